//! X Token Refresh Utility
//!
//! This script exchanges a refresh token for a new OAuth 2.0 access token.
//! Client id, client secret and refresh token are taken from the environment
//! (`X_CLIENT_ID`, `X_CLIENT_SECRET`, `X_OAUTH2_REFRESH_TOKEN`) or prompted for.

use std::io::{self, Write};

use postrank::tokens::refresh_grant;
use postrank::XApiConfig;

fn prompt(label: &str) -> io::Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    println!("🔄 X Token Refresh Utility");
    println!("==========================");

    let config = XApiConfig::from_env();
    let client_id = match config.client_id.clone() {
        Some(id) => id,
        None => prompt("Enter your OAuth 2.0 Client ID: ")?,
    };
    let client_secret = match config.client_secret.clone() {
        Some(secret) => secret,
        None => prompt("Enter your OAuth 2.0 Client Secret: ")?,
    };
    let refresh_token = match config.delegated.as_ref().and_then(|d| d.refresh_token.clone()) {
        Some(token) => token,
        None => prompt("Enter your refresh token: ")?,
    };

    if client_id.is_empty() || client_secret.is_empty() || refresh_token.is_empty() {
        eprintln!("❌ Error: client id, client secret and refresh token are all required");
        std::process::exit(1);
    }

    println!("\n🔄 Refreshing access token...");
    let http = reqwest::Client::new();
    let grant = refresh_grant(
        &http,
        &config.token_url,
        &client_id,
        &client_secret,
        &refresh_token,
    )
    .await?;

    println!("\n✅ Success! Your new access token is:");
    println!("{}", grant.access_token);
    println!("\n📝 Update your environment:");
    println!("export X_OAUTH2_ACCESS_TOKEN=\"{}\"", grant.access_token);

    if let Some(new_refresh) = grant.refresh_token.as_deref().filter(|t| *t != refresh_token) {
        println!("export X_OAUTH2_REFRESH_TOKEN=\"{}\"", new_refresh);
        println!("\n⚠️  IMPORTANT: Your old refresh token is now invalid!");
        println!("   You must update your refresh token to continue automatic refresh.");
    }

    Ok(())
}
