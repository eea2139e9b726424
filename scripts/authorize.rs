//! X Authorization Script
//!
//! This script obtains OAuth 2.0 user-context tokens (access + refresh) with
//! the PKCE flow. Run it once, then configure the printed tokens.
//!
//! Reads `X_CLIENT_ID` and `X_CLIENT_SECRET` from the environment and
//! `X_REDIRECT_URI` (defaults to `http://127.0.0.1:3456/callback`).
//!
//! By default a short-lived local listener captures the redirect. With
//! `--no-server` the redirect URL is pasted back by hand instead.

use std::env;
use std::io::{self, Write};

use postrank::setup::{
    build_authorization_url, exchange_code, generate_pkce, generate_state, parse_redirect,
    wait_for_callback, DEFAULT_REDIRECT_URI,
};
use postrank::tokens::StoredTokens;
use postrank::{TokenStore, XApiConfig};

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

    println!("🤖 X Authorization Helper");
    println!("=========================");

    let paste_mode = env::args().any(|arg| arg == "--no-server");

    let config = XApiConfig::from_env();
    let (client_id, client_secret) = match config.client_credentials() {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            eprintln!();
            eprintln!("Find both values in the developer portal under your app's");
            eprintln!("\"Keys and tokens\" tab (OAuth 2.0 Client ID and Client Secret).");
            std::process::exit(1);
        }
    };
    let redirect_uri = env::var("X_REDIRECT_URI")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());

    // Generate PKCE parameters
    let pkce = generate_pkce();
    let state = generate_state();
    let auth_url = build_authorization_url(
        &config.authorize_url,
        &client_id,
        &redirect_uri,
        &state,
        &pkce.challenge,
    )?;

    println!("\n🔗 Authorization Steps:");
    println!("1. Make sure {} is a registered callback URL of your app", redirect_uri);
    println!("2. Open this URL in your browser:");
    println!("   {}", auth_url);
    println!("3. Authorize the application");

    let code = if paste_mode {
        println!("4. Copy the full URL your browser was redirected to");
        let pasted = prompt("\nPaste the redirect URL: ")?;
        parse_redirect(&pasted, &state)?
    } else {
        println!("\n⏳ Waiting for the callback on {} ...", redirect_uri);
        wait_for_callback(&redirect_uri, &state).await?
    };

    println!("\n🔄 Exchanging code for tokens...");
    let http = reqwest::Client::new();
    let grant = exchange_code(
        &http,
        &config.token_url,
        &client_id,
        &client_secret,
        &code,
        &redirect_uri,
        &pkce.verifier,
    )
    .await?;

    let refresh_token = grant.refresh_token.clone().unwrap_or_default();
    println!("\n✅ Success! Tokens received (access token valid for {} seconds).", grant.expires_in);
    println!("\n📝 Set these environment variables:");
    println!("export X_OAUTH2_ACCESS_TOKEN=\"{}\"", grant.access_token);
    println!("export X_OAUTH2_REFRESH_TOKEN=\"{}\"", refresh_token);
    println!("\n💡 With X_CLIENT_ID and X_CLIENT_SECRET also set, expired tokens are refreshed automatically.");

    // Seed the token store so the service starts from this pair
    let store = TokenStore::from_env().await?;
    if store.is_persistent() {
        store.save(&StoredTokens::from_grant(&grant)).await?;
        println!("🗄️  Tokens also saved (encrypted) to the database.");
    } else {
        // A stored pair wins over the environment, so a stale one would shadow these
        println!("\n⚠️  DATABASE_URL is not set, so the tokens were not saved to a database.");
        println!("   If the service keeps tokens in a database, run this again with");
        println!("   DATABASE_URL and TOKEN_ENCRYPTION_KEY set, or it keeps using the old pair.");
    }

    Ok(())
}
