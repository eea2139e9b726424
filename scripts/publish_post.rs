//! X Post Publishing Script
//!
//! Publishes one post with the credentials configured in the environment
//! (OAuth 2.0 user tokens, or OAuth 1.0a). The text is taken from the
//! command line, or prompted for when no arguments are given.

use std::env;
use std::io::{self, Write};

use postrank::twitter::MAX_POST_CHARS;
use postrank::{TokenStore, XApiConfig, XClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    println!("🐦 X Post Publisher");
    println!("===================");

    let args: Vec<String> = env::args().skip(1).collect();
    let text = if args.is_empty() {
        print!("Enter the post text: ");
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        line.trim().to_string()
    } else {
        args.join(" ")
    };

    if text.chars().count() > MAX_POST_CHARS {
        println!(
            "⚠️  Text is longer than {} characters and will be truncated",
            MAX_POST_CHARS
        );
    }

    let client = XClient::with_store(XApiConfig::from_env(), TokenStore::from_env().await?);
    println!("\n🚀 Publishing...");
    let result = client.publish_post(&text).await;
    report_rotated_tokens(&client).await;
    match result {
        Ok(post) => {
            println!("\n✅ Post published!");
            println!("   ID:   {}", post.id);
            println!("   Text: {}", post.text);
            println!("   URL:  {}", post.url());
        }
        Err(e) => {
            eprintln!("\n❌ Publishing failed ({}): {}", e.kind(), e);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Prints the pair a refresh rotated when nothing persists it.
async fn report_rotated_tokens(client: &XClient) {
    match client.tokens().rotated_tokens().await {
        Ok(Some(rotated)) => {
            println!("\n🔄 The access token was refreshed during this run.");
            println!("   The old refresh token no longer works. Update your environment:");
            println!("export X_OAUTH2_ACCESS_TOKEN=\"{}\"", rotated.access_token);
            if let Some(refresh_token) = rotated.refresh_token {
                println!("export X_OAUTH2_REFRESH_TOKEN=\"{}\"", refresh_token);
            }
            println!("💡 Set DATABASE_URL and TOKEN_ENCRYPTION_KEY to keep refreshed tokens automatically.");
        }
        Ok(None) => {}
        Err(e) => eprintln!("⚠️  Could not read refreshed tokens: {}", e),
    }
}
