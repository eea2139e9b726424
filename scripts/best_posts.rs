//! Best Posts Digest
//!
//! Runs the best posts digest once, using the same settings as the
//! scheduled job (`DIGEST_USERNAME`, `TELEGRAM_BOT_TOKEN`,
//! `TELEGRAM_TARGET_CHAT_ID`, ...). With `--dry-run` the digest is logged
//! instead of sent, and the Telegram settings are not needed.

use std::env;

use postrank::config::DEFAULT_TELEGRAM_API_BASE;
use postrank::{run_digest, DigestConfig, DigestSink, TokenStore, XApiConfig, XClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("🏆 Best Posts Digest");
    println!("====================");

    let dry_run = env::args().any(|arg| arg == "--dry-run");

    let digest = if dry_run {
        // Only the username matters when nothing is sent
        let username = match env::var("DIGEST_USERNAME") {
            Ok(u) if !u.trim().is_empty() => u,
            _ => {
                eprintln!("❌ Error: DIGEST_USERNAME is not set");
                std::process::exit(1);
            }
        };
        DigestConfig::from_lookup(|name| match name {
            "DIGEST_USERNAME" => Some(username.clone()),
            "TELEGRAM_BOT_TOKEN" | "TELEGRAM_TARGET_CHAT_ID" => Some("dry-run".to_string()),
            "TELEGRAM_API_BASE_URL" => Some(DEFAULT_TELEGRAM_API_BASE.to_string()),
            other => env::var(other).ok(),
        })?
    } else {
        match DigestConfig::from_env() {
            Ok(digest) => digest,
            Err(e) => {
                eprintln!("❌ Error: {}", e);
                eprintln!("   Use --dry-run to print the digest without Telegram settings.");
                std::process::exit(1);
            }
        }
    };

    let sink = if dry_run {
        DigestSink::Log
    } else {
        DigestSink::telegram(&digest)
    };

    let client = XClient::with_store(XApiConfig::from_env(), TokenStore::from_env().await?);
    println!("\n🔍 Ranking posts for @{}...", digest.username);
    let result = run_digest(&client, &digest, &sink).await;
    report_rotated_tokens(&client).await;
    match result {
        Ok(0) => println!("\n🤷 No posts found, nothing was sent."),
        Ok(count) if dry_run => println!("\n✅ Digest with {} posts logged (dry run).", count),
        Ok(count) => println!("\n✅ Digest with {} posts sent.", count),
        Err(e) => {
            eprintln!("\n❌ Digest failed ({}): {}", e.kind(), e);
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
