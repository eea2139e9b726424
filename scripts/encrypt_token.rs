//! Token Encryption Utility
//!
//! This script encrypts tokens using AES-256-GCM for secure database storage.
//! Requires TOKEN_ENCRYPTION_KEY environment variable to be set.

use std::io::{self, Write};

use postrank::crypto::KEY_ENV_VAR;
use postrank::TokenCipher;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    println!("🔐 Token Encryption Utility");
    println!("===========================");
    println!();

    let cipher = match TokenCipher::from_env() {
        Ok(cipher) => cipher,
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            eprintln!();
            eprintln!("Generate a key with:");
            eprintln!("  openssl rand -hex 32");
            eprintln!();
            eprintln!("Then set it:");
            eprintln!("  export {}=\"your_64_char_hex_key\"", KEY_ENV_VAR);
            std::process::exit(1);
        }
    };

    print!("Enter the token to encrypt: ");
    io::stdout().flush()?;
    let mut token = String::new();
    io::stdin().read_line(&mut token)?;
    let token = token.trim();

    if token.is_empty() {
        eprintln!("❌ Error: Token cannot be empty");
        std::process::exit(1);
    }

    match cipher.encrypt(token) {
        Ok(encrypted) => {
            println!();
            println!("✅ Token encrypted successfully!");
            println!();
            println!("Encrypted value (hex):");
            println!("{}", encrypted);
            println!();
            println!("📝 Use this value in the delegated_tokens table.");
        }
        Err(e) => {
            eprintln!("❌ Encryption failed: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
