//! Command-line helper for secret references
//!
//! - `key`: print a fresh base64 key for the `scr` backend
//! - `encrypt` / `decrypt`: seal or open a value with that key
//! - `resolve`: resolve a reference against the default registry

use clap::{Parser, Subcommand};
use secret_ref::backends::cipher;
use secret_ref::{Registry, Secret, CIPHER_KEY_ENV};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "secret-ref")]
#[command(about = "Create and resolve secret references", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new base64 key for the scr backend
    Key,
    /// Encrypt a value; prints the locator to use after `scr:`
    Encrypt {
        /// Value to encrypt
        #[arg(short, long)]
        value: String,
        /// Base64 key (defaults to the built-in key when neither flag nor env is set)
        #[arg(short, long, env = CIPHER_KEY_ENV, hide_env_values = true)]
        key: Option<String>,
    },
    /// Decrypt a locator produced by `encrypt`
    Decrypt {
        /// Locator to decrypt
        #[arg(short, long)]
        value: String,
        /// Base64 key
        #[arg(short, long, env = CIPHER_KEY_ENV, hide_env_values = true)]
        key: Option<String>,
    },
    /// Resolve a reference, e.g. `env:HOME` or `db://{{env:USER}}@host`
    Resolve {
        /// Reference to resolve
        reference: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn key_bytes(key: Option<&str>) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    match key {
        Some(encoded) if !encoded.is_empty() => Ok(cipher::decode_key(encoded)?.to_vec()),
        _ => {
            debug!("no key given, using the built-in default key");
            Ok(cipher::DEFAULT_KEY.to_vec())
        }
    }
}

fn run(command: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match command {
        Commands::Key => Ok(cipher::generate_key()),
        Commands::Encrypt { value, key } => {
            let key = key_bytes(key.as_deref())?;
            let sealed = cipher::encrypt(&value, &key)?;
            if cipher::decrypt(&sealed, &key)? != value {
                return Err("encrypted value did not decrypt back to the input".into());
            }
            Ok(sealed)
        }
        Commands::Decrypt { value, key } => {
            let key = key_bytes(key.as_deref())?;
            Ok(cipher::decrypt(&value, &key)?)
        }
        Commands::Resolve { reference } => {
            let secret = Secret::parse_with(&Registry::global(), &reference);
            if let Some(e) = secret.parse_error() {
                return Err(e.into());
            }
            let value = secret.get();
            match secret.internal_error() {
                Some(e) => Err(e.into()),
                None => Ok(value),
            }
        }
    }
}
