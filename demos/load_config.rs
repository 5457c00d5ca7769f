//! Load a YAML configuration whose fields are secret references
//!
//! ```sh
//! DB_PASS=hunter2 cargo run --example load_config
//! ```

use secret_ref::backends::{cipher, CipherBackend, CIPHER};
use secret_ref::{validate_required_secret, Registry, Secret};
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
struct Config {
    db: Db,
    #[serde(default)]
    banner: Option<Secret>,
}

#[derive(Debug, Deserialize, Validate)]
struct Db {
    user: Secret,
    #[validate(custom(function = "validate_required_secret"))]
    password: Secret,
    url: Secret,
    api_key: Secret,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Seal a value with a throwaway key so the demo is self-contained
    let key = cipher::generate_key();
    let sealed = cipher::encrypt("sk-demo-123", &cipher::decode_key(&key)?)?;

    let registry = Registry::with_builtins();
    registry.register(CIPHER, CipherBackend::from_base64(&key)?);

    let yaml = format!(
        r#"
db:
  user: raw:admin
  password: dynenv:DB_PASS
  url: "postgres://{{{{raw:admin}}}}:{{{{dynenv:DB_PASS}}}}@localhost:5432/app"
  api_key: scr:{sealed}
banner: "welcome to {{{{env:HOSTNAME}}}}"
"#
    );

    let config: Config = registry.scope(|| serde_yaml::from_str(&yaml))?;

    match config.db.validate() {
        Ok(()) => println!("db password resolves"),
        Err(e) => println!("db config invalid: {}", e),
    }

    println!("user    = {}", config.db.user.get());
    println!("url     = {}", config.db.url.get());
    println!("api_key = {}", config.db.api_key.get());

    if let Some(banner) = &config.banner {
        let text = banner.get();
        match banner.internal_error() {
            Some(e) => println!("banner  = {:?} (partial: {})", text, e),
            None => println!("banner  = {}", text),
        }
    }

    println!("{:#?}", config.db.password);
    Ok(())
}
