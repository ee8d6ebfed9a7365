//! Responder configuration.
//!
//! Settings come from an optional JSON file, then CLI overrides. Key material
//! never lives in the file: it is read from the environment into an explicit
//! `Identity` that the caller hands to `Responder::new`.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use courier_crypto::Identity;

use crate::error::ResponderError;

pub const SIGNING_KEY_ENV: &str = "COURIER_SIGNING_KEY";
pub const ENCRYPTION_KEY_ENV: &str = "COURIER_ENCRYPTION_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderConfig {
    pub database_path: PathBuf,
    pub poll_interval_secs: u64,
    /// Maximum inbound messages handled per batch.
    pub batch_size: u32,
    /// Alias published alongside the responder's public keys.
    pub alias: Option<String>,
    /// Prepended to the echoed text of every reply.
    pub reply_prefix: String,
    /// Run the TTL sweep before each batch.
    pub sweep_expired: bool,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("courier-relay.db"),
            poll_interval_secs: 5,
            batch_size: 50,
            alias: Some("courier-responder".into()),
            reply_prefix: "re: ".into(),
            sweep_expired: true,
        }
    }
}

impl ResponderConfig {
    /// Read `path` if given; absent fields keep their defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ResponderError> {
        let cfg = match path {
            Some(p) => {
                let data = std::fs::read_to_string(p)?;
                serde_json::from_str(&data)?
            }
            None => Self::default(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ResponderError> {
        if self.poll_interval_secs == 0 {
            return Err(ResponderError::Config("poll_interval_secs must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(ResponderError::Config("batch_size must be at least 1".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Build the responder identity from hex secrets in the environment.
pub fn identity_from_env(alias: Option<String>) -> Result<Identity, ResponderError> {
    let signing = read_secret(SIGNING_KEY_ENV)?;
    let encryption = read_secret(ENCRYPTION_KEY_ENV)?;
    Ok(Identity::from_hex(&signing, &encryption, alias)?)
}

fn read_secret(var: &str) -> Result<Zeroizing<String>, ResponderError> {
    std::env::var(var)
        .map(Zeroizing::new)
        .map_err(|_| ResponderError::Config(format!("{var} is not set (run `keygen` to create one)")))
}
