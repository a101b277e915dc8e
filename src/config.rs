use actix_web::cookie::Key;
use log::{info, warn};
use std::path::PathBuf;
use thiserror::Error;

const PREFIX: &str = "WATCHLIST_";
const MIN_SECRET_KEY_LEN: usize = 64;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: String, value: String },

    #[error("WATCHLIST_SECRET_KEY must be at least 64 bytes, got {0}")]
    SecretKeyTooShort(usize),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub database: PathBuf,
    pub upload_folder: PathBuf,
    pub secret_key: Option<Vec<u8>>,
    pub secure_cookies: bool,
    pub password_cost: u32,
}

impl Config {
    /// Loads the configuration from the process environment and `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            info!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", PREFIX, name));

        let secret_key = var("SECRET_KEY").map(String::into_bytes);
        if let Some(key) = &secret_key {
            if key.len() < MIN_SECRET_KEY_LEN {
                return Err(ConfigError::SecretKeyTooShort(key.len()));
            }
        }

        Ok(Config {
            bind: var("BIND").unwrap_or_else(|| "127.0.0.1:8080".to_owned()),
            database: var("DATABASE")
                .unwrap_or_else(|| "watchlist.db".to_owned())
                .into(),
            upload_folder: var("UPLOAD_FOLDER")
                .unwrap_or_else(|| "uploads".to_owned())
                .into(),
            secret_key,
            secure_cookies: parse(&var, "SECURE_COOKIES", false)?,
            password_cost: parse(&var, "PASSWORD_COST", bcrypt::DEFAULT_COST)?,
        })
    }

    pub fn cookie_key(&self) -> Key {
        match &self.secret_key {
            Some(key) => Key::from(key.as_slice()),
            None => {
                warn!("{}SECRET_KEY not set, sessions will not survive a restart", PREFIX);
                Key::generate()
            }
        }
    }
}

fn parse<T, F>(var: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key: format!("{}{}", PREFIX, name),
            value,
        }),
        None => Ok(default),
    }
}
