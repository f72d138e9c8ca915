use secrecy::Secret;
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_ACTIVATION_RETRY_LIMIT: u32 = 3;
pub const MAX_ACTIVATION_RETRY_LIMIT: u32 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,

    // Storage: the keys file is used unless a database is configured
    pub keys_file: PathBuf,
    pub database_url: Option<Secret<String>>,

    // Admin routes are open when no token is set
    pub admin_token: Option<Secret<String>>,

    pub static_dir: PathBuf,
    pub activation_retry_limit: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Ok(Self {
            host: config.get("host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: config.get("port").unwrap_or(3000),

            keys_file: config
                .get::<String>("keys_file")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("keys.json")),
            database_url: config
                .get::<String>("database_url")
                .ok()
                .filter(|url| !url.is_empty())
                .map(Secret::new),

            admin_token: config
                .get::<String>("admin_token")
                .ok()
                .filter(|token| !token.is_empty())
                .map(Secret::new),

            static_dir: config
                .get::<String>("static_dir")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("public")),
            activation_retry_limit: check_retry_limit(
                config
                    .get("activation_retry_limit")
                    .unwrap_or(DEFAULT_ACTIVATION_RETRY_LIMIT),
            )?,
        })
    }

    /// Configuration for a file-backed store with no admin token
    pub fn for_keys_file(keys_file: impl Into<PathBuf>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            keys_file: keys_file.into(),
            database_url: None,
            admin_token: None,
            static_dir: PathBuf::from("public"),
            activation_retry_limit: DEFAULT_ACTIVATION_RETRY_LIMIT,
        }
    }
}

fn check_retry_limit(limit: u32) -> Result<u32, config::ConfigError> {
    if limit > MAX_ACTIVATION_RETRY_LIMIT {
        return Err(config::ConfigError::Message(format!(
            "ACTIVATION_RETRY_LIMIT must be at most {}, got {}",
            MAX_ACTIVATION_RETRY_LIMIT, limit
        )));
    }
    Ok(limit)
}
