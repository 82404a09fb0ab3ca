use anyhow::Context;
use std::str::FromStr;

const DEFAULT_DATABASE_URL: &str = "sqlite:catalog.db?mode=rwc";
const DEFAULT_SERVER_PORT: u16 = 8080;

#[derive(Debug)]
pub struct Config {
    database_url: String,
    server_port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = load_env_or("DATABASE_URL", DEFAULT_DATABASE_URL.to_string())?;
        let server_port = load_env_or("SERVER_PORT", DEFAULT_SERVER_PORT)?;
        Ok(Self {
            database_url,
            server_port,
        })
    }

    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    #[must_use]
    pub const fn server_port(&self) -> u16 {
        self.server_port
    }
}

fn load_env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .with_context(|| format!("Failed to parse environment variable {key}")),
        Err(std::env::VarError::NotPresent) => Ok(default),
        Err(err) => {
            Err(err).with_context(|| format!("Failed to load environment variable {key}"))
        }
    }
}
