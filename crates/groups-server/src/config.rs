use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Postgres connection string. Without one the server keeps its data in memory.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub app_env: String,
    pub default_page_limit: u32,
}

fn parse_or<T>(key: &str, default: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .map_err(|e| anyhow::anyhow!("Invalid {} value {:?}: {}", key, raw, e))
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());
        if database_url.is_none() {
            tracing::warn!("DATABASE_URL not set, data will be kept in memory");
        }

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_or("PORT", "3000")?,
            database_url,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", "10")?,
            app_env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            default_page_limit: parse_or("DEFAULT_PAGE_LIMIT", "20")?,
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: None,
            database_max_connections: 10,
            app_env: "development".to_string(),
            default_page_limit: 20,
        }
    }
}
