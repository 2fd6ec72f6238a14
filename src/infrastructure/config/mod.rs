// ============================================================
// CONFIGURATION LOADING
// ============================================================
// Defaults, then TOML file, then FARMER_INGEST_* environment

use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use tracing::debug;
use url::Url;

use crate::domain::error::{AppError, Result};
use crate::domain::ingest_config::{DatabaseConfig, IngestConfig};

pub const DEFAULT_CONFIG_PATH: &str = "config/ingest.toml";
pub const ENV_PREFIX: &str = "FARMER_INGEST_";

pub fn figment(path: &Path) -> Figment {
    Figment::from(Serialized::defaults(IngestConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load and check the configuration.
/// An explicitly named file must exist; the default path is optional.
pub fn load_config(path: Option<&Path>) -> Result<IngestConfig> {
    let config_path = match path {
        Some(path) if !path.exists() => {
            return Err(AppError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        Some(path) => path,
        None => Path::new(DEFAULT_CONFIG_PATH),
    };

    let config: IngestConfig = figment(config_path)
        .extract()
        .map_err(|e| AppError::ConfigError(format!("Failed to load config: {}", e)))?;
    config.check()?;

    debug!(
        path = %config_path.display(),
        batch_size = config.batch_size,
        duplicate_policy = %config.duplicate_policy,
        "Configuration loaded"
    );
    Ok(config)
}

/// Connection URL from the process environment and the database section
pub fn resolve_database_url(config: &DatabaseConfig) -> Result<String> {
    resolve_database_url_with(config, |key| std::env::var(key).ok())
}

/// `DATABASE_URL` wins, then the configured `url`, then a PostgreSQL URL
/// assembled from the parts with `POSTGRES_*` variables overriding them
pub fn resolve_database_url_with<F>(config: &DatabaseConfig, env: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = env("DATABASE_URL") {
        return Ok(url);
    }
    if let Some(url) = config.url.as_ref().filter(|u| !u.trim().is_empty()) {
        return Ok(url.clone());
    }

    let host = env("POSTGRES_HOST").unwrap_or_else(|| config.host.clone());
    let port = match env("POSTGRES_PORT") {
        Some(port) => port
            .parse::<u16>()
            .map_err(|_| AppError::ConfigError(format!("POSTGRES_PORT '{}' is not a port number", port)))?,
        None => config.port,
    };
    let database = env("POSTGRES_DB").unwrap_or_else(|| config.database.clone());
    let username = env("POSTGRES_USER").unwrap_or_else(|| config.username.clone());
    let password = env("POSTGRES_PASSWORD").or_else(|| config.password.clone());

    let invalid = |what: &str| AppError::ConfigError(format!("Invalid database {}", what));

    let mut url = Url::parse(&format!("postgres://{}", host)).map_err(|_| invalid("host"))?;
    url.set_port(Some(port)).map_err(|_| invalid("port"))?;
    url.set_username(&username).map_err(|_| invalid("username"))?;
    if let Some(password) = password {
        url.set_password(Some(&password)).map_err(|_| invalid("password"))?;
    }
    url.set_path(&database);

    Ok(url.to_string())
}
