// src/config/mod.rs
// Process configuration, loaded once from the environment (.env supported)

use once_cell::sync::Lazy;
use std::str::FromStr;

pub static CONFIG: Lazy<WeftConfig> = Lazy::new(WeftConfig::from_env);

#[derive(Debug, Clone)]
pub struct WeftConfig {
    // ── Executor Configuration
    pub executor_base_url: String,

    // ── Database Configuration
    pub database_url: String,
    pub sqlite_max_connections: u32,

    // ── Server Configuration
    pub host: String,
    pub port: u16,

    // ── Logging Configuration
    pub log_level: String,
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => match val.trim().parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                eprintln!("Config: {} = '{}' (parse failed, using default)", key, val);
                default
            }
        },
        Err(_) => default,
    }
}

impl WeftConfig {
    pub fn from_env() -> Self {
        // Load from .env file first if it exists
        let _ = dotenvy::dotenv();

        Self {
            executor_base_url: env_var_or(
                "EXECUTOR_BASE_URL",
                "http://localhost:8000".to_string(),
            ),
            database_url: env_var_or("DATABASE_URL", "sqlite://weft.db?mode=rwc".to_string()),
            sqlite_max_connections: env_var_or("SQLITE_MAX_CONNECTIONS", 5),
            host: env_var_or("HOST", "0.0.0.0".to_string()),
            port: env_var_or("PORT", 8080),
            log_level: env_var_or("LOG_LEVEL", "info".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let config = WeftConfig::from_env();
        assert!(!config.executor_base_url.is_empty());
        assert!(config.sqlite_max_connections > 0);
    }
}
