//! Application configuration, read from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `RAILYARD_ENV` (or `APP_ENV`) | `development` |
//! | `HOST` | `0.0.0.0` |
//! | `PORT` | `3000` |
//! | `LOG_LEVEL` | `info` |
//! | `DB_NAME` | `railyard_dev` / `railyard_test` / `railyard` |
//! | `DB_LOGGING` | on in development |
//! | `RAILYARD_STRICT_DEFINITIONS` | `false` |
//! | `VIEWS_DIR` | `app/views` |

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

use crate::model::ParseMode;
use crate::serve::env_loader::load_env_files;

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Production => "production",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "development" | "dev" => Some(Environment::Development),
            "test" => Some(Environment::Test),
            "production" | "prod" => Some(Environment::Production),
            _ => None,
        }
    }

    pub fn is_development(&self) -> bool {
        *self == Environment::Development
    }

    pub fn is_production(&self) -> bool {
        *self == Environment::Production
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseConfig {
    pub name: String,
    /// Log every query at debug level.
    pub logging: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub strict_definitions: bool,
    pub views_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl AppConfig {
    /// Load `.env` files from `root`, then read the process environment.
    pub fn load(root: &Path) -> Self {
        load_env_files(root, || resolve_environment(env_var).as_str().to_string());

        let mut config = Self::from_env();
        if config.views_dir.is_relative() {
            config.views_dir = root.join(&config.views_dir);
        }
        config
    }

    pub fn from_env() -> Self {
        Self::from_lookup(env_var)
    }

    /// Build a config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = resolve_environment(&lookup);

        let port = match lookup("PORT") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("Invalid PORT '{}', using {}", raw, DEFAULT_PORT);
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        let database = DatabaseConfig {
            name: lookup("DB_NAME").unwrap_or_else(|| default_database_name(environment)),
            logging: lookup("DB_LOGGING")
                .map(|v| is_truthy(&v))
                .unwrap_or(environment.is_development()),
        };

        Self {
            environment,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            database,
            strict_definitions: lookup("RAILYARD_STRICT_DEFINITIONS")
                .map(|v| is_truthy(&v))
                .unwrap_or(false),
            views_dir: lookup("VIEWS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("app/views")),
        }
    }

    pub fn parse_mode(&self) -> ParseMode {
        if self.strict_definitions {
            ParseMode::Strict
        } else {
            ParseMode::Lenient
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `RAILYARD_ENV`, then `APP_ENV`; unknown names fall back to development.
fn resolve_environment<F>(lookup: F) -> Environment
where
    F: Fn(&str) -> Option<String>,
{
    match lookup("RAILYARD_ENV").or_else(|| lookup("APP_ENV")) {
        Some(name) => Environment::from_name(&name).unwrap_or_else(|| {
            warn!("Unknown environment '{}', using development", name);
            Environment::Development
        }),
        None => Environment::Development,
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn default_database_name(environment: Environment) -> String {
    match environment {
        Environment::Development => "railyard_dev",
        Environment::Test => "railyard_test",
        Environment::Production => "railyard",
    }
    .to_string()
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(
            config.database,
            DatabaseConfig {
                name: "railyard_dev".into(),
                logging: true
            }
        );
        assert_eq!(config.parse_mode(), ParseMode::Lenient);
        assert_eq!(config.views_dir, PathBuf::from("app/views"));
        assert_eq!(config.address(), "0.0.0.0:3000");
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("APP_ENV", "production"),
            ("PORT", "8080"),
            ("DB_NAME", "blog"),
            ("RAILYARD_STRICT_DEFINITIONS", "true"),
        ]);
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.port, 8080);
        assert_eq!(config.database.name, "blog");
        assert!(!config.database.logging);
        assert_eq!(config.parse_mode(), ParseMode::Strict);
    }

    #[test]
    fn test_railyard_env_wins_and_bad_values_fall_back() {
        let config = config(&[("RAILYARD_ENV", "test"), ("APP_ENV", "production"), ("PORT", "http")]);
        assert_eq!(config.environment, Environment::Test);
        assert_eq!(config.database.name, "railyard_test");
        assert_eq!(config.port, DEFAULT_PORT);

        assert_eq!(config_env("staging"), Environment::Development);
    }

    #[test]
    fn test_env_file_can_select_the_environment() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "RAILYARD_ENV=production\n").unwrap();
        std::fs::write(dir.path().join(".env.production"), "DB_NAME=prod_db\n").unwrap();
        std::fs::write(dir.path().join(".env.development"), "DB_NAME=dev_db\n").unwrap();

        let config = AppConfig::load(dir.path());
        std::env::remove_var("RAILYARD_ENV");
        std::env::remove_var("DB_NAME");

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.database.name, "prod_db");
        assert_eq!(config.views_dir, dir.path().join("app/views"));
    }

    fn config_env(name: &str) -> Environment {
        config(&[("RAILYARD_ENV", name)]).environment
    }
}
