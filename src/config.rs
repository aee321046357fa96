// ⚙️ Configuration
// Defaults, then parking.toml, then PARKING_* environment variables

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "parking.toml";
pub const ENV_PREFIX: &str = "PARKING_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database file
    pub database_path: PathBuf,

    /// How long a unit of work waits for the write lock
    pub busy_timeout_ms: u64,

    /// Listen address for the HTTP server
    pub bind_address: String,

    /// Fallback filter when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from("parking.db"),
            busy_timeout_ms: 5_000,
            bind_address: "0.0.0.0:8080".to_string(),
            log_filter: "parking_engine=info".to_string(),
        }
    }
}

impl Config {
    /// Layered figment: defaults, then the TOML file if present, then env.
    pub fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, figment::Error> {
        figment.extract()
    }

    /// Load from `path`, or from `parking.toml` in the working directory.
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Self::from_figment(Self::figment(path))
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        let config = Config::from_figment(figment).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(
                r#"
                database_path = "/var/lib/parking/lots.db"
                busy_timeout_ms = 250
                "#,
            ));
        let config = Config::from_figment(figment).unwrap();

        assert_eq!(config.database_path, PathBuf::from("/var/lib/parking/lots.db"));
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(config.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_bad_value_is_reported() {
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string("busy_timeout_ms = \"soon\""));

        assert!(Config::from_figment(figment).is_err());
    }
}
