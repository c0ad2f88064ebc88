use crate::db::SchemaConfig;
use crate::domain::ExpiryDate;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_dir: PathBuf,
    pub database_name: String,
    pub general_items: bool,
    pub busy_timeout_ms: u64,
    /// Replaces the system date for the load cycle when set.
    pub today: Option<ExpiryDate>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_dir = env_map
            .get("MEDSTOCK_DB_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let database_name = env_map
            .get("MEDSTOCK_DB_NAME")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| "inventory".to_string());
        if database_name.is_empty() {
            return Err(ConfigError::InvalidValue(
                "MEDSTOCK_DB_NAME".to_string(),
                "must not be blank".to_string(),
            ));
        }

        let general_items = match env_map
            .get("MEDSTOCK_GENERAL_ITEMS")
            .map(|s| s.as_str())
            .unwrap_or("true")
        {
            "true" | "1" => true,
            "false" | "0" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "MEDSTOCK_GENERAL_ITEMS".to_string(),
                    format!("must be true or false, got {}", other),
                ))
            }
        };

        let busy_timeout_ms = env_map
            .get("MEDSTOCK_BUSY_TIMEOUT_MS")
            .map(|s| s.as_str())
            .unwrap_or("5000")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "MEDSTOCK_BUSY_TIMEOUT_MS".to_string(),
                    "must be a valid u64".to_string(),
                )
            })?;

        let today = env_map
            .get("MEDSTOCK_TODAY")
            .map(|s| ExpiryDate::parse(s))
            .transpose()
            .map_err(|e| ConfigError::InvalidValue("MEDSTOCK_TODAY".to_string(), e.to_string()))?;

        Ok(Config {
            database_dir,
            database_name,
            general_items,
            busy_timeout_ms,
            today,
        })
    }

    pub fn schema_config(&self) -> SchemaConfig {
        SchemaConfig {
            general_items: self.general_items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(HashMap::new()).unwrap();
        assert_eq!(config.database_dir, PathBuf::from("."));
        assert_eq!(config.database_name, "inventory");
        assert!(config.general_items);
        assert_eq!(config.busy_timeout_ms, 5000);
        assert!(config.today.is_none());
    }

    #[test]
    fn test_overrides() {
        let mut env_map = HashMap::new();
        env_map.insert("MEDSTOCK_DB_DIR".to_string(), "/var/lib/medstock".to_string());
        env_map.insert("MEDSTOCK_DB_NAME".to_string(), "db_vite".to_string());
        env_map.insert("MEDSTOCK_GENERAL_ITEMS".to_string(), "false".to_string());
        env_map.insert("MEDSTOCK_TODAY".to_string(), "2024-06-01".to_string());

        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.database_dir, PathBuf::from("/var/lib/medstock"));
        assert_eq!(config.database_name, "db_vite");
        assert_eq!(config.schema_config(), SchemaConfig { general_items: false });
        assert_eq!(config.today.map(|d| d.to_canonical_string()), Some("2024-06-01".to_string()));
    }

    #[test]
    fn test_blank_database_name() {
        let mut env_map = HashMap::new();
        env_map.insert("MEDSTOCK_DB_NAME".to_string(), "  ".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "MEDSTOCK_DB_NAME"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_general_items() {
        let mut env_map = HashMap::new();
        env_map.insert("MEDSTOCK_GENERAL_ITEMS".to_string(), "yes".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "MEDSTOCK_GENERAL_ITEMS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_busy_timeout() {
        let mut env_map = HashMap::new();
        env_map.insert("MEDSTOCK_BUSY_TIMEOUT_MS".to_string(), "-1".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "MEDSTOCK_BUSY_TIMEOUT_MS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_today() {
        let mut env_map = HashMap::new();
        env_map.insert("MEDSTOCK_TODAY".to_string(), "01/06/2024".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "MEDSTOCK_TODAY"),
            _ => panic!("Expected InvalidValue error"),
        }
    }
}
