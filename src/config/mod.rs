use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::auth::MAX_JWT_EXPIRY_HOURS;
use crate::tenancy::schema_name::SchemaName;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub tenancy: TenancyConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection.
    pub connection_timeout: u64,
    pub enable_query_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    pub schema_prefix: String,
    pub shared_schema: String,
    pub transaction_timeout_ms: u64,
    pub isolation_level: IsolationLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "read_committed" => Ok(IsolationLevel::ReadCommitted),
            "repeatable_read" => Ok(IsolationLevel::RepeatableRead),
            "serializable" => Ok(IsolationLevel::Serializable),
            other => Err(format!("unknown isolation level: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub cors_origins: Vec<String>,
}

/// Rejected configuration values.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid tenancy.{0}")]
    InvalidTenancy(&'static str),

    #[error("JWT_SECRET must be set outside development")]
    MissingJwtSecret,

    #[error("SECURITY_JWT_EXPIRY_HOURS out of range: {0}")]
    InvalidJwtExpiry(u64),
}

const DEVELOPMENT_JWT_SECRET: &str = "development-only-secret";

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_ENABLE_QUERY_LOGGING") {
            self.database.enable_query_logging = v.parse().unwrap_or(self.database.enable_query_logging);
        }

        // Tenancy overrides
        if let Ok(v) = env::var("TENANCY_SCHEMA_PREFIX") {
            self.tenancy.schema_prefix = v;
        }
        if let Ok(v) = env::var("TENANCY_SHARED_SCHEMA") {
            self.tenancy.shared_schema = v;
        }
        if let Ok(v) = env::var("TENANCY_TRANSACTION_TIMEOUT_MS") {
            self.tenancy.transaction_timeout_ms = v.parse().unwrap_or(self.tenancy.transaction_timeout_ms);
        }
        if let Ok(v) = env::var("TENANCY_ISOLATION_LEVEL") {
            match v.parse() {
                Ok(level) => self.tenancy.isolation_level = level,
                Err(e) => tracing::warn!("ignoring TENANCY_ISOLATION_LEVEL: {}", e),
            }
        }

        // API overrides
        if let Some(v) = env::var("API_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        self
    }

    /// Checks that must pass before the server or CLI touches the database.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if SchemaName::shared(&self.tenancy.shared_schema).is_err() {
            return Err(ConfigError::InvalidTenancy("shared_schema"));
        }
        // The prefix must itself be a valid schema name fragment.
        if SchemaName::shared(&self.tenancy.schema_prefix).is_err() {
            return Err(ConfigError::InvalidTenancy("schema_prefix"));
        }
        if self.tenancy.transaction_timeout_ms == 0 {
            return Err(ConfigError::InvalidTenancy("transaction_timeout_ms"));
        }
        if self.security.jwt_secret.is_empty() {
            return Err(ConfigError::MissingJwtSecret);
        }
        let expiry = self.security.jwt_expiry_hours;
        if expiry == 0 || expiry > MAX_JWT_EXPIRY_HOURS {
            return Err(ConfigError::InvalidJwtExpiry(expiry));
        }
        Ok(())
    }

    fn tenancy_defaults(transaction_timeout_ms: u64) -> TenancyConfig {
        TenancyConfig {
            schema_prefix: "tenant_".to_string(),
            shared_schema: "public".to_string(),
            transaction_timeout_ms,
            isolation_level: IsolationLevel::ReadCommitted,
        }
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                max_connections: 10,
                connection_timeout: 30,
                enable_query_logging: true,
            },
            tenancy: Self::tenancy_defaults(15_000),
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            security: SecurityConfig {
                jwt_secret: DEVELOPMENT_JWT_SECRET.to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                max_connections: 20,
                connection_timeout: 10,
                enable_query_logging: true,
            },
            tenancy: Self::tenancy_defaults(12_000),
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                max_connections: 50,
                connection_timeout: 5,
                enable_query_logging: false,
            },
            tenancy: Self::tenancy_defaults(10_000),
            api: ApiConfig {
                port: 3000,
                enable_request_logging: false,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 12,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_development {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Development)
    };
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig::development()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.tenancy.schema_prefix, "tenant_");
        assert_eq!(config.tenancy.shared_schema, "public");
        assert_eq!(config.tenancy.transaction_timeout_ms, 15_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert_eq!(config.tenancy.transaction_timeout_ms, 10_000);
        assert!(!config.api.enable_request_logging);
        // Production refuses to start without an explicit secret.
        assert!(matches!(config.validate(), Err(ConfigError::MissingJwtSecret)));
    }

    #[test]
    fn rejects_unsafe_schema_settings() {
        let mut config = AppConfig::development();
        config.tenancy.shared_schema = "public; DROP".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTenancy("shared_schema"))));

        let mut config = AppConfig::development();
        config.tenancy.schema_prefix = "t\"".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTenancy("schema_prefix"))));

        let mut config = AppConfig::development();
        config.tenancy.transaction_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unbounded_token_expiry() {
        let mut config = AppConfig::development();
        config.security.jwt_expiry_hours = u64::MAX;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidJwtExpiry(u64::MAX))));

        config.security.jwt_expiry_hours = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidJwtExpiry(0))));

        config.security.jwt_expiry_hours = MAX_JWT_EXPIRY_HOURS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_isolation_levels() {
        assert_eq!("serializable".parse::<IsolationLevel>().unwrap(), IsolationLevel::Serializable);
        assert_eq!("Repeatable Read".parse::<IsolationLevel>().unwrap(), IsolationLevel::RepeatableRead);
        assert_eq!("read-committed".parse::<IsolationLevel>().unwrap(), IsolationLevel::ReadCommitted);
        assert!("snapshot".parse::<IsolationLevel>().is_err());
        assert_eq!(IsolationLevel::Serializable.as_sql(), "SERIALIZABLE");
    }
}
