//! Demo remote-database settings and a simulated connection test.
//!
//! The configuration, password included, is stored in plaintext. This is a
//! demonstration screen only; no database is ever contacted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::error::{Result, ValidationErrorBuilder};
use crate::storage::{Storage, StorageKey};
use crate::validation::{validate_host, validate_port};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    #[default]
    Mysql,
    Pgsql,
    Sqlsrv,
}

impl DatabaseDriver {
    pub fn default_port(self) -> u16 {
        match self {
            Self::Mysql => 3306,
            Self::Pgsql => 5432,
            Self::Sqlsrv => 1433,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Mysql => "MySQL",
            Self::Pgsql => "PostgreSQL",
            Self::Sqlsrv => "SQL Server",
        }
    }
}

impl std::fmt::Display for DatabaseDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mysql => write!(f, "mysql"),
            Self::Pgsql => write!(f, "pgsql"),
            Self::Sqlsrv => write!(f, "sqlsrv"),
        }
    }
}

impl std::str::FromStr for DatabaseDriver {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::Mysql),
            "pgsql" | "postgres" | "postgresql" => Ok(Self::Pgsql),
            "sqlsrv" | "mssql" | "sqlserver" => Ok(Self::Sqlsrv),
            _ => Err(format!("Unknown database driver: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub driver: DatabaseDriver,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub last_connected: Option<DateTime<Utc>>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let driver = DatabaseDriver::default();
        Self {
            driver,
            host: "127.0.0.1".to_string(),
            port: driver.default_port(),
            database: "ielts_prep".to_string(),
            username: "root".to_string(),
            password: String::new(),
            connected: false,
            last_connected: None,
        }
    }
}

impl DatabaseConfig {
    /// Required fields that are blank
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.host.trim().is_empty() {
            missing.push("host");
        }
        if self.port == 0 {
            missing.push("port");
        }
        if self.database.trim().is_empty() {
            missing.push("database");
        }
        if self.username.trim().is_empty() {
            missing.push("username");
        }
        missing
    }

    /// Laravel-style `.env` entries for this connection
    pub fn env_vars(&self) -> Vec<(String, String)> {
        vec![
            ("DB_CONNECTION".to_string(), self.driver.to_string()),
            ("DB_HOST".to_string(), self.host.clone()),
            ("DB_PORT".to_string(), self.port.to_string()),
            ("DB_DATABASE".to_string(), self.database.clone()),
            ("DB_USERNAME".to_string(), self.username.clone()),
            ("DB_PASSWORD".to_string(), self.password.clone()),
        ]
    }

    fn validate(&self) -> Result<()> {
        let mut errors = ValidationErrorBuilder::new();
        if !self.host.trim().is_empty() {
            if let Err(msg) = validate_host(self.host.trim()) {
                errors.add("host", msg);
            }
        }
        if let Err(msg) = validate_port(self.port) {
            errors.add("port", msg);
        }
        errors.finish()
    }
}

/// Outcome of a connection test
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionReport {
    pub success: bool,
    pub message: String,
    pub missing_fields: Vec<&'static str>,
}

pub struct DatabaseSettings {
    storage: Storage,
    delay: Duration,
}

impl DatabaseSettings {
    pub fn new(storage: Storage, delay: Duration) -> Self {
        Self { storage, delay }
    }

    pub fn load(&self) -> Result<DatabaseConfig> {
        Ok(self.storage.get_or_default(&StorageKey::DatabaseConfig)?)
    }

    /// Store edited settings; a changed connection must be tested again
    pub fn save(&self, config: &DatabaseConfig) -> Result<DatabaseConfig> {
        config.validate()?;
        let _guard = self.storage.lock();
        let previous = self.load()?;
        let mut config = config.clone();
        if !same_target(&previous, &config) {
            config.connected = false;
        }
        self.storage.set(&StorageKey::DatabaseConfig, &config)?;
        info!(driver = %config.driver, host = %config.host, "Saved database settings");
        Ok(config)
    }

    pub fn reset(&self) -> Result<DatabaseConfig> {
        self.storage.remove(&StorageKey::DatabaseConfig)?;
        Ok(DatabaseConfig::default())
    }

    /// Pretend to connect: succeeds when every required field is filled in.
    /// The outcome is recorded on the stored settings.
    pub async fn test_connection(&self, config: &DatabaseConfig) -> Result<ConnectionReport> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let missing_fields = config.missing_fields();
        let mut stored = config.clone();
        let report = if missing_fields.is_empty() {
            stored.connected = true;
            stored.last_connected = Some(Utc::now());
            ConnectionReport {
                success: true,
                message: format!(
                    "Connected to {} database '{}' at {}:{}",
                    config.driver.label(),
                    config.database,
                    config.host,
                    config.port
                ),
                missing_fields,
            }
        } else {
            stored.connected = false;
            ConnectionReport {
                success: false,
                message: format!("Missing required fields: {}", missing_fields.join(", ")),
                missing_fields,
            }
        };

        self.storage.set(&StorageKey::DatabaseConfig, &stored)?;
        info!(success = report.success, host = %config.host, "Database connection test");
        Ok(report)
    }
}

fn same_target(a: &DatabaseConfig, b: &DatabaseConfig) -> bool {
    a.driver == b.driver
        && a.host == b.host
        && a.port == b.port
        && a.database == b.database
        && a.username == b.username
        && a.password == b.password
}
