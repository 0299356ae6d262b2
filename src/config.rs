use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub content_store: DatabaseConfig,
    pub ledger: DatabaseConfig,
    pub storage: StorageConfig,
    pub timeouts: TimeoutConfig,
    pub security: SecurityConfig,
    /// "postgres" or "memory"
    pub backend: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub connection_string: Option<String>,
    pub max_connections: Option<u32>,
}

/// Uploads are written below `root_dir` and served back at `/files`, so
/// `public_base_url` should point at this server's `/files` path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root_dir: String,
    pub public_base_url: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub store_call_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// bcrypt work factor for stored passwords
    pub password_cost: u32,
}

/// Which store implementations the server runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Memory,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            content_store: DatabaseConfig::default(),
            ledger: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            timeouts: TimeoutConfig::default(),
            security: SecurityConfig::default(),
            backend: "postgres".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            max_connections: Some(20),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: "./data/objects".to_string(),
            public_base_url: "http://127.0.0.1:8080/files".to_string(),
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { store_call_secs: 10 }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            password_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional config file and
    /// `PRODHUB_*` environment variables, in that order
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        config = config.add_source(config::File::with_name("config").required(false));

        // PRODHUB_SERVER__PORT=9000, PRODHUB_CONTENT_STORE__MAX_CONNECTIONS=5
        config = config.add_source(
            config::Environment::with_prefix("PRODHUB")
                .separator("__")
                .prefix_separator("_"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    pub fn backend(&self) -> anyhow::Result<Backend> {
        match self.backend.to_ascii_lowercase().as_str() {
            "postgres" => Ok(Backend::Postgres),
            "memory" => Ok(Backend::Memory),
            other => anyhow::bail!("unknown backend '{}', expected 'postgres' or 'memory'", other),
        }
    }

    /// Document store URL from config, then `CONTENT_DATABASE_URL`
    pub fn content_database_url(&self) -> anyhow::Result<String> {
        database_url(&self.content_store, "CONTENT_DATABASE_URL")
    }

    /// Ledger URL from config, then `LEDGER_DATABASE_URL`
    pub fn ledger_database_url(&self) -> anyhow::Result<String> {
        database_url(&self.ledger, "LEDGER_DATABASE_URL")
    }

    pub fn store_call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.store_call_secs)
    }

    /// Get the server bind address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl DatabaseConfig {
    pub fn max_connections(&self) -> u32 {
        self.max_connections.unwrap_or(20)
    }
}

fn database_url(section: &DatabaseConfig, env_var: &str) -> anyhow::Result<String> {
    if let Some(connection_string) = &section.connection_string {
        return Ok(connection_string.clone());
    }
    std::env::var(env_var).map_err(|_| {
        anyhow::anyhow!(
            "no connection string configured and {} is not set",
            env_var
        )
    })
}
