use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub locks: LockConfig,
    pub auth: AuthConfig,
    pub payment: PaymentConfig,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
    #[default]
    Local,
    Redis,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LockConfig {
    #[serde(default)]
    pub backend: LockBackend,
    #[serde(default = "default_lock_ttl_ms")]
    pub ttl_ms: u64,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backend: LockBackend::default(),
            ttl_ms: default_lock_ttl_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

fn default_lock_ttl_ms() -> u64 { 5_000 }
fn default_acquire_timeout_ms() -> u64 { 2_000 }

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_fare_paise")]
    pub fare_paise: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_true")]
    pub require_payment: bool,
    /// Seed the demo corridor at startup. Honoured by the memory backend only.
    #[serde(default)]
    pub seed_demo: bool,
}

fn default_fare_paise() -> i64 { 50_000 }
fn default_currency() -> String { "INR".to_string() }
fn default_true() -> bool { true }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    pub key_id: String,
    pub key_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Developer overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `SEATLINE__SERVER__PORT=8080`
            .add_source(config::Environment::with_prefix("SEATLINE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_optional_sections() {
        let raw = r#"
            [server]
            port = 3000
            [database]
            url = "postgres://localhost/seatline"
            [redis]
            url = "redis://localhost"
            [auth]
            jwt_secret = "secret"
            jwt_expiration_seconds = 3600
            [payment]
            key_id = "rzp_test"
            key_secret = "shh"
            [business_rules]
        "#;
        let cfg: Config = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.storage.backend, StorageBackend::Memory);
        assert_eq!(cfg.locks.backend, LockBackend::Local);
        assert_eq!(cfg.business_rules.fare_paise, 50_000);
        assert!(cfg.business_rules.require_payment);
        assert!(!cfg.business_rules.seed_demo);
    }

    #[test]
    fn test_shipped_defaults_seed_the_memory_backend() {
        let cfg: Config = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        // seed_demo only takes effect together with the memory backend.
        assert_eq!(cfg.storage.backend, StorageBackend::Memory);
        assert!(cfg.business_rules.seed_demo);
        assert_eq!(cfg.locks.backend, LockBackend::Local);
    }
}
