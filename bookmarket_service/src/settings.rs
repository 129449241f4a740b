use anyhow::{bail, Context};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::auth::DEFAULT_TOKEN_TTL_SECONDS;
use crate::id_generator::DEFAULT_INSTANCE_ID;
use crate::purchase::DEFAULT_FAILURE_RATE;

/// Secret used when none is configured, only good for local runs
pub const DEV_JWT_SECRET: &str = "bookmarket-dev-secret";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DatabaseSettings {
    pub use_in_memory: bool,
    pub hostname: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StorageSettings {
    pub root: String,
    pub max_pdf_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PurchaseSettings {
    /// Probability that a payment is declined
    pub failure_rate: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IdSettings {
    pub instance_id: u16,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub purchase: PurchaseSettings,
    pub auth: AuthSettings,
    pub ids: IdSettings,
}

impl Settings {
    /// Defaults, overridden by an optional `bookmarket.toml` and then by
    /// `BOOKMARKET__SECTION__KEY` environment variables
    pub fn load() -> anyhow::Result<Self> {
        let builder = Self::defaults()?
            .add_source(File::with_name("bookmarket").required(false))
            .add_source(
                Environment::with_prefix("BOOKMARKET")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::build(builder)
    }

    pub fn defaults() -> anyhow::Result<ConfigBuilder<DefaultState>> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080_i64)?
            .set_default("database.use_in_memory", false)?
            .set_default("database.hostname", "127.0.0.1")?
            .set_default("database.username", "postgres")?
            .set_default("database.password", "postgres")?
            .set_default("storage.root", "storage")?
            .set_default("storage.max_pdf_bytes", 50_i64 * 1024 * 1024)?
            .set_default("purchase.failure_rate", DEFAULT_FAILURE_RATE)?
            .set_default("auth.jwt_secret", DEV_JWT_SECRET)?
            .set_default("auth.token_ttl_seconds", DEFAULT_TOKEN_TTL_SECONDS as i64)?
            .set_default("ids.instance_id", DEFAULT_INSTANCE_ID as i64)
            .context("Failed to set default settings")
    }

    pub fn build(builder: ConfigBuilder<DefaultState>) -> anyhow::Result<Self> {
        let settings: Settings = builder
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Failed to parse settings")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.purchase.failure_rate) {
            bail!(
                "purchase.failure_rate must lie in [0, 1], got {}",
                self.purchase.failure_rate
            )
        }
        if self.auth.jwt_secret.is_empty() {
            bail!("auth.jwt_secret must not be empty")
        }
        if self.storage.max_pdf_bytes == 0 {
            bail!("storage.max_pdf_bytes must be positive")
        }
        Ok(())
    }
}
