use std::path::Path;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

use crate::store::{DEFAULT_BULK_CONCURRENCY, DEFAULT_LANGUAGE};

/// Prefix of the environment variables that override the config file.
pub const ENV_PREFIX: &str = "QNA_";

/// Store configuration, derived from a TOML file and `QNA_*` environment
/// variables (the latter take precedence).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    // secrets
    db_uri: String,
    // non-secrets
    #[serde(default = "default_database_id")]
    database_id: String,
    #[serde(default = "default_container_id")]
    container_id: String,
    #[serde(default = "default_language")]
    default_language: String,
    #[serde(default = "default_bulk_concurrency")]
    bulk_concurrency: usize,
}

fn default_database_id() -> String {
    "qna".to_string()
}

fn default_container_id() -> String {
    "questions".to_string()
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_bulk_concurrency() -> usize {
    DEFAULT_BULK_CONCURRENCY
}

impl StoreConfig {
    /// The configuration sources, in increasing order of precedence.
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load the configuration from `path` and the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    /// Connection string for the database server.
    /// Configured via `QNA_DB_URI`.
    pub fn db_uri(&self) -> &str {
        &self.db_uri
    }

    /// Name of the database holding the question containers.
    pub fn database_id(&self) -> &str {
        &self.database_id
    }

    /// Name of the base container; other languages get `<base>_<language>`.
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// The language stored in the base container.
    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// How many inserts a bulk insert keeps in flight.
    pub fn bulk_concurrency(&self) -> usize {
        self.bulk_concurrency
    }
}

/// Get a database name for a test.
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
pub(crate) fn test_database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}
