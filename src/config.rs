//! Store configuration.
//!
//! [`StoreConfig`] is the single configuration point for the provider:
//! connection target, schema placement, and provisioning behavior. It can
//! be built explicitly or loaded 12-factor style from environment variables
//! (or a `.env` file via `dotenvy`).

use crate::error::StoreError;

/// Default schema when none is configured.
pub const DEFAULT_SCHEMA: &str = "public";

/// Postgres truncates identifiers beyond 63 bytes (NAMEDATALEN - 1).
const MAX_SCHEMA_LEN: usize = 63;

/// Longest derived identifier is `ix_<prefix>_snapshots_actor_snapshot_index`
/// (34 bytes around the prefix); the prefix must keep it within
/// [`MAX_SCHEMA_LEN`], or Postgres would silently truncate index names and
/// conditional-create could match the wrong object.
const MAX_PREFIX_LEN: usize = MAX_SCHEMA_LEN - 34;

/// Configuration for a [`crate::provider::PersistenceProvider`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// PostgreSQL connection string.
    pub database_url: String,

    /// Schema the event and snapshot tables live in.
    pub schema_name: String,

    /// Optional table-name prefix. When non-empty, table names become
    /// `<prefix>_events` / `<prefix>_snapshots`.
    pub table_prefix: String,

    /// Whether to provision the tables at construction. When `false`, the
    /// schema must be pre-provisioned and construction fails with
    /// [`StoreError::SchemaMissing`] if it is not.
    pub auto_create_tables: bool,

    /// Maximum number of database connections in the pool.
    pub max_connections: u32,

    /// Minimum idle connections in the pool.
    pub min_connections: u32,

    /// Timeout in seconds for acquiring a database connection.
    pub connect_timeout_secs: u64,
}

impl StoreConfig {
    /// Creates a configuration with defaults for everything but the
    /// connection string: schema `public`, no prefix, no auto-provisioning.
    #[must_use]
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            schema_name: DEFAULT_SCHEMA.to_string(),
            table_prefix: String::new(),
            auto_create_tables: false,
            max_connections: 10,
            min_connections: 2,
            connect_timeout_secs: 5,
        }
    }

    /// Sets the schema the tables live in.
    #[must_use]
    pub fn with_schema(mut self, schema_name: impl Into<String>) -> Self {
        self.schema_name = schema_name.into();
        self
    }

    /// Sets the table-name prefix.
    #[must_use]
    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Enables or disables table provisioning at construction.
    #[must_use]
    pub const fn with_auto_create_tables(mut self, auto_create: bool) -> Self {
        self.auto_create_tables = auto_create;
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// Reads `DATABASE_URL` (required), `STORE_SCHEMA`,
    /// `STORE_TABLE_PREFIX`, `STORE_AUTO_CREATE_TABLES`,
    /// `DATABASE_MAX_CONNECTIONS`, `DATABASE_MIN_CONNECTIONS`, and
    /// `DATABASE_CONNECT_TIMEOUT_SECS`, falling back to defaults for all
    /// but the connection string. Calls `dotenvy::dotenv().ok()` first to
    /// optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if `DATABASE_URL` is unset or any
    /// value fails validation.
    pub fn from_env() -> Result<Self, StoreError> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| StoreError::Config("DATABASE_URL is not set".to_string()))?;

        let config = Self {
            database_url,
            schema_name: std::env::var("STORE_SCHEMA")
                .unwrap_or_else(|_| DEFAULT_SCHEMA.to_string()),
            table_prefix: std::env::var("STORE_TABLE_PREFIX").unwrap_or_default(),
            auto_create_tables: parse_env_bool("STORE_AUTO_CREATE_TABLES", false),
            max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10),
            min_connections: parse_env("DATABASE_MIN_CONNECTIONS", 2),
            connect_timeout_secs: parse_env("DATABASE_CONNECT_TIMEOUT_SECS", 5),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the connection target and the identifiers that get
    /// interpolated into SQL text.
    ///
    /// Schema name and table prefix end up inside DDL and query strings
    /// (they cannot be bound as parameters), so both are restricted to
    /// `[A-Za-z_][A-Za-z0-9_]*` and length-capped so every derived table
    /// and index name stays within the Postgres 63-byte identifier limit.
    /// Actor names and payloads are always bound and carry no such
    /// restriction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] on an empty connection string or an
    /// unsafe identifier.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.database_url.trim().is_empty() {
            return Err(StoreError::Config(
                "database_url must not be empty".to_string(),
            ));
        }
        if !is_safe_identifier(&self.schema_name) {
            return Err(StoreError::Config(format!(
                "schema_name {:?} is not a safe SQL identifier",
                self.schema_name
            )));
        }
        if self.schema_name.len() > MAX_SCHEMA_LEN {
            return Err(StoreError::Config(format!(
                "schema_name {:?} exceeds {MAX_SCHEMA_LEN} bytes",
                self.schema_name
            )));
        }
        if !self.table_prefix.is_empty() && !is_safe_identifier(&self.table_prefix) {
            return Err(StoreError::Config(format!(
                "table_prefix {:?} is not a safe SQL identifier",
                self.table_prefix
            )));
        }
        if self.table_prefix.len() > MAX_PREFIX_LEN {
            return Err(StoreError::Config(format!(
                "table_prefix {:?} exceeds {MAX_PREFIX_LEN} bytes; derived index names \
                 would overflow the Postgres identifier limit",
                self.table_prefix
            )));
        }
        Ok(())
    }
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*` — identifiers that need no quoting and
/// cannot break out of interpolated SQL.
fn is_safe_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref() {
        Some("true") | Some("TRUE") | Some("1") => true,
        Some("false") | Some("FALSE") | Some("0") => false,
        _ => default,
    }
}
