//! Configuration handling for the PostgreSQL MCP Server.
//!
//! Settings come from command line flags, each with a libpq-style environment
//! variable fallback. [`Config::resolve`] turns the raw values into a
//! [`ResolvedConfig`] once at startup; the result is passed by reference to
//! the pieces that need it.

use crate::error::{DbError, DbResult};
use clap::Parser;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_USER: &str = "postgres";
pub const DEFAULT_SCHEMA: &str = "public";

/// Postgres identifiers are truncated at 63 bytes (NAMEDATALEN - 1).
pub const MAX_SCHEMA_NAME_LEN: usize = 63;

/// Configuration for the PostgreSQL MCP Server.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pg-mcp-server",
    about = "MCP server for PostgreSQL - lets AI assistants query and inspect a database",
    version,
    author
)]
pub struct Config {
    /// Database server host
    #[arg(long, env = "PGHOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Database server port. Unparsable values fall back to 5432.
    #[arg(long, env = "PGPORT")]
    pub port: Option<String>,

    /// Database name (required)
    #[arg(short = 'd', long, env = "PGDATABASE")]
    pub database: Option<String>,

    /// Database user. Defaults to the OS user, then "postgres".
    #[arg(short = 'U', long, env = "PGUSER")]
    pub user: Option<String>,

    /// Database password
    #[arg(long, env = "PGPASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Default schema for list_tables and describe_table
    #[arg(long, env = "PGSCHEMA")]
    pub schema: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MCP_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MCP_JSON_LOGS")]
    pub json_logs: bool,

    /// Enable logging output on stderr (disabled by default to keep the stdio channel quiet)
    #[arg(long, env = "MCP_ENABLE_LOGS")]
    pub enable_logs: bool,
}

/// Connection parameters for the single database connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Fully resolved startup configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub connection: ConnectionConfig,
    /// Schema used when a tool call does not name one.
    pub default_schema: String,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Resolve connection parameters and the default schema.
    ///
    /// The OS user is read from `USER` (or `USERNAME` on Windows).
    pub fn resolve(&self) -> DbResult<ResolvedConfig> {
        let os_user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .ok();
        self.resolve_with_os_user(os_user)
    }

    /// Resolve against an explicit OS user, without reading the environment.
    pub fn resolve_with_os_user(&self, os_user: Option<String>) -> DbResult<ResolvedConfig> {
        let database = self
            .database
            .as_deref()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| {
                DbError::configuration("PGDATABASE environment variable is required")
            })?
            .to_string();

        let port = parse_port(self.port.as_deref());

        let user = non_empty(self.user.clone())
            .or_else(|| non_empty(os_user))
            .unwrap_or_else(|| DEFAULT_USER.to_string());

        let default_schema = match self.schema.as_deref() {
            Some(schema) => {
                validate_schema_name(schema)?;
                schema.to_string()
            }
            None => DEFAULT_SCHEMA.to_string(),
        };

        Ok(ResolvedConfig {
            connection: ConnectionConfig {
                host: self.host.clone(),
                port,
                database,
                user,
                password: non_empty(self.password.clone()),
            },
            default_schema,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Parse a port, falling back to 5432 when missing or unparsable.
pub fn parse_port(value: Option<&str>) -> u16 {
    value
        .and_then(|v| v.trim().parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT)
}

/// Check that a schema name is a plain identifier.
///
/// Accepts a letter or underscore followed by up to 62 letters, digits or
/// underscores.
pub fn validate_schema_name(name: &str) -> DbResult<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid_start && valid_rest && name.len() <= MAX_SCHEMA_NAME_LEN {
        Ok(())
    } else {
        Err(DbError::configuration(format!(
            "Invalid schema name '{}': must start with a letter or underscore and contain at most {} letters, digits or underscores",
            name, MAX_SCHEMA_NAME_LEN
        )))
    }
}
