use clap::Parser;

use pgbridge_core::{Config, DispatchMode};

/// MCP server exposing a PostgreSQL database over stdio.
///
/// Reads JSON-RPC requests from stdin, one per line, and writes responses
/// to stdout. Connection settings come from `POSTGRES_*` environment
/// variables (or a `.env` file); the flags below override them.
#[derive(Parser, Debug)]
#[command(name = "pgbridge", version, about = "MCP server for PostgreSQL over stdio")]
pub struct CliArgs {
    /// Database host (overrides POSTGRES_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Database port (overrides POSTGRES_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database name (overrides POSTGRES_DB)
    #[arg(long)]
    pub database: Option<String>,

    /// Database user (overrides POSTGRES_USER)
    #[arg(long)]
    pub user: Option<String>,

    /// Request scheduling: serialized or concurrent (overrides PGBRIDGE_MODE)
    #[arg(long)]
    pub mode: Option<DispatchMode>,

    /// Concurrent-mode request limit (overrides PGBRIDGE_MAX_IN_FLIGHT)
    #[arg(long)]
    pub max_in_flight: Option<usize>,

    /// Log filter directive; logs always go to stderr
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,
}

impl CliArgs {
    /// Layer explicit flags over the environment-derived config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.postgres.host = host.clone();
        }
        if let Some(port) = self.port {
            config.postgres.port = port;
        }
        if let Some(database) = &self.database {
            config.postgres.database = database.clone();
        }
        if let Some(user) = &self.user {
            config.postgres.username = user.clone();
        }
        if let Some(mode) = self.mode {
            config.server.mode = mode;
        }
        if let Some(max_in_flight) = self.max_in_flight {
            config.server.max_in_flight = max_in_flight.max(1);
        }
    }
}
