mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pgbridge_core::config::load_dotenv;
use pgbridge_core::Config;
use pgbridge_db::{PgDriver, QueryExecutor, SchemaCache, SqlDriver};
use pgbridge_mcp::{McpServer, StdioTransport};
use pgbridge_tool_runtime::{ToolContext, ToolRegistry};

use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let args = CliArgs::parse();

    // Stdout carries protocol frames only.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&args.log_filter).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    let mut config = Config::from_env();
    args.apply(&mut config);
    config.log_summary();

    let driver = Arc::new(
        PgDriver::connect(&config.postgres)
            .await
            .with_context(|| {
                format!("failed to connect to {}", config.postgres.connection_label())
            })?,
    );

    let schema = match SchemaCache::load(driver.as_ref()).await {
        Ok(schema) => schema,
        Err(e) => {
            error!(error = %e, "Failed to cache schema, continuing with an empty cache");
            SchemaCache::default()
        }
    };

    let context = ToolContext::new(QueryExecutor::new(driver.clone()), schema);
    let registry = ToolRegistry::with_builtin_tools().context("failed to register tools")?;
    let server = McpServer::new(registry, context)
        .with_name(config.server.name.clone())
        .with_mode(config.server.mode)
        .with_max_in_flight(config.server.max_in_flight);

    info!("Starting PostgreSQL MCP server");
    let result = server.run(StdioTransport::new()).await;
    if let Err(e) = &result {
        error!(error = %e, "Server error");
    }

    driver.close().await;
    info!("Database pool closed");

    result.context("MCP server stopped with an error")
}
