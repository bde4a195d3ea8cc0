//! Unified database MCP server - main entry point.

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use unidb_mcp_server::config::{Config, TransportMode};
use unidb_mcp_server::db::{ConnectionManager, StatementExecutor};
use unidb_mcp_server::kv::RedisRegistry;
use unidb_mcp_server::mcp::UnifiedDbService;
use unidb_mcp_server::transport::{HttpTransport, StdioTransport, Transport};
use url::Url;

/// Initialize the tracing subscriber. Logs always go to stderr.
fn init_tracing(config: &Config) {
    if !config.enable_logs {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    info!(
        transport = %config.transport,
        "Starting unidb MCP server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let connection_manager = Arc::new(ConnectionManager::with_connect_timeout(
        config.connect_timeout_duration(),
    ));
    let redis_registry = Arc::new(RedisRegistry::new(
        config.connect_timeout_duration(),
        config.query_timeout_duration(),
    ));

    let db_configs = config.parse_databases()?;
    let redis_configs = config.parse_redis()?;
    info!(
        databases = db_configs.len(),
        redis = redis_configs.len(),
        "Opening preconfigured sessions"
    );

    for db_config in &db_configs {
        connection_manager
            .connect(db_config.to_connection_config()?)
            .await?;
    }
    for redis_config in &redis_configs {
        let url = Url::parse(&redis_config.url)?;
        redis_registry.connect(&redis_config.id, &url).await?;
    }

    let service = UnifiedDbService::new(
        connection_manager,
        redis_registry,
        StatementExecutor::new(config.query_timeout_duration()),
        config.connect_timeout_duration(),
    );

    let result = match config.transport {
        TransportMode::Stdio => StdioTransport::new(service).run().await,
        TransportMode::Http => {
            info!(
                host = %config.http_host,
                port = config.http_port,
                endpoint = %config.mcp_endpoint,
                "Using HTTP transport"
            );
            HttpTransport::new(
                service,
                &config.http_host,
                config.http_port,
                &config.mcp_endpoint,
            )
            .run()
            .await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
