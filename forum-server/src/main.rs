//! Forum API server
//!
//! Boots the stock resources, opens the SQLite store and serves the
//! JSON:API over HTTP.
//!
//! Usage:
//!   forum-server --config forum.toml --database forum.db --port 8080

use anyhow::{Context, Result};
use clap::Parser;
use forum_api::{ApiConfig, JsonApi, SchemaRegistry};
use forum_server::build_router;
use std::{path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "forum-server")]
#[command(about = "Forum JSON:API server")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "forum.toml")]
    config: PathBuf,

    /// SQLite database path (in memory when omitted)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// HTTP port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("Forum server starting...");
    let config = ApiConfig::load_from(&args.config);
    let registry = SchemaRegistry::with_builtin_resources().context("Failed to register resources")?;
    let api = JsonApi::open(registry, config, args.database.as_deref()).context("Failed to boot API")?;
    let resources = api.catalog().types().count();
    let app = build_router(Arc::new(api));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port))
        .await
        .with_context(|| format!("Failed to bind HTTP port {}", args.port))?;
    info!("HTTP API listening on port {}", args.port);

    println!("\n========================================");
    println!("  Forum API Running");
    println!("========================================");
    println!("  HTTP Port: {}", args.port);
    println!("  Resources: {}", resources);
    match &args.database {
        Some(path) => println!("  Database:  {}", path.display()),
        None => println!("  Database:  in memory"),
    }
    println!("========================================\n");

    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}
