//! Memory server
//!
//! Run with: continuity-server

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use continuity::config::{default_central_path, ServerConfig, StorageMode};
use continuity::embedding::create_embedder;
use continuity::engine::Engine;
use continuity::error::Result;
use continuity::migration::{migrate_memories_dir, MigrationOptions};
use continuity::server;
use continuity::store::Store;

#[derive(Parser, Debug)]
#[command(name = "continuity-server")]
#[command(about = "Memory continuity server for AI coding assistants")]
struct Args {
    /// Bind host
    #[arg(long, env = "MEMORY_HOST", default_value = "localhost")]
    host: String,

    /// Bind port
    #[arg(long, env = "MEMORY_PORT", default_value = "8765")]
    port: u16,

    /// Storage mode (central or local)
    #[arg(long, env = "MEMORY_STORAGE_MODE", default_value = "central")]
    storage_mode: String,

    /// Central storage root (defaults to XDG data dir)
    #[arg(long, env = "MEMORY_CENTRAL_PATH")]
    central_path: Option<String>,

    /// Enable the external management agent
    #[arg(long, env = "MEMORY_MANAGER_ENABLED", default_value = "1")]
    manager_enabled: String,

    /// Enable the personal primer
    #[arg(long, env = "MEMORY_PERSONAL_ENABLED", default_value = "1")]
    personal_enabled: String,

    /// Run migration (with re-embedding) over existing projects at startup
    #[arg(long, default_value = "true")]
    migrate_on_start: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "continuity=info,tower_http=warn".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        storage_mode: args
            .storage_mode
            .parse::<StorageMode>()
            .unwrap_or_default(),
        central_path: args
            .central_path
            .map(Into::into)
            .unwrap_or_else(default_central_path),
        manager_enabled: args.manager_enabled != "0",
        personal_enabled: args.personal_enabled != "0",
        ..Default::default()
    };

    let embedder = create_embedder()?;

    if args.migrate_on_start {
        let options = MigrationOptions {
            reembed: true,
            ..Default::default()
        };
        if config.central_path.is_dir() {
            for entry in std::fs::read_dir(&config.central_path)? {
                let project_dir = entry?.path();
                if !project_dir.is_dir() {
                    continue;
                }
                let memories_dir = project_dir.join("memories");
                let report =
                    migrate_memories_dir(&memories_dir, Some(embedder.as_ref()), &options)?;
                if report.migrated > 0 || !report.errors.is_empty() {
                    tracing::info!(
                        project = %project_dir.display(),
                        migrated = report.migrated,
                        errors = report.errors.len(),
                        "startup migration"
                    );
                }
            }
        }
    }

    let store = Arc::new(Store::new(config));
    let engine = Arc::new(Engine::new(store, embedder, None, None));

    server::serve(engine).await?;
    Ok(())
}
