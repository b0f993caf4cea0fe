use anyhow::Result;
use axum::Router;
use gateway_auth::{
    config::{AppConfig, KvBackend},
    routes,
    services::{auth_db::Database, kv::Kv, memory_kv::MemoryKv, sqlite_kv::SqliteKv},
};
use sqlx::sqlite::SqlitePoolOptions;
use std::{io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting gateway-auth with config: {:?}", cfg);

    // --- Initialize credential store ---
    let kv: Arc<dyn Kv> = match cfg.kv_backend {
        KvBackend::Memory => {
            if migrate {
                tracing::info!("Memory backend has no schema; nothing to migrate.");
                return Ok(());
            }
            Arc::new(MemoryKv::new())
        }
        KvBackend::Sqlite => {
            let kv = connect_sqlite(&cfg.database_url).await?;
            kv.migrate().await?;
            if migrate {
                tracing::info!("Database migration complete.");
                return Ok(()); // exit after migration
            }
            Arc::new(kv)
        }
    };

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(Database::new(kv));

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Open the SQLite pool, creating the database file and its directory
/// when they are missing.
async fn connect_sqlite(db_url: &str) -> Result<SqliteKv> {
    tracing::debug!("Connecting using raw URL => {}", db_url);

    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");

    if !db_path.starts_with(":memory:") {
        let db_path_obj = Path::new(db_path);
        if let Some(parent) = db_path_obj.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }

        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(db_path_obj)
        {
            Ok(_) => tracing::debug!("Database file {} is ready.", db_path),
            Err(e) => tracing::warn!("Failed to open database file manually: {}", e),
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    Ok(SqliteKv::new(Arc::new(pool)))
}
