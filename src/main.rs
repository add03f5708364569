use anyhow::{Context, Result};
use nft_gateway::{
    config::AppConfig,
    db,
    services::{
        blob_store::BlobStore, entity_service::EntityService, gateway::GatewayResolver,
        registry::EntityRegistry,
    },
    storage,
};
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting nft-gateway with config: {:?}", cfg);

    // --- Initialize SQLite registry ---
    let db = Arc::new(db::connect(&cfg.database_url).await?);
    db::run_migrations(&db).await?;

    // --- Handle migration mode ---
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core services ---
    let backend = storage::open_backend(&cfg)
        .await
        .with_context(|| format!("opening {:?} blob backend", cfg.storage_backend))?;
    let blobs = BlobStore::new(backend, cfg.retry_policy(), cfg.operation_timeouts());
    let registry = EntityRegistry::new(db.clone());
    let gateway = GatewayResolver::new(&cfg.gateway_base_url)?;
    let service = EntityService::new(blobs, registry, gateway);

    // --- Build router ---
    let app = nft_gateway::app(service, cfg.max_upload_bytes);

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
