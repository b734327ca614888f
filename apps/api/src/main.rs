mod admin;
mod config;
mod db;
mod errors;
mod models;
mod orchestration;
mod providers;
mod routes;
mod state;
mod store;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::orchestration::orchestrator::Orchestrator;
use crate::orchestration::resolver::ConfigResolver;
use crate::orchestration::usage::UsageRecorder;
use crate::orchestration::vault::CredentialVault;
use crate::providers::HttpAdapterFactory;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::postgres::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Operator helper: print a fresh CREDENTIAL_MASTER_KEY and exit
    if std::env::args().nth(1).as_deref() == Some("generate-master-key") {
        println!("{}", CredentialVault::generate_master_key());
        return Ok(());
    }

    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // usage-store faults log under their own target
            EnvFilter::new(format!(
                "{}={},ai_usage_fault=error",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting AI orchestrator v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL (+ migrations)
    let db = create_pool(&config.database_url).await?;
    let store = Arc::new(PgStore::new(db));

    // Initialize credential vault
    let vault = Arc::new(config.credential_vault()?);
    info!(
        "Credential vault initialized (master key configured: {})",
        vault.has_master_key()
    );

    // Initialize provider adapters (one shared HTTP client, adapters built per call)
    let adapters = Arc::new(
        HttpAdapterFactory::new(config.provider_timeout, config.endpoints.clone())
            .context("Failed to build provider HTTP client")?,
    );
    info!(
        "Provider adapters initialized (timeout: {}s)",
        config.provider_timeout.as_secs()
    );

    if let Some(fallback) = &config.fallback {
        info!(
            "Static fallback provider: {} (model: {})",
            fallback.provider_type,
            fallback.model_name.as_deref().unwrap_or("routed")
        );
    }

    let resolver = ConfigResolver::new(store.clone(), vault.clone(), config.fallback.clone());
    let orchestrator = Orchestrator::new(
        store.clone(),
        resolver,
        adapters.clone(),
        UsageRecorder::new(store.clone()),
        config.provider_timeout,
    );

    // Build app state
    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        configs: store.clone(),
        usage: store,
        vault,
        adapters,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict CORS to the admin UI origin

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
