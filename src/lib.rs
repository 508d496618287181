//! Observation aggregation backend for the fungal map dashboard.
//!
//! Merges records from the local authoritative index (MINDEX) and two
//! external biodiversity providers (iNaturalist, GBIF) into one
//! deduplicated, geographically filterable, cached feed.
//!
//!
//!
//! # Pipeline
//!
//! - MINDEX is paginated fully and wins whenever it returns anything at all
//! - Empty primary results trigger the external providers, fetched
//!   concurrently across a fixed list of fungal-diversity hotspot regions
//! - Heterogeneous raw records are normalized into one canonical shape;
//!   MINDEX rows resolve their taxon ids against a cached catalog
//! - Duplicates collapse on exact id or species + ~100 m coordinate cell
//! - The assembled set is sorted newest-first and held in a short-TTL
//!   process-wide cache so repeat map loads skip the slow upstreams
//!
//!
//!
//! # Availability over completeness
//!
//! No upstream failure is fatal: timeouts and bad pages degrade to partial
//! or empty data in an otherwise normal 200 response. The honest per-source
//! counts in `meta.sources` are the only signal that something upstream was
//! unhappy.
use std::time::Duration;

use axum::{
    http::{header::CONTENT_TYPE, Method},
    routing::get,
    Router,
};

use signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod dedup;
pub mod error;
pub mod geo;
pub mod geocode;
pub mod models;
pub mod normalize;
pub mod routes;
pub mod sources;
pub mod state;
pub mod taxa;

use routes::{health_handler, observations_handler};
use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new();

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let app = Router::new()
        .route("/api/observations", get(observations_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
