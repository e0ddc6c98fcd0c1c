mod config;
mod demo;
mod error;
mod lab;
mod logs;
mod models;
mod request_id;
mod routes;
mod sse;

use std::sync::Arc;

use tracing::{error, info};

use crate::config::AppConfig;
use crate::lab::LabRegistry;
use crate::models::AppState;

#[tokio::main]
async fn main() {
    let config = AppConfig::from_env();
    logs::init_tracing(&config);

    let registry = Arc::new(LabRegistry::with_builtin_modules());
    info!("Registered lab modules: {}", registry.names().join(", "));

    let addr = config.bind_addr();
    let app = routes::build_router(AppState::new(config, registry));

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    info!("Lab playground listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
