//! Floodgate JSON API Server

use std::{process, sync::Arc};

use salvo::{
    affix_state::inject,
    oapi::{OpenApi, swagger_ui::SwaggerUi},
    prelude::*,
    trailing_slash::remove_slash,
};
use tokio::sync::watch;
use tracing::{error, warn};

use floodgate_app::{
    cache::MemoryStockCache,
    clock::SystemClock,
    context::AppContext,
    database::Db,
    domain::holds::HoldSweeper,
    settings::WebhookSigning,
};

use crate::{config::ServerConfig, state::State};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod config;
mod database;
mod extensions;
mod healthcheck;
mod holds;
mod observability;
mod orders;
mod payments;
mod products;
mod router;
mod shutdown;
mod state;

#[cfg(test)]
mod test_helpers;

/// Floodgate JSON API Server entry point
///
/// # Panics
///
/// Panics if the server fails to bind or serve requests
#[tokio::main]
pub async fn main() {
    // Load configuration from .env and CLI arguments
    let config = ServerConfig::load().unwrap_or_else(|e| {
        #[expect(
            clippy::print_stderr,
            reason = "logging not initialized yet, must use eprintln for config errors"
        )]
        {
            eprintln!("Configuration error: {e}");
        }

        process::exit(1);
    });

    observability::init(&config.logging);

    let settings = config.app_settings();

    if matches!(&settings.webhooks.signing, WebhookSigning::Disabled) {
        warn!("WEBHOOK_HMAC_SECRET is not set; webhook signature verification is disabled");
    }

    let addr = config.socket_addr();
    tracing::info!("Starting server on {addr}");

    let listener = TcpListener::new(addr).bind().await;

    let pool = database::connect(&config.database.database_url).await;

    let db = Db::new(pool);
    let clock = Arc::new(SystemClock);
    let cache = Arc::new(MemoryStockCache::new(clock.clone(), config.cache_settings()));

    let app = AppContext::new(db.clone(), clock.clone(), cache, settings);

    let sweeper = HoldSweeper::new(
        db,
        clock,
        app.holds.clone(),
        app.orders.clone(),
        app.idempotency.clone(),
        config.sweep_settings(),
    );

    let (sweeper_stop, sweeper_signal) = watch::channel(false);
    let sweeper_task = tokio::spawn(sweeper.run(sweeper_signal));

    let state = Arc::new(State::new(
        app,
        config.webhook.signature_header.clone(),
    ));

    let router = Router::new()
        .hoop(CatchPanic::new())
        .hoop(remove_slash())
        .hoop(inject(state))
        .push(Router::with_path("healthcheck").get(healthcheck::handler))
        .push(router::app_router(config.checkout.max_inflight_holds));

    let doc = OpenApi::new("Floodgate API", "0.1.0").merge_router(&router);

    let router = router
        .push(doc.into_router("/api-doc/openapi.json"))
        .push(SwaggerUi::new("/api-doc/openapi.json").into_router("docs"));

    let server = Server::new(listener);

    let handle = server.handle();

    // Listen for shutdown signal
    tokio::spawn(async move {
        if let Err(error) = shutdown::listen(handle, sweeper_stop).await {
            error!("failed to listen for shutdown signal: {error}");
        }
    });

    // Start serving requests
    server.serve(router).await;

    // Give the sweeper its drain window before the process exits.
    if let Err(error) = sweeper_task.await {
        error!("sweeper task ended abnormally: {error}");
    }
}
