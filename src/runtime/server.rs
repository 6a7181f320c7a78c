//! Server mode
//!
//! Builds the store and the view services from the global configuration,
//! starts the batcher's background flush, then serves HTTP until the
//! server receives a stop signal.

use actix_web::{App, HttpServer, middleware::DefaultHeaders, web};
use anyhow::Result;
use tracing::{info, warn};

use crate::analytics::ViewsSettings;
use crate::api::{AppState, configure_routes};
use crate::runtime::shutdown;
use crate::storage::StorageFactory;

/// Run the HTTP server
///
/// **Note**: Logging system must be initialized before calling this function
pub async fn run_server() -> Result<()> {
    let config = crate::config::get_config();

    let store = StorageFactory::create().await.map_err(|e| {
        tracing::error!("Storage initialization failed: {}", e);
        e
    })?;

    let settings = ViewsSettings::from(&config.views);
    if !settings.batching_enabled {
        info!("View batching disabled, every view is written immediately");
    }
    let state = AppState::new(store, settings);
    let flush_task = state.recorder.spawn_background_flush();

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    warn!("Starting server at http://{}", bind_address);

    let app_state = state.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::PayloadConfig::new(16 * 1024))
            .wrap(DefaultHeaders::new().add(("Cache-Control", "no-store")))
            .configure(configure_routes)
    })
    .keep_alive(std::time::Duration::from_secs(30))
    .bind(&bind_address)?
    .run()
    .await?;

    shutdown::drain_recorder(&state.recorder).await;
    if let Some(task) = flush_task {
        task.abort();
    }

    Ok(())
}
