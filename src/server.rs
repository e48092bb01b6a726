use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use streambox::api::{self, state::AppState};
use streambox::config::Config;
use streambox::engine::{AcquisitionEngine, HttpAcquisitionClient};
use streambox::events::EventBus;
use streambox::ledger::{StateStore, persist};
use streambox::media::FfmpegTranscoder;
use streambox::observability::Metrics;
use streambox::pipeline::{Orchestrator, reconciler, run_event_loop, worker};
use streambox::queue::ConversionQueue;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Composition root: load config, restore the ledger, start the pipeline
/// tasks, serve HTTP, and run the shutdown sequence.
pub async fn run(address_override: Option<SocketAddr>) -> Result<(), AnyError> {
    info!("Loading configuration");
    let config = Config::load().map_err(|e| format!("Failed to load config: {}", e))?;
    let bind_addr = address_override.unwrap_or(config.server.bind_addr);

    // Required directories are the only fatal startup condition besides
    // the listener bind below.
    std::fs::create_dir_all(&config.server.media_dir)
        .map_err(|e| format!("Failed to create media dir: {}", e))?;
    if let Some(parent) = config.store.state_file.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create state dir: {}", e))?;
        }
    }

    let (bus, events_rx) = EventBus::new(config.pipeline.event_capacity);
    info!(path = %config.store.state_file.display(), "Loading item states");
    let items = persist::load_items(&config.store.state_file).await;
    let store = StateStore::with_items(items, bus);

    let engine: Arc<dyn AcquisitionEngine> = Arc::new(HttpAcquisitionClient::new(
        config.engine.endpoint.clone(),
        config.engine.request_timeout(),
    )?);

    let (queue, queue_rx) = ConversionQueue::new(config.pipeline.queue_capacity);
    let metrics = Arc::new(Metrics::new());
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        Arc::clone(&engine),
        queue,
        config.server.media_dir.clone(),
        config.transcode.probe_timeout(),
        Arc::clone(&metrics),
    ));

    // Pipeline tasks stop on `tasks_shutdown`; the saver has its own
    // token so its final save runs after the worker has finished.
    let tasks_shutdown = CancellationToken::new();
    let saver_shutdown = CancellationToken::new();

    let saver = tokio::spawn(persist::run_saver(
        store.clone(),
        config.store.state_file.clone(),
        config.store.save_interval(),
        saver_shutdown.clone(),
    ));
    let reconciler_task = tokio::spawn(reconciler::run_reconciler(
        store.clone(),
        Arc::clone(&engine),
        config.pipeline.reconcile_interval(),
        tasks_shutdown.clone(),
    ));
    let event_loop = tokio::spawn(run_event_loop(
        Arc::clone(&orchestrator),
        events_rx,
        tasks_shutdown.clone(),
    ));
    let transcoder = Arc::new(FfmpegTranscoder::new(config.transcode.hls_settings()));
    let mut worker_task = tokio::spawn(worker::run_worker(
        store.clone(),
        transcoder,
        config.server.media_dir.clone(),
        queue_rx,
        tasks_shutdown.clone(),
        Arc::clone(&metrics),
    ));

    // Re-announce restored records so the event loop re-submits their
    // locators to the engine.
    store.emit_loaded().await;

    let shutdown_grace = config.pipeline.shutdown_grace();
    let state = AppState::new(config, orchestrator, metrics);
    let app = api::build_router(state);

    let listener = TcpListener::bind(bind_addr).await?;
    info!(address = %bind_addr, "streambox listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Shutdown: stop taking new work, let the in-flight transcode finish
    // within the grace period, then write the final snapshot.
    info!("Shutting down pipeline");
    tasks_shutdown.cancel();
    let _ = reconciler_task.await;
    let _ = event_loop.await;

    if tokio::time::timeout(shutdown_grace, &mut worker_task)
        .await
        .is_err()
    {
        warn!("In-flight conversion did not finish in time, abandoning it");
        worker_task.abort();
        let _ = worker_task.await;
    }

    if let Err(err) = engine.close().await {
        warn!(%err, "Engine close failed");
    }

    saver_shutdown.cancel();
    let _ = saver.await;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
