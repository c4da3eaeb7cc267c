// ShowSync engine
//
// Keeps listener audio aligned with a light show:
//   - Poll the show-control device and resolve the running sequence to audio
//   - Push the timeline to every connected listener over an event stream
//   - Serve the audio assets listeners play
//
// Run behind a reverse proxy (nginx/Caddy) for HTTPS and internet exposure.
// The engine keeps timeline state in memory: run exactly one instance.

use std::sync::Arc;

use showsync_engine::{
    api::{build_router, AppState},
    config::Config,
    mapping::MappingStore,
    show_control::ShowControlClient,
    AudioResolver, BroadcastHub, Clock, Poller, SystemClock, TimelineState,
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .init();

    let version = env!("CARGO_PKG_VERSION").to_string();
    let cfg = Config::from_env()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let resolver = Arc::new(AudioResolver::new(
        cfg.audio_dir.clone(),
        MappingStore::new(cfg.db_path.clone()),
    ));
    // An unreadable library is not fatal; the reload endpoint can retry later.
    if let Err(e) = resolver.reload().await {
        warn!("initial resolver load failed: {e}");
    }

    let hub = Arc::new(BroadcastHub::new(TimelineState::idle(clock.now_ms())));
    let keepalive_task = hub.spawn_keepalive(cfg.keepalive_interval);

    let source = ShowControlClient::new(&cfg.show_control)?;
    info!("polling show control at {}", source.status_url());
    let poller = Poller::new(
        Arc::new(source),
        Arc::clone(&resolver),
        Arc::clone(&hub),
        Arc::clone(&clock),
        cfg.heartbeat_interval,
    );
    let poll_health = poller.health();
    let poll_task = tokio::spawn(poller.run(cfg.poll_interval));

    let state = AppState {
        version: version.clone(),
        hub: Arc::clone(&hub),
        resolver,
        poll_health,
        clock,
    };
    let app = build_router(state, &cfg.audio_dir).layer(TraceLayer::new_for_http());

    info!("ShowSync engine v{version} starting on http://{}", cfg.bind);

    let listener = tokio::net::TcpListener::bind(cfg.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Open event streams would otherwise hold the graceful shutdown forever.
            hub.disconnect_all();
        })
        .await?;

    poll_task.abort();
    keepalive_task.abort();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let term = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("cannot install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let term = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = term => {},
    }

    warn!("Shutdown signal received.");
}
