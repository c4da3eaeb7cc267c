// Headless ShowSync listener.
//
// Connects to an engine's push channel and runs the same sync controller a
// browser listener runs, against a virtual playhead. The debug log shows the
// drift and the correction applied on every tick, which makes this a handy
// tool for checking sync quality from a given network location:
//
//   RUST_LOG=debug SHOWSYNC_SERVER_URL=http://show.local:3000 showsync-listener

use std::sync::Arc;

use showsync_engine::{
    client::{drive, Reconnector, SyncController, VirtualElement},
    config::ListenerConfig,
    Clock, SystemClock,
};
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .init();

    let cfg = ListenerConfig::from_env()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let media_base = format!("{}/audio", cfg.server_url.trim_end_matches('/'));
    let element = VirtualElement::new(Arc::clone(&clock));
    let mut controller = SyncController::new(element, clock, media_base);
    // There is no autoplay policy here; behave as if the user pressed play.
    controller.user_play();

    let reconnector = Reconnector::new(&cfg.server_url, cfg.reconnect_delay)?;
    info!("listening to {}", reconnector.stream_url());

    let (tx, rx) = mpsc::channel(16);
    let channel_task = tokio::spawn(reconnector.run(tx));

    drive(&mut controller, rx, cfg.tick_interval, async {
        tokio::signal::ctrl_c().await.ok();
    })
    .await;

    channel_task.abort();
    info!("listener stopped");
    Ok(())
}
