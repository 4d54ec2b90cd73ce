use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uwb_live::config;
use uwb_live::geofence::{GeofenceEvent, GeofencePolicy};
use uwb_live::viewer::{ViewerCommand, ViewerSession};
use uwb_live::zone::{ZoneRegistry, ZoneSource};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "uwb_live=info,uwb_viewer=info".into()),
        )
        .init();

    let config = config::load_from_env()?;
    let policy = GeofencePolicy::from(&config.geofence);

    let zones = Arc::new(ZoneRegistry::new());
    let source = ZoneSource::from_config(&config.zones, config.geofence.default_size);
    source
        .load_initial(&zones)
        .await
        .context("Failed to load forbidden zones")?;
    tokio::spawn(source.run(Arc::clone(&zones)));

    // Any stdin line dismisses the popup
    let (command_tx, mut command_rx) = mpsc::channel(8);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(_)) = lines.next_line().await {
            if command_tx.send(ViewerCommand::Dismiss).await.is_err() {
                break;
            }
        }
    });

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            log_event(&event);
        }
    });

    let reconnect = Duration::from_secs(config.viewer.reconnect_seconds);
    loop {
        // Fresh session per connection
        let session = ViewerSession::new(policy, Arc::clone(&zones));
        if let Err(e) = session
            .run(&config.viewer.server_url, &mut command_rx, &event_tx)
            .await
        {
            warn!(error = %e, "Viewer session ended");
        }
        tokio::time::sleep(reconnect).await;
    }
}

fn log_event(event: &GeofenceEvent) {
    match event {
        GeofenceEvent::BadgeOn { zones } | GeofenceEvent::ZonesChanged { zones } => {
            let ids: Vec<&str> = zones.iter().map(|z| z.id.as_str()).collect();
            warn!(zones = ?ids, "VIOLATION OF RESTRICTED ZONE");
        }
        GeofenceEvent::BadgeOff => info!("Tag left all forbidden zones"),
        GeofenceEvent::PopupShown { zones, countdown } => {
            for zone in zones {
                warn!(
                    zone = %zone.id,
                    x = zone.center.x,
                    y = zone.center.y,
                    z = zone.center.z,
                    "WARNING: tag entered a forbidden zone"
                );
            }
            info!(seconds = countdown, "Alert shown; press Enter to dismiss");
        }
        GeofenceEvent::CountdownTick { .. } => {}
        GeofenceEvent::PopupHidden { reason } => info!(reason = ?reason, "Alert hidden"),
    }
}
