use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use uwb_live::api::{create_app, DeviceAppState, IngestAppState, WsAppState};
use uwb_live::auth::StaticTokenVerifier;
use uwb_live::config;
use uwb_live::devices::{DeviceStore, MemoryDeviceStore, RtdbDeviceStore};
use uwb_live::fanout::FanOut;
use uwb_live::state::StateStore;
use uwb_live::zone::{ZoneRegistry, ZoneSource};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "uwb_live=info".into()),
        )
        .init();

    info!("uwb-live starting...");

    let config = config::load_from_env()?;

    // World state + fan-out
    let store = Arc::new(StateStore::new(
        &config.world,
        config.server.broadcast_capacity,
    ));
    let fan_out = Arc::new(FanOut::new(Arc::clone(&store)));
    info!(anchors = ?store.anchor_ids(), "State store initialized");

    // Zone mirror: must load once at startup, then follows the source
    let zones = Arc::new(ZoneRegistry::new());
    let source = ZoneSource::from_config(&config.zones, config.geofence.default_size);
    source
        .load_initial(&zones)
        .await
        .context("Failed to load forbidden zones")?;
    tokio::spawn(source.run(Arc::clone(&zones)));

    // Device registry
    let devices: Arc<dyn DeviceStore> = match &config.zones.database_url {
        Some(url) => Arc::new(RtdbDeviceStore::new(
            url,
            &config.devices.path,
            config.zones.auth_token.clone(),
        )),
        None => Arc::new(MemoryDeviceStore::default()),
    };

    let app = create_app(
        IngestAppState {
            store: Arc::clone(&store),
            zones: Arc::clone(&zones),
        },
        WsAppState {
            fan_out: Arc::clone(&fan_out),
        },
        DeviceAppState {
            devices,
            verifier: Arc::new(StaticTokenVerifier::new(config.auth.tokens.clone())),
            auth_enabled: config.auth.enabled,
        },
        config.server.cors_permissive,
    );

    let listener = TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;

    info!(addr = %config.server.bind_addr, "Listening");
    info!("  GET  /push          tag position");
    info!("  POST /api/anchors   anchor drift");
    info!("  GET  /api/ws        full-state-update stream");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
