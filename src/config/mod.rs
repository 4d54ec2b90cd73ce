mod env;

pub use env::apply_env_overrides;

use crate::state::Point3;
use crate::zone::{ForbiddenZone, ZoneSize};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Complete service configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub geofence: GeofenceConfig,
    #[serde(default)]
    pub zones: ZonesConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub devices: DevicesConfig,
    #[serde(default)]
    pub viewer: ViewerConfig,
}

/// HTTP/WebSocket listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Per-viewer buffer of pending states before a slow viewer starts skipping
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
    #[serde(default = "default_true")]
    pub cors_permissive: bool,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_broadcast_capacity() -> usize {
    64
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            broadcast_capacity: default_broadcast_capacity(),
            cors_permissive: true,
        }
    }
}

/// Initial world state used before the localization source reports anything.
///
/// The anchor map also fixes the set of anchor ids the store accepts.
#[derive(Debug, Clone, Deserialize)]
pub struct WorldConfig {
    #[serde(default = "default_tag")]
    pub tag: Point3,
    #[serde(default = "default_anchors")]
    pub anchors: BTreeMap<String, Point3>,
}

fn default_tag() -> Point3 {
    Point3::new(6.0, 1.6, 6.0)
}

fn default_anchors() -> BTreeMap<String, Point3> {
    BTreeMap::from([
        ("A0".to_string(), Point3::new(0.0, 2.0, 0.0)),
        ("A1".to_string(), Point3::new(12.0, 2.0, 0.0)),
        ("A2".to_string(), Point3::new(0.0, 2.0, 12.0)),
        ("A3".to_string(), Point3::new(12.0, 2.0, 12.0)),
    ])
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tag: default_tag(),
            anchors: default_anchors(),
        }
    }
}

/// Geofence alerting parameters
#[derive(Debug, Clone, Deserialize)]
pub struct GeofenceConfig {
    /// Containment slack in meters, added to every half-extent
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Minimum time between two alert popups (seconds)
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: f64,
    /// How long a popup stays visible (seconds)
    #[serde(default = "default_popup_seconds")]
    pub popup_seconds: u32,
    /// Size given to zone records that lack one
    #[serde(default)]
    pub default_size: ZoneSize,
}

impl GeofenceConfig {
    /// Reject values that would silently change containment or cooldown rules
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            bail!("geofence.tolerance must be a non-negative number, got {}", self.tolerance);
        }
        if !(self.cooldown_seconds.is_finite() && self.cooldown_seconds >= 0.0) {
            bail!(
                "geofence.cooldown_seconds must be a non-negative number, got {}",
                self.cooldown_seconds
            );
        }
        if self.popup_seconds == 0 {
            bail!("geofence.popup_seconds must be at least 1");
        }
        let size = self.default_size;
        if [size.w, size.h, size.d].iter().any(|v| !(v.is_finite() && *v > 0.0)) {
            bail!("geofence.default_size must be positive, got {:?}", size);
        }
        Ok(())
    }
}

fn default_tolerance() -> f64 {
    0.02
}

fn default_cooldown_seconds() -> f64 {
    60.0
}

fn default_popup_seconds() -> u32 {
    30
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            cooldown_seconds: default_cooldown_seconds(),
            popup_seconds: default_popup_seconds(),
            default_size: ZoneSize::default(),
        }
    }
}

/// Where forbidden zones come from
#[derive(Debug, Clone, Deserialize)]
pub struct ZonesConfig {
    /// Realtime Database root, e.g. https://example.firebasedatabase.app
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_zones_path")]
    pub path: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_retry_seconds")]
    pub retry_seconds: u64,
    /// Reconnect when the stream stays silent this long
    #[serde(default = "default_idle_timeout_seconds")]
    pub idle_timeout_seconds: u64,
    /// Used when no database is configured
    #[serde(default)]
    pub static_zones: Vec<ForbiddenZone>,
}

fn default_zones_path() -> String {
    "uwb/forbidden/zones".to_string()
}

fn default_retry_seconds() -> u64 {
    5
}

fn default_idle_timeout_seconds() -> u64 {
    60
}

impl Default for ZonesConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            path: default_zones_path(),
            auth_token: None,
            retry_seconds: default_retry_seconds(),
            idle_timeout_seconds: default_idle_timeout_seconds(),
            static_zones: Vec::new(),
        }
    }
}

/// Bearer-token verification for administrative routes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub tokens: Vec<String>,
}

/// Device registry location (shares the zones database)
#[derive(Debug, Clone, Deserialize)]
pub struct DevicesConfig {
    #[serde(default = "default_devices_path")]
    pub path: String,
}

fn default_devices_path() -> String {
    "uwbConfig/devices".to_string()
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            path: default_devices_path(),
        }
    }
}

/// Headless viewer client settings
#[derive(Debug, Clone, Deserialize)]
pub struct ViewerConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_reconnect_seconds")]
    pub reconnect_seconds: u64,
}

fn default_server_url() -> String {
    "ws://127.0.0.1:3000/api/ws".to_string()
}

fn default_reconnect_seconds() -> u64 {
    2
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            reconnect_seconds: default_reconnect_seconds(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: AppConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {}", path))?;
    config
        .geofence
        .validate()
        .with_context(|| format!("Invalid config file {}", path))?;
    Ok(config)
}

/// Load configuration from `UWB_CONFIG` (if set), then apply env overrides.
pub fn load_from_env() -> Result<AppConfig> {
    let mut config = match std::env::var("UWB_CONFIG") {
        Ok(path) => load_config(&path)?,
        Err(_) => AppConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}
