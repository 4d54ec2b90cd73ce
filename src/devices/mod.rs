// Device registry consumed by the admin API

mod rtdb;

pub use rtdb::RtdbDeviceStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::RwLock;

/// Fields a client may change through PATCH
const PATCHABLE_FIELDS: [&str; 4] = ["mac", "coord", "type", "status"];

/// Device record, normalised from whatever the store holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub mac: String,
    pub coord: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub status: String,
}

impl Device {
    /// Missing fields default: mac to the id, coord/type to "", status to "Offline"
    pub fn from_record(id: &str, record: &Value) -> Self {
        let text = |key: &str| record.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            id: id.to_string(),
            mac: text("mac").unwrap_or_else(|| id.to_string()),
            coord: text("coord").unwrap_or_default(),
            device_type: text("type").unwrap_or_default(),
            status: text("status").unwrap_or_else(|| "Offline".to_string()),
        }
    }

    fn apply(&mut self, patch: &Map<String, Value>) {
        for (key, value) in patch {
            let Some(v) = value.as_str() else { continue };
            match key.as_str() {
                "mac" => self.mac = v.to_string(),
                "coord" => self.coord = v.to_string(),
                "type" => self.device_type = v.to_string(),
                "status" => self.status = v.to_string(),
                _ => {}
            }
        }
    }
}

/// Reject unknown fields and non-string values
pub fn validate_patch(patch: &Map<String, Value>) -> Result<(), DeviceError> {
    if patch.is_empty() {
        return Err(DeviceError::InvalidPatch("patch is empty".to_string()));
    }
    for (key, value) in patch {
        if !PATCHABLE_FIELDS.contains(&key.as_str()) {
            return Err(DeviceError::InvalidPatch(format!("unknown field '{}'", key)));
        }
        if !value.is_string() {
            return Err(DeviceError::InvalidPatch(format!("field '{}' must be a string", key)));
        }
    }
    Ok(())
}

/// External device collection
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Device>, DeviceError>;

    async fn update(&self, id: &str, patch: Map<String, Value>) -> Result<(), DeviceError>;
}

/// In-process device store (tests, no database configured)
#[derive(Default)]
pub struct MemoryDeviceStore {
    devices: RwLock<BTreeMap<String, Device>>,
}

impl MemoryDeviceStore {
    pub fn new(devices: impl IntoIterator<Item = Device>) -> Self {
        Self {
            devices: RwLock::new(devices.into_iter().map(|d| (d.id.clone(), d)).collect()),
        }
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn list(&self) -> Result<Vec<Device>, DeviceError> {
        let devices = self
            .devices
            .read()
            .map_err(|_| DeviceError::Store("device store lock poisoned".to_string()))?;
        Ok(devices.values().cloned().collect())
    }

    async fn update(&self, id: &str, patch: Map<String, Value>) -> Result<(), DeviceError> {
        validate_patch(&patch)?;
        let mut devices = self
            .devices
            .write()
            .map_err(|_| DeviceError::Store("device store lock poisoned".to_string()))?;
        let device = devices
            .get_mut(id)
            .ok_or_else(|| DeviceError::NotFound(id.to_string()))?;
        device.apply(&patch);
        Ok(())
    }
}

/// Device store errors
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceError {
    NotFound(String),
    InvalidPatch(String),
    Store(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NotFound(id) => write!(f, "device '{}' not found", id),
            DeviceError::InvalidPatch(msg) => write!(f, "invalid device update: {}", msg),
            DeviceError::Store(msg) => write!(f, "device store error: {}", msg),
        }
    }
}

impl std::error::Error for DeviceError {}
