// Forbidden zone model and local mirror of the external zone collection

mod registry;
mod source;
mod sse;

pub use registry::{RegistryChange, ZoneRegistry};
pub use source::{rtdb_url, RtdbZoneSource, ZoneSource};
pub use sse::{RtdbEvent, SseDecoder, SseEvent};

use crate::state::Point3;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Cuboid extents along x (width), y (height) and z (depth), in meters
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneSize {
    pub w: f64,
    pub h: f64,
    pub d: f64,
}

impl ZoneSize {
    pub const fn new(w: f64, h: f64, d: f64) -> Self {
        Self { w, h, d }
    }
}

impl Default for ZoneSize {
    fn default() -> Self {
        Self::new(4.0, 3.0, 4.0)
    }
}

/// Axis-aligned cuboid the tag must stay out of
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForbiddenZone {
    pub id: String,
    pub center: Point3,
    pub size: ZoneSize,
}

impl ForbiddenZone {
    pub fn new(id: impl Into<String>, center: Point3, size: ZoneSize) -> Self {
        Self {
            id: id.into(),
            center,
            size,
        }
    }

    /// Build a zone from a store record `{x, y, z, w, h, d}`.
    ///
    /// Missing or non-numeric centre fields read as 0; missing or
    /// non-positive size fields take `default_size`.
    pub fn from_record(id: &str, record: &Value, default_size: ZoneSize) -> Result<Self, ZoneError> {
        let obj = record
            .as_object()
            .ok_or_else(|| ZoneError::NotAnObject(id.to_string()))?;

        let num = |key: &str| obj.get(key).and_then(Value::as_f64).filter(|v| v.is_finite());
        let extent = |key: &str, default: f64| num(key).filter(|v| *v > 0.0).unwrap_or(default);

        Ok(Self {
            id: id.to_string(),
            center: Point3::new(
                num("x").unwrap_or(0.0),
                num("y").unwrap_or(0.0),
                num("z").unwrap_or(0.0),
            ),
            size: ZoneSize::new(
                extent("w", default_size.w),
                extent("h", default_size.h),
                extent("d", default_size.d),
            ),
        })
    }

    /// Store record form, inverse of `from_record`
    pub fn to_record(&self) -> Map<String, Value> {
        let mut obj = Map::new();
        for (key, v) in [
            ("x", self.center.x),
            ("y", self.center.y),
            ("z", self.center.z),
            ("w", self.size.w),
            ("h", self.size.h),
            ("d", self.size.d),
        ] {
            obj.insert(key.to_string(), Value::from(v));
        }
        obj
    }

    /// Containment with `tolerance` added to every half-extent; faces count as inside.
    pub fn contains(&self, p: &Point3, tolerance: f64) -> bool {
        let half_w = self.size.w / 2.0 + tolerance;
        let half_h = self.size.h / 2.0 + tolerance;
        let half_d = self.size.d / 2.0 + tolerance;

        within(p.x, self.center.x, half_w)
            && within(p.y, self.center.y, half_h)
            && within(p.z, self.center.z, half_d)
    }
}

fn within(v: f64, center: f64, half: f64) -> bool {
    center - half <= v && v <= center + half
}

/// Zone record errors
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneError {
    NotAnObject(String),
    UnsupportedPath(String),
    MalformedEvent(String),
}

impl fmt::Display for ZoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneError::NotAnObject(id) => write!(f, "zone record '{}' is not an object", id),
            ZoneError::UnsupportedPath(path) => write!(f, "unsupported zone path '{}'", path),
            ZoneError::MalformedEvent(msg) => write!(f, "malformed zone event: {}", msg),
        }
    }
}

impl std::error::Error for ZoneError {}
