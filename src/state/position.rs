use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A point in the tracking frame. `y` is vertical height.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Parse `{x, y, z}` where every axis must be a JSON number.
    pub fn from_json(value: &Value) -> Result<Self, CoordinateError> {
        let obj = value.as_object().ok_or(CoordinateError::NotAnObject)?;
        let axis = |a: Axis| -> Result<f64, CoordinateError> {
            let v = obj.get(a.name()).ok_or(CoordinateError::Missing(a))?;
            match v.as_f64() {
                Some(n) if n.is_finite() => Ok(n),
                _ => Err(CoordinateError::NotFinite(a)),
            }
        };
        Ok(Self::new(axis(Axis::X)?, axis(Axis::Y)?, axis(Axis::Z)?))
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Tag position with the unix time (seconds) it was measured at
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: f64,
}

impl Position {
    pub fn new(point: Point3, timestamp: f64) -> Self {
        Self {
            x: point.x,
            y: point.y,
            z: point.z,
            timestamp,
        }
    }

    pub fn point(&self) -> Point3 {
        Point3::new(self.x, self.y, self.z)
    }

    /// Reject NaN/infinite coordinates or timestamp
    pub fn validate(&self) -> Result<(), CoordinateError> {
        for (axis, v) in [(Axis::X, self.x), (Axis::Y, self.y), (Axis::Z, self.z)] {
            if !v.is_finite() {
                return Err(CoordinateError::NotFinite(axis));
            }
        }
        if !self.timestamp.is_finite() {
            return Err(CoordinateError::InvalidTimestamp);
        }
        Ok(())
    }
}

/// Latest known position of the tag and every configured anchor.
///
/// This is also the full wire payload pushed to viewers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub tag: Position,
    pub anchors: BTreeMap<String, Point3>,
}

/// Tag update as it arrives from the localization process (query string fields).
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TagUpdate {
    pub x: Option<String>,
    pub y: Option<String>,
    pub z: Option<String>,
    pub ts: Option<String>,
}

impl TagUpdate {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: Some(x.to_string()),
            y: Some(y.to_string()),
            z: Some(z.to_string()),
            ts: None,
        }
    }

    pub fn with_timestamp(mut self, ts: f64) -> Self {
        self.ts = Some(ts.to_string());
        self
    }

    /// Parse into a Position; a missing `ts` takes `now`.
    pub fn parse(&self, now: f64) -> Result<Position, CoordinateError> {
        let x = parse_axis(Axis::X, self.x.as_deref())?;
        let y = parse_axis(Axis::Y, self.y.as_deref())?;
        let z = parse_axis(Axis::Z, self.z.as_deref())?;

        let timestamp = match self.ts.as_deref().map(str::trim) {
            None | Some("") => now,
            Some(raw) => match raw.parse::<f64>() {
                Ok(ts) if ts.is_finite() => ts,
                _ => return Err(CoordinateError::InvalidTimestamp),
            },
        };

        Ok(Position {
            x,
            y,
            z,
            timestamp,
        })
    }
}

fn parse_axis(axis: Axis, raw: Option<&str>) -> Result<f64, CoordinateError> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty());
    let raw = raw.ok_or(CoordinateError::Missing(axis))?;
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(CoordinateError::NotFinite(axis)),
    }
}

/// Current unix time in fractional seconds
pub fn now_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn name(&self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }
}

/// Why a coordinate update was rejected
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinateError {
    Missing(Axis),
    NotFinite(Axis),
    InvalidTimestamp,
    NotAnObject,
}

impl fmt::Display for CoordinateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinateError::Missing(axis) => write!(f, "missing {} coordinate", axis.name()),
            CoordinateError::NotFinite(axis) => {
                write!(f, "{} coordinate is not a finite number", axis.name())
            }
            CoordinateError::InvalidTimestamp => write!(f, "timestamp is not a finite number"),
            CoordinateError::NotAnObject => write!(f, "coordinates must be an object"),
        }
    }
}

impl std::error::Error for CoordinateError {}
