// Server-authoritative world state (tag + anchors)

mod engine;
mod position;

pub use engine::{AnchorBatchOutcome, SkippedAnchor, StateStore};
pub use position::{now_seconds, Axis, CoordinateError, Point3, Position, TagUpdate, WorldState};
