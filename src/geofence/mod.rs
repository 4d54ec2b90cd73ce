// Per-viewer geofence evaluation and alert debouncing

mod evaluator;
mod timer;

pub use evaluator::{GeofenceEvaluator, GeofenceEvent, GeofencePolicy, HideReason, ViolationState};
pub use timer::AlertTimer;
