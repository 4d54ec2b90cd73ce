use crate::config::WorldConfig;
use crate::state::position::{now_seconds, CoordinateError, Point3, Position, WorldState};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// State store holds the single latest world state.
///
/// Every accepted write and the broadcast it triggers happen under one lock,
/// so subscribers observe states in exactly the order they were produced.
pub struct StateStore {
    world: Mutex<World>,

    /// Broadcast channel for full-state pushes
    state_tx: broadcast::Sender<WorldState>,
}

struct World {
    state: WorldState,
    /// Number of accepted writes since startup
    revision: u64,
}

/// Result of applying an anchor drift batch
#[derive(Clone, Debug, Default, Serialize)]
pub struct AnchorBatchOutcome {
    pub applied: Vec<String>,
    pub skipped: Vec<SkippedAnchor>,
    /// Resulting state, present only when at least one anchor changed
    #[serde(skip)]
    pub state: Option<WorldState>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkippedAnchor {
    pub id: String,
    pub reason: String,
}

impl StateStore {
    /// Create a store seeded with the configured defaults
    pub fn new(config: &WorldConfig, capacity: usize) -> Self {
        let (state_tx, _) = broadcast::channel(capacity.max(1));

        let state = WorldState {
            tag: Position::new(config.tag, now_seconds()),
            anchors: config.anchors.clone(),
        };

        Self {
            world: Mutex::new(World { state, revision: 0 }),
            state_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state (a copy, never an alias)
    pub fn snapshot(&self) -> WorldState {
        self.lock().state.clone()
    }

    /// Number of accepted writes since startup
    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    /// Configured anchor ids
    pub fn anchor_ids(&self) -> Vec<String> {
        self.lock().state.anchors.keys().cloned().collect()
    }

    /// Subscribe to state broadcasts
    pub fn subscribe(&self) -> broadcast::Receiver<WorldState> {
        self.state_tx.subscribe()
    }

    /// Take a snapshot and subscribe atomically.
    ///
    /// The receiver yields exactly the states produced after the snapshot.
    pub fn subscribe_with_snapshot(&self) -> (WorldState, broadcast::Receiver<WorldState>) {
        let world = self.lock();
        (world.state.clone(), self.state_tx.subscribe())
    }

    /// Replace the tag position and broadcast the new state
    pub fn apply_tag_update(&self, position: Position) -> Result<WorldState, CoordinateError> {
        if let Err(e) = position.validate() {
            warn!(error = %e, "Rejected tag update");
            return Err(e);
        }

        let mut world = self.lock();
        world.state.tag = position;
        let state = self.publish(&mut world);

        debug!(
            x = position.x,
            y = position.y,
            z = position.z,
            "Tag position updated"
        );

        Ok(state)
    }

    /// Apply an anchor drift batch `{id: {x, y, z}}`.
    ///
    /// Each anchor is validated on its own; malformed or unknown entries are
    /// skipped while the rest apply. One broadcast covers the whole batch.
    pub fn apply_anchor_updates(&self, batch: &Map<String, Value>) -> AnchorBatchOutcome {
        let mut outcome = AnchorBatchOutcome::default();
        let mut world = self.lock();

        for (id, payload) in batch {
            if !world.state.anchors.contains_key(id) {
                outcome.skipped.push(SkippedAnchor {
                    id: id.clone(),
                    reason: "unknown anchor".to_string(),
                });
                continue;
            }

            match Point3::from_json(payload) {
                Ok(point) => {
                    world.state.anchors.insert(id.clone(), point);
                    outcome.applied.push(id.clone());
                }
                Err(e) => outcome.skipped.push(SkippedAnchor {
                    id: id.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        if !outcome.applied.is_empty() {
            outcome.state = Some(self.publish(&mut world));
            info!(anchors = ?outcome.applied, "Anchor drift applied");
        }
        if !outcome.skipped.is_empty() {
            warn!(skipped = ?outcome.skipped, "Skipped anchor updates");
        }

        outcome
    }

    /// Bump the revision and broadcast; caller holds the lock.
    fn publish(&self, world: &mut World) -> WorldState {
        world.revision += 1;
        let state = world.state.clone();
        // No receivers is fine: nobody is watching yet
        let _ = self.state_tx.send(state.clone());
        state
    }
}
