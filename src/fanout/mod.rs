// Full-state fan-out to connected viewers

pub mod connection;
pub mod protocol;

pub use connection::ConnectionManager;
pub use protocol::{ClientMessage, ServerMessage};

use crate::state::{StateStore, WorldState};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

/// Registry of connected viewers.
///
/// Delivery rides on the store's broadcast channel, which the store feeds
/// while holding its write lock, so every viewer sees states in production order.
pub struct FanOut {
    store: Arc<StateStore>,
    viewers: DashMap<Uuid, ViewerInfo>,
}

#[derive(Debug, Clone)]
pub struct ViewerInfo {
    pub connected_at: DateTime<Utc>,
}

/// A registered viewer: its initial full state plus the live update feed
pub struct ViewerSubscription {
    pub id: Uuid,
    pub initial: WorldState,
    updates: broadcast::Receiver<WorldState>,
}

impl ViewerSubscription {
    /// Next state for this viewer; `None` once the store is gone.
    ///
    /// A viewer that fell behind skips straight to newer states.
    pub async fn next(&mut self) -> Option<WorldState> {
        loop {
            match self.updates.recv().await {
                Ok(state) => return Some(state),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(viewer_id = %self.id, skipped = skipped, "Viewer lagged, skipped states");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl FanOut {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self {
            store,
            viewers: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Register a viewer. Its initial state is the latest one at connect time.
    pub fn connect(&self) -> ViewerSubscription {
        let (initial, updates) = self.store.subscribe_with_snapshot();
        let id = Uuid::new_v4();
        self.viewers.insert(
            id,
            ViewerInfo {
                connected_at: Utc::now(),
            },
        );
        info!(viewer_id = %id, viewers = self.viewers.len(), "Viewer connected");

        ViewerSubscription {
            id,
            initial,
            updates,
        }
    }

    /// Release a viewer. Affects nothing else.
    pub fn disconnect(&self, id: &Uuid) -> bool {
        let removed = self.viewers.remove(id).is_some();
        if removed {
            info!(viewer_id = %id, viewers = self.viewers.len(), "Viewer disconnected");
        }
        removed
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    pub fn viewer(&self, id: &Uuid) -> Option<ViewerInfo> {
        self.viewers.get(id).map(|v| v.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::state::Position;

    fn fan_out(capacity: usize) -> FanOut {
        FanOut::new(Arc::new(StateStore::new(&WorldConfig::default(), capacity)))
    }

    fn tag(x: f64) -> Position {
        Position { x, y: 1.0, z: 1.0, timestamp: x }
    }

    #[tokio::test]
    async fn test_connect_receives_latest_state() {
        let fan_out = fan_out(16);
        for i in 1..=5 {
            fan_out.store().apply_tag_update(tag(i as f64)).unwrap();
        }

        let viewer = fan_out.connect();
        assert_eq!(viewer.initial.tag, tag(5.0));
        assert_eq!(viewer.initial, fan_out.store().snapshot());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_viewer_in_order() {
        let fan_out = fan_out(16);
        let mut a = fan_out.connect();
        let mut b = fan_out.connect();
        assert_eq!(fan_out.viewer_count(), 2);

        for i in 1..=3 {
            fan_out.store().apply_tag_update(tag(i as f64)).unwrap();
        }

        for viewer in [&mut a, &mut b] {
            for i in 1..=3 {
                assert_eq!(viewer.next().await.unwrap().tag, tag(i as f64));
            }
        }
    }

    #[tokio::test]
    async fn test_lagging_viewer_skips_to_newer_states() {
        let fan_out = fan_out(2);
        let mut viewer = fan_out.connect();

        for i in 1..=6 {
            fan_out.store().apply_tag_update(tag(i as f64)).unwrap();
        }

        let first = viewer.next().await.unwrap();
        assert!(first.tag.x > 1.0);
        let second = viewer.next().await.unwrap();
        assert!(second.tag.x > first.tag.x);
        assert_eq!(second.tag, tag(6.0));
    }

    #[tokio::test]
    async fn test_disconnect_only_affects_that_viewer() {
        let fan_out = fan_out(16);
        let a = fan_out.connect();
        let mut b = fan_out.connect();

        assert!(fan_out.disconnect(&a.id));
        assert!(!fan_out.disconnect(&a.id));
        drop(a);
        assert_eq!(fan_out.viewer_count(), 1);
        assert!(fan_out.viewer(&b.id).is_some());

        fan_out.store().apply_tag_update(tag(9.0)).unwrap();
        assert_eq!(b.next().await.unwrap().tag, tag(9.0));
    }

    #[tokio::test]
    async fn test_reconnect_resyncs_with_full_state() {
        let fan_out = fan_out(16);
        let first = fan_out.connect();
        fan_out.disconnect(&first.id);
        drop(first);

        fan_out.store().apply_tag_update(tag(4.0)).unwrap();
        fan_out.store().apply_tag_update(tag(7.0)).unwrap();

        let again = fan_out.connect();
        assert_eq!(again.initial.tag, tag(7.0));
    }
}
