// Headless viewer: live state in, geofence alerts out

use crate::fanout::ServerMessage;
use crate::geofence::{AlertTimer, GeofenceEvaluator, GeofenceEvent, GeofencePolicy, ViolationState};
use crate::state::{now_seconds, WorldState};
use crate::zone::ZoneRegistry;
use anyhow::{bail, Context, Result};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// User input to a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerCommand {
    Dismiss,
}

/// One connection's worth of viewer state.
///
/// Created per connection and dropped on disconnect, taking its violation
/// state and countdown timer with it.
pub struct ViewerSession {
    evaluator: GeofenceEvaluator,
    timer: AlertTimer,
    zones: Arc<ZoneRegistry>,
    last_state: Option<WorldState>,
}

impl ViewerSession {
    pub fn new(policy: GeofencePolicy, zones: Arc<ZoneRegistry>) -> Self {
        Self {
            evaluator: GeofenceEvaluator::new(policy),
            timer: AlertTimer::default(),
            zones,
            last_state: None,
        }
    }

    pub fn violation(&self) -> &ViolationState {
        self.evaluator.state()
    }

    pub fn last_state(&self) -> Option<&WorldState> {
        self.last_state.as_ref()
    }

    pub fn timer_active(&self) -> bool {
        self.timer.is_active()
    }

    /// Evaluate a pushed state against the current zone mirror
    pub fn handle_state(&mut self, state: WorldState, now: f64) -> Vec<GeofenceEvent> {
        let zones = self.zones.list();
        let events = self.evaluator.on_position(&state.tag.point(), &zones, now);
        self.last_state = Some(state);
        self.follow(&events);
        events
    }

    pub fn handle_tick(&mut self) -> Vec<GeofenceEvent> {
        let events: Vec<_> = self.evaluator.tick().into_iter().collect();
        self.follow(&events);
        events
    }

    pub fn handle_command(&mut self, command: ViewerCommand) -> Vec<GeofenceEvent> {
        let events: Vec<_> = match command {
            ViewerCommand::Dismiss => self.evaluator.dismiss().into_iter().collect(),
        };
        self.follow(&events);
        events
    }

    fn follow(&mut self, events: &[GeofenceEvent]) {
        for event in events {
            self.timer.follow(event);
        }
    }

    /// Connect and process until the server goes away.
    ///
    /// Returns `Ok` on a clean close; the caller decides whether to reconnect.
    pub async fn run(
        mut self,
        url: &str,
        commands: &mut mpsc::Receiver<ViewerCommand>,
        events: &mpsc::UnboundedSender<GeofenceEvent>,
    ) -> Result<()> {
        let (mut ws, _) = connect_async(url)
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;
        info!(url = %url, "Viewer connected");

        loop {
            let produced = tokio::select! {
                msg = ws.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ServerMessage>(&text) {
                                Ok(ServerMessage::FullStateUpdate { state }) => {
                                    self.handle_state(state, now_seconds())
                                }
                                Err(e) => {
                                    warn!(error = %e, "Ignoring server message");
                                    Vec::new()
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Server closed connection");
                            return Ok(());
                        }
                        Some(Ok(_)) => Vec::new(),
                        Some(Err(e)) => bail!("viewer connection failed: {}", e),
                    }
                }

                _ = self.timer.tick() => self.handle_tick(),

                Some(command) = commands.recv() => {
                    debug!(command = ?command, "Viewer command");
                    self.handle_command(command)
                }
            };

            for event in produced {
                // Nobody listening is fine
                let _ = events.send(event);
            }
        }
    }
}
