use crate::fanout::protocol::{ClientMessage, ServerMessage};
use crate::fanout::{FanOut, ViewerSubscription};
use crate::state::WorldState;
use axum::extract::ws::{Message, WebSocket};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Manages a single viewer's WebSocket connection
pub struct ConnectionManager {
    fan_out: Arc<FanOut>,
    subscription: ViewerSubscription,
}

impl ConnectionManager {
    /// Register the viewer with the fan-out
    pub fn new(fan_out: Arc<FanOut>) -> Self {
        let subscription = fan_out.connect();
        Self {
            fan_out,
            subscription,
        }
    }

    /// Handle WebSocket connection lifecycle
    pub async fn handle(mut self, mut socket: WebSocket) {
        let viewer_id = self.subscription.id;

        // Full state first, before any live update
        let initial = self.subscription.initial.clone();
        if let Err(e) = send_state(&mut socket, initial).await {
            warn!(viewer_id = %viewer_id, error = %e, "Failed to send initial state");
            self.fan_out.disconnect(&viewer_id);
            return;
        }

        loop {
            tokio::select! {
                // Handle incoming client messages
                msg = socket.recv() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.handle_client_message(&text) {
                                warn!(viewer_id = %viewer_id, error = %e, "Ignoring client message");
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!(viewer_id = %viewer_id, "Viewer closed connection");
                            break;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = socket.send(Message::Pong(data)).await {
                                error!(viewer_id = %viewer_id, error = %e, "Failed to send pong");
                                break;
                            }
                        }
                        Some(Ok(_)) => {
                            // Ignore binary, pong messages
                        }
                        Some(Err(e)) => {
                            warn!(viewer_id = %viewer_id, error = %e, "WebSocket error");
                            break;
                        }
                    }
                }

                // Push every new state
                state = self.subscription.next() => {
                    match state {
                        Some(state) => {
                            if let Err(e) = send_state(&mut socket, state).await {
                                warn!(viewer_id = %viewer_id, error = %e, "Failed to push state");
                                break;
                            }
                        }
                        None => {
                            error!("State broadcast channel closed");
                            break;
                        }
                    }
                }
            }
        }

        self.fan_out.disconnect(&viewer_id);
    }

    /// Handle client message (anchor drift correction)
    fn handle_client_message(&self, text: &str) -> anyhow::Result<()> {
        let msg: ClientMessage = serde_json::from_str(text)?;

        match msg {
            ClientMessage::AnchorsUpdate { anchors } => {
                let outcome = self.fan_out.store().apply_anchor_updates(&anchors);
                info!(
                    viewer_id = %self.subscription.id,
                    applied = outcome.applied.len(),
                    skipped = outcome.skipped.len(),
                    "Anchor drift from viewer"
                );
            }
        }

        Ok(())
    }
}

async fn send_state(socket: &mut WebSocket, state: WorldState) -> anyhow::Result<()> {
    let json = serde_json::to_string(&ServerMessage::from(state))?;
    socket.send(Message::Text(json)).await?;
    Ok(())
}
