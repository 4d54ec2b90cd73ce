use crate::config::GeofenceConfig;
use crate::state::Point3;
use crate::zone::ForbiddenZone;
use serde::Serialize;
use std::collections::BTreeSet;

/// Containment and alerting parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeofencePolicy {
    pub tolerance: f64,
    pub cooldown_seconds: f64,
    pub popup_seconds: u32,
}

impl Default for GeofencePolicy {
    fn default() -> Self {
        Self {
            tolerance: 0.02,
            cooldown_seconds: 60.0,
            popup_seconds: 30,
        }
    }
}

impl From<&GeofenceConfig> for GeofencePolicy {
    fn from(config: &GeofenceConfig) -> Self {
        Self {
            tolerance: config.tolerance,
            cooldown_seconds: config.cooldown_seconds,
            popup_seconds: config.popup_seconds,
        }
    }
}

/// Violation state of one viewer session. Never shared, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViolationState {
    /// Ids of zones currently containing the tag
    pub active: BTreeSet<String>,
    /// When the last popup was shown; `None` until the first one
    pub last_alert: Option<f64>,
    pub alert_visible: bool,
    pub countdown_remaining: u32,
}

impl ViolationState {
    pub fn is_violating(&self) -> bool {
        !self.active.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HideReason {
    Expired,
    Dismissed,
}

/// Presentation changes produced by the evaluator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeofenceEvent {
    /// Violation badge switched on (Clear -> Violating)
    BadgeOn { zones: Vec<ForbiddenZone> },
    /// Still violating, but the set of zones changed
    ZonesChanged { zones: Vec<ForbiddenZone> },
    /// Violation badge switched off (Violating -> Clear)
    BadgeOff,
    PopupShown {
        zones: Vec<ForbiddenZone>,
        countdown: u32,
    },
    CountdownTick { remaining: u32 },
    PopupHidden { reason: HideReason },
}

/// Geofence state machine for one viewer.
///
/// Two signals with different responsiveness: the badge follows containment
/// on every update, the popup is rate-limited by the cooldown and hides on its
/// own countdown regardless of the badge.
pub struct GeofenceEvaluator {
    policy: GeofencePolicy,
    state: ViolationState,
}

impl GeofenceEvaluator {
    pub fn new(policy: GeofencePolicy) -> Self {
        Self {
            policy,
            state: ViolationState {
                active: BTreeSet::new(),
                last_alert: None,
                alert_visible: false,
                countdown_remaining: policy.popup_seconds,
            },
        }
    }

    pub fn policy(&self) -> &GeofencePolicy {
        &self.policy
    }

    pub fn state(&self) -> &ViolationState {
        &self.state
    }

    /// Evaluate a tag position against every zone. `now` is unix seconds.
    pub fn on_position(
        &mut self,
        point: &Point3,
        zones: &[ForbiddenZone],
        now: f64,
    ) -> Vec<GeofenceEvent> {
        let violated: Vec<ForbiddenZone> = zones
            .iter()
            .filter(|zone| zone.contains(point, self.policy.tolerance))
            .cloned()
            .collect();
        let ids: BTreeSet<String> = violated.iter().map(|z| z.id.clone()).collect();

        let mut events = Vec::new();

        if ids.is_empty() {
            if self.state.is_violating() {
                self.state.active.clear();
                events.push(GeofenceEvent::BadgeOff);
            }
            // A visible popup keeps counting down on its own
            return events;
        }

        if !self.state.is_violating() {
            events.push(GeofenceEvent::BadgeOn {
                zones: violated.clone(),
            });
        } else if ids != self.state.active {
            events.push(GeofenceEvent::ZonesChanged {
                zones: violated.clone(),
            });
        }
        self.state.active = ids;

        if !self.state.alert_visible && self.cooldown_elapsed(now) {
            self.state.alert_visible = true;
            self.state.countdown_remaining = self.policy.popup_seconds;
            self.state.last_alert = Some(now);
            events.push(GeofenceEvent::PopupShown {
                zones: violated,
                countdown: self.policy.popup_seconds,
            });
        }

        events
    }

    fn cooldown_elapsed(&self, now: f64) -> bool {
        self.state
            .last_alert
            .map_or(true, |last| now - last >= self.policy.cooldown_seconds)
    }

    /// One-second countdown step; no-op while the popup is hidden
    pub fn tick(&mut self) -> Option<GeofenceEvent> {
        if !self.state.alert_visible {
            return None;
        }

        if self.state.countdown_remaining <= 1 {
            self.hide();
            return Some(GeofenceEvent::PopupHidden {
                reason: HideReason::Expired,
            });
        }

        self.state.countdown_remaining -= 1;
        Some(GeofenceEvent::CountdownTick {
            remaining: self.state.countdown_remaining,
        })
    }

    /// Manual dismissal. The cooldown still runs from when the popup was shown.
    pub fn dismiss(&mut self) -> Option<GeofenceEvent> {
        if !self.state.alert_visible {
            return None;
        }
        self.hide();
        Some(GeofenceEvent::PopupHidden {
            reason: HideReason::Dismissed,
        })
    }

    fn hide(&mut self) {
        self.state.alert_visible = false;
        self.state.countdown_remaining = self.policy.popup_seconds;
    }
}
