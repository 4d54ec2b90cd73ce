use crate::geofence::GeofenceEvent;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Cancellable countdown ticker owned by one viewer session.
///
/// At most one interval exists at a time; it runs only while a popup is shown.
pub struct AlertTimer {
    period: Duration,
    interval: Option<Interval>,
}

impl AlertTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            interval: None,
        }
    }

    /// Start (or restart) the ticker; first tick fires one period from now
    pub fn start(&mut self) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(ticker);
    }

    pub fn cancel(&mut self) {
        self.interval = None;
    }

    pub fn is_active(&self) -> bool {
        self.interval.is_some()
    }

    /// Start on popup shown, cancel on popup hidden
    pub fn follow(&mut self, event: &GeofenceEvent) {
        match event {
            GeofenceEvent::PopupShown { .. } => self.start(),
            GeofenceEvent::PopupHidden { .. } => self.cancel(),
            _ => {}
        }
    }

    /// Wait for the next tick. Pending forever while cancelled.
    ///
    /// Cancel-safe, so it can sit in a `select!` loop.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

impl Default for AlertTimer {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geofence::HideReason;

    #[test]
    fn test_follows_popup_events() {
        let mut timer = AlertTimer::default();
        assert!(!timer.is_active());

        // Interval creation needs a runtime
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let _guard = rt.enter();

        timer.follow(&GeofenceEvent::PopupShown {
            zones: vec![],
            countdown: 30,
        });
        assert!(timer.is_active());

        timer.follow(&GeofenceEvent::BadgeOff);
        assert!(timer.is_active());

        timer.follow(&GeofenceEvent::PopupHidden {
            reason: HideReason::Dismissed,
        });
        assert!(!timer.is_active());
    }

    #[tokio::test]
    async fn test_ticks_while_active() {
        let mut timer = AlertTimer::new(Duration::from_millis(10));
        timer.start();
        tokio::time::timeout(Duration::from_secs(1), timer.tick())
            .await
            .expect("timer should tick");
    }

    #[tokio::test]
    async fn test_cancelled_timer_never_ticks() {
        let mut timer = AlertTimer::new(Duration::from_millis(10));
        timer.start();
        timer.cancel();
        let result = tokio::time::timeout(Duration::from_millis(50), timer.tick()).await;
        assert!(result.is_err());
    }
}
