//! Process-wide location broadcasting.
//!
//! A single [`LocationHub`] owns the device-level position watch and fans every
//! fix out to independent consumers (track follower, recorder, map overlay).
//! Consumers never start their own watch.

use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use thiserror::Error;

use crate::publish::{Publisher, SubscriptionId};
use crate::Fix;

/// Why the location source cannot deliver positions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Position unavailable")]
    PositionUnavailable,

    #[error("Timed out waiting for a position")]
    Timeout,

    #[error("Location is not supported on this device")]
    Unsupported,

    #[error("Location error: {0}")]
    Other(String),
}

/// Lifecycle of the location source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LocationStatus {
    #[default]
    Stopped,
    Running,
    /// Running, but the source reported an error. Cleared by the next fix.
    Unavailable(LocationError),
}

impl LocationStatus {
    /// Human-readable status line for display.
    pub fn message(&self) -> String {
        match self {
            LocationStatus::Stopped => "Location off".to_string(),
            LocationStatus::Running => "Location on".to_string(),
            LocationStatus::Unavailable(err) => err.to_string(),
        }
    }
}

/// Anything that consumes a stream of fixes.
pub trait FixConsumer {
    fn on_fix(&mut self, fix: &Fix);
}

/// Broadcaster of fixes and source status to any number of subscribers.
#[derive(Debug, Default)]
pub struct LocationHub {
    fixes: Publisher<Option<Fix>>,
    status: Publisher<LocationStatus>,
}

impl LocationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start delivering fixes. Starting a running hub is a no-op.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        info!("[LocationHub] Started");
        self.status.publish(LocationStatus::Running);
    }

    /// Stop delivering fixes. The last fix stays readable.
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }
        info!("[LocationHub] Stopped");
        self.status.publish(LocationStatus::Stopped);
    }

    pub fn is_running(&self) -> bool {
        *self.status.current() != LocationStatus::Stopped
    }

    pub fn status(&self) -> LocationStatus {
        self.status.current().clone()
    }

    /// Last fix delivered, if any.
    pub fn last_fix(&self) -> Option<Fix> {
        *self.fixes.current()
    }

    /// Deliver a fix to every subscriber.
    ///
    /// Returns `false` when the fix was dropped: the hub is stopped or the
    /// coordinates are out of range.
    pub fn publish_fix(&mut self, fix: Fix) -> bool {
        if !self.is_running() {
            debug!("[LocationHub] Dropping fix, hub is stopped");
            return false;
        }
        if !fix.point.is_valid() {
            warn!(
                "[LocationHub] Dropping invalid fix ({}, {})",
                fix.point.lat, fix.point.lng
            );
            return false;
        }

        if matches!(*self.status.current(), LocationStatus::Unavailable(_)) {
            info!("[LocationHub] Position available again");
            self.status.publish(LocationStatus::Running);
        }

        self.fixes.publish(Some(fix));
        true
    }

    /// Surface a source error. Ignored while stopped.
    pub fn report_error(&mut self, error: LocationError) {
        if !self.is_running() {
            return;
        }
        warn!("[LocationHub] {}", error);
        self.status.publish(LocationStatus::Unavailable(error));
    }

    /// Subscribe to fixes. The last fix, if any, is delivered immediately.
    pub fn subscribe_fixes<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&Fix) + Send + Sync + 'static,
    {
        self.fixes.subscribe(move |fix: &Option<Fix>| {
            if let Some(fix) = fix {
                callback(fix);
            }
        })
    }

    pub fn unsubscribe_fixes(&mut self, id: SubscriptionId) -> bool {
        self.fixes.unsubscribe(id)
    }

    /// Subscribe to status changes. The current status is delivered immediately.
    pub fn subscribe_status<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&LocationStatus) + Send + Sync + 'static,
    {
        self.status.subscribe(callback)
    }

    pub fn unsubscribe_status(&mut self, id: SubscriptionId) -> bool {
        self.status.unsubscribe(id)
    }

    /// Feed every fix into a shared consumer.
    pub fn attach<C>(&mut self, consumer: Arc<Mutex<C>>) -> SubscriptionId
    where
        C: FixConsumer + Send + 'static,
    {
        self.subscribe_fixes(move |fix| match consumer.lock() {
            Ok(mut consumer) => consumer.on_fix(fix),
            Err(poisoned) => poisoned.into_inner().on_fix(fix),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GeoPoint;
    use chrono::Utc;

    #[derive(Default)]
    struct Collect(Vec<GeoPoint>);

    impl FixConsumer for Collect {
        fn on_fix(&mut self, fix: &Fix) {
            self.0.push(fix.point);
        }
    }

    fn fix(lat: f64, lng: f64) -> Fix {
        Fix::new(lat, lng, Utc::now())
    }

    #[test]
    fn test_fixes_dropped_while_stopped() {
        let mut hub = LocationHub::new();
        assert!(!hub.publish_fix(fix(1.0, 1.0)));
        assert_eq!(hub.last_fix(), None);

        hub.start();
        assert!(hub.publish_fix(fix(1.0, 1.0)));
        assert_eq!(hub.last_fix().map(|f| f.point), Some(GeoPoint::new(1.0, 1.0)));

        hub.stop();
        assert!(!hub.publish_fix(fix(2.0, 2.0)));
        assert_eq!(hub.last_fix().map(|f| f.point), Some(GeoPoint::new(1.0, 1.0)));
    }

    #[test]
    fn test_invalid_fix_is_rejected() {
        let mut hub = LocationHub::new();
        hub.start();
        assert!(!hub.publish_fix(fix(f64::NAN, 0.0)));
        assert!(!hub.publish_fix(fix(95.0, 0.0)));
        assert_eq!(hub.last_fix(), None);
    }

    #[test]
    fn test_consumers_share_one_source() {
        let mut hub = LocationHub::new();
        let first = Arc::new(Mutex::new(Collect::default()));
        let second = Arc::new(Mutex::new(Collect::default()));

        hub.attach(Arc::clone(&first));
        hub.attach(Arc::clone(&second));
        hub.start();
        hub.publish_fix(fix(1.0, 1.0));
        hub.publish_fix(fix(1.0, 1.1));

        assert_eq!(first.lock().unwrap().0.len(), 2);
        assert_eq!(second.lock().unwrap().0, first.lock().unwrap().0);
    }

    #[test]
    fn test_late_subscriber_gets_last_fix() {
        let mut hub = LocationHub::new();
        hub.start();
        hub.publish_fix(fix(3.0, 4.0));

        let late = Arc::new(Mutex::new(Collect::default()));
        let id = hub.attach(Arc::clone(&late));
        assert_eq!(late.lock().unwrap().0, vec![GeoPoint::new(3.0, 4.0)]);

        assert!(hub.unsubscribe_fixes(id));
        hub.publish_fix(fix(5.0, 6.0));
        assert_eq!(late.lock().unwrap().0.len(), 1);
    }

    #[test]
    fn test_error_status_clears_on_next_fix() {
        let mut hub = LocationHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        hub.subscribe_status(move |s| sink.lock().unwrap().push(s.clone()));

        hub.report_error(LocationError::Timeout);
        hub.start();
        hub.report_error(LocationError::PermissionDenied);
        assert_eq!(hub.status().message(), "Location permission denied");
        assert!(hub.is_running());

        hub.publish_fix(fix(1.0, 1.0));
        assert_eq!(hub.status(), LocationStatus::Running);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                LocationStatus::Stopped,
                LocationStatus::Running,
                LocationStatus::Unavailable(LocationError::PermissionDenied),
                LocationStatus::Running,
            ]
        );
    }
}
