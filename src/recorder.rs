//! # Track Recording
//!
//! Builds a recorded path from a stream of fixes.
//!
//! - Fixes closer than 2 m to the previous path point only move the current
//!   position (anti-jitter filter).
//! - Distance is the running haversine sum over accepted points; speed is
//!   `displacement / max(0.5 s, Δt)`.
//! - Points usually arrive without a usable altitude. Their elevation is filled
//!   later by index through [`Recorder::apply_elevation_batch_for`], which also
//!   rescans ascent and descent over consecutive known elevations.
//!
//! Every session carries a `generation` bumped by `start` and `reset`, so a batch
//! issued for an earlier session can be recognised and discarded.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::geo_utils::haversine_distance;
use crate::location::FixConsumer;
use crate::publish::{Publisher, SubscriptionId};
use crate::{Fix, GeoPoint, RecordedPoint, Waypoint};

/// Configuration for track recording.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecorderConfig {
    /// Fixes closer than this to the previous path point are not recorded.
    /// Default: 2.0 meters
    pub min_point_spacing_meters: f64,

    /// Lower bound on the time delta used for speed.
    /// Default: 0.5 seconds
    pub min_speed_interval_secs: f64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            min_point_spacing_meters: 2.0,
            min_speed_interval_secs: 0.5,
        }
    }
}

/// Snapshot of a recording, replaced wholesale on every change.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecordingSession {
    pub is_recording: bool,
    pub started_at: Option<DateTime<Utc>>,
    /// Append-only while recording
    pub path: Vec<RecordedPoint>,
    pub waypoints: Vec<Waypoint>,
    pub distance_meters: f64,
    pub ascent_meters: f64,
    pub descent_meters: f64,
    /// First path index still waiting for an elevation
    pub pending_elevation_start_index: Option<usize>,
    /// Last known position, updated even while not recording
    pub current_position: Option<GeoPoint>,
    pub current_accuracy: Option<f64>,
    pub last_fix_time: Option<DateTime<Utc>>,
    pub last_speed_mps: Option<f64>,
    /// Bumped by every start and reset
    pub generation: u64,
}

/// What [`Recorder::update_my_location`] did with a fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixOutcome {
    /// Not recording; only the current position moved.
    PositionOnly,
    /// Recording, but too close to the previous point.
    Filtered,
    /// Appended to the path at `index`.
    Accepted { index: usize, needs_elevation: bool },
}

/// Live track recorder.
///
/// # Example
/// ```
/// use chrono::{Duration, Utc};
/// use trail_tracker::{Fix, FixOutcome, Recorder, RecorderConfig};
///
/// let mut recorder = Recorder::new(RecorderConfig::default());
/// recorder.start();
///
/// let t0 = Utc::now();
/// let step = 10.0 / 111_195.0; // ~10m of latitude
/// recorder.update_my_location(&Fix::new(0.0, 0.0, t0));
/// let outcome = recorder.update_my_location(&Fix::new(step, 0.0, t0 + Duration::seconds(5)));
///
/// assert_eq!(outcome, FixOutcome::Accepted { index: 1, needs_elevation: true });
/// assert!((recorder.snapshot().distance_meters - 10.0).abs() < 0.1);
/// ```
#[derive(Debug)]
pub struct Recorder {
    config: RecorderConfig,
    state: Publisher<RecordingSession>,
}

impl Recorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            state: Publisher::new(RecordingSession::default()),
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Current session snapshot.
    pub fn snapshot(&self) -> Arc<RecordingSession> {
        self.state.snapshot()
    }

    pub fn is_recording(&self) -> bool {
        self.state.current().is_recording
    }

    pub fn generation(&self) -> u64 {
        self.state.current().generation
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&RecordingSession) + Send + Sync + 'static,
    {
        self.state.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.state.unsubscribe(id)
    }

    /// Begin a new session, discarding any previous path and waypoints.
    pub fn start(&mut self) {
        let prev = self.state.snapshot();
        let generation = prev.generation + 1;
        info!("[Recorder] Recording started (generation {})", generation);

        self.state.publish(RecordingSession {
            is_recording: true,
            started_at: Some(Utc::now()),
            current_position: prev.current_position,
            current_accuracy: prev.current_accuracy,
            last_fix_time: prev.last_fix_time,
            generation,
            ..RecordingSession::default()
        });
    }

    /// Stop recording, keeping everything recorded so far.
    pub fn stop(&mut self) {
        let prev = self.state.snapshot();
        info!(
            "[Recorder] Recording stopped: {} points, {:.0}m",
            prev.path.len(),
            prev.distance_meters
        );
        self.state.publish(RecordingSession {
            is_recording: false,
            ..RecordingSession::clone(&prev)
        });
    }

    /// Wipe the session whether or not it is recording.
    pub fn reset(&mut self) {
        let prev = self.state.snapshot();
        let generation = prev.generation + 1;
        info!("[Recorder] Session reset (generation {})", generation);

        self.state.publish(RecordingSession {
            current_position: prev.current_position,
            current_accuracy: prev.current_accuracy,
            last_fix_time: prev.last_fix_time,
            generation,
            ..RecordingSession::default()
        });
    }

    /// Drop a waypoint at the last known position.
    ///
    /// Returns `false` (and does nothing) when no position is known yet.
    pub fn add_waypoint_from_current(
        &mut self,
        name: Option<&str>,
        description: Option<&str>,
    ) -> bool {
        let prev = self.state.snapshot();
        let Some(point) = prev.current_position else {
            return false;
        };

        let mut next = RecordingSession::clone(&prev);
        next.waypoints.push(Waypoint {
            point,
            elevation_meters: prev.path.last().and_then(|p| p.elevation_meters),
            timestamp: prev.last_fix_time.unwrap_or_else(Utc::now),
            name: name.map(str::to_string),
            description: description.map(str::to_string),
        });
        self.state.publish(next);
        true
    }

    /// Feed a fix.
    pub fn update_my_location(&mut self, fix: &Fix) -> FixOutcome {
        let prev = self.state.snapshot();
        let mut next = RecordingSession::clone(&prev);
        next.current_position = Some(fix.point);
        next.current_accuracy = fix.accuracy_meters.or(prev.current_accuracy);
        next.last_fix_time = Some(fix.timestamp);

        if !prev.is_recording {
            self.state.publish(next);
            return FixOutcome::PositionOnly;
        }

        let point = RecordedPoint::new(fix.point, fix.altitude_meters, fix.timestamp);

        if let Some(last) = prev.path.last() {
            let d = haversine_distance(&last.point, &fix.point);
            if d < self.config.min_point_spacing_meters {
                debug!("[Recorder] Filtered fix {:.1}m from previous point", d);
                self.state.publish(next);
                return FixOutcome::Filtered;
            }

            let dt = (fix.timestamp - last.timestamp).num_milliseconds() as f64 / 1000.0;
            next.distance_meters += d;
            next.last_speed_mps = Some(d / dt.max(self.config.min_speed_interval_secs));

            if let (Some(a), Some(b)) = (last.elevation_meters, point.elevation_meters) {
                let de = b - a;
                if de > 0.0 {
                    next.ascent_meters += de;
                } else {
                    next.descent_meters += -de;
                }
            }
        } else {
            next.last_speed_mps = None;
        }

        let index = next.path.len();
        let needs_elevation = point.awaits_elevation();
        next.path.push(point);
        if next.pending_elevation_start_index.is_none() && needs_elevation {
            next.pending_elevation_start_index = Some(index);
        }

        debug!(
            "[Recorder] Point {} at ({:.6}, {:.6}), total {:.1}m",
            index, fix.point.lat, fix.point.lng, next.distance_meters
        );
        self.state.publish(next);

        FixOutcome::Accepted {
            index,
            needs_elevation,
        }
    }

    /// Lower the pending elevation index to `index` if it is earlier.
    pub fn mark_pending_elevation_from(&mut self, index: usize) {
        let prev = self.state.snapshot();
        if prev
            .pending_elevation_start_index
            .map_or(true, |pending| index < pending)
        {
            self.state.publish(RecordingSession {
                pending_elevation_start_index: Some(index),
                ..RecordingSession::clone(&prev)
            });
        }
    }

    /// Patch elevations of `path[start_index..]` from a parallel array.
    ///
    /// Indices past the end of the path are ignored. Ascent and descent are
    /// recomputed over the whole path.
    pub fn apply_elevation_batch(&mut self, start_index: usize, elevations: &[Option<f64>]) {
        if elevations.is_empty() {
            return;
        }

        let prev = self.state.snapshot();
        let mut next = RecordingSession::clone(&prev);

        for (offset, elevation) in elevations.iter().enumerate() {
            let Some(point) = next.path.get_mut(start_index + offset) else {
                break;
            };
            point.elevation_meters = *elevation;
            if elevation.is_some() {
                point.elevation_unresolved = false;
            }
        }

        let (ascent, descent) = elevation_gain(&next.path);
        next.ascent_meters = ascent;
        next.descent_meters = descent;
        next.pending_elevation_start_index = first_awaiting(&next.path);

        debug!(
            "[Recorder] Applied {} elevations at {}, ascent {:.0}m descent {:.0}m",
            elevations.len(),
            start_index,
            ascent,
            descent
        );
        self.state.publish(next);
    }

    /// [`apply_elevation_batch`](Self::apply_elevation_batch) guarded by the
    /// session generation the batch was issued for.
    ///
    /// Returns `false` when the batch belongs to an earlier session.
    pub fn apply_elevation_batch_for(
        &mut self,
        generation: u64,
        start_index: usize,
        elevations: &[Option<f64>],
    ) -> bool {
        let current = self.generation();
        if generation != current {
            warn!(
                "[Recorder] Discarding stale elevation batch (generation {}, current {})",
                generation, current
            );
            return false;
        }
        self.apply_elevation_batch(start_index, elevations);
        true
    }

    /// Flag points whose elevation will never be resolved.
    pub fn mark_elevation_unresolved(&mut self, indices: &[usize]) {
        let prev = self.state.snapshot();
        let mut next = RecordingSession::clone(&prev);

        let mut marked = 0;
        for &i in indices {
            if let Some(point) = next.path.get_mut(i) {
                if point.elevation_meters.is_none() {
                    point.elevation_unresolved = true;
                    marked += 1;
                }
            }
        }
        if marked == 0 {
            return;
        }

        warn!("[Recorder] {} points left without elevation", marked);
        next.pending_elevation_start_index = first_awaiting(&next.path);
        self.state.publish(next);
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new(RecorderConfig::default())
    }
}

impl FixConsumer for Recorder {
    fn on_fix(&mut self, fix: &Fix) {
        self.update_my_location(fix);
    }
}

/// Total ascent and descent over consecutive points with known elevation.
pub fn elevation_gain(path: &[RecordedPoint]) -> (f64, f64) {
    path.windows(2)
        .filter_map(|w| Some(w[1].elevation_meters? - w[0].elevation_meters?))
        .fold((0.0, 0.0), |(ascent, descent), de| {
            if de > 0.0 {
                (ascent + de, descent)
            } else {
                (ascent, descent - de)
            }
        })
}

fn first_awaiting(path: &[RecordedPoint]) -> Option<usize> {
    path.iter().position(RecordedPoint::awaits_elevation)
}
