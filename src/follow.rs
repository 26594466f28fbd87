//! # Track Following
//!
//! Matches a live stream of fixes against a reference path.
//!
//! ## Algorithm
//! 1. Nearest sample: scan ±`window_radius` indices around the previous nearest
//!    index; fall back to a full scan for short paths or when the window's best
//!    candidate is farther than `stale_window_meters` (the observer jumped).
//! 2. Cross-track distance: minimum point-to-segment distance over the
//!    ±`cross_track_segments` segments around the nearest sample.
//! 3. Off-track hysteresis: `threshold = max(35, accuracy * 1.5)`. Readings above
//!    the threshold build an off streak, readings below `threshold - 10` build an
//!    on streak. The flag rises after 3 off readings and clears after 2 on readings.
//! 4. Direction: rolling window of the last 8 nearest indices; net backward
//!    progress of more than 15 indices flags a wrong direction.
//! 5. Heading: bearing from the previous fix, only updated on displacements of
//!    at least 3 m.
//!
//! The two-tier nearest search keeps the per-fix cost bounded by the window
//! size on long paths while still recovering from jumps.

use std::sync::Arc;

use log::{debug, info};

use crate::geo_utils::{haversine_distance, heading_update, point_to_segment_distance};
use crate::location::FixConsumer;
use crate::publish::{Publisher, SubscriptionId};
use crate::{Fix, GeoPoint};

/// Shape of the reference route, used to interpret index progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RouteKind {
    /// Start and finish differ; index order is the travel direction.
    #[default]
    PointToPoint,
    /// Start and finish coincide; progress may wrap from the last index to the first.
    Circular,
    /// The return leg retraces the outbound leg; direction is not checked.
    OutAndBack,
}

/// Configuration for track following.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FollowConfig {
    /// Half-width of the nearest-sample search window around the previous match.
    /// Default: 80
    pub window_radius: usize,

    /// Paths with at most this many points are always scanned in full.
    /// Default: 200
    pub full_scan_max_points: usize,

    /// Windowed matches farther than this trigger a full scan.
    /// Default: 150.0 meters
    pub stale_window_meters: f64,

    /// Segments on each side of the nearest sample checked for cross-track distance.
    /// Default: 15
    pub cross_track_segments: usize,

    /// Minimum off-track threshold.
    /// Default: 35.0 meters
    pub base_threshold_meters: f64,

    /// Threshold scale applied to the reported accuracy.
    /// Default: 1.5
    pub accuracy_factor: f64,

    /// Accuracy assumed when the source never reported one.
    /// Default: 60.0 meters
    pub assumed_accuracy_meters: f64,

    /// Readings must drop this far below the threshold to count as on-track.
    /// Default: 10.0 meters
    pub clear_margin_meters: f64,

    /// Consecutive off readings needed to raise the off-track flag.
    /// Default: 3
    pub confirm_off_readings: u32,

    /// Consecutive on readings needed to clear the off-track flag.
    /// Default: 2
    pub confirm_on_readings: u32,

    /// Number of nearest indices kept for the direction check.
    /// Default: 8
    pub direction_window: usize,

    /// Samples required before the direction check can flag.
    /// Default: 6
    pub direction_min_samples: usize,

    /// Net backward progress (in indices) tolerated before flagging.
    /// Default: 15
    pub backward_index_tolerance: usize,

    /// Minimum displacement between fixes for the heading to be recomputed.
    /// Default: 3.0 meters
    pub heading_min_displacement_meters: f64,

    /// How index progress along the route is interpreted.
    /// Default: PointToPoint
    pub route_kind: RouteKind,
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            window_radius: 80,
            full_scan_max_points: 200,
            stale_window_meters: 150.0,
            cross_track_segments: 15,
            base_threshold_meters: 35.0,
            accuracy_factor: 1.5,
            assumed_accuracy_meters: 60.0,
            clear_margin_meters: 10.0,
            confirm_off_readings: 3,
            confirm_on_readings: 2,
            direction_window: 8,
            direction_min_samples: 6,
            backward_index_tolerance: 15,
            heading_min_displacement_meters: 3.0,
            route_kind: RouteKind::PointToPoint,
        }
    }
}

impl FollowConfig {
    /// Off-track threshold for a given accuracy.
    pub fn off_track_threshold(&self, accuracy_meters: Option<f64>) -> f64 {
        let accuracy = accuracy_meters.unwrap_or(self.assumed_accuracy_meters);
        self.base_threshold_meters.max(accuracy * self.accuracy_factor)
    }
}

/// Snapshot of a following session, replaced wholesale on every fix.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackingState {
    /// Number of points in the reference path
    pub path_len: usize,
    pub nearest_index: usize,
    pub off_track: bool,
    /// Cross-track distance of the latest fix
    pub off_track_meters: f64,
    pub off_track_streak: u32,
    pub on_track_streak: u32,
    pub wrong_direction: bool,
    /// Most recent nearest indices, oldest first
    pub direction_window: Vec<usize>,
    pub last_fix: Option<GeoPoint>,
    /// Last reported accuracy, carried across fixes that lack one
    pub accuracy_meters: Option<f64>,
    pub heading_deg: Option<f64>,
}

/// Live matcher of a position stream against a reference path.
///
/// # Example
/// ```
/// use chrono::Utc;
/// use trail_tracker::{Fix, FollowConfig, GeoPoint, PathMatcher};
///
/// let path: Vec<GeoPoint> = (0..3).map(|i| GeoPoint::new(0.0, i as f64 * 0.001)).collect();
/// let mut matcher = PathMatcher::new(FollowConfig::default());
/// matcher.init_target(path);
///
/// // ~50m north of the first segment, reported accuracy 20m
/// let off = Fix::new(50.0 / 111_195.0, 0.0005, Utc::now()).with_accuracy(20.0);
/// for _ in 0..3 {
///     matcher.update_my_position(&off);
/// }
/// assert!(matcher.snapshot().off_track);
/// ```
#[derive(Debug)]
pub struct PathMatcher {
    config: FollowConfig,
    target: Arc<[GeoPoint]>,
    state: Publisher<TrackingState>,
}

impl PathMatcher {
    pub fn new(config: FollowConfig) -> Self {
        Self {
            config,
            target: Arc::from(Vec::new()),
            state: Publisher::new(TrackingState::default()),
        }
    }

    pub fn config(&self) -> &FollowConfig {
        &self.config
    }

    /// The reference path currently being followed.
    pub fn target_path(&self) -> &[GeoPoint] {
        &self.target
    }

    /// Load a new reference path and clear every tracking flag.
    ///
    /// The last known position, accuracy and heading survive the reset.
    pub fn init_target(&mut self, path: Vec<GeoPoint>) {
        info!("[PathMatcher] New target path with {} points", path.len());
        self.target = Arc::from(path);

        let prev = self.state.snapshot();
        self.state.publish(TrackingState {
            path_len: self.target.len(),
            last_fix: prev.last_fix,
            accuracy_meters: prev.accuracy_meters,
            heading_deg: prev.heading_deg,
            ..TrackingState::default()
        });
    }

    /// Recompute and publish the tracking state for a new fix.
    pub fn update_my_position(&mut self, fix: &Fix) {
        let prev = self.state.snapshot();
        let path = &self.target[..];
        let position = fix.point;
        let accuracy = fix.accuracy_meters.or(prev.accuracy_meters);

        let nearest = nearest_index_windowed(path, &position, prev.nearest_index, &self.config);
        let off_distance =
            cross_track_distance(path, &position, nearest, self.config.cross_track_segments);

        // Hysteresis
        let threshold = self.config.off_track_threshold(accuracy);
        let clear_below = (threshold - self.config.clear_margin_meters).max(0.0);

        let mut off_track_streak = prev.off_track_streak;
        let mut on_track_streak = prev.on_track_streak;
        if off_distance > threshold {
            off_track_streak += 1;
            on_track_streak = 0;
        } else if off_distance < clear_below {
            on_track_streak += 1;
            off_track_streak = 0;
        }

        let mut off_track = prev.off_track;
        if !off_track && off_track_streak >= self.config.confirm_off_readings {
            off_track = true;
            info!(
                "[PathMatcher] Off track: {:.0}m from path (threshold {:.0}m)",
                off_distance, threshold
            );
        }
        if off_track && on_track_streak >= self.config.confirm_on_readings {
            off_track = false;
            info!("[PathMatcher] Back on track at index {}", nearest);
        }

        // Direction
        let mut direction_window = prev.direction_window.clone();
        direction_window.push(nearest);
        if direction_window.len() > self.config.direction_window {
            let excess = direction_window.len() - self.config.direction_window;
            direction_window.drain(..excess);
        }
        let wrong_direction = is_wrong_direction(&direction_window, path.len(), &self.config);
        if wrong_direction != prev.wrong_direction {
            info!("[PathMatcher] Wrong direction: {}", wrong_direction);
        }

        let heading_deg = match prev.last_fix {
            Some(last) => heading_update(
                prev.heading_deg,
                &last,
                &position,
                self.config.heading_min_displacement_meters,
            ),
            None => prev.heading_deg,
        };

        debug!(
            "[PathMatcher] fix ({:.6}, {:.6}) -> index {} off {:.1}m streaks {}/{}",
            position.lat, position.lng, nearest, off_distance, off_track_streak, on_track_streak
        );

        self.state.publish(TrackingState {
            path_len: path.len(),
            nearest_index: nearest,
            off_track,
            off_track_meters: off_distance,
            off_track_streak,
            on_track_streak,
            wrong_direction,
            direction_window,
            last_fix: Some(position),
            accuracy_meters: accuracy,
            heading_deg,
        });
    }

    /// Current tracking state.
    pub fn snapshot(&self) -> Arc<TrackingState> {
        self.state.snapshot()
    }

    /// Subscribe to tracking state updates.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&TrackingState) + Send + Sync + 'static,
    {
        self.state.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.state.unsubscribe(id)
    }
}

impl Default for PathMatcher {
    fn default() -> Self {
        Self::new(FollowConfig::default())
    }
}

impl FixConsumer for PathMatcher {
    fn on_fix(&mut self, fix: &Fix) {
        self.update_my_position(fix);
    }
}

// =============================================================================
// Matching Steps
// =============================================================================

/// Nearest path index to `position`, searching around `previous` first.
///
/// Ties resolve to the lower index. An empty path yields 0.
pub fn nearest_index_windowed(
    path: &[GeoPoint],
    position: &GeoPoint,
    previous: usize,
    config: &FollowConfig,
) -> usize {
    if path.is_empty() {
        return 0;
    }

    let last = path.len() - 1;
    let center = previous.min(last);
    let from = center.saturating_sub(config.window_radius);
    let to = (center + config.window_radius).min(last);

    let (best_index, best_distance) = scan_nearest(path, position, from, to);

    if path.len() <= config.full_scan_max_points || best_distance > config.stale_window_meters {
        if path.len() > config.full_scan_max_points {
            debug!(
                "[PathMatcher] Window best {:.0}m is stale, full scan of {} points",
                best_distance,
                path.len()
            );
        }
        return scan_nearest(path, position, 0, last).0;
    }

    best_index
}

fn scan_nearest(path: &[GeoPoint], position: &GeoPoint, from: usize, to: usize) -> (usize, f64) {
    let mut best_index = from;
    let mut best_distance = f64::INFINITY;

    for (i, p) in path.iter().enumerate().take(to + 1).skip(from) {
        let d = haversine_distance(position, p);
        if d < best_distance {
            best_distance = d;
            best_index = i;
        }
    }

    (best_index, best_distance)
}

/// Minimum distance from `position` to the path segments around `nearest`.
///
/// Paths with fewer than two points yield 0.0.
pub fn cross_track_distance(
    path: &[GeoPoint],
    position: &GeoPoint,
    nearest: usize,
    segments: usize,
) -> f64 {
    if path.len() < 2 {
        return 0.0;
    }

    let last_segment = path.len() - 2;
    let from = nearest.saturating_sub(segments).min(last_segment);
    let to = (nearest + segments).min(last_segment);

    let best = (from..=to)
        .map(|i| point_to_segment_distance(position, &path[i], &path[i + 1]))
        .fold(f64::INFINITY, f64::min);

    if best.is_finite() {
        best
    } else {
        0.0
    }
}

/// Whether the index history shows net backward progress.
pub fn is_wrong_direction(window: &[usize], path_len: usize, config: &FollowConfig) -> bool {
    if window.len() < config.direction_min_samples.max(2) {
        return false;
    }

    let (first, last) = match (window.first(), window.last()) {
        (Some(first), Some(last)) => (*first as i64, *last as i64),
        _ => return false,
    };
    let mut delta = last - first;

    match config.route_kind {
        RouteKind::OutAndBack => return false,
        RouteKind::Circular if path_len > 0 => {
            let n = path_len as i64;
            if delta > n / 2 {
                delta -= n;
            } else if delta < -(n / 2) {
                delta += n;
            }
        }
        _ => {}
    }

    delta < -(config.backward_index_tolerance as i64)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    const METERS_PER_DEGREE: f64 = 111_195.0;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn scenario_path() -> Vec<GeoPoint> {
        vec![
            GeoPoint::new(0.0, 0.000),
            GeoPoint::new(0.0, 0.001),
            GeoPoint::new(0.0, 0.002),
        ]
    }

    /// Straight path along the equator, ~11m between samples.
    fn line_path(n: usize) -> Vec<GeoPoint> {
        (0..n).map(|i| GeoPoint::new(0.0, i as f64 * 0.0001)).collect()
    }

    /// Closed loop of radius ~556m.
    fn loop_path(n: usize) -> Vec<GeoPoint> {
        (0..n)
            .map(|i| {
                let theta = i as f64 / n as f64 * std::f64::consts::TAU;
                GeoPoint::new(0.005 * theta.sin(), 0.005 * theta.cos())
            })
            .collect()
    }

    fn fix(p: GeoPoint, accuracy: f64) -> Fix {
        Fix::at(p, Utc::now()).with_accuracy(accuracy)
    }

    fn matcher_on(path: Vec<GeoPoint>, config: FollowConfig) -> PathMatcher {
        let mut matcher = PathMatcher::new(config);
        matcher.init_target(path);
        matcher
    }

    fn off_fix() -> Fix {
        fix(GeoPoint::new(50.0 / METERS_PER_DEGREE, 0.0005), 20.0)
    }

    #[test]
    fn test_fix_on_path_sample() {
        let mut matcher = matcher_on(scenario_path(), FollowConfig::default());
        matcher.update_my_position(&fix(GeoPoint::new(0.0, 0.001), 20.0));

        let state = matcher.snapshot();
        assert_eq!(state.nearest_index, 1);
        assert!(approx_eq(state.off_track_meters, 0.0, 1e-6));
        assert!(!state.off_track);
        assert_eq!(state.path_len, 3);
    }

    #[test]
    fn test_off_track_after_three_readings() {
        let mut matcher = matcher_on(scenario_path(), FollowConfig::default());

        matcher.update_my_position(&off_fix());
        matcher.update_my_position(&off_fix());
        assert!(!matcher.snapshot().off_track);

        matcher.update_my_position(&off_fix());
        let state = matcher.snapshot();
        assert!(state.off_track);
        assert!(approx_eq(state.off_track_meters, 50.0, 1.0));
        assert_eq!(state.off_track_streak, 3);
    }

    #[test]
    fn test_two_bad_then_good_stays_on_track() {
        let mut matcher = matcher_on(scenario_path(), FollowConfig::default());
        let good = fix(GeoPoint::new(0.0, 0.0005), 20.0);

        matcher.update_my_position(&off_fix());
        matcher.update_my_position(&off_fix());
        matcher.update_my_position(&good);

        let state = matcher.snapshot();
        assert!(!state.off_track);
        assert_eq!(state.off_track_streak, 0);
        assert_eq!(state.on_track_streak, 1);
    }

    #[test]
    fn test_off_track_clears_after_two_good_readings() {
        let mut matcher = matcher_on(scenario_path(), FollowConfig::default());
        let good = fix(GeoPoint::new(0.0, 0.0005), 20.0);

        for _ in 0..3 {
            matcher.update_my_position(&off_fix());
        }
        matcher.update_my_position(&good);
        assert!(matcher.snapshot().off_track);

        matcher.update_my_position(&good);
        assert!(!matcher.snapshot().off_track);
    }

    #[test]
    fn test_dead_band_keeps_streaks() {
        // threshold 35, clear below 25: a 30m reading counts for neither side
        let mut matcher = matcher_on(scenario_path(), FollowConfig::default());
        let dead_band = fix(GeoPoint::new(30.0 / METERS_PER_DEGREE, 0.0005), 20.0);

        matcher.update_my_position(&off_fix());
        matcher.update_my_position(&off_fix());
        matcher.update_my_position(&dead_band);
        let state = matcher.snapshot();
        assert_eq!(state.off_track_streak, 2);
        assert_eq!(state.on_track_streak, 0);

        matcher.update_my_position(&off_fix());
        assert!(matcher.snapshot().off_track);
    }

    #[test]
    fn test_unknown_accuracy_uses_assumed_value() {
        // threshold max(35, 60 * 1.5) = 90: 50m off never alerts
        let mut matcher = matcher_on(scenario_path(), FollowConfig::default());
        let unknown = Fix::at(GeoPoint::new(50.0 / METERS_PER_DEGREE, 0.0005), Utc::now());

        for _ in 0..5 {
            matcher.update_my_position(&unknown);
        }
        let state = matcher.snapshot();
        assert!(!state.off_track);
        assert_eq!(state.accuracy_meters, None);
    }

    #[test]
    fn test_accuracy_is_carried_over() {
        let mut matcher = matcher_on(scenario_path(), FollowConfig::default());
        let unknown = Fix::at(GeoPoint::new(50.0 / METERS_PER_DEGREE, 0.0005), Utc::now());

        matcher.update_my_position(&off_fix());
        matcher.update_my_position(&unknown);
        matcher.update_my_position(&unknown);

        let state = matcher.snapshot();
        assert_eq!(state.accuracy_meters, Some(20.0));
        assert!(state.off_track);
    }

    #[test]
    fn test_every_path_point_matches_its_own_index() {
        let path = line_path(200);
        for (i, p) in path.iter().enumerate() {
            let mut matcher = matcher_on(path.clone(), FollowConfig::default());
            matcher.update_my_position(&fix(*p, 5.0));

            let state = matcher.snapshot();
            assert_eq!(state.nearest_index, i);
            assert!(approx_eq(state.off_track_meters, 0.0, 0.01));
        }
    }

    #[test]
    fn test_windowed_search_follows_a_walk() {
        let path = line_path(1000);
        let mut matcher = matcher_on(path.clone(), FollowConfig::default());

        for i in (0..1000).step_by(7) {
            matcher.update_my_position(&fix(path[i], 5.0));
            assert_eq!(matcher.snapshot().nearest_index, i);
        }
        assert!(!matcher.snapshot().wrong_direction);
    }

    #[test]
    fn test_long_path_window_prefers_nearby_candidate() {
        // 5 samples past the window edge is only ~55m away: the window result stands
        let path = line_path(1000);
        let config = FollowConfig::default();
        assert_eq!(nearest_index_windowed(&path, &path[85], 0, &config), 80);
        assert_eq!(nearest_index_windowed(&path, &path[85], 40, &config), 85);
    }

    #[test]
    fn test_jump_recovers_through_full_scan() {
        let path = line_path(1000);
        let mut matcher = matcher_on(path.clone(), FollowConfig::default());

        matcher.update_my_position(&fix(path[10], 5.0));
        matcher.update_my_position(&fix(path[900], 5.0));
        assert_eq!(matcher.snapshot().nearest_index, 900);
    }

    #[test]
    fn test_nearest_tie_prefers_lower_index() {
        let path = scenario_path();
        let p = GeoPoint::new(50.0 / METERS_PER_DEGREE, 0.0005);
        assert_eq!(nearest_index_windowed(&path, &p, 0, &FollowConfig::default()), 0);
        assert_eq!(nearest_index_windowed(&path, &p, 2, &FollowConfig::default()), 0);
    }

    #[test]
    fn test_wrong_direction_on_backward_walk() {
        let path = line_path(100);
        let mut matcher = matcher_on(path.clone(), FollowConfig::default());

        for (n, i) in [90, 85, 80, 75, 70].iter().enumerate() {
            matcher.update_my_position(&fix(path[*i], 5.0));
            assert!(!matcher.snapshot().wrong_direction, "flagged after {} samples", n + 1);
        }
        matcher.update_my_position(&fix(path[65], 5.0));
        assert!(matcher.snapshot().wrong_direction);

        // Forward again until the window only shows progress
        for i in [70, 75, 80, 85, 90, 95, 99, 99] {
            matcher.update_my_position(&fix(path[i], 5.0));
        }
        assert!(!matcher.snapshot().wrong_direction);
    }

    #[test]
    fn test_direction_window_is_bounded() {
        let path = line_path(100);
        let mut matcher = matcher_on(path.clone(), FollowConfig::default());
        for i in 0..20 {
            matcher.update_my_position(&fix(path[i * 2], 5.0));
        }
        let state = matcher.snapshot();
        assert_eq!(state.direction_window.len(), 8);
        assert_eq!(state.direction_window.last(), Some(&38));
    }

    #[test]
    fn test_circular_route_seam_is_not_backward() {
        let path = loop_path(100);
        let seam = [96, 97, 98, 99, 0, 1];

        let mut linear = matcher_on(path.clone(), FollowConfig::default());
        let mut circular = matcher_on(
            path.clone(),
            FollowConfig {
                route_kind: RouteKind::Circular,
                ..FollowConfig::default()
            },
        );

        for i in seam {
            linear.update_my_position(&fix(path[i], 5.0));
            circular.update_my_position(&fix(path[i], 5.0));
        }

        assert!(linear.snapshot().wrong_direction);
        assert!(!circular.snapshot().wrong_direction);
    }

    #[test]
    fn test_circular_route_still_detects_backward() {
        let config = FollowConfig {
            route_kind: RouteKind::Circular,
            ..FollowConfig::default()
        };
        assert!(is_wrong_direction(&[40, 36, 32, 28, 24, 20], 100, &config));
        assert!(is_wrong_direction(&[3, 1, 99, 95, 90, 80], 100, &config));
        assert!(!is_wrong_direction(&[90, 94, 98, 2, 6, 10], 100, &config));
    }

    #[test]
    fn test_out_and_back_never_flags_direction() {
        let config = FollowConfig {
            route_kind: RouteKind::OutAndBack,
            ..FollowConfig::default()
        };
        assert!(!is_wrong_direction(&[90, 80, 70, 60, 50, 40, 30, 20], 100, &config));
    }

    #[test]
    fn test_heading_follows_movement() {
        let mut matcher = matcher_on(line_path(50), FollowConfig::default());

        matcher.update_my_position(&fix(GeoPoint::new(0.0, 0.0), 5.0));
        assert_eq!(matcher.snapshot().heading_deg, None);

        matcher.update_my_position(&fix(GeoPoint::new(0.0, 0.0001), 5.0));
        let heading = matcher.snapshot().heading_deg.unwrap();
        assert!(approx_eq(heading, 90.0, 1e-6));

        // ~1m of northward jitter keeps the eastward heading
        matcher.update_my_position(&fix(GeoPoint::new(0.00001, 0.0001), 5.0));
        assert!(approx_eq(matcher.snapshot().heading_deg.unwrap(), 90.0, 1e-6));
    }

    #[test]
    fn test_empty_and_single_point_paths_are_neutral() {
        for path in [vec![], vec![GeoPoint::new(1.0, 1.0)]] {
            let mut matcher = matcher_on(path, FollowConfig::default());
            for _ in 0..5 {
                matcher.update_my_position(&fix(GeoPoint::new(2.0, 2.0), 5.0));
            }
            let state = matcher.snapshot();
            assert_eq!(state.nearest_index, 0);
            assert_eq!(state.off_track_meters, 0.0);
            assert!(!state.off_track);
            assert!(!state.wrong_direction);
        }
    }

    #[test]
    fn test_init_target_clears_flags() {
        let mut matcher = matcher_on(scenario_path(), FollowConfig::default());
        for _ in 0..3 {
            matcher.update_my_position(&off_fix());
        }
        assert!(matcher.snapshot().off_track);

        matcher.init_target(line_path(10));
        let state = matcher.snapshot();
        assert!(!state.off_track);
        assert_eq!(state.off_track_streak, 0);
        assert_eq!(state.nearest_index, 0);
        assert!(state.direction_window.is_empty());
        assert_eq!(state.path_len, 10);
        assert!(state.last_fix.is_some());
    }

    #[test]
    fn test_subscribers_receive_every_update() {
        let mut matcher = matcher_on(scenario_path(), FollowConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        matcher.subscribe(move |s: &TrackingState| sink.lock().unwrap().push(s.off_track));

        for _ in 0..3 {
            matcher.update_my_position(&off_fix());
        }

        assert_eq!(*seen.lock().unwrap(), vec![false, false, false, true]);
    }

    #[test]
    fn test_threshold_scales_with_accuracy() {
        let config = FollowConfig::default();
        assert_eq!(config.off_track_threshold(Some(10.0)), 35.0);
        assert_eq!(config.off_track_threshold(Some(40.0)), 60.0);
        assert_eq!(config.off_track_threshold(None), 90.0);
    }
}
