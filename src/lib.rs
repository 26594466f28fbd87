//! # Trail Tracker
//!
//! Live geospatial tracking and route correlation for hiking tracks.
//!
//! This library provides:
//! - Live track following: nearest path sample, cross-track distance, off-track
//!   alerts with hysteresis and wrong-direction detection ([`PathMatcher`])
//! - Live track recording: filtered path, distance/ascent/descent statistics and
//!   batched elevation enrichment ([`Recorder`], [`ElevationBatcher`])
//! - Index correlation between a route's coordinate path, its distance-indexed
//!   elevation profile and its points of interest ([`correlate`])
//!
//! ## Features
//!
//! - **`serde`** - Serialize/Deserialize derives on data types and configs
//! - **`parallel`** - Parallel point-of-interest anchoring with rayon
//! - **`http`** - Elevation enrichment HTTP client and async worker
//! - **`gpx`** - GPX 1.1 export of recorded sessions
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::Utc;
//! use trail_tracker::{Fix, FollowConfig, GeoPoint, PathMatcher};
//!
//! let path = vec![
//!     GeoPoint::new(0.0, 0.000),
//!     GeoPoint::new(0.0, 0.001),
//!     GeoPoint::new(0.0, 0.002),
//! ];
//!
//! let mut matcher = PathMatcher::new(FollowConfig::default());
//! matcher.init_target(path);
//! matcher.update_my_position(&Fix::new(0.0, 0.001, Utc::now()).with_accuracy(20.0));
//!
//! let state = matcher.snapshot();
//! assert_eq!(state.nearest_index, 1);
//! assert!(!state.off_track);
//! ```

use chrono::{DateTime, Utc};

// Geometric primitives
pub mod geo_utils;

// Snapshot publishing (observer)
pub mod publish;
pub use publish::{Publisher, SubscriptionId};

// Process-wide location broadcaster
pub mod location;
pub use location::{FixConsumer, LocationError, LocationHub, LocationStatus};

// Live track following
pub mod follow;
pub use follow::{FollowConfig, PathMatcher, RouteKind, TrackingState};

// Live track recording
pub mod recorder;
pub use recorder::{FixOutcome, Recorder, RecorderConfig, RecordingSession};

// Elevation batching state machine
pub mod batcher;
pub use batcher::{BatchCompletion, BatchConfig, BatchRequest, ElevationBatcher};

// Path / profile / POI correlation
pub mod correlate;
pub use correlate::{
    PoiAnchor, PoiKind, PointOfInterest, ProfileConfig, RouteCorrelation, SlopeClass,
};

// Unified error handling
pub mod error;
pub use error::{ElevationError, Result};

// HTTP client for elevation enrichment
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::{ElevationClient, ElevationClientConfig, ElevationProvider};

// Async enrichment worker
#[cfg(feature = "http")]
pub mod enrichment;
#[cfg(feature = "http")]
pub use enrichment::{EnrichmentEvent, EnrichmentHandle, EnrichmentWorker};

// GPX export
#[cfg(feature = "gpx")]
pub mod gpx_export;
#[cfg(feature = "gpx")]
pub use gpx_export::{to_gpx, GpxExportError};

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate in degrees.
///
/// # Example
/// ```
/// use trail_tracker::GeoPoint;
/// let point = GeoPoint::new(40.4168, -3.7038); // Madrid
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Create a new point.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Check if the point has finite, in-range coordinates.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && self.lat >= -90.0
            && self.lat <= 90.0
            && self.lng >= -180.0
            && self.lng <= 180.0
    }
}

/// A single timestamped position reading from a location source.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fix {
    pub point: GeoPoint,
    /// Horizontal accuracy radius in meters, if the source reports one
    pub accuracy_meters: Option<f64>,
    /// Altitude in meters, if the source reports a usable one
    pub altitude_meters: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Fix {
    /// Create a fix without accuracy or altitude.
    pub fn new(lat: f64, lng: f64, timestamp: DateTime<Utc>) -> Self {
        Self::at(GeoPoint::new(lat, lng), timestamp)
    }

    /// Create a fix at an existing point.
    pub fn at(point: GeoPoint, timestamp: DateTime<Utc>) -> Self {
        Self {
            point,
            accuracy_meters: None,
            altitude_meters: None,
            timestamp,
        }
    }

    pub fn with_accuracy(mut self, accuracy_meters: f64) -> Self {
        self.accuracy_meters = Some(accuracy_meters);
        self
    }

    pub fn with_altitude(mut self, altitude_meters: f64) -> Self {
        self.altitude_meters = Some(altitude_meters);
        self
    }
}

/// A point of a recorded path.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecordedPoint {
    pub point: GeoPoint,
    /// `None` until elevation enrichment resolves it
    pub elevation_meters: Option<f64>,
    /// Set when enrichment gave up on this point; it will stay without elevation
    pub elevation_unresolved: bool,
    pub timestamp: DateTime<Utc>,
}

impl RecordedPoint {
    pub fn new(point: GeoPoint, elevation_meters: Option<f64>, timestamp: DateTime<Utc>) -> Self {
        Self {
            point,
            elevation_meters,
            elevation_unresolved: false,
            timestamp,
        }
    }

    /// True while the point still waits for an elevation.
    pub fn awaits_elevation(&self) -> bool {
        self.elevation_meters.is_none() && !self.elevation_unresolved
    }
}

/// A named mark dropped while recording.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Waypoint {
    pub point: GeoPoint,
    pub elevation_meters: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub name: Option<String>,
    pub description: Option<String>,
}

/// One sample of a distance-indexed elevation profile.
///
/// Profiles are ordered by non-decreasing `cumulative_distance_meters` and are
/// sampled independently of the route's coordinate path.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProfileSample {
    pub cumulative_distance_meters: f64,
    pub elevation_meters: f64,
}

impl ProfileSample {
    pub fn new(cumulative_distance_meters: f64, elevation_meters: f64) -> Self {
        Self {
            cumulative_distance_meters,
            elevation_meters,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
