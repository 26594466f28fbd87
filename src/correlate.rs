//! # Route Correlation
//!
//! Index mappings between the three views of a route:
//! - the raw coordinate path (what the map draws)
//! - the distance-indexed elevation profile (what the chart draws), sampled
//!   independently of the path
//! - points of interest, anchored to both
//!
//! All mappings go through cumulative distance. The proportional
//! [`profile_index_to_path_index`] is kept for callers that know both series
//! are evenly sampled.

use log::debug;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::geo_utils::{
    haversine_distance, nearest_sorted_index, nearest_sorted_index_by, project_local,
};
use crate::{GeoPoint, ProfileSample};

pub use crate::geo_utils::cumulative_distances;

/// Configuration for profile processing and POI anchoring.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProfileConfig {
    /// Moving-average window for chart smoothing (made odd, at least 3).
    /// Default: 5
    pub smoothing_window: usize,

    /// Samples on each side used for the local slope.
    /// Default: 2
    pub slope_half_span: usize,

    /// Maximum number of points of interest anchored per route.
    /// Default: 250
    pub max_pois: usize,

    /// Largest profile index distance at which a hovered sample picks up a
    /// point of interest.
    /// Default: 2
    pub poi_hover_index_delta: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            smoothing_window: 5,
            slope_half_span: 2,
            max_pois: 250,
            poi_hover_index_delta: 2,
        }
    }
}

// =============================================================================
// Index Mappings
// =============================================================================

/// Path index whose cumulative distance is closest to `target_meters`.
pub fn distance_to_path_index(distances: &[f64], target_meters: f64) -> usize {
    nearest_sorted_index(distances, target_meters)
}

/// Profile index whose cumulative distance is closest to `target_meters`.
pub fn distance_to_profile_index(profile: &[ProfileSample], target_meters: f64) -> usize {
    nearest_sorted_index_by(profile, target_meters, |s| s.cumulative_distance_meters)
}

/// Proportional profile-to-path index mapping.
///
/// Only exact when both series are evenly spaced. Prefer
/// [`profile_index_to_path_index_by_distance`].
///
/// ```
/// use trail_tracker::correlate::profile_index_to_path_index;
/// assert_eq!(profile_index_to_path_index(50, 101, 201), 100);
/// assert_eq!(profile_index_to_path_index(7, 10, 10), 7);
/// ```
pub fn profile_index_to_path_index(profile_index: usize, profile_len: usize, path_len: usize) -> usize {
    if profile_len <= 1 || path_len <= 1 {
        return 0;
    }
    let idx = profile_index.min(profile_len - 1);
    let scaled = idx as f64 * (path_len - 1) as f64 / (profile_len - 1) as f64;
    (scaled.round() as usize).min(path_len - 1)
}

/// Profile-to-path index mapping through cumulative distance.
pub fn profile_index_to_path_index_by_distance(
    profile: &[ProfileSample],
    distances: &[f64],
    profile_index: usize,
) -> usize {
    match profile.get(profile_index.min(profile.len().saturating_sub(1))) {
        Some(sample) => distance_to_path_index(distances, sample.cumulative_distance_meters),
        None => 0,
    }
}

/// Path-to-profile index mapping through cumulative distance.
pub fn path_index_to_profile_index(
    distances: &[f64],
    profile: &[ProfileSample],
    path_index: usize,
) -> usize {
    match distances.get(path_index.min(distances.len().saturating_sub(1))) {
        Some(d) => distance_to_profile_index(profile, *d),
        None => 0,
    }
}

/// Nearest path index to `point` by linear scan. Ties resolve to the lower index.
pub fn nearest_path_index_by_coordinate(path: &[GeoPoint], point: &GeoPoint) -> usize {
    let mut best_index = 0;
    let mut best_distance = f64::INFINITY;
    for (i, p) in path.iter().enumerate() {
        let d = haversine_distance(p, point);
        if d < best_distance {
            best_distance = d;
            best_index = i;
        }
    }
    best_index
}

// =============================================================================
// Profile Processing
// =============================================================================

/// Centred moving average over elevations; distances are untouched.
///
/// The window is made odd and at least 3 and is truncated at both ends.
/// Profiles shorter than 3 samples are returned unchanged.
pub fn smooth_profile(profile: &[ProfileSample], window: usize) -> Vec<ProfileSample> {
    if profile.len() < 3 {
        return profile.to_vec();
    }

    let mut w = window.max(3);
    if w % 2 == 0 {
        w += 1;
    }
    let half = w / 2;

    let mut prefix = Vec::with_capacity(profile.len() + 1);
    prefix.push(0.0);
    for s in profile {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + s.elevation_meters);
    }

    let last = profile.len() - 1;
    profile
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let start = i.saturating_sub(half);
            let end = (i + half).min(last);
            let mean = (prefix[end + 1] - prefix[start]) / (end - start + 1) as f64;
            ProfileSample::new(s.cumulative_distance_meters, mean)
        })
        .collect()
}

/// Local grade in percent over `[index - half_span, index + half_span]`.
///
/// `None` when the index is out of range or the span has no horizontal run.
pub fn slope_percent_at(profile: &[ProfileSample], index: usize, half_span: usize) -> Option<f64> {
    if profile.len() < 2 || index >= profile.len() {
        return None;
    }
    let p0 = &profile[index.saturating_sub(half_span)];
    let p1 = &profile[(index + half_span).min(profile.len() - 1)];

    let run = p1.cumulative_distance_meters - p0.cumulative_distance_meters;
    if run <= 0.0 {
        return None;
    }
    Some((p1.elevation_meters - p0.elevation_meters) / run * 100.0)
}

/// Difficulty band of a grade, uphill or downhill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SlopeClass {
    Easy,
    Moderate,
    Hard,
    Extreme,
}

impl SlopeClass {
    pub fn from_percent(percent: f64) -> Self {
        let abs = percent.abs();
        if abs < 10.0 {
            SlopeClass::Easy
        } else if abs < 17.0 {
            SlopeClass::Moderate
        } else if abs < 25.0 {
            SlopeClass::Hard
        } else {
            SlopeClass::Extreme
        }
    }
}

// =============================================================================
// Points of Interest
// =============================================================================

/// Category of a point of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum PoiKind {
    DrinkingWater,
    Viewpoint,
    Shelter,
    Parking,
    CampSite,
    PicnicSite,
    Information,
}

impl PoiKind {
    pub fn label(&self) -> &'static str {
        match self {
            PoiKind::DrinkingWater => "Drinking water",
            PoiKind::Viewpoint => "Viewpoint",
            PoiKind::Shelter => "Shelter",
            PoiKind::Parking => "Parking",
            PoiKind::CampSite => "Camp site",
            PoiKind::PicnicSite => "Picnic site",
            PoiKind::Information => "Information",
        }
    }
}

/// A point of interest attached to a route.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PointOfInterest {
    pub id: String,
    pub name: Option<String>,
    pub kind: PoiKind,
    pub point: GeoPoint,
}

impl PointOfInterest {
    /// Trimmed name, or the kind's label when unnamed.
    pub fn title(&self) -> &str {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => self.kind.label(),
        }
    }
}

/// A point of interest placed on the path and on the elevation profile.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoiAnchor {
    pub poi_id: String,
    pub title: String,
    pub kind: PoiKind,
    pub path_index: usize,
    pub profile_index: usize,
    /// Distance of the anchoring profile sample
    pub distance_meters: f64,
    pub elevation_meters: f64,
}

/// Spatial index over a path for nearest-sample queries.
///
/// Points are projected onto a local plane around the path's mean latitude;
/// the closest candidates are then re-ranked by haversine distance.
pub struct PathIndex {
    tree: RTree<IndexedSample>,
    path: Vec<GeoPoint>,
    cos_lat: f64,
}

/// Candidates re-ranked by haversine after the planar query
const RERANK_CANDIDATES: usize = 4;

#[derive(Debug, Clone, Copy)]
struct IndexedSample {
    idx: usize,
    xy: [f64; 2],
}

impl RTreeObject for IndexedSample {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.xy)
    }
}

impl PointDistance for IndexedSample {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.xy[0] - point[0];
        let dy = self.xy[1] - point[1];
        dx * dx + dy * dy
    }
}

impl PathIndex {
    pub fn new(path: &[GeoPoint]) -> Self {
        let cos_lat = if path.is_empty() {
            1.0
        } else {
            let mean_lat = path.iter().map(|p| p.lat).sum::<f64>() / path.len() as f64;
            mean_lat.to_radians().cos()
        };

        let samples: Vec<IndexedSample> = path
            .iter()
            .enumerate()
            .map(|(idx, p)| IndexedSample {
                idx,
                xy: project_local(p, cos_lat),
            })
            .collect();

        Self {
            tree: RTree::bulk_load(samples),
            path: path.to_vec(),
            cos_lat,
        }
    }

    /// Nearest path index to `point`; 0 for an empty path.
    pub fn nearest(&self, point: &GeoPoint) -> usize {
        let query = project_local(point, self.cos_lat);

        self.tree
            .nearest_neighbor_iter(&query)
            .take(RERANK_CANDIDATES)
            .map(|s| (s.idx, haversine_distance(&self.path[s.idx], point)))
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
            .map_or(0, |(idx, _)| idx)
    }

    pub fn len(&self) -> usize {
        self.path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}

/// Anchor points of interest to the path and the elevation profile.
///
/// At most `config.max_pois` are anchored. Returns an empty list when the path
/// or the profile is empty, or when `distances` does not match the path.
pub fn anchor_pois(
    path: &[GeoPoint],
    distances: &[f64],
    profile: &[ProfileSample],
    pois: &[PointOfInterest],
    config: &ProfileConfig,
) -> Vec<PoiAnchor> {
    if !can_anchor(path, distances, profile) {
        return Vec::new();
    }
    let index = PathIndex::new(path);
    let limit = pois.len().min(config.max_pois);

    pois[..limit]
        .iter()
        .filter_map(|poi| anchor_one(&index, distances, profile, poi))
        .collect()
}

/// [`anchor_pois`] on the rayon thread pool.
#[cfg(feature = "parallel")]
pub fn anchor_pois_parallel(
    path: &[GeoPoint],
    distances: &[f64],
    profile: &[ProfileSample],
    pois: &[PointOfInterest],
    config: &ProfileConfig,
) -> Vec<PoiAnchor> {
    use rayon::prelude::*;

    if !can_anchor(path, distances, profile) {
        return Vec::new();
    }
    let index = PathIndex::new(path);
    let limit = pois.len().min(config.max_pois);

    pois[..limit]
        .par_iter()
        .filter_map(|poi| anchor_one(&index, distances, profile, poi))
        .collect()
}

/// Anchor whose profile index is nearest to `profile_index`, if it is at most
/// `max_index_delta` samples away. Ties go to the earlier anchor.
pub fn poi_at_profile_index(
    anchors: &[PoiAnchor],
    profile_index: usize,
    max_index_delta: usize,
) -> Option<&PoiAnchor> {
    let mut best: Option<(&PoiAnchor, usize)> = None;
    for anchor in anchors {
        let delta = anchor.profile_index.abs_diff(profile_index);
        if best.map_or(true, |(_, d)| delta < d) {
            best = Some((anchor, delta));
        }
    }

    best.filter(|(_, d)| *d <= max_index_delta)
        .map(|(anchor, _)| anchor)
}

fn can_anchor(path: &[GeoPoint], distances: &[f64], profile: &[ProfileSample]) -> bool {
    if path.is_empty() || profile.is_empty() || distances.len() != path.len() {
        debug!(
            "[RouteCorrelation] Cannot anchor: path {} distances {} profile {}",
            path.len(),
            distances.len(),
            profile.len()
        );
        return false;
    }
    true
}

fn anchor_one(
    index: &PathIndex,
    distances: &[f64],
    profile: &[ProfileSample],
    poi: &PointOfInterest,
) -> Option<PoiAnchor> {
    let path_index = index.nearest(&poi.point);
    let distance = *distances.get(path_index)?;
    let profile_index = distance_to_profile_index(profile, distance);
    let sample = profile.get(profile_index)?;

    Some(PoiAnchor {
        poi_id: poi.id.clone(),
        title: poi.title().to_string(),
        kind: poi.kind,
        path_index,
        profile_index,
        distance_meters: sample.cumulative_distance_meters,
        elevation_meters: sample.elevation_meters,
    })
}

// =============================================================================
// Route Correlation
// =============================================================================

/// One loaded route: its path, its elevation profile and the derived indices.
///
/// Built once when a route is opened.
pub struct RouteCorrelation {
    config: ProfileConfig,
    path: Vec<GeoPoint>,
    distances: Vec<f64>,
    profile: Vec<ProfileSample>,
    index: PathIndex,
}

impl RouteCorrelation {
    pub fn new(path: Vec<GeoPoint>, profile: Vec<ProfileSample>, config: ProfileConfig) -> Self {
        let distances = cumulative_distances(&path);
        let index = PathIndex::new(&path);
        debug!(
            "[RouteCorrelation] Loaded route: {} path points, {} profile samples, {:.0}m",
            path.len(),
            profile.len(),
            distances.last().copied().unwrap_or(0.0)
        );
        Self {
            config,
            path,
            distances,
            profile,
            index,
        }
    }

    pub fn path(&self) -> &[GeoPoint] {
        &self.path
    }

    pub fn profile(&self) -> &[ProfileSample] {
        &self.profile
    }

    pub fn cumulative_distances(&self) -> &[f64] {
        &self.distances
    }

    pub fn total_distance_meters(&self) -> f64 {
        self.distances.last().copied().unwrap_or(0.0)
    }

    pub fn path_index_at_distance(&self, meters: f64) -> usize {
        distance_to_path_index(&self.distances, meters)
    }

    pub fn profile_index_at_distance(&self, meters: f64) -> usize {
        distance_to_profile_index(&self.profile, meters)
    }

    /// Chart hover to map marker.
    pub fn path_index_for_profile(&self, profile_index: usize) -> usize {
        profile_index_to_path_index_by_distance(&self.profile, &self.distances, profile_index)
    }

    /// Map hover to chart point.
    pub fn profile_index_for_path(&self, path_index: usize) -> usize {
        path_index_to_profile_index(&self.distances, &self.profile, path_index)
    }

    pub fn nearest_path_index(&self, point: &GeoPoint) -> usize {
        self.index.nearest(point)
    }

    pub fn smoothed_profile(&self) -> Vec<ProfileSample> {
        smooth_profile(&self.profile, self.config.smoothing_window)
    }

    pub fn slope_percent_at(&self, profile_index: usize) -> Option<f64> {
        slope_percent_at(&self.profile, profile_index, self.config.slope_half_span)
    }

    pub fn slope_class_at(&self, profile_index: usize) -> Option<SlopeClass> {
        self.slope_percent_at(profile_index).map(SlopeClass::from_percent)
    }

    pub fn anchor_pois(&self, pois: &[PointOfInterest]) -> Vec<PoiAnchor> {
        #[cfg(feature = "parallel")]
        {
            anchor_pois_parallel(&self.path, &self.distances, &self.profile, pois, &self.config)
        }
        #[cfg(not(feature = "parallel"))]
        {
            anchor_pois(&self.path, &self.distances, &self.profile, pois, &self.config)
        }
    }

    /// Chart hover to point of interest.
    pub fn poi_at_profile_index<'a>(
        &self,
        anchors: &'a [PoiAnchor],
        profile_index: usize,
    ) -> Option<&'a PoiAnchor> {
        poi_at_profile_index(anchors, profile_index, self.config.poi_hover_index_delta)
    }
}
