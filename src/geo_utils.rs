//! # Geographic Utilities
//!
//! Geometric primitives shared by the follower, the recorder and the index
//! correlator.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two points |
//! | [`polyline_length`] | Total length of a path in meters |
//! | [`cumulative_distances`] | Prefix-summed distances along a path |
//! | [`bearing_deg`] | Initial bearing from one point to another |
//! | [`heading_update`] | Bearing that ignores sub-threshold GPS jitter |
//! | [`point_to_segment_distance`] | Distance from a point to a segment |
//! | [`nearest_sorted_index`] | Closest value in a non-decreasing array |
//!
//! ## Example
//!
//! ```rust
//! use trail_tracker::{GeoPoint, geo_utils};
//!
//! let a = GeoPoint::new(0.0, 0.000);
//! let b = GeoPoint::new(0.0, 0.001);
//!
//! let d = geo_utils::haversine_distance(&a, &b);
//! assert!((d - 111.2).abs() < 0.5);
//!
//! let bearing = geo_utils::bearing_deg(&a, &b);
//! assert!((bearing - 90.0).abs() < 1e-6);
//! ```
//!
//! ## Algorithm Notes
//!
//! ### Local Projection
//!
//! Point-to-segment distances are computed on an equirectangular tangent plane
//! centred on the query point (longitude scaled by `cos(lat)`). At trail scales
//! (segments of meters to a few kilometers) the error stays well below GPS noise.

use geo::{Distance, Haversine, Point};

use crate::GeoPoint;

/// Sphere radius used by the local tangent-plane projection.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance between two points using the Haversine formula.
///
/// Symmetric and exactly zero for identical points.
///
/// # Example
///
/// ```rust
/// use trail_tracker::{GeoPoint, geo_utils};
///
/// let madrid = GeoPoint::new(40.4168, -3.7038);
/// let toledo = GeoPoint::new(39.8628, -4.0273);
///
/// let distance = geo_utils::haversine_distance(&madrid, &toledo);
/// assert!((distance - 67_700.0).abs() < 1_000.0);
/// ```
#[inline]
pub fn haversine_distance(p1: &GeoPoint, p2: &GeoPoint) -> f64 {
    let point1 = Point::new(p1.lng, p1.lat);
    let point2 = Point::new(p2.lng, p2.lat);
    Haversine::distance(point1, point2)
}

/// Total length of a path in meters. Empty and single-point paths return 0.0.
pub fn polyline_length(points: &[GeoPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Prefix-summed haversine distances along a path.
///
/// The result has the same length as the path, starts at 0.0 and is
/// non-decreasing. An empty path yields an empty vector.
pub fn cumulative_distances(points: &[GeoPoint]) -> Vec<f64> {
    let mut distances = Vec::with_capacity(points.len());
    if points.is_empty() {
        return distances;
    }

    let mut acc = 0.0;
    distances.push(acc);
    for w in points.windows(2) {
        acc += haversine_distance(&w[0], &w[1]);
        distances.push(acc);
    }

    distances
}

/// Distance in meters from `p` to the segment `[seg_start, seg_end]`.
///
/// Computed on a tangent plane at `p` (longitude scaled by `cos(p.lat)`), with the
/// projection parameter clamped to the segment. A degenerate segment reduces to
/// the distance to its single point.
///
/// # Example
///
/// ```rust
/// use trail_tracker::{GeoPoint, geo_utils};
///
/// let a = GeoPoint::new(0.0, 0.000);
/// let b = GeoPoint::new(0.0, 0.002);
/// let on_segment = GeoPoint::new(0.0, 0.001);
///
/// assert!(geo_utils::point_to_segment_distance(&on_segment, &a, &b) < 1e-6);
/// ```
pub fn point_to_segment_distance(p: &GeoPoint, seg_start: &GeoPoint, seg_end: &GeoPoint) -> f64 {
    let cos_lat = p.lat.to_radians().cos();

    let [px, py] = project_local(p, cos_lat);
    let [ax, ay] = project_local(seg_start, cos_lat);
    let [bx, by] = project_local(seg_end, cos_lat);

    let abx = bx - ax;
    let aby = by - ay;
    let apx = px - ax;
    let apy = py - ay;

    let ab2 = abx * abx + aby * aby;
    let t = if ab2 == 0.0 {
        0.0
    } else {
        ((apx * abx + apy * aby) / ab2).clamp(0.0, 1.0)
    };

    let dx = px - (ax + t * abx);
    let dy = py - (ay + t * aby);
    (dx * dx + dy * dy).sqrt()
}

/// Project a point onto a local equirectangular plane, in meters.
///
/// `cos_lat` is the cosine of the reference latitude shared by every point that
/// takes part in the same computation.
#[inline]
pub(crate) fn project_local(p: &GeoPoint, cos_lat: f64) -> [f64; 2] {
    [
        EARTH_RADIUS_M * p.lng.to_radians() * cos_lat,
        EARTH_RADIUS_M * p.lat.to_radians(),
    ]
}

// =============================================================================
// Bearing Functions
// =============================================================================

/// Initial bearing from `from` to `to`, in degrees within `[0, 360)`.
///
/// 0 is north, 90 is east. Identical points yield 0.0; callers that track a
/// heading should go through [`heading_update`] instead.
pub fn bearing_deg(from: &GeoPoint, to: &GeoPoint) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let d_lng = (to.lng - from.lng).to_radians();

    let y = d_lng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lng.cos();

    let bearing = y.atan2(x).to_degrees();
    (bearing + 360.0) % 360.0
}

/// Next heading given the previous one and a displacement `from -> to`.
///
/// Displacements shorter than `min_displacement_meters` keep the previous heading.
pub fn heading_update(
    previous: Option<f64>,
    from: &GeoPoint,
    to: &GeoPoint,
    min_displacement_meters: f64,
) -> Option<f64> {
    if haversine_distance(from, to) >= min_displacement_meters {
        Some(bearing_deg(from, to))
    } else {
        previous
    }
}

// =============================================================================
// Search Functions
// =============================================================================

/// Index of the value closest to `target` in a non-decreasing array.
///
/// O(log n) binary search. Ties resolve to the earlier index. Returns 0 for an
/// empty array.
///
/// # Example
///
/// ```rust
/// use trail_tracker::geo_utils;
///
/// let distances = [0.0, 100.0, 200.0, 300.0];
/// assert_eq!(geo_utils::nearest_sorted_index(&distances, 140.0), 1);
/// assert_eq!(geo_utils::nearest_sorted_index(&distances, 150.0), 1); // tie
/// assert_eq!(geo_utils::nearest_sorted_index(&distances, 9_999.0), 3);
/// ```
pub fn nearest_sorted_index(sorted: &[f64], target: f64) -> usize {
    nearest_sorted_index_by(sorted, target, |d| *d)
}

/// [`nearest_sorted_index`] over any slice ordered by a non-decreasing key.
pub fn nearest_sorted_index_by<T, F>(items: &[T], target: f64, key: F) -> usize
where
    F: Fn(&T) -> f64,
{
    if items.is_empty() {
        return 0;
    }

    // First index whose key is >= target
    let i = items.partition_point(|item| key(item) < target);
    if i == 0 {
        return 0;
    }
    if i >= items.len() {
        return items.len() - 1;
    }

    let prev = i - 1;
    let d_prev = (key(&items[prev]) - target).abs();
    let d_next = (key(&items[i]) - target).abs();

    if d_prev <= d_next {
        prev
    } else {
        i
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_haversine_distance_same_point() {
        let p = GeoPoint::new(40.4168, -3.7038);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_distance_symmetric() {
        let a = GeoPoint::new(40.4168, -3.7038);
        let b = GeoPoint::new(40.8, -4.1);
        assert_eq!(haversine_distance(&a, &b), haversine_distance(&b, &a));
    }

    #[test]
    fn test_haversine_distance_known_value() {
        // 0.001 degrees of longitude on the equator is ~111.2m
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.0, 0.001);
        assert!(approx_eq(haversine_distance(&a, &b), 111.2, 0.5));
    }

    #[test]
    fn test_polyline_length_short_inputs() {
        assert_eq!(polyline_length(&[]), 0.0);
        assert_eq!(polyline_length(&[GeoPoint::new(1.0, 1.0)]), 0.0);
    }

    #[test]
    fn test_cumulative_distances() {
        let path = vec![
            GeoPoint::new(0.0, 0.000),
            GeoPoint::new(0.0, 0.001),
            GeoPoint::new(0.0, 0.003),
        ];
        let d = cumulative_distances(&path);
        assert_eq!(d.len(), 3);
        assert_eq!(d[0], 0.0);
        assert!(approx_eq(d[1], 111.2, 0.5));
        assert!(approx_eq(d[2], 333.6, 1.5));
        assert!(approx_eq(*d.last().unwrap(), polyline_length(&path), 1e-9));

        assert!(cumulative_distances(&[]).is_empty());
    }

    #[test]
    fn test_point_on_segment_is_zero() {
        let a = GeoPoint::new(42.0, 2.0);
        let b = GeoPoint::new(42.001, 2.001);
        let mid = GeoPoint::new(42.0005, 2.0005);
        assert!(point_to_segment_distance(&mid, &a, &b) < 0.05);
        assert!(point_to_segment_distance(&a, &a, &b) < 1e-9);
        assert!(point_to_segment_distance(&b, &a, &b) < 1e-6);
    }

    #[test]
    fn test_point_to_segment_perpendicular() {
        let a = GeoPoint::new(0.0, 0.000);
        let b = GeoPoint::new(0.0, 0.001);
        // ~50m north of the segment midpoint
        let p = GeoPoint::new(50.0 / 111_195.0, 0.0005);
        assert!(approx_eq(point_to_segment_distance(&p, &a, &b), 50.0, 0.5));
    }

    #[test]
    fn test_point_to_segment_clamps_to_endpoint() {
        let a = GeoPoint::new(0.0, 0.000);
        let b = GeoPoint::new(0.0, 0.001);
        let beyond = GeoPoint::new(0.0, 0.002);
        let d = point_to_segment_distance(&beyond, &a, &b);
        assert!(approx_eq(d, haversine_distance(&beyond, &b), 0.5));
    }

    #[test]
    fn test_degenerate_segment_is_point_distance() {
        let a = GeoPoint::new(0.0, 0.0);
        let p = GeoPoint::new(0.0, 0.001);
        let d = point_to_segment_distance(&p, &a, &a);
        assert!(approx_eq(d, haversine_distance(&p, &a), 0.5));
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = GeoPoint::new(0.0, 0.0);
        assert!(approx_eq(bearing_deg(&origin, &GeoPoint::new(0.001, 0.0)), 0.0, 1e-6));
        assert!(approx_eq(bearing_deg(&origin, &GeoPoint::new(0.0, 0.001)), 90.0, 1e-6));
        assert!(approx_eq(bearing_deg(&origin, &GeoPoint::new(-0.001, 0.0)), 180.0, 1e-6));
        assert!(approx_eq(bearing_deg(&origin, &GeoPoint::new(0.0, -0.001)), 270.0, 1e-6));
    }

    #[test]
    fn test_heading_update_ignores_jitter() {
        let from = GeoPoint::new(0.0, 0.0);
        let jitter = GeoPoint::new(0.00001, 0.0); // ~1.1m
        let moved = GeoPoint::new(0.0, 0.0001); // ~11m east

        assert_eq!(heading_update(Some(45.0), &from, &jitter, 3.0), Some(45.0));
        assert_eq!(heading_update(None, &from, &jitter, 3.0), None);

        let h = heading_update(Some(45.0), &from, &moved, 3.0).unwrap();
        assert!(approx_eq(h, 90.0, 1e-6));
    }

    #[test]
    fn test_nearest_sorted_index() {
        let d = [0.0, 10.0, 20.0, 20.0, 40.0];
        assert_eq!(nearest_sorted_index(&d, -5.0), 0);
        assert_eq!(nearest_sorted_index(&d, 4.0), 0);
        assert_eq!(nearest_sorted_index(&d, 5.0), 0);
        assert_eq!(nearest_sorted_index(&d, 6.0), 1);
        assert_eq!(nearest_sorted_index(&d, 20.0), 2);
        assert_eq!(nearest_sorted_index(&d, 31.0), 4);
        assert_eq!(nearest_sorted_index(&d, 100.0), 4);
        assert_eq!(nearest_sorted_index(&[], 3.0), 0);
    }
}
