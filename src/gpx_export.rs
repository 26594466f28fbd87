//! GPX 1.1 export of a recorded session.

use chrono::{DateTime, Utc};
use gpx::{Gpx, GpxVersion, Track, TrackSegment};
use thiserror::Error;
use time::OffsetDateTime;

use crate::{GeoPoint, RecordedPoint, Waypoint};

const CREATOR: &str = "trail-tracker";

#[derive(Debug, Error)]
pub enum GpxExportError {
    #[error("GPX write failed: {0}")]
    Write(#[from] gpx::errors::GpxError),

    #[error("Timestamp out of range: {0}")]
    Timestamp(String),

    #[error("GPX output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Serialize a recording as GPX 1.1: one track with one segment, plus waypoints.
///
/// Points without elevation are written without `<ele>`.
pub fn to_gpx(
    track_name: &str,
    points: &[RecordedPoint],
    waypoints: &[Waypoint],
) -> Result<String, GpxExportError> {
    let mut segment = TrackSegment::new();
    for p in points {
        segment
            .points
            .push(gpx_waypoint(&p.point, p.elevation_meters, &p.timestamp)?);
    }

    let mut track = Track::new();
    track.name = Some(track_name.to_string());
    track.segments.push(segment);

    let mut marks = Vec::with_capacity(waypoints.len());
    for w in waypoints {
        let mut wpt = gpx_waypoint(&w.point, w.elevation_meters, &w.timestamp)?;
        wpt.name = w.name.clone();
        wpt.description = w.description.clone();
        marks.push(wpt);
    }

    let doc = Gpx {
        version: GpxVersion::Gpx11,
        creator: Some(CREATOR.to_string()),
        waypoints: marks,
        tracks: vec![track],
        ..Gpx::default()
    };

    let mut buf = Vec::new();
    gpx::write(&doc, &mut buf)?;
    Ok(String::from_utf8(buf)?)
}

fn gpx_waypoint(
    point: &GeoPoint,
    elevation: Option<f64>,
    timestamp: &DateTime<Utc>,
) -> Result<gpx::Waypoint, GpxExportError> {
    let mut wpt = gpx::Waypoint::new(geo::Point::new(point.lng, point.lat));
    wpt.elevation = elevation;
    wpt.time = Some(to_gpx_time(timestamp)?);
    Ok(wpt)
}

fn to_gpx_time(timestamp: &DateTime<Utc>) -> Result<gpx::Time, GpxExportError> {
    let nanos = i128::from(timestamp.timestamp()) * 1_000_000_000
        + i128::from(timestamp.timestamp_subsec_nanos());
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .map(gpx::Time::from)
        .map_err(|e| GpxExportError::Timestamp(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_export_reads_back() {
        let points = vec![
            RecordedPoint::new(GeoPoint::new(46.5, 7.9), Some(1200.0), ts(0)),
            RecordedPoint::new(GeoPoint::new(46.5001, 7.9), None, ts(5)),
            RecordedPoint::new(GeoPoint::new(46.5002, 7.9), Some(1204.5), ts(10)),
        ];
        let waypoints = vec![Waypoint {
            point: GeoPoint::new(46.5002, 7.9),
            elevation_meters: Some(1204.5),
            timestamp: ts(12),
            name: Some("Hut".to_string()),
            description: Some("Closed in winter".to_string()),
        }];

        let xml = to_gpx("Morning hike", &points, &waypoints).unwrap();
        let doc = gpx::read(xml.as_bytes()).unwrap();

        assert_eq!(doc.version, GpxVersion::Gpx11);
        assert_eq!(doc.tracks.len(), 1);
        assert_eq!(doc.tracks[0].name.as_deref(), Some("Morning hike"));

        let trkpts = &doc.tracks[0].segments[0].points;
        assert_eq!(trkpts.len(), 3);
        assert_eq!(trkpts[0].elevation, Some(1200.0));
        assert_eq!(trkpts[1].elevation, None);
        assert!((trkpts[2].point().y() - 46.5002).abs() < 1e-9);
        assert!(trkpts.iter().all(|p| p.time.is_some()));

        assert_eq!(doc.waypoints.len(), 1);
        assert_eq!(doc.waypoints[0].name.as_deref(), Some("Hut"));
        assert_eq!(doc.waypoints[0].description.as_deref(), Some("Closed in winter"));
    }

    #[test]
    fn test_empty_recording() {
        let xml = to_gpx("Empty", &[], &[]).unwrap();
        let doc = gpx::read(xml.as_bytes()).unwrap();
        assert_eq!(doc.tracks.len(), 1);
        assert!(doc.tracks[0].segments.iter().all(|s| s.points.is_empty()));
        assert!(doc.waypoints.is_empty());
    }
}
