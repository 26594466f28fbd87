//! Record a short walk, batch its elevations by hand and print the totals.
//!
//! Run with: cargo run --example record_track
//! With GPX output: cargo run --example record_track --features gpx

use std::time::Instant;

use chrono::{Duration, Utc};
use trail_tracker::{
    BatchCompletion, ElevationBatcher, Fix, FixOutcome, GeoPoint, Recorder, RecorderConfig,
    RecordingSession,
};

/// Stand-in terrain: a slope rising to the north.
fn terrain_elevation(p: &GeoPoint) -> f64 {
    1500.0 + (p.lat - 46.0) * 20_000.0
}

fn main() {
    env_logger::init();

    let mut recorder = Recorder::new(RecorderConfig::default());
    let mut batcher = ElevationBatcher::default();
    recorder.start();

    let t0 = Utc::now();
    let now = Instant::now();

    for i in 0..23 {
        // Every fourth fix is GPS jitter around the previous one
        let lat = 46.0 + (i - i / 4) as f64 * 0.00009;
        let fix = Fix::new(lat, 8.0, t0 + Duration::seconds(4 * i as i64)).with_accuracy(6.0);

        if let FixOutcome::Accepted {
            index,
            needs_elevation: true,
        } = recorder.update_my_location(&fix)
        {
            batcher.enqueue(recorder.generation(), index, fix.point);
            if let Some(request) = batcher.on_point_queued(now) {
                let elevations = request.points.iter().map(|p| Some(terrain_elevation(p))).collect();
                if let BatchCompletion::Apply {
                    generation,
                    start_index,
                    elevations,
                } = batcher.complete(request.id, Ok(elevations))
                {
                    recorder.apply_elevation_batch_for(generation, start_index, &elevations);
                }
            }
        }

        if i == 10 {
            recorder.add_waypoint_from_current(Some("Bridge"), Some("Wooden footbridge"));
        }
    }

    // Flush the tail on stop
    recorder.stop();
    while let Some(request) = batcher.flush(now) {
        let elevations = request.points.iter().map(|p| Some(terrain_elevation(p))).collect();
        if let BatchCompletion::Apply {
            generation,
            start_index,
            elevations,
        } = batcher.complete(request.id, Ok(elevations))
        {
            recorder.apply_elevation_batch_for(generation, start_index, &elevations);
        }
    }

    let session = recorder.snapshot();
    println!("Recorded {} points, {} waypoints", session.path.len(), session.waypoints.len());
    println!("Distance: {:.0}m", session.distance_meters);
    println!(
        "Ascent: {:.0}m, descent: {:.0}m",
        session.ascent_meters, session.descent_meters
    );
    println!("Last speed: {:.2} m/s", session.last_speed_mps.unwrap_or(0.0));
    println!("Pending elevations from: {:?}", session.pending_elevation_start_index);

    print_gpx(&session);
}

#[cfg(feature = "gpx")]
fn print_gpx(session: &RecordingSession) {
    match trail_tracker::to_gpx("Demo walk", &session.path, &session.waypoints) {
        Ok(xml) => println!("\n{}", xml),
        Err(e) => eprintln!("GPX export failed: {}", e),
    }
}

#[cfg(not(feature = "gpx"))]
fn print_gpx(_session: &RecordingSession) {
    println!("\nBuild with --features gpx to print the GPX document");
}
