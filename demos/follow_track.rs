//! Follow a reference path with a simulated walker who takes a detour and
//! then turns back.
//!
//! Run with: RUST_LOG=info cargo run --example follow_track

use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use trail_tracker::{Fix, FollowConfig, GeoPoint, LocationHub, PathMatcher, TrackingState};

fn main() {
    env_logger::init();

    // ~1.1 km path heading east, one sample every ~11m
    let path: Vec<GeoPoint> = (0..100)
        .map(|i| GeoPoint::new(46.55, 7.98 + i as f64 * 0.000145))
        .collect();

    let matcher = Arc::new(Mutex::new(PathMatcher::new(FollowConfig::default())));
    matcher.lock().unwrap().init_target(path.clone());

    // Print only alert changes
    matcher.lock().unwrap().subscribe({
        let last = Mutex::new((false, false));
        move |s: &TrackingState| {
            let mut last = last.lock().unwrap();
            if (s.off_track, s.wrong_direction) != *last {
                println!(
                    "  index {:>3}: off_track={} ({:.0}m) wrong_direction={}",
                    s.nearest_index, s.off_track, s.off_track_meters, s.wrong_direction
                );
                *last = (s.off_track, s.wrong_direction);
            }
        }
    });

    let mut hub = LocationHub::new();
    hub.attach(Arc::clone(&matcher));
    hub.start();

    let t0 = Utc::now();
    let mut step = 0;
    let mut walk = |hub: &mut LocationHub, p: GeoPoint| {
        hub.publish_fix(Fix::at(p, t0 + Duration::seconds(step)).with_accuracy(12.0));
        step += 1;
    };

    println!("Walking the first 40 samples...");
    for p in &path[..40] {
        walk(&mut hub, *p);
    }

    println!("Detour 80m north...");
    for p in &path[40..46] {
        walk(&mut hub, GeoPoint::new(p.lat + 80.0 / 111_195.0, p.lng));
    }

    println!("Back on the path...");
    for p in &path[46..60] {
        walk(&mut hub, *p);
    }

    println!("Turning back...");
    for p in path[20..60].iter().rev().step_by(3) {
        walk(&mut hub, *p);
    }

    let state = matcher.lock().unwrap().snapshot();
    println!(
        "\nFinal: index {}, heading {:?}, off_track={}, wrong_direction={}",
        state.nearest_index,
        state.heading_deg.map(|h| h.round()),
        state.off_track,
        state.wrong_direction
    );
}
