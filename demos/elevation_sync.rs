//! Record a walk while a background worker fills in elevations.
//!
//! Uses a synthetic provider by default. Point it at a real batch elevation
//! service with ELEVATION_ENDPOINT (and optionally ELEVATION_TOKEN).
//!
//! Run with: RUST_LOG=debug cargo run --example elevation_sync --features http

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use trail_tracker::{
    BatchConfig, ElevationClient, ElevationClientConfig, ElevationProvider, EnrichmentWorker, Fix,
    GeoPoint, LocationHub, Recorder, RecorderConfig,
};

/// Synthetic terrain that is missing data north of 46.003.
struct SyntheticTerrain;

impl ElevationProvider for SyntheticTerrain {
    fn elevations<'a>(
        &'a self,
        points: &'a [GeoPoint],
    ) -> BoxFuture<'a, trail_tracker::Result<Vec<Option<f64>>>> {
        async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            Ok(points
                .iter()
                .map(|p| (p.lat < 46.003).then(|| 900.0 + (p.lat - 46.0) * 50_000.0))
                .collect())
        }
        .boxed()
    }
}

async fn walk<P: ElevationProvider + 'static>(provider: P) {
    let recorder = Arc::new(Mutex::new(Recorder::new(RecorderConfig::default())));
    let (worker, handle) =
        EnrichmentWorker::new(Arc::new(provider), Arc::clone(&recorder), BatchConfig::default());
    let task = tokio::spawn(worker.run());

    let mut hub = LocationHub::new();
    {
        let recorder = Arc::clone(&recorder);
        let handle = handle.clone();
        hub.subscribe_fixes(move |fix| {
            handle.record_fix(&recorder, fix);
        });
    }

    recorder.lock().unwrap().start();
    hub.start();

    for i in 0..40 {
        hub.publish_fix(Fix::new(46.0 + i as f64 * 0.0001, 8.0, Utc::now()).with_accuracy(8.0));
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    recorder.lock().unwrap().stop();
    hub.stop();
    handle.flush();

    // The hub's subscriber holds a handle clone too
    drop(hub);
    drop(handle);
    if let Err(e) = task.await {
        eprintln!("Worker failed: {}", e);
    }

    let session = recorder.lock().unwrap().snapshot();
    let resolved = session.path.iter().filter(|p| p.elevation_meters.is_some()).count();
    let unresolved = session.path.iter().filter(|p| p.elevation_unresolved).count();
    println!(
        "{} points: {} with elevation, {} unresolved, ascent {:.0}m",
        session.path.len(),
        resolved,
        unresolved,
        session.ascent_meters
    );
}

#[tokio::main]
async fn main() {
    env_logger::init();

    match std::env::var("ELEVATION_ENDPOINT") {
        Ok(endpoint) => {
            let mut config = ElevationClientConfig::new(endpoint);
            if let Ok(token) = std::env::var("ELEVATION_TOKEN") {
                config = config.with_bearer_token(token);
            }
            match ElevationClient::new(config) {
                Ok(client) => walk(client).await,
                Err(e) => eprintln!("Could not build elevation client: {}", e),
            }
        }
        Err(_) => walk(SyntheticTerrain).await,
    }
}
