//! Async elevation enrichment.
//!
//! An [`EnrichmentWorker`] is a single tokio task that owns an
//! [`ElevationBatcher`] and drives it from three sources:
//! - events sent through an [`EnrichmentHandle`] (accepted points, resets, flushes)
//! - a ticker at the batch flush interval
//! - the one in-flight provider request
//!
//! Results are written into the shared [`Recorder`] by index, guarded by the
//! session generation. Dropping every handle drains the queue and stops the
//! worker.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, OptionFuture};
use futures::FutureExt;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::batcher::{BatchCompletion, BatchConfig, BatchRequest, ElevationBatcher};
use crate::error::Result;
use crate::http::ElevationProvider;
use crate::recorder::{FixOutcome, Recorder};
use crate::{Fix, GeoPoint};

/// Input to the enrichment worker.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentEvent {
    /// A recorded point needs an elevation.
    PointAccepted {
        generation: u64,
        index: usize,
        point: GeoPoint,
    },
    /// The recorder moved to a new session.
    SessionReset { generation: u64 },
    /// Send whatever is queued now.
    Flush,
}

/// Cloneable sender side of an [`EnrichmentWorker`].
#[derive(Debug, Clone)]
pub struct EnrichmentHandle {
    tx: mpsc::UnboundedSender<EnrichmentEvent>,
}

impl EnrichmentHandle {
    /// Send an event. Returns `false` once the worker has stopped.
    pub fn send(&self, event: EnrichmentEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn point_accepted(&self, generation: u64, index: usize, point: GeoPoint) -> bool {
        self.send(EnrichmentEvent::PointAccepted {
            generation,
            index,
            point,
        })
    }

    pub fn session_reset(&self, generation: u64) -> bool {
        self.send(EnrichmentEvent::SessionReset { generation })
    }

    pub fn flush(&self) -> bool {
        self.send(EnrichmentEvent::Flush)
    }

    /// Feed a fix to the recorder and queue the point if it needs an elevation.
    pub fn record_fix(&self, recorder: &Mutex<Recorder>, fix: &Fix) -> FixOutcome {
        let (outcome, generation) = {
            let mut recorder = lock(recorder);
            (recorder.update_my_location(fix), recorder.generation())
        };

        if let FixOutcome::Accepted {
            index,
            needs_elevation: true,
        } = outcome
        {
            self.point_accepted(generation, index, fix.point);
        }
        outcome
    }
}

type InFlight = BoxFuture<'static, (u64, Result<Vec<Option<f64>>>)>;

/// Background task applying elevations to a shared recorder.
pub struct EnrichmentWorker<P> {
    provider: Arc<P>,
    recorder: Arc<Mutex<Recorder>>,
    batcher: ElevationBatcher,
    events: mpsc::UnboundedReceiver<EnrichmentEvent>,
}

impl<P> EnrichmentWorker<P>
where
    P: ElevationProvider + 'static,
{
    pub fn new(
        provider: Arc<P>,
        recorder: Arc<Mutex<Recorder>>,
        config: BatchConfig,
    ) -> (Self, EnrichmentHandle) {
        let (tx, events) = mpsc::unbounded_channel();
        let worker = Self {
            provider,
            recorder,
            batcher: ElevationBatcher::new(config),
            events,
        };
        (worker, EnrichmentHandle { tx })
    }

    /// Run until every handle is dropped and the queue is drained.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.batcher.config().flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        let mut in_flight: Option<InFlight> = None;
        let mut closed = false;

        info!("[EnrichmentWorker] Started");

        loop {
            let mut next: Option<BatchRequest> = None;

            tokio::select! {
                Some((id, result)) = OptionFuture::from(in_flight.as_mut()), if in_flight.is_some() => {
                    in_flight = None;
                    self.complete(id, result);
                }
                event = self.events.recv(), if !closed => {
                    match event {
                        Some(event) => next = self.handle_event(event),
                        None => {
                            debug!("[EnrichmentWorker] All handles dropped, draining");
                            closed = true;
                        }
                    }
                }
                _ = ticker.tick() => {
                    next = self.batcher.on_tick(Instant::now().into_std());
                }
            }

            if closed && in_flight.is_none() && next.is_none() {
                next = self.batcher.flush(Instant::now().into_std());
                if next.is_none() {
                    break;
                }
            }

            if let Some(request) = next {
                in_flight = Some(self.dispatch(request));
            }
        }

        info!("[EnrichmentWorker] Stopped");
    }

    fn handle_event(&mut self, event: EnrichmentEvent) -> Option<BatchRequest> {
        let now = Instant::now().into_std();
        match event {
            EnrichmentEvent::PointAccepted {
                generation,
                index,
                point,
            } => {
                self.batcher.enqueue(generation, index, point);
                self.batcher.on_point_queued(now)
            }
            EnrichmentEvent::SessionReset { generation } => {
                self.batcher.reset(generation);
                None
            }
            EnrichmentEvent::Flush => self.batcher.flush(now),
        }
    }

    fn dispatch(&self, request: BatchRequest) -> InFlight {
        let provider = Arc::clone(&self.provider);
        async move {
            let result = provider.elevations(&request.points).await;
            (request.id, result)
        }
        .boxed()
    }

    fn complete(&mut self, id: u64, result: Result<Vec<Option<f64>>>) {
        match self.batcher.complete(id, result) {
            BatchCompletion::Apply {
                generation,
                start_index,
                elevations,
            } => {
                let mut recorder = lock(&self.recorder);
                if !recorder.apply_elevation_batch_for(generation, start_index, &elevations) {
                    return;
                }
                // The service has no data for these points
                let missing: Vec<usize> = elevations
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.is_none())
                    .map(|(i, _)| start_index + i)
                    .collect();
                if !missing.is_empty() {
                    recorder.mark_elevation_unresolved(&missing);
                }
            }
            BatchCompletion::Abandoned {
                generation,
                indices,
            } => {
                let mut recorder = lock(&self.recorder);
                if recorder.generation() == generation {
                    recorder.mark_elevation_unresolved(&indices);
                } else {
                    warn!(
                        "[EnrichmentWorker] Abandoned batch of old generation {}",
                        generation
                    );
                }
            }
            BatchCompletion::Requeued { attempt } => {
                debug!("[EnrichmentWorker] Retry {} on next tick", attempt);
            }
            BatchCompletion::Ignored => {}
        }
    }
}

fn lock(recorder: &Mutex<Recorder>) -> MutexGuard<'_, Recorder> {
    match recorder.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
