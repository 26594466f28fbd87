//! # Elevation Batching
//!
//! Queue of recorded points waiting for an elevation, flushed in small batches
//! to the enrichment service.
//!
//! The batcher is a plain state machine (`Idle -> Flushing -> Idle`) with no I/O
//! and no clock of its own. Two racing triggers request a flush: the queue
//! reaching `max_points` and a periodic tick once `flush_interval` has elapsed.
//! Both respect the in-flight guard, so at most one request is outstanding.
//!
//! A response with the wrong number of elevations counts as a failure.
//! Failed batches go back to the front of the queue; after `max_attempts`
//! failures the points are abandoned and reported so they can be flagged as
//! unresolved instead of silently staying empty.

use std::collections::VecDeque;
use std::ops::Range;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::{ElevationError, Result};
use crate::GeoPoint;

/// Configuration for elevation batching.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatchConfig {
    /// Queue size that triggers an immediate flush, and the batch size limit.
    /// Default: 5
    pub max_points: usize,

    /// Minimum time between timer-triggered flushes.
    /// Default: 2 seconds
    pub flush_interval: Duration,

    /// Failed attempts before a batch is abandoned.
    /// Default: 3
    pub max_attempts: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_points: 5,
            flush_interval: Duration::from_secs(2),
            max_attempts: 3,
        }
    }
}

/// A batch handed to the enrichment service.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub id: u64,
    /// Recorder generation the points belong to
    pub generation: u64,
    /// Path index of the first point; the rest follow contiguously
    pub start_index: usize,
    pub points: Vec<GeoPoint>,
}

impl BatchRequest {
    /// Path indices covered by this batch.
    pub fn indices(&self) -> Range<usize> {
        self.start_index..self.start_index + self.points.len()
    }
}

/// Result of [`ElevationBatcher::complete`].
#[derive(Debug, Clone, PartialEq)]
pub enum BatchCompletion {
    /// Apply these elevations to the recorder, if `generation` is still current.
    Apply {
        generation: u64,
        start_index: usize,
        elevations: Vec<Option<f64>>,
    },
    /// The batch failed and is queued again.
    Requeued { attempt: u32 },
    /// The batch failed for good; these points will not get an elevation.
    Abandoned { generation: u64, indices: Vec<usize> },
    /// The id does not match the in-flight request.
    Ignored,
}

#[derive(Debug, Clone)]
struct QueuedPoint {
    generation: u64,
    index: usize,
    point: GeoPoint,
    attempts: u32,
}

#[derive(Debug)]
enum BatchState {
    Idle,
    Flushing {
        request: BatchRequest,
        entries: Vec<QueuedPoint>,
    },
}

/// Elevation batch scheduler.
#[derive(Debug)]
pub struct ElevationBatcher {
    config: BatchConfig,
    queue: VecDeque<QueuedPoint>,
    state: BatchState,
    generation: u64,
    next_id: u64,
    last_flush: Option<Instant>,
}

impl ElevationBatcher {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            queue: VecDeque::new(),
            state: BatchState::Idle,
            generation: 0,
            next_id: 1,
            last_flush: None,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Points waiting to be sent.
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_flushing(&self) -> bool {
        matches!(self.state, BatchState::Flushing { .. })
    }

    /// The outstanding request, if any.
    pub fn in_flight(&self) -> Option<&BatchRequest> {
        match &self.state {
            BatchState::Flushing { request, .. } => Some(request),
            BatchState::Idle => None,
        }
    }

    /// Queue a recorded point.
    ///
    /// Points of an older generation are dropped; a newer generation resets
    /// the queue first.
    pub fn enqueue(&mut self, generation: u64, index: usize, point: GeoPoint) {
        if generation < self.generation {
            debug!(
                "[ElevationBatcher] Dropping point {} of stale generation {}",
                index, generation
            );
            return;
        }
        if generation > self.generation {
            self.reset(generation);
        }
        if self.queue.iter().any(|q| q.index == index) {
            return;
        }

        self.queue.push_back(QueuedPoint {
            generation,
            index,
            point,
            attempts: 0,
        });
    }

    /// Size trigger: flush once the queue holds a full batch.
    pub fn on_point_queued(&mut self, now: Instant) -> Option<BatchRequest> {
        if self.queue.len() >= self.config.max_points {
            self.flush(now)
        } else {
            None
        }
    }

    /// Timer trigger: flush whatever is queued once the interval has elapsed.
    pub fn on_tick(&mut self, now: Instant) -> Option<BatchRequest> {
        let due = self
            .last_flush
            .map_or(true, |last| now.duration_since(last) >= self.config.flush_interval);
        if due {
            self.flush(now)
        } else {
            None
        }
    }

    /// Send the next batch now, unless a request is already in flight or the
    /// queue is empty.
    pub fn flush(&mut self, now: Instant) -> Option<BatchRequest> {
        if self.is_flushing() {
            return None;
        }

        let entries = self.take_batch();
        let first = entries.first()?;

        let request = BatchRequest {
            id: self.next_id,
            generation: first.generation,
            start_index: first.index,
            points: entries.iter().map(|q| q.point).collect(),
        };
        self.next_id += 1;
        self.last_flush = Some(now);

        debug!(
            "[ElevationBatcher] Batch {}: {} points from index {}",
            request.id,
            request.points.len(),
            request.start_index
        );
        self.state = BatchState::Flushing {
            request: request.clone(),
            entries,
        };
        Some(request)
    }

    /// Report the outcome of the in-flight request.
    pub fn complete(&mut self, id: u64, result: Result<Vec<Option<f64>>>) -> BatchCompletion {
        let (request, entries) = match std::mem::replace(&mut self.state, BatchState::Idle) {
            BatchState::Flushing { request, entries } if request.id == id => (request, entries),
            other => {
                self.state = other;
                debug!("[ElevationBatcher] Ignoring completion of unknown batch {}", id);
                return BatchCompletion::Ignored;
            }
        };

        match result {
            Ok(elevations) if elevations.len() != request.points.len() => {
                let err = ElevationError::CountMismatch {
                    expected: request.points.len(),
                    actual: elevations.len(),
                };
                self.fail(request, entries, &err)
            }
            Ok(elevations) => BatchCompletion::Apply {
                generation: request.generation,
                start_index: request.start_index,
                elevations,
            },
            Err(err) => self.fail(request, entries, &err),
        }
    }

    /// Start a new generation. Queued points of older generations are dropped;
    /// an in-flight request keeps the guard until it completes.
    pub fn reset(&mut self, generation: u64) {
        let before = self.queue.len();
        self.queue.retain(|q| q.generation >= generation);
        self.generation = self.generation.max(generation);
        if before != self.queue.len() {
            info!(
                "[ElevationBatcher] Dropped {} queued points on reset",
                before - self.queue.len()
            );
        }
    }

    fn fail(
        &mut self,
        request: BatchRequest,
        mut entries: Vec<QueuedPoint>,
        err: &ElevationError,
    ) -> BatchCompletion {
        let attempt = entries.iter().map(|q| q.attempts).max().unwrap_or(0) + 1;

        let stale = request.generation < self.generation;
        if stale || !err.is_transient() || attempt >= self.config.max_attempts {
            warn!(
                "[ElevationBatcher] Abandoning batch {} after {} attempts: {}",
                request.id, attempt, err
            );
            return BatchCompletion::Abandoned {
                generation: request.generation,
                indices: request.indices().collect(),
            };
        }

        warn!(
            "[ElevationBatcher] Batch {} failed (attempt {}), requeued: {}",
            request.id, attempt, err
        );
        for entry in entries.iter_mut() {
            entry.attempts = attempt;
        }
        for entry in entries.into_iter().rev() {
            self.queue.push_front(entry);
        }
        BatchCompletion::Requeued { attempt }
    }

    /// Take up to `max_points` contiguous points of the current generation.
    fn take_batch(&mut self) -> Vec<QueuedPoint> {
        while self
            .queue
            .front()
            .is_some_and(|q| q.generation < self.generation)
        {
            self.queue.pop_front();
        }

        let mut batch: Vec<QueuedPoint> = Vec::with_capacity(self.config.max_points);
        while batch.len() < self.config.max_points {
            let contiguous = match (batch.last(), self.queue.front()) {
                (None, Some(_)) => true,
                (Some(last), Some(next)) => {
                    next.index == last.index + 1 && next.generation == last.generation
                }
                (_, None) => false,
            };
            if !contiguous {
                break;
            }
            if let Some(entry) = self.queue.pop_front() {
                batch.push(entry);
            }
        }
        batch
    }
}

impl Default for ElevationBatcher {
    fn default() -> Self {
        Self::new(BatchConfig::default())
    }
}
