//! Async docstring detection worker
//!
//! Runs detection off the LSP event loop. Requests queue on an unbounded
//! channel and are drained in bounded batches. Each batch runs on the
//! blocking pool across rayon threads; requests whose receiver was dropped
//! are skipped.

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace};

use super::block::DocumentationBlock;
use super::cancellation::CancellationToken;
use super::detector::DocstringDetector;

/// Request to detect documentation blocks in one document
#[derive(Debug)]
pub struct DetectionRequest {
    /// Cache key of the document revision, echoed back in the result
    pub key: String,
    pub text: Arc<str>,
    pub language: String,
    /// Detector snapshot current when the request was made
    pub detector: Arc<DocstringDetector>,
    pub cancel: CancellationToken,
    pub response: oneshot::Sender<DetectionResult>,
}

/// Result of a detection request
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub key: String,
    pub blocks: Vec<DocumentationBlock>,
    /// Cancellation was observed before every pattern ran
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

/// Upper bound on requests drained into one batch
const MAX_BATCH: usize = 64;

/// Handle to the detection worker
///
/// Cloneable; the worker stops once every handle has been dropped.
#[derive(Debug, Clone)]
pub struct DetectionWorkerHandle {
    queue: mpsc::UnboundedSender<DetectionRequest>,
}

impl DetectionWorkerHandle {
    /// Queues a detection and returns the receiver for its result
    ///
    /// If the worker has stopped the receiver resolves to an error
    /// immediately.
    pub fn detect(
        &self,
        key: String,
        text: Arc<str>,
        language: String,
        detector: Arc<DocstringDetector>,
        cancel: CancellationToken,
    ) -> oneshot::Receiver<DetectionResult> {
        let (response, receiver) = oneshot::channel();

        let queued = self.queue.send(DetectionRequest {
            key,
            text,
            language,
            detector,
            cancel,
            response,
        });
        if let Err(rejected) = queued {
            error!("Detection worker is gone; dropping request for {}", rejected.0.key);
        }

        receiver
    }

    pub fn is_running(&self) -> bool {
        !self.queue.is_closed()
    }
}

/// Spawns the detection worker on the current tokio runtime
pub fn spawn_detection_worker() -> DetectionWorkerHandle {
    let (queue, requests) = mpsc::unbounded_channel();
    tokio::spawn(run_worker(requests));
    DetectionWorkerHandle { queue }
}

async fn run_worker(mut requests: mpsc::UnboundedReceiver<DetectionRequest>) {
    debug!("Docstring detection worker started");

    let mut pending = Vec::with_capacity(MAX_BATCH);
    while requests.recv_many(&mut pending, MAX_BATCH).await > 0 {
        let batch: Vec<DetectionRequest> = pending
            .drain(..)
            .filter(|request| {
                let abandoned = request.response.is_closed();
                if abandoned {
                    trace!("Skipping abandoned detection for {}", request.key);
                }
                !abandoned
            })
            .collect();
        if batch.is_empty() {
            continue;
        }

        trace!("Dispatching batch of {} detections", batch.len());
        tokio::spawn(async move {
            match tokio::task::spawn_blocking(move || run_batch(batch)).await {
                Ok(completed) => deliver(completed),
                Err(e) => error!("Detection batch failed to complete: {}", e),
            }
        });
    }

    debug!("Docstring detection worker stopped");
}

fn deliver(completed: Vec<(oneshot::Sender<DetectionResult>, DetectionResult)>) {
    for (response, result) in completed {
        debug!(
            "Detected {} blocks for {} in {}ms{}",
            result.blocks.len(),
            result.key,
            result.elapsed_ms,
            if result.cancelled { " (cancelled)" } else { "" }
        );
        if response.send(result).is_err() {
            trace!("Detection result discarded; requester went away");
        }
    }
}

fn run_batch(batch: Vec<DetectionRequest>) -> Vec<(oneshot::Sender<DetectionResult>, DetectionResult)> {
    batch
        .into_par_iter()
        .map(|request| {
            let started = Instant::now();
            let detection = request.detector.run(&request.text, &request.language, &request.cancel);
            let result = DetectionResult {
                key: request.key,
                blocks: detection.blocks,
                cancelled: detection.cancelled,
                elapsed_ms: started.elapsed().as_millis() as u64,
            };
            (request.response, result)
        })
        .collect()
}
