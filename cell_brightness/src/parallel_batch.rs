// THEORY:
// Images of a batch do not depend on each other, so they can be analyzed
// concurrently. This module runs the same per-image pipeline as `batch` on a pool
// of blocking worker tasks and reassembles the results in directory order, so its
// output is identical to the sequential batch.
//
// Key architectural principles:
// 1.  **Bounded Workers**: At most `workers` images are decoded and analyzed at once
//     (default: one per logical CPU). Decoding and reduction are CPU-bound, so each
//     image runs on tokio's blocking pool rather than on the async executor.
// 2.  **Ordered Reassembly**: Results are consumed in submission order, so the
//     combined record sequence and the observer calls follow directory order even
//     when later images finish first.
// 3.  **Same Failure Policy**: Outcomes are folded into the report exactly as in the
//     sequential batch. Under `Abort` the first failure in directory order ends the
//     run; images already in flight are abandoned.

use std::path::Path;

use futures::stream::{self, StreamExt};
use log::info;

use crate::batch::{
    BatchConfig, BatchReport, ImageAnalysis, analyze_image, finish, images_for_batch,
    record_outcome,
};
use crate::error::{AnalysisError, Result};

/// Number of workers used when the caller does not choose one.
pub fn default_workers() -> usize {
    num_cpus::get().max(1)
}

/// Concurrent counterpart of [`crate::batch::process_directory`].
pub async fn process_directory_parallel<F>(
    dir: impl AsRef<Path>,
    config: &BatchConfig,
    workers: usize,
    mut observer: F,
) -> Result<BatchReport>
where
    F: FnMut(&ImageAnalysis) -> Result<()>,
{
    let images = images_for_batch(dir.as_ref())?;
    let workers = workers.max(1);
    info!("processing {} images on {} workers", images.len(), workers);

    let mut outcomes = stream::iter(images)
        .map(|path| {
            let config = config.clone();
            async move {
                let worker_path = path.clone();
                let joined =
                    tokio::task::spawn_blocking(move || analyze_image(&worker_path, &config)).await;
                (path, flatten_join(joined))
            }
        })
        .buffered(workers);

    let mut report = BatchReport::default();
    while let Some((path, outcome)) = outcomes.next().await {
        record_outcome(&mut report, path, outcome, config.failure_policy, &mut observer)?;
    }
    finish(&report);
    Ok(report)
}

fn flatten_join(
    joined: std::result::Result<Result<ImageAnalysis>, tokio::task::JoinError>,
) -> Result<ImageAnalysis> {
    joined.unwrap_or_else(|error| Err(AnalysisError::Worker(error.to_string())))
}
