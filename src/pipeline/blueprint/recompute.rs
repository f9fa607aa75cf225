//! Debounced background recompute of blueprints after ingestion.
//!
//! Ingests notify the worker with the exam/subject they touched. The worker
//! waits until no notification has arrived for the debounce window, then runs
//! the job once per distinct pair on the blocking pool.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type PairKey = (String, String);

/// Sender side of the recompute worker. Cheap to clone.
#[derive(Clone)]
pub struct RecomputeHandle {
    tx: mpsc::UnboundedSender<PairKey>,
}

impl RecomputeHandle {
    /// Queue a recompute. Dropped silently once the worker has stopped.
    pub fn notify(&self, exam_name: &str, subject: &str) {
        if self
            .tx
            .send((exam_name.to_string(), subject.to_string()))
            .is_err()
        {
            tracing::debug!(exam = exam_name, subject, "Recompute worker stopped");
        }
    }
}

/// Start the worker. It exits when every handle has been dropped.
pub fn spawn_recompute_worker<F>(debounce: Duration, job: F) -> (RecomputeHandle, JoinHandle<()>)
where
    F: Fn(&str, &str) + Send + Sync + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<PairKey>();
    let job = Arc::new(job);

    let task = tokio::spawn(async move {
        while let Some(first) = rx.recv().await {
            let mut pending: BTreeSet<PairKey> = BTreeSet::new();
            pending.insert(first);
            let mut closed = false;

            loop {
                match tokio::time::timeout(debounce, rx.recv()).await {
                    Ok(Some(next)) => {
                        pending.insert(next);
                    }
                    Ok(None) => {
                        closed = true;
                        break;
                    }
                    Err(_) => break,
                }
            }

            for (exam, subject) in pending {
                let job = Arc::clone(&job);
                let run = tokio::task::spawn_blocking(move || job(&exam, &subject)).await;
                if let Err(e) = run {
                    tracing::error!(error = %e, "Blueprint recompute panicked");
                }
            }

            if closed {
                break;
            }
        }
        tracing::debug!("Recompute worker finished");
    });

    (RecomputeHandle { tx }, task)
}
