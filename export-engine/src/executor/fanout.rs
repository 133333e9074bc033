//! Bounded fan-out of independent tasks.
//!
//! Every item is run on its own tokio task. A failure or panic in one item
//! becomes that item's result; siblings are never cancelled and the batch
//! always yields exactly one outcome per input, in input order.

use crate::executor::progress::Progress;
use crate::utils::errors::ExportError;
use futures_util::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Result of running a single item.
#[derive(Debug)]
pub struct TaskOutcome<R> {
    pub label: String,
    /// The handler's value, or the fault that stopped it.
    pub result: Result<R, ExportError>,
    /// Everything the handler wrote to its progress sink.
    pub log: String,
}

impl<R> TaskOutcome<Result<R, ExportError>> {
    /// Merge a handler's own error with a runtime fault.
    pub fn flatten(self) -> Result<R, ExportError> {
        self.result.and_then(|r| r)
    }
}

/// Runs a batch of handlers with an optional concurrency cap.
#[derive(Debug, Clone)]
pub struct FanOut {
    operation: &'static str,
    limit: usize,
}

impl FanOut {
    /// New unbounded fan-out; `operation` prefixes every item label.
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            limit: 0,
        }
    }

    /// Cap the number of concurrently running handlers. 0 means unbounded.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub async fn run<T, R, L, F, Fut>(&self, items: Vec<T>, label: L, handler: F) -> Vec<TaskOutcome<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        L: Fn(&T) -> String,
        F: Fn(T, Progress) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let semaphore = (self.limit > 0).then(|| Arc::new(Semaphore::new(self.limit)));
        let handler = Arc::new(handler);

        debug!(
            operation = self.operation,
            items = items.len(),
            limit = self.limit,
            "Starting fan-out"
        );

        let mut sinks = Vec::with_capacity(items.len());
        let mut handles = Vec::with_capacity(items.len());

        for item in items {
            let progress = Progress::new(format!("[{} {:?}]", self.operation, label(&item)));
            sinks.push(progress.clone());

            let semaphore = semaphore.clone();
            let handler = Arc::clone(&handler);

            handles.push(tokio::spawn(async move {
                // Held until the handler returns.
                let _permit = match semaphore {
                    Some(sem) => {
                        progress.line("waiting");
                        Some(sem.acquire_owned().await.map_err(|_| ExportError::Cancelled)?)
                    }
                    None => None,
                };
                Ok::<R, ExportError>((*handler)(item, progress).await)
            }));
        }

        join_all(handles)
            .await
            .into_iter()
            .zip(sinks)
            .map(|(joined, progress)| {
                let result = joined.map_err(ExportError::from).and_then(|r| r);
                match &result {
                    Ok(_) => progress.line("done"),
                    Err(err) => {
                        warn!(item = %progress.label(), error = %err, "Task did not complete");
                        progress.line(err);
                    }
                }
                TaskOutcome {
                    label: progress.label().to_string(),
                    result,
                    log: progress.contents(),
                }
            })
            .collect()
    }
}
