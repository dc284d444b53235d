//! Fan-in of concurrent queries
//!
//! A [`QueryGroup`] spawns each query on its own task and hands back a
//! [`QueryFuture`]. The driver awaits the futures it cares about; the group
//! owns cancellation of everything it spawned and keeps a record of the
//! queries that failed.

use super::QueryResult;
use crate::error::{SourceError, SourceResult};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Tracks a set of outstanding queries.
#[derive(Debug)]
pub struct QueryGroup {
    cancel: CancellationToken,
    errors: Arc<Mutex<Vec<(String, SourceError)>>>,
}

impl QueryGroup {
    /// Create a group whose queries stop when `parent` is cancelled.
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            cancel: parent.child_token(),
            errors: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Run `query` on a new task.
    pub fn spawn<F>(&self, label: impl Into<String>, query: F) -> QueryFuture
    where
        F: Future<Output = SourceResult<Vec<QueryResult>>> + Send + 'static,
    {
        let label = label.into();
        let token = self.cancel.clone();
        let errors = Arc::clone(&self.errors);
        let task_label = label.clone();

        let handle = tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(SourceError::Cancelled),
                result = query => result,
            };

            if let Err(err) = &result {
                debug!(query = %task_label, error = %err, "Query failed");
                errors
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push((task_label, err.clone()));
            }
            result
        });

        QueryFuture { label, handle }
    }

    /// Cancel every query still running.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Failures recorded so far, labelled by query.
    pub fn errors(&self) -> Vec<(String, SourceError)> {
        self.errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Drop for QueryGroup {
    fn drop(&mut self) {
        // Abandoned queries should not outlive the phase that issued them
        self.cancel.cancel();
    }
}

/// Handle to a query running inside a [`QueryGroup`].
#[derive(Debug)]
pub struct QueryFuture {
    label: String,
    handle: JoinHandle<SourceResult<Vec<QueryResult>>>,
}

impl QueryFuture {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Wait for the query to finish.
    pub async fn await_result(self) -> SourceResult<Vec<QueryResult>> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(SourceError::Cancelled),
            Err(err) => Err(SourceError::TaskFailed(err.to_string())),
        }
    }
}
