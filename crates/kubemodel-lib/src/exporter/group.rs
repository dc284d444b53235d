use super::controller::ComputeExportController;
use super::source::ExportSummary;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Starts and stops a set of controllers together. Each controller runs
/// on its own task and ticks independently.
pub struct ComputeExportControllerGroup<T> {
    controllers: Vec<Arc<ComputeExportController<T>>>,
    running: Option<Running>,
}

struct Running {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl<T> std::fmt::Debug for ComputeExportControllerGroup<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeExportControllerGroup")
            .field("controllers", &self.controllers)
            .field("running", &self.running.is_some())
            .finish()
    }
}

impl<T> ComputeExportControllerGroup<T>
where
    T: ExportSummary + Send + Sync + 'static,
{
    pub fn new(controllers: Vec<ComputeExportController<T>>) -> Self {
        Self {
            controllers: controllers.into_iter().map(Arc::new).collect(),
            running: None,
        }
    }

    pub fn controllers(&self) -> &[Arc<ComputeExportController<T>>] {
        &self.controllers
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Spawn one ticking task per controller. Returns false when the group
    /// is already running.
    pub fn start(&mut self, interval: Duration) -> bool {
        if self.running.is_some() {
            warn!("Export controller group already started");
            return false;
        }

        let cancel = CancellationToken::new();
        let handles = self
            .controllers
            .iter()
            .map(|controller| tokio::spawn(Arc::clone(controller).run(interval, cancel.child_token())))
            .collect();

        info!(
            controllers = self.controllers.len(),
            interval_secs = interval.as_secs(),
            "Started export controller group"
        );
        self.running = Some(Running { cancel, handles });
        true
    }

    /// Cancel every controller and wait for their tasks to finish.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        running.cancel.cancel();
        for handle in running.handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "Export controller task failed");
            }
        }
        info!("Stopped export controller group");
    }
}
