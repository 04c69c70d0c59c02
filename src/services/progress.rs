//! Progress polling for asynchronous server-side jobs.

use crate::client::CanvasClient;
use crate::errors::{CanvasError, CanvasErrorKind, CanvasResult};
use crate::types::{Progress, WorkflowState};
use std::time::Duration;
use tracing::debug;

/// Service for progress operations.
pub struct ProgressService<'a> {
    client: &'a CanvasClient,
}

impl<'a> ProgressService<'a> {
    /// Creates a new progress service.
    pub fn new(client: &'a CanvasClient) -> Self {
        Self { client }
    }

    /// Gets the current state of a job. Never served from the cache.
    pub async fn get(&self, progress_id: u64) -> CanvasResult<Progress> {
        self.client
            .get_json_uncached(&format!("progress/{}", progress_id))
            .await
    }

    /// Polls a job until it completes.
    ///
    /// Fails with [`CanvasErrorKind::ProgressFailed`] if the job fails. The
    /// wait between polls observes the client's cancellation and deadline.
    pub async fn wait_for_completion(
        &self,
        progress_id: u64,
        poll_interval: Duration,
    ) -> CanvasResult<Progress> {
        loop {
            let progress = self.get(progress_id).await?;

            match progress.workflow_state {
                WorkflowState::Completed => return Ok(progress),
                WorkflowState::Failed => {
                    let message = progress
                        .message
                        .unwrap_or_else(|| format!("job {} failed", progress_id));
                    return Err(CanvasError::new(CanvasErrorKind::ProgressFailed, message)
                        .with_path(format!("progress/{}", progress_id)));
                }
                state => {
                    debug!(
                        progress_id,
                        state = ?state,
                        completion = progress.completion.unwrap_or(0.0),
                        "Job still running"
                    );
                    self.client.scope().sleep(poll_interval).await?;
                }
            }
        }
    }
}
