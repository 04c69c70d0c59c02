//! Caller-supplied cancellation and deadline for one logical call.

use crate::errors::{CanvasError, CanvasResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation token plus optional deadline observed by every suspension
/// point of a call.
#[derive(Debug, Clone, Default)]
pub struct CallScope {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallScope {
    /// Creates a scope that is never cancelled and has no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scope bound to the given token.
    pub fn with_token(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Returns a copy with the given deadline.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Returns a copy with a deadline `timeout` from now.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.deadline(Instant::now() + timeout)
    }

    /// Gets the cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Gets the deadline.
    pub fn deadline_at(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails fast if the scope is already cancelled or past its deadline.
    pub fn check(&self) -> CanvasResult<()> {
        if self.cancel.is_cancelled() {
            return Err(CanvasError::cancelled());
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(CanvasError::deadline_exceeded());
            }
        }
        Ok(())
    }

    /// Runs `fut` until it completes, the token fires, or the deadline passes.
    pub async fn run<F, T>(&self, fut: F) -> CanvasResult<T>
    where
        F: Future<Output = CanvasResult<T>>,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CanvasError::cancelled()),
            _ = deadline => Err(CanvasError::deadline_exceeded()),
            result = fut => result,
        }
    }

    /// Sleeps for `duration` unless interrupted.
    pub async fn sleep(&self, duration: Duration) -> CanvasResult<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}
