//! Cooperative cancellation between pipeline phases.

use crate::errors::ProcessError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag checked by the pipeline between phases.
///
/// Clones observe the same flag, so a caller can keep one handle and move the
/// other into a worker running the pipeline.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Work already inside a phase runs to completion.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fails with [`ProcessError::Cancelled`] if cancellation was requested
    /// before `phase` starts.
    pub fn checkpoint(&self, phase: &'static str) -> Result<(), ProcessError> {
        if self.is_cancelled() {
            tracing::debug!("cancellation observed before {phase}");
            return Err(ProcessError::Cancelled { phase });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancellationToken::new();
        let worker = token.clone();
        assert!(worker.checkpoint("load").is_ok());
        token.cancel();
        assert!(matches!(
            worker.checkpoint("remap"),
            Err(ProcessError::Cancelled { phase: "remap" })
        ));
    }
}
