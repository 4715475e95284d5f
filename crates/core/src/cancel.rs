//! Cancellation of network-bound verification steps.

use std::future::Future;

pub use tokio_util::sync::CancellationToken;

use crate::error::{Result, VerifyError};

/// Run `fut` until it completes or `cancel` fires, whichever comes first.
///
/// A cancelled future is dropped, which aborts any in-flight request it owns.
pub async fn run_cancellable<T, F>(
    cancel: &CancellationToken,
    operation: &'static str,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(VerifyError::Cancelled { operation });
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!(operation, "Cancelled");
            Err(VerifyError::Cancelled { operation })
        }
        res = fut => res,
    }
}
