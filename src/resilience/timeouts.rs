//! Timeout and cancellation enforcement.
//!
//! # Responsibilities
//! - Wrap every transport attempt with a deadline
//! - Race attempts and inter-attempt waits against the caller's cancellation
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors (and retriable)
//! - Cancellation wins ties: a cancelled call never reports a late result

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::TransportError;

/// Bound `attempt` by `deadline` and by `cancel`.
pub async fn guarded<F, T>(deadline: Duration, cancel: &CancellationToken, attempt: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransportError::Cancelled),
        result = tokio::time::timeout(deadline, attempt) => match result {
            Ok(outcome) => outcome,
            Err(_) => Err(TransportError::Timeout(deadline)),
        },
    }
}

/// Sleep for `delay` unless cancelled first. Returns false when cancelled.
pub async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_maps_to_timeout() {
        let cancel = CancellationToken::new();
        let result: Result<(), _> = guarded(Duration::from_millis(50), &cancel, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(TransportError::Timeout(Duration::from_millis(50))));
    }

    #[tokio::test]
    async fn test_cancel_wins() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = guarded(Duration::from_secs(1), &cancel, async { Ok(1) }).await;
        assert_eq!(result, Err(TransportError::Cancelled));
        assert!(!pause(Duration::from_secs(1), &cancel).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_elapses() {
        let cancel = CancellationToken::new();
        assert!(pause(Duration::from_millis(10), &cancel).await);
        assert!(pause(Duration::ZERO, &cancel).await);
    }
}
