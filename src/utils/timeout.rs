//! Async timeout wrappers.

use crate::error::{ProtocolError, Result};
use std::future::Future;
use std::time::Duration;

/// Default bound for a single transport write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default wait for the session challenge after START_SESSION.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait between history boundaries. Segments can take a while to stream.
pub const DEFAULT_BOUNDARY_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval between battery level requests.
pub const BATTERY_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Run `future` with a deadline, mapping expiry to [`ProtocolError::Timeout`].
pub async fn with_timeout_error<F, T>(future: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}

/// Run `future` with a deadline, returning `None` on expiry.
pub async fn with_timeout<F, T>(future: F, duration: Duration) -> Option<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future).await.ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expiry_maps_to_timeout() {
        let result: Result<()> = with_timeout_error(
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            },
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(ProtocolError::Timeout)));
    }

    #[tokio::test]
    async fn completed_future_passes_through() {
        assert_eq!(with_timeout(async { 7 }, Duration::from_secs(1)).await, Some(7));
    }
}
