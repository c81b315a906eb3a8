//! Timing constants and an async timeout helper.

use crate::error::{ProtocolError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Default timeout for one outbound request (identity service lookups)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between keepalive pings
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// How long a keepalive ping may go unanswered
pub const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Silence after which a connection is considered dead
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for graceful server shutdown
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Tick period of the authoritative context (20 ticks per second)
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Run `future`, failing with [`ProtocolError::Timeout`] after `duration`.
pub async fn with_timeout_error<F, T>(future: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_maps_to_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        };
        let err = with_timeout_error(slow, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Timeout));
    }

    #[tokio::test]
    async fn test_inner_result_passes_through() {
        let value = with_timeout_error(async { Ok(7) }, Duration::from_secs(1)).await;
        assert_eq!(value.unwrap(), 7);

        let failed: Result<()> =
            with_timeout_error(async { Err(ProtocolError::ConnectionClosed) }, DEFAULT_TIMEOUT).await;
        assert!(matches!(failed, Err(ProtocolError::ConnectionClosed)));
    }
}
