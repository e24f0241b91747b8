use std::future::Future;
use std::time::Duration;

use tracewalk_core::error::{Result, TracewalkError};

/// Await an oracle call, failing with `OracleTimeout` once `limit` elapses.
pub(crate) async fn within<T>(
    oracle: &str,
    limit: Option<Duration>,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    let Some(limit) = limit else {
        return call.await;
    };

    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| TracewalkError::OracleTimeout {
            oracle: oracle.to_string(),
            timeout_secs: limit.as_secs(),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_result_through() {
        let value = within("execution", Some(Duration::from_secs(1)), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let err = within::<()>(
            "evaluation",
            Some(Duration::from_secs(3)),
            futures::future::pending(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            TracewalkError::OracleTimeout { ref oracle, timeout_secs: 3 } if oracle == "evaluation"
        ));
    }
}
