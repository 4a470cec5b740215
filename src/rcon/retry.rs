use std::future::Future;
use std::time::Duration;

use log::warn;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::GameServerError;

/// Upper bounds of the default randomized backoff, in milliseconds.
const DEFAULT_BOUNDS_MS: [u64; 3] = [1000, 3000, 5000];

/// Ordered backoff delays, one per retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySpec {
    delays: Vec<Duration>,
}

impl RetrySpec {
    pub fn new(delays: Vec<Duration>) -> Self {
        RetrySpec { delays }
    }

    /// Never retry.
    pub fn none() -> Self {
        RetrySpec { delays: Vec::new() }
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    /// Number of retries after the first attempt.
    pub fn retries(&self) -> usize {
        self.delays.len()
    }
}

/// Three randomized delays, under 1s, 3s and 5s.
impl Default for RetrySpec {
    fn default() -> Self {
        let mut rng = rand::thread_rng();
        let delays: Vec<Duration> = DEFAULT_BOUNDS_MS
            .iter()
            .map(|bound| Duration::from_millis(rng.gen_range(0..*bound)))
            .collect();
        RetrySpec { delays }
    }
}

/// Run `op` until it succeeds or `spec` runs out of delays.
///
/// Any error is retried. The last error is returned once every delay has
/// been used, so `op` runs at most `spec.retries() + 1` times. The calling
/// task waits through the whole backoff; cancelling `cancel` cuts it short.
pub async fn retry<T, F, Fut>(
    spec: &RetrySpec,
    cancel: &CancellationToken,
    what: &str,
    mut op: F,
) -> Result<T, GameServerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GameServerError>>,
{
    let mut attempt: usize = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(GameServerError::Cancelled);
        }

        let err: GameServerError = match op().await {
            Ok(value) => return Ok(value),
            Err(GameServerError::Cancelled) => return Err(GameServerError::Cancelled),
            Err(e) => e,
        };

        let Some(delay) = spec.delays.get(attempt) else {
            return Err(err);
        };
        attempt += 1;
        warn!(
            "{what} failed: {err}; retry {attempt} of {} in {delay:?}",
            spec.retries()
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(GameServerError::Cancelled),
            _ = tokio::time::sleep(*delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn refused() -> GameServerError {
        GameServerError::SendError(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
    }

    #[tokio::test]
    async fn exhausts_every_delay_then_fails() {
        let spec: RetrySpec = RetrySpec::new(vec![Duration::ZERO; 3]);
        let cancel: CancellationToken = CancellationToken::new();
        let mut calls: usize = 0;

        let result: Result<(), GameServerError> = retry(&spec, &cancel, "status", || {
            calls += 1;
            async { Err(refused()) }
        })
        .await;

        assert!(matches!(result, Err(GameServerError::SendError(_))));
        assert_eq!(calls, 4);
    }

    #[tokio::test]
    async fn stops_on_first_success() {
        let spec: RetrySpec = RetrySpec::new(vec![Duration::ZERO; 3]);
        let cancel: CancellationToken = CancellationToken::new();
        let mut calls: usize = 0;

        let result: Result<usize, GameServerError> = retry(&spec, &cancel, "status", || {
            calls += 1;
            let current: usize = calls;
            async move {
                if current < 2 {
                    Err(refused())
                } else {
                    Ok(current)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn cancellation_cuts_backoff_short() {
        let spec: RetrySpec = RetrySpec::new(vec![Duration::from_secs(60)]);
        let cancel: CancellationToken = CancellationToken::new();

        let trigger: CancellationToken = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            retry(&spec, &cancel, "status", || async { Err::<(), _>(refused()) }),
        )
        .await
        .expect("backoff was not cancelled");

        assert!(matches!(result, Err(GameServerError::Cancelled)));
    }

    #[test]
    fn default_delays_stay_under_bounds() {
        let spec: RetrySpec = RetrySpec::default();
        assert_eq!(spec.retries(), 3);
        for (delay, bound) in spec.delays().iter().zip(DEFAULT_BOUNDS_MS) {
            assert!(*delay < Duration::from_millis(bound));
        }
    }
}
