//! Startup readiness probe for the local WebUI service.
//!
//! The WebUI loads models on cold start and can take minutes before its
//! API port answers. [`wait_for_service`] blocks until the service
//! responds at all; HTTP error statuses still count as reachable, only
//! network-level failures keep the probe looping.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Delay between probe attempts.
pub const PROBE_INTERVAL: Duration = Duration::from_millis(200);

/// Per-attempt request timeout.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(120);

/// Emit a "still waiting" log line every this many consecutive failures,
/// so a slow cold start does not flood the logs.
pub const LOG_EVERY_FAILURES: u32 = 15;

/// Whether the given consecutive-failure count warrants a log line.
fn should_log(failures: u32) -> bool {
    failures % LOG_EVERY_FAILURES == 0
}

/// Drive `attempt` until it succeeds, sleeping [`PROBE_INTERVAL`] between
/// failures. Any `Ok` terminates the loop. Returns the total number of
/// attempts made.
pub async fn wait_until_ready<F, Fut, E>(mut attempt: F) -> u32
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let mut failures = 0u32;

    loop {
        match attempt().await {
            Ok(()) => return failures + 1,
            Err(e) => {
                failures += 1;
                if should_log(failures) {
                    tracing::info!(failures, error = %e, "Service not ready yet, retrying");
                }
            }
        }

        tokio::time::sleep(PROBE_INTERVAL).await;
    }
}

/// Block until `GET <api_url>/sd-models` gets any HTTP response.
///
/// This is the single suspension point of the worker and runs once at
/// startup, before the job loop accepts work.
pub async fn wait_for_service(client: &reqwest::Client, api_url: &str) {
    let url = format!("{api_url}/sd-models");

    let attempts = wait_until_ready(|| {
        let client = client.clone();
        let url = url.clone();
        async move {
            client
                .get(&url)
                .timeout(PROBE_TIMEOUT)
                .send()
                .await
                .map(|_| ())
        }
    })
    .await;

    tracing::info!(attempts, url = %url, "WebUI API is reachable");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test(start_paused = true)]
    async fn immediate_success_takes_one_attempt() {
        let attempts = wait_until_ready(|| async { Ok::<(), &str>(()) }).await;
        assert_eq!(attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn n_failures_then_success_takes_n_plus_one_attempts() {
        let calls = Cell::new(0u32);
        let attempts = wait_until_ready(|| {
            let n = calls.get() + 1;
            calls.set(n);
            async move {
                if n <= 20 {
                    Err("connection refused")
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert_eq!(attempts, 21);
        assert_eq!(calls.get(), 21);
    }

    /// Twenty consecutive failures cross the logging threshold exactly
    /// once, at the fifteenth failure.
    #[test]
    fn twenty_failures_log_exactly_once() {
        let logged: Vec<u32> = (1..=20).filter(|&n| should_log(n)).collect();
        assert_eq!(logged, vec![15]);
    }

    #[test]
    fn thirty_failures_log_twice() {
        let logged: Vec<u32> = (1..=30).filter(|&n| should_log(n)).collect();
        assert_eq!(logged, vec![15, 30]);
    }
}
