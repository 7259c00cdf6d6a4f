// src/proxy/dial.rs

use std::time::Duration;

use tracing::{debug, trace};

/// Bounded retry for reaching the application.
///
/// Covers the window after a background server was killed and respawned
/// but has not bound its socket yet. Only connection failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for DialPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 500,
            interval: Duration::from_millis(10),
        }
    }
}

impl DialPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }
}

/// Send the request produced by `build`, rebuilding and resending it while
/// the connection is refused, up to `policy.max_attempts` sends in total.
///
/// Returns the last error once the budget is spent, or immediately for any
/// error that is not a connection failure.
pub async fn send_with_retry<F>(
    policy: &DialPolicy,
    mut build: F,
) -> Result<reqwest::Response, reqwest::Error>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match build().send().await {
            Ok(resp) => {
                if attempt > 1 {
                    debug!(attempt, "application reachable again");
                }
                return Ok(resp);
            }
            Err(err) if err.is_connect() && attempt < max_attempts => {
                trace!(attempt, error = %err, "dial failed; retrying");
                tokio::time::sleep(policy.interval).await;
                attempt += 1;
            }
            Err(err) => {
                debug!(attempt, error = %err, "giving up on dial");
                return Err(err);
            }
        }
    }
}
