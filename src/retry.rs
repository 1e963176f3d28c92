//! Transaction retry wrapper
//!
//! Issuance and claim writes are stateless per call and safe to retry in
//! full; on a busy/locked conflict the whole operation (lookup, increment,
//! claim write) runs again with doubling backoff up to a hard attempt cap.

use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::error::ClaimsError;

/// Backoff policy for transient storage conflicts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Hard cap on attempts; the final error is re-raised on exhaustion
    pub max_attempts: u32,
    /// First delay; doubles after every failed attempt
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 10,
        }
    }
}

/// Run `op`, retrying transient conflicts per the policy.
///
/// Fatal errors (configuration/data problems, authorization) are returned
/// on the first occurrence.
pub fn with_retry<T, F>(policy: &RetryPolicy, mut op: F) -> Result<T, ClaimsError>
where
    F: FnMut() -> Result<T, ClaimsError>,
{
    let mut delay = Duration::from_millis(policy.base_delay_ms);
    let mut attempt: u32 = 1;

    loop {
        match op() {
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                warn!(attempt, error = %e, "Transient conflict, retrying");
                thread::sleep(delay);
                delay *= 2;
                attempt += 1;
            }
            other => return other,
        }
    }
}
