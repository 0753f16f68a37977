//! Bounded retry with linear backoff
//!
//! ```rust,ignore
//! let records = retry(
//!     || resolver.lookup(fqdn, RecordType::A),
//!     5,
//!     Some(&|e: &DnsLookupError| e.is_retryable()),
//!     Duration::from_millis(1000),
//! )
//! .await?;
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Predicate deciding whether an error is worth another attempt
pub type RetryPredicate<'a, E> = &'a (dyn Fn(&E) -> bool + Send + Sync);

/// Run `operation` until it succeeds or `max_retries` retries are used up
///
/// After the n-th failure the caller sleeps `backoff * n` before the next
/// attempt, so at most `max_retries + 1` attempts are made. When `should_retry`
/// is given and returns `false` for an error, that error is returned
/// immediately. On exhaustion the last error is returned.
pub async fn retry<T, E, F, Fut>(
    mut operation: F,
    max_retries: u32,
    should_retry: Option<RetryPredicate<'_, E>>,
    backoff: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if let Some(predicate) = should_retry {
                    if !predicate(&e) {
                        return Err(e);
                    }
                }

                attempt += 1;
                if attempt > max_retries {
                    return Err(e);
                }

                debug!("{}, retrying... (attempt {} of {})", e, attempt, max_retries);
                tokio::time::sleep(backoff * attempt).await;
            }
        }
    }
}
