//! Bounded polling for the `wait` and `waitForUrl` commands.
//!
//! Each primitive sleeps, evaluates its predicate, and repeats until the
//! predicate holds or the retry budget is spent. The first evaluation happens
//! after the first delay, and a budget of `retries` allows `retries + 1`
//! evaluations: the final check is made when the counter has already reached
//! zero. There is no way to cancel a poll once started.

use std::future::Future;

use thiserror::Error;
use tracing::trace;

use crate::dom::{compile_pattern, find_by_text, DocumentQuery, DomError};

/// Source of the delay between polls.
pub trait Timer {
    type Sleep: Future<Output = ()>;

    fn sleep(&self, ms: u32) -> Self::Sleep;
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PollError {
    #[error("Condition not met after {attempts} attempts")]
    Exhausted { attempts: u32 },
    #[error(transparent)]
    Dom(#[from] DomError),
}

/// Number of times a predicate is evaluated before a poll with `retries`
/// retries gives up.
pub const fn max_evaluations(retries: u32) -> u32 {
    retries.saturating_add(1)
}

/// Polls `predicate` every `delay_ms` until it returns `Ok(true)`.
///
/// Returns the 1-based attempt on which the predicate held. A predicate error
/// ends the poll immediately.
pub async fn poll_until<T, F>(
    timer: &T,
    delay_ms: u32,
    retries: u32,
    mut predicate: F,
) -> Result<u32, PollError>
where
    T: Timer,
    F: FnMut() -> Result<bool, DomError>,
{
    let attempts = max_evaluations(retries);
    for attempt in 1..=attempts {
        timer.sleep(delay_ms).await;
        if predicate()? {
            return Ok(attempt);
        }
        trace!(attempt, attempts, "condition not met yet");
    }
    Err(PollError::Exhausted { attempts })
}

pub async fn wait_for_element<D, T>(
    document: &D,
    timer: &T,
    selector: &str,
    delay_ms: u32,
    retries: u32,
) -> Result<u32, PollError>
where
    D: DocumentQuery,
    T: Timer,
{
    poll_until(timer, delay_ms, retries, || {
        Ok(document.query_selector(selector)?.is_some())
    })
    .await
}

/// Waits until some `<tag>` element's trimmed text matches `pattern`.
pub async fn wait_for_element_with_text<D, T>(
    document: &D,
    timer: &T,
    tag: &str,
    pattern: &str,
    delay_ms: u32,
    retries: u32,
) -> Result<u32, PollError>
where
    D: DocumentQuery,
    T: Timer,
{
    let regex = compile_pattern(pattern)?;
    poll_until(timer, delay_ms, retries, || {
        Ok(find_by_text(document, tag, &regex).is_some())
    })
    .await
}

pub async fn wait_for_url<D, T>(
    document: &D,
    timer: &T,
    url_pattern: &str,
    delay_ms: u32,
    retries: u32,
) -> Result<u32, PollError>
where
    D: DocumentQuery,
    T: Timer,
{
    let regex = compile_pattern(url_pattern)?;
    poll_until(timer, delay_ms, retries, || {
        Ok(regex.is_match(&document.current_url()?))
    })
    .await
}
