//! Navigation and element-discovery helpers.
//!
//! The target site's markup is not under our control, so element discovery
//! works through ordered selector candidates with bounded waits, and
//! navigation outcomes distinguish "the server started a file transfer"
//! from actual failure.

use std::time::{Duration, Instant};

use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use rand::Rng;
use tracing::debug;

/// How often element polls re-check the page.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Outcome of a navigation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// The load settled normally.
    Completed,
    /// The load did not settle within the allotted time; the page may still
    /// be usable, so callers inspect the URL instead of failing.
    TimedOut,
    /// Chrome aborted the navigation because the server answered with a
    /// file transfer instead of a page.
    AbortedByTransfer,
}

/// Navigate with a bounded wait, classifying the outcome.
pub async fn navigate(page: &Page, url: &str, timeout: Duration) -> Result<Navigation, CdpError> {
    match tokio::time::timeout(timeout, page.goto(url)).await {
        Ok(Ok(_)) => Ok(Navigation::Completed),
        Ok(Err(e)) if is_aborted(&e) => Ok(Navigation::AbortedByTransfer),
        Ok(Err(e)) => Err(e),
        Err(_) => {
            debug!(url, "navigation did not settle in time");
            Ok(Navigation::TimedOut)
        }
    }
}

/// net::ERR_ABORTED surfaces when a download supplants the navigation.
fn is_aborted(err: &CdpError) -> bool {
    err.to_string().contains("ERR_ABORTED")
}

/// Wait for the next navigation to settle; a timeout is tolerated and the
/// caller decides based on the resulting URL.
pub async fn settle(page: &Page, timeout: Duration) {
    if tokio::time::timeout(timeout, page.wait_for_navigation())
        .await
        .is_err()
    {
        debug!("navigation wait timed out, continuing with URL inspection");
    }
}

/// Poll for a selector until it appears or the timeout elapses.
pub async fn wait_for_element(page: &Page, selector: &str, timeout: Duration) -> Option<Element> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(element) = page.find_element(selector).await {
            return Some(element);
        }
        if Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Try an ordered list of selector candidates, returning the first that
/// matches within its per-candidate timeout.
pub async fn find_first(
    page: &Page,
    candidates: &[&str],
    per_candidate: Duration,
) -> Option<(String, Element)> {
    for selector in candidates {
        if let Some(element) = wait_for_element(page, selector, per_candidate).await {
            debug!(%selector, "candidate matched");
            return Some((selector.to_string(), element));
        }
    }
    None
}

/// Sleep for `base_ms` plus up to `jitter_ms` extra. Human-pacing for form
/// interaction; best-effort evasion, not a correctness requirement.
pub async fn pace(base_ms: u64, jitter_ms: u64) {
    let extra = if jitter_ms == 0 {
        0
    } else {
        rand::rng().random_range(0..jitter_ms)
    };
    tokio::time::sleep(Duration::from_millis(base_ms + extra)).await;
}

/// Type text one key at a time with randomized delays.
pub async fn type_slowly(element: &Element, text: &str) -> Result<(), CdpError> {
    for ch in text.chars() {
        element.press_key(ch.to_string()).await?;
        pace(60, 40).await;
    }
    Ok(())
}

/// Current page URL, or empty if unavailable.
pub async fn current_url(page: &Page) -> String {
    page.url().await.ok().flatten().unwrap_or_default()
}
