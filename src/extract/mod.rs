//! Download URL extraction.
//!
//! The document page's download control is unstable in markup, wording and
//! request pattern, so resolution is a layered fallback chain that
//! short-circuits on the first stage to produce a URL:
//!
//! 1. the well-known download endpoint, with a network observer catching
//!    the file response (an aborted navigation here means the transfer
//!    started and is treated as success);
//! 2. the document page: strip consent overlays, find and activate a
//!    control whose text contains "Download";
//! 3. after activation: observer poll, DOM scan for link-like attributes,
//!    raw-HTML sweep, then an exact-text in-modal control and a re-poll;
//! 4. diagnostic snapshot and failure.

mod observer;

pub use observer::{is_download_response, ResponseObserver};

use std::time::{Duration, Instant};

use chromiumoxide::Page;
use regex::Regex;
use tracing::{debug, info};

use crate::browser::nav::{self, Navigation};
use crate::browser::{self, BrowserHandle};
use crate::config::Settings;
use crate::error::ExtractError;

const BASE_URL: &str = "https://www.scribd.com";

/// CDN host marker seen in resolved file URLs.
const CDN_MARKER: &str = "dl.scribd";

pub fn document_url(document_id: &str) -> String {
    format!("{BASE_URL}/document/{document_id}/")
}

pub fn direct_download_url(document_id: &str) -> String {
    format!("{BASE_URL}/document_downloads/{document_id}?extension=pdf&from=download_page")
}

/// Pull the numeric document id out of a pasted link, or accept a bare id.
pub fn parse_document_id(input: &str) -> Option<String> {
    let re = Regex::new(r"/document/(\d+)").unwrap();
    if let Some(caps) = re.captures(input) {
        return Some(caps[1].to_string());
    }

    let trimmed = input.trim();
    (!trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()))
        .then(|| trimmed.to_string())
}

/// Relative URLs from DOM attributes are resolved against the site root.
pub fn normalize_url(url: &str) -> String {
    if url.starts_with("http") {
        url.to_string()
    } else {
        format!("{BASE_URL}{url}")
    }
}

/// Server-side sweep of rendered HTML for a link that looks like the file
/// URL. Covers markup the in-page queries miss, including URLs buried in
/// inline script blobs.
pub fn scan_html(html: &str) -> Option<String> {
    let document = scraper::Html::parse_document(html);
    let selector = scraper::Selector::parse("a[href], [data-download-url], [data-href]").unwrap();

    for element in document.select(&selector) {
        let candidate = element
            .value()
            .attr("data-download-url")
            .or_else(|| element.value().attr("data-href"))
            .or_else(|| element.value().attr("href"))
            .unwrap_or("");
        if candidate.is_empty() {
            continue;
        }
        let lower = candidate.to_ascii_lowercase();
        if lower.contains("/download") || lower.contains(".pdf") || lower.contains(CDN_MARKER) {
            return Some(candidate.to_string());
        }
    }

    let re = Regex::new(r#"https://[^"'\s]*(?:download|dl\.scribd)[^"'\s]*"#).unwrap();
    re.find(html).map(|m| m.as_str().to_string())
}

/// Resolves document ids against an authenticated browser session.
pub struct DownloadExtractor<'a> {
    browser: &'a BrowserHandle,
    settings: &'a Settings,
}

impl<'a> DownloadExtractor<'a> {
    pub fn new(browser: &'a BrowserHandle, settings: &'a Settings) -> Self {
        Self { browser, settings }
    }

    /// Resolve `document_id` to a transient download URL.
    pub async fn extract(&self, document_id: &str) -> Result<String, ExtractError> {
        let page = self.browser.new_page().await?;

        let result = self.extract_on(&page, document_id).await;
        if result.is_err() {
            browser::dump_page(&page, &self.settings.diagnostics_dir(), "extract-failed").await;
        }
        let _ = page.close().await;
        result
    }

    async fn extract_on(&self, page: &Page, document_id: &str) -> Result<String, ExtractError> {
        // The observer must exist before any navigation so the very first
        // response can be captured.
        let observer = ResponseObserver::attach(page).await?;
        let nav_timeout = self.settings.browser.nav_timeout;

        // Stage 1: the well-known download endpoint.
        let direct = direct_download_url(document_id);
        info!(url = %direct, "Trying direct download endpoint");
        let outcome = nav::navigate(page, &direct, nav_timeout).await?;
        if outcome == Navigation::AbortedByTransfer {
            debug!("Navigation aborted by transfer, polling observer");
            if let Some(url) = poll_observer(&observer, Duration::from_secs(2)).await {
                info!("Direct endpoint resolved the download URL");
                return Ok(normalize_url(&url));
            }
        }
        if let Some(url) = observer.captured() {
            info!("Direct endpoint resolved the download URL");
            return Ok(normalize_url(&url));
        }

        // Stage 2: the document page and its download control.
        info!("Falling back to the document page");
        nav::navigate(page, &document_url(document_id), nav_timeout).await?;
        dismiss_consent_overlays(page).await;

        let control_timeout = self.settings.browser.element_timeout * 5;
        if !click_download_control(page, control_timeout).await {
            return Err(ExtractError::NoDownloadControl);
        }
        // Give the modal and the requests it fires a moment.
        nav::pace(3000, 0).await;

        // Stage 3: observer first, then the DOM, then the in-modal control.
        if let Some(url) = observer.captured() {
            return Ok(normalize_url(&url));
        }
        if let Some(url) = scan_dom_for_link(page).await {
            debug!("Download URL found in the DOM");
            return Ok(normalize_url(&url));
        }
        if let Ok(content) = page.content().await {
            if let Some(url) = scan_html(&content) {
                debug!("Download URL recovered from raw page HTML");
                return Ok(normalize_url(&url));
            }
        }
        if click_modal_download(page).await {
            debug!("Clicked in-modal download control");
            if let Some(url) = poll_observer(&observer, Duration::from_secs(5)).await {
                return Ok(normalize_url(&url));
            }
            if let Some(url) = scan_dom_for_link(page).await {
                return Ok(normalize_url(&url));
            }
        }

        Err(ExtractError::NoUrlResolved)
    }
}

async fn poll_observer(observer: &ResponseObserver, window: Duration) -> Option<String> {
    let deadline = Instant::now() + window;
    loop {
        if let Some(url) = observer.captured() {
            return Some(url);
        }
        if Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

/// Best-effort removal of cookie-consent overlays. They are matched by
/// attribute and text content because their markup varies; absence is fine.
async fn dismiss_consent_overlays(page: &Page) {
    const SCRIPT: &str = r#"
        (() => {
            document.querySelectorAll('[class*="osano"]').forEach(el => el.remove());
            const containers = document.querySelectorAll(
                '[id*="cookie"], [class*="cookie"], [id*="consent"], [class*="consent"]');
            containers.forEach(el => {
                const text = el.textContent.toLowerCase();
                if (text.includes('cookie') || text.includes('privacy')) {
                    el.remove();
                }
            });
        })()
    "#;

    nav::pace(2000, 0).await;
    if let Err(e) = page.evaluate(SCRIPT.to_string()).await {
        debug!("Consent overlay removal skipped: {}", e);
    }
}

/// Find and activate a visible control whose text contains "Download",
/// looking across both buttons and links. Polls because the control is
/// often rendered late.
async fn click_download_control(page: &Page, timeout: Duration) -> bool {
    const SCRIPT: &str = r#"
        (() => {
            const els = Array.from(document.querySelectorAll('button, a'));
            const control = els.find(el =>
                el.offsetParent !== null && el.textContent.includes('Download'));
            if (control) { control.click(); return true; }
            return false;
        })()
    "#;

    let deadline = Instant::now() + timeout;
    loop {
        if eval_bool(page, SCRIPT).await {
            info!("Download control activated");
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

/// Secondary control inside the download modal: exact text "download",
/// case-insensitive, to avoid matching navigation items.
async fn click_modal_download(page: &Page) -> bool {
    const SCRIPT: &str = r#"
        (() => {
            const els = Array.from(document.querySelectorAll('button, a, div[role="button"]'));
            const control = els.find(el =>
                el.offsetParent !== null &&
                el.textContent.trim().toLowerCase() === 'download');
            if (control) { control.click(); return true; }
            return false;
        })()
    "#;

    eval_bool(page, SCRIPT).await
}

async fn scan_dom_for_link(page: &Page) -> Option<String> {
    const SCRIPT: &str = r#"
        (() => {
            const selectors = [
                'a[href*="/download/"]',
                'a[href*=".pdf"]',
                'a[href*="dl.scribd"]',
                'button[data-url*="download"]',
                '[data-download-url]'
            ];
            for (const selector of selectors) {
                const el = document.querySelector(selector);
                if (el) {
                    const href = el.getAttribute('href')
                        || el.getAttribute('data-url')
                        || el.getAttribute('data-download-url');
                    if (href) return href;
                }
            }
            return null;
        })()
    "#;

    page.evaluate(SCRIPT.to_string())
        .await
        .ok()
        .and_then(|result| result.into_value::<Option<String>>().ok())
        .flatten()
}

async fn eval_bool(page: &Page, script: &str) -> bool {
    page.evaluate(script.to_string())
        .await
        .ok()
        .and_then(|result| result.into_value::<bool>().ok())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_document_links() {
        assert_eq!(
            parse_document_id("https://www.scribd.com/document/123456789/some-title"),
            Some("123456789".to_string())
        );
        assert_eq!(
            parse_document_id("https://www.scribd.com/document/42"),
            Some("42".to_string())
        );
    }

    #[test]
    fn accepts_bare_numeric_ids() {
        assert_eq!(parse_document_id("123456789"), Some("123456789".to_string()));
        assert_eq!(parse_document_id("  42  "), Some("42".to_string()));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_document_id("https://example.com/"), None);
        assert_eq!(parse_document_id("not-a-link"), None);
        assert_eq!(parse_document_id(""), None);
    }

    #[test]
    fn normalizes_relative_urls() {
        assert_eq!(
            normalize_url("/download/123?token=x"),
            "https://www.scribd.com/download/123?token=x"
        );
        assert_eq!(
            normalize_url("https://dl.scribd.example/f.pdf"),
            "https://dl.scribd.example/f.pdf"
        );
    }

    #[test]
    fn scans_anchors_for_download_links() {
        let html = r#"<html><body>
            <a href="/about">About</a>
            <a href="https://dl.scribd.example/document/123/file.pdf">get it</a>
        </body></html>"#;
        assert_eq!(
            scan_html(html),
            Some("https://dl.scribd.example/document/123/file.pdf".to_string())
        );
    }

    #[test]
    fn scans_data_attributes() {
        let html = r#"<div data-download-url="/download/99?sig=abc">download</div>"#;
        assert_eq!(scan_html(html), Some("/download/99?sig=abc".to_string()));
    }

    #[test]
    fn scans_inline_script_blobs() {
        let html = r#"<script>var u = "https://www.scribd.com/document_downloads/7?download=1";</script>"#;
        assert_eq!(
            scan_html(html),
            Some("https://www.scribd.com/document_downloads/7?download=1".to_string())
        );
    }

    #[test]
    fn scan_finds_nothing_on_plain_pages() {
        let html = r#"<html><body><a href="/home">home</a><p>text</p></body></html>"#;
        assert_eq!(scan_html(html), None);
    }
}
