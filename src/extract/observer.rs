//! Network response observer that watches for the transient download URL.
//!
//! The file URL usually shows up as a network response (PDF content type or
//! attachment disposition) before anything about it appears in the DOM, so
//! an observer is attached to the page before the first navigation.

use std::sync::{Arc, Mutex};

use chromiumoxide::cdp::browser_protocol::network::EventResponseReceived;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::debug;

/// URL substrings that suggest a download endpoint.
const URL_MARKERS: &[&str] = &["download", ".pdf", "dl.scribd"];

pub struct ResponseObserver {
    captured: Arc<Mutex<Option<String>>>,
    task: JoinHandle<()>,
}

impl ResponseObserver {
    /// Attach to `page`. Must happen before the navigation whose responses
    /// should be observed.
    pub async fn attach(page: &Page) -> Result<Self, CdpError> {
        let mut events = page.event_listener::<EventResponseReceived>().await?;

        let captured = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&captured);
        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let response = &event.response;
                let headers = serde_json::to_value(&response.headers).unwrap_or_default();
                if is_download_response(&response.url, &response.mime_type, &headers) {
                    debug!(url = %response.url, "download response observed");
                    if let Ok(mut guard) = slot.lock() {
                        *guard = Some(response.url.clone());
                    }
                }
            }
        });

        Ok(Self { captured, task })
    }

    /// The most recently captured candidate, if any.
    pub fn captured(&self) -> Option<String> {
        self.captured.lock().ok().and_then(|guard| guard.clone())
    }
}

impl Drop for ResponseObserver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A response is a download candidate when its URL looks like a download
/// endpoint and its headers say "file", not "page".
pub fn is_download_response(url: &str, mime_type: &str, headers: &serde_json::Value) -> bool {
    let url_lower = url.to_ascii_lowercase();
    if !URL_MARKERS.iter().any(|m| url_lower.contains(m)) {
        return false;
    }

    if mime_type.contains("pdf") {
        return true;
    }

    header_value(headers, "content-type")
        .map(|v| v.contains("pdf"))
        .unwrap_or(false)
        || header_value(headers, "content-disposition")
            .map(|v| v.contains("attachment"))
            .unwrap_or(false)
}

fn header_value<'a>(headers: &'a serde_json::Value, name: &str) -> Option<&'a str> {
    headers
        .as_object()?
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, value)| value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pdf_content_type_is_a_candidate() {
        let headers = json!({"Content-Type": "application/pdf"});
        assert!(is_download_response(
            "https://www.scribd.com/document_downloads/123",
            "",
            &headers
        ));
    }

    #[test]
    fn attachment_disposition_is_a_candidate() {
        let headers = json!({"content-disposition": "attachment; filename=doc.pdf"});
        assert!(is_download_response(
            "https://dl.scribd.example/x/y",
            "text/html",
            &headers
        ));
    }

    #[test]
    fn mime_type_alone_is_enough() {
        let headers = json!({});
        assert!(is_download_response(
            "https://cdn.example/file.pdf",
            "application/pdf",
            &headers
        ));
    }

    #[test]
    fn page_responses_are_not_candidates() {
        let headers = json!({"content-type": "text/html"});
        assert!(!is_download_response(
            "https://www.scribd.com/document/123",
            "text/html",
            &headers
        ));
        // URL matches but nothing says "file".
        assert!(!is_download_response(
            "https://www.scribd.com/document_downloads/123",
            "text/html",
            &headers
        ));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let headers = json!({"CONTENT-DISPOSITION": "attachment"});
        assert!(is_download_response(
            "https://x.example/download",
            "",
            &headers
        ));
    }
}
