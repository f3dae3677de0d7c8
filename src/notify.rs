//! Operator notifications over Discord webhooks.
//!
//! Sends are fire-and-forget: spawned, never awaited by callers, and a
//! delivery failure only produces a warning. Both webhook URLs are
//! optional; without them every call is a no-op.

use reqwest::Client;
use serde_json::json;
use tracing::warn;

const ALERT_COLOR: u32 = 15158332; // red
const LOG_COLOR: u32 = 3447003; // blue

#[derive(Clone)]
pub struct Notifier {
    client: Client,
    alert_url: Option<String>,
    log_url: Option<String>,
}

impl Notifier {
    pub fn new(alert_url: Option<String>, log_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            alert_url,
            log_url,
        }
    }

    /// A notifier that never sends anything.
    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    /// Critical operator alert (cookie expiry, login outcomes).
    pub fn alert(&self, message: &str) {
        let Some(url) = self.alert_url.clone() else {
            return;
        };
        let body = json!({
            "embeds": [{
                "title": "Session alert",
                "description": message,
                "color": ALERT_COLOR,
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "footer": { "text": "scribdl" },
            }]
        });
        self.post(url, body);
    }

    /// Routine activity log (queue lifecycle, startup).
    pub fn log(&self, message: &str) {
        let Some(url) = self.log_url.clone() else {
            return;
        };
        let body = json!({
            "embeds": [{
                "description": message,
                "color": LOG_COLOR,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }]
        });
        self.post(url, body);
    }

    fn post(&self, url: String, body: serde_json::Value) {
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.post(&url).json(&body).send().await {
                warn!("Webhook delivery failed: {}", e);
            }
        });
    }
}
