//! Web front end: submit form, queue polling API, result pages.
//!
//! Thin glue over the core: handlers only read/write the queue, cache,
//! limiter and stats; all automation happens in the queue worker.

mod handlers;
mod routes;
mod templates;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::cache::LinkCache;
use crate::config::Settings;
use crate::notify::Notifier;
use crate::queue::RequestQueue;
use crate::rate_limit::RateLimiter;
use crate::stats::StatsStore;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub queue: RequestQueue,
    pub cache: Arc<LinkCache>,
    pub limiter: Arc<RateLimiter>,
    pub stats: Arc<StatsStore>,
    pub notifier: Notifier,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(
        settings: Arc<Settings>,
        queue: RequestQueue,
        cache: Arc<LinkCache>,
        notifier: Notifier,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(
            settings.rate_limit.limit,
            settings.rate_limit.window,
        ));
        let stats = Arc::new(StatsStore::new(settings.stats_path()));
        Self {
            settings,
            queue,
            cache,
            limiter,
            stats,
            notifier,
            http: reqwest::Client::new(),
        }
    }

    pub fn turnstile_site_key(&self) -> &str {
        self.settings
            .turnstile
            .as_ref()
            .map(|t| t.site_key.as_str())
            .unwrap_or("")
    }
}

/// Start the web server. The queue worker is spawned by the caller.
pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use regex::Regex;
    use tower::ServiceExt;

    use crate::config::{
        BrowserSettings, MailboxConfig, PlatformConfig, RateLimitSettings, Settings,
    };
    use crate::queue::{spawn_worker, DownloadResolver};

    struct StubResolver {
        calls: Arc<std::sync::Mutex<u32>>,
    }

    #[async_trait]
    impl DownloadResolver for StubResolver {
        async fn resolve(&mut self, document_id: &str) -> anyhow::Result<String> {
            *self.calls.lock().unwrap() += 1;
            Ok(format!("https://dl.scribd.example/{document_id}.pdf"))
        }
    }

    fn test_settings(data_dir: &std::path::Path) -> Settings {
        Settings {
            platform: PlatformConfig {
                email: "user@example.com".to_string(),
                password: "hunter2".to_string(),
            },
            mailbox: MailboxConfig {
                host: "imap.example.com".to_string(),
                port: 993,
                user: "inbox@example.com".to_string(),
                password: "secret".to_string(),
                subject_marker: "Scribd".to_string(),
                accept_invalid_certs: true,
            },
            browser: BrowserSettings::default(),
            turnstile: None,
            alert_webhook: None,
            log_webhook: None,
            session_ttl: Duration::from_secs(3600),
            cache_ttl: Duration::from_secs(300),
            rate_limit: RateLimitSettings {
                limit: 5,
                window: Duration::from_secs(60),
            },
            queue_cool_down: Duration::from_millis(1),
            status_retention: Duration::from_secs(300),
            data_dir: data_dir.to_path_buf(),
        }
    }

    fn setup_app(
        settings: Settings,
    ) -> (axum::Router, AppState, Arc<std::sync::Mutex<u32>>) {
        let settings = Arc::new(settings);
        let queue = RequestQueue::new(settings.status_retention);
        let cache = Arc::new(LinkCache::with_ttl(settings.cache_ttl));

        let calls = Arc::new(std::sync::Mutex::new(0));
        let resolver = StubResolver {
            calls: Arc::clone(&calls),
        };
        let _worker = spawn_worker(
            queue.clone(),
            resolver,
            Arc::clone(&cache),
            settings.queue_cool_down,
        );

        let state = AppState::new(settings, queue, cache, Notifier::disabled());
        let app = create_router(state.clone());
        (app, state, calls)
    }

    fn post_form(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/x-www-form-urlencoded")
            .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn landing_page_renders_the_form() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _state, _calls) = setup_app(test_settings(dir.path()));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_string(response).await;
        assert!(html.contains("<form method=\"POST\""));
    }

    #[tokio::test]
    async fn invalid_link_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _state, calls) = setup_app(test_settings(dir.path()));

        let response = app
            .oneshot(post_form("url=https%3A%2F%2Fexample.com%2Fnope"))
            .await
            .unwrap();

        let html = body_string(response).await;
        assert!(html.contains("does not look like"));
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_request_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _state, _calls) = setup_app(test_settings(dir.path()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/queue/req_missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn submit_polls_to_completion_and_second_hit_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _state, calls) = setup_app(test_settings(dir.path()));

        // First submission enqueues and returns the polling page.
        let response = app
            .clone()
            .oneshot(post_form(
                "url=https%3A%2F%2Fwww.scribd.com%2Fdocument%2F123456789%2Fsample",
            ))
            .await
            .unwrap();
        let html = body_string(response).await;
        let request_id = Regex::new(r"req_[0-9a-f]+")
            .unwrap()
            .find(&html)
            .expect("queued page embeds a request id")
            .as_str()
            .to_string();

        // Poll until the worker resolves it.
        let mut download_url = None;
        for _ in 0..200 {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri(format!("/api/queue/{request_id}"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            let json: serde_json::Value =
                serde_json::from_str(&body_string(response).await).unwrap();
            match json["status"].as_str() {
                Some("completed") => {
                    download_url = json["downloadUrl"].as_str().map(str::to_string);
                    break;
                }
                Some("failed") => panic!("request failed: {json}"),
                _ => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
        let download_url = download_url.expect("request completed with a url");
        assert!(!download_url.is_empty());
        assert_eq!(*calls.lock().unwrap(), 1);

        // Second submission for the same document is served from cache,
        // with no new queue entry and no second resolver call.
        let response = app
            .clone()
            .oneshot(post_form(
                "url=https%3A%2F%2Fwww.scribd.com%2Fdocument%2F123456789%2Fsample",
            ))
            .await
            .unwrap();
        let html = body_string(response).await;
        assert!(html.contains("from cache"));
        assert!(html.contains(&download_url));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn rate_limit_rejects_after_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = test_settings(dir.path());
        settings.rate_limit = RateLimitSettings {
            limit: 2,
            window: Duration::from_secs(60),
        };
        let (app, _state, _calls) = setup_app(settings);

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(post_form("url=garbage"))
                .await
                .unwrap();
            let html = body_string(response).await;
            assert!(!html.contains("Too many requests"));
        }

        let response = app.clone().oneshot(post_form("url=garbage")).await.unwrap();
        let html = body_string(response).await;
        assert!(html.contains("Too many requests"));
    }

    #[tokio::test]
    async fn stats_endpoint_returns_totals() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _state, _calls) = setup_app(test_settings(dir.path()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["total_downloads"], 0);
    }

    #[tokio::test]
    async fn incomplete_result_redirects_home() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _state, _calls) = setup_app(test_settings(dir.path()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/result/req_unknown")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        // Requests that never completed bounce back to the form.
        assert!(response.status().is_redirection());
    }
}
