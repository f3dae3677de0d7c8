//! HTTP request handlers for the web form and the status API.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{Form, Json};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::templates;
use super::AppState;
use crate::extract::parse_document_id;
use crate::queue::{RequestStatus, SECONDS_PER_REQUEST};

const TURNSTILE_VERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";

#[derive(Deserialize)]
pub struct DownloadForm {
    pub url: Option<String>,
    #[serde(rename = "cf-turnstile-response")]
    pub turnstile_token: Option<String>,
}

/// Landing page with the submit form.
pub async fn index(State(state): State<AppState>) -> impl IntoResponse {
    Html(templates::form_page(state.turnstile_site_key(), "", ""))
}

/// Form submission: captcha, rate limit, cache check, then enqueue.
pub async fn submit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Form(form): Form<DownloadForm>,
) -> Html<String> {
    let site_key = state.turnstile_site_key().to_string();
    let client_ip = client_ip(&headers, &addr);

    if let Some(turnstile) = &state.settings.turnstile {
        let token = form.turnstile_token.as_deref().unwrap_or_default();
        if !verify_turnstile(&state, &turnstile.secret_key, token).await {
            return Html(templates::form_page(
                &site_key,
                &templates::error_box("CAPTCHA verification failed. Please try again."),
                "",
            ));
        }
    } else {
        debug!("No Turnstile secret configured, skipping verification");
    }

    if !state.limiter.allow(&client_ip) {
        return Html(templates::form_page(
            &site_key,
            &templates::error_box("Too many requests. Please wait a minute."),
            "",
        ));
    }

    let url = form.url.unwrap_or_default();
    info!(%client_ip, %url, "Download requested");
    state.notifier.log(&format!("[{client_ip}] requested {url}"));

    let Some(document_id) = parse_document_id(url.trim()) else {
        return Html(templates::form_page(
            &site_key,
            &templates::error_box("That does not look like a Scribd document link."),
            "",
        ));
    };

    // A cached link answers immediately, with no queue entry.
    if let Some(cached) = state.cache.get(&document_id) {
        info!(%document_id, "Cache hit");
        let total = state.stats.increment();
        state
            .notifier
            .log(&format!("Cache hit for {document_id} (total downloads: {total})"));
        return Html(templates::form_page(
            &site_key,
            &templates::success_box("Success! (from cache)"),
            &templates::result_actions(&cached),
        ));
    }

    let request_id = state.queue.enqueue(&document_id, &client_ip);
    Html(templates::queued_page(&site_key, &request_id))
}

/// Poll endpoint for queued requests.
pub async fn queue_status(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Response {
    let Some(request) = state.queue.status(&request_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Request not found"})),
        )
            .into_response();
    };

    let mut body = json!({
        "status": request.status.as_str(),
        "queueLength": state.queue.backlog_len(),
    });
    match &request.status {
        RequestStatus::Queued { position } => {
            body["position"] = json!(position);
            body["eta"] = json!(*position as u64 * SECONDS_PER_REQUEST);
        }
        RequestStatus::Processing => {}
        RequestStatus::Completed { url } => {
            body["downloadUrl"] = json!(url);
        }
        RequestStatus::Failed { error } => {
            body["error"] = json!(error);
        }
    }

    Json(body).into_response()
}

/// Result page shown once a request has completed.
pub async fn result_page(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Response {
    let Some(request) = state.queue.status(&request_id) else {
        return Redirect::to("/").into_response();
    };
    let RequestStatus::Completed { url } = &request.status else {
        return Redirect::to("/").into_response();
    };

    let total = state.stats.increment();
    info!(total, "Download served");
    state
        .notifier
        .log(&format!("Download served (total: {total})"));

    Html(templates::form_page(
        state.turnstile_site_key(),
        &templates::success_box("Success!"),
        &templates::result_actions(url),
    ))
    .into_response()
}

/// Running totals for the landing page footer and monitoring.
pub async fn api_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.stats.load())
}

/// Proxy-aware client IP: first X-Forwarded-For hop, else the peer address.
fn client_ip(headers: &HeaderMap, addr: &SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| addr.ip().to_string())
}

async fn verify_turnstile(state: &AppState, secret: &str, token: &str) -> bool {
    if token.is_empty() {
        return false;
    }

    let body = json!({ "secret": secret, "response": token });
    match state.http.post(TURNSTILE_VERIFY_URL).json(&body).send().await {
        Ok(response) => response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("success").and_then(|s| s.as_bool()))
            .unwrap_or(false),
        Err(e) => {
            warn!("Turnstile verification error: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "192.0.2.7:4242".parse().unwrap()
    }

    #[test]
    fn client_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, &addr()), "203.0.113.9");
    }

    #[test]
    fn client_ip_falls_back_to_peer() {
        let headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, &addr()), "192.0.2.7");
    }
}
