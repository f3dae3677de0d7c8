//! HTML templates for the web form.
//!
//! Server-rendered pages built with plain string formatting: one card with
//! the submit form, plus result/error fragments and the queue-polling
//! script injected after enqueue.

/// Escape HTML special characters for safe rendering.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

const STYLE: &str = r#"
* { margin: 0; padding: 0; box-sizing: border-box; }
body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
    background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
    min-height: 100vh;
    display: flex;
    align-items: center;
    justify-content: center;
    padding: 20px;
}
.card {
    background: white;
    padding: 40px;
    border-radius: 20px;
    box-shadow: 0 20px 60px rgba(0,0,0,0.15);
    width: 100%;
    max-width: 500px;
}
h1 {
    font-size: 28px;
    font-weight: 700;
    background: linear-gradient(135deg, #667eea, #764ba2);
    -webkit-background-clip: text;
    -webkit-text-fill-color: transparent;
    text-align: center;
    margin-bottom: 30px;
}
input[type="text"] {
    width: 100%;
    padding: 15px 20px;
    border: 2px solid #e5e7eb;
    border-radius: 12px;
    font-size: 16px;
    background: #f9fafb;
    margin-bottom: 20px;
}
input[type="text"]:focus {
    outline: none;
    border-color: #667eea;
    background: white;
}
button[type="submit"] {
    width: 100%;
    padding: 15px;
    background: linear-gradient(135deg, #667eea, #764ba2);
    color: white;
    border: none;
    border-radius: 12px;
    font-size: 16px;
    font-weight: 600;
    cursor: pointer;
}
.result {
    margin-top: 20px;
    padding: 15px;
    border-radius: 12px;
    text-align: center;
}
.success { background: #d1fae5; color: #065f46; border: 2px solid #a7f3d0; }
.error { background: #fee2e2; color: #991b1b; border: 2px solid #fca5a5; }
.info { background: #e0e7ff; color: #3730a3; border: 2px solid #c7d2fe; }
.download-btn {
    display: inline-block;
    margin-top: 15px;
    padding: 12px 24px;
    background: linear-gradient(135deg, #10b981, #059669);
    color: white;
    text-decoration: none;
    border-radius: 12px;
    font-weight: 600;
}
.note { display: block; margin-top: 10px; font-size: 13px; color: #6b7280; }
"#;

/// Base page: the submit form plus whatever result markup the caller adds.
pub fn form_page(turnstile_site_key: &str, result: &str, download: &str) -> String {
    let turnstile = if turnstile_site_key.is_empty() {
        String::new()
    } else {
        format!(
            r#"<div class="cf-turnstile" data-sitekey="{}"></div>
            <script src="https://challenges.cloudflare.com/turnstile/v0/api.js" async defer></script>"#,
            html_escape(turnstile_site_key)
        )
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Scribd Downloader</title>
    <style>{STYLE}</style>
</head>
<body>
    <div class="card">
        <h1>Scribd Downloader</h1>
        <form method="POST" action="/">
            <input
                type="text"
                name="url"
                placeholder="Paste a Scribd document link..."
                required
                autocomplete="off"
            />
            {turnstile}
            <button type="submit">Get download link</button>
        </form>
        {result}
        {download}
    </div>
</body>
</html>"#,
    )
}

pub fn error_box(message: &str) -> String {
    format!(r#"<div class="result error">{}</div>"#, html_escape(message))
}

pub fn success_box(message: &str) -> String {
    format!(
        r#"<div class="result success">{}</div>"#,
        html_escape(message)
    )
}

/// Download button + copyable link for a resolved URL.
pub fn result_actions(url: &str) -> String {
    let escaped = html_escape(url);
    format!(
        r#"<a href="{escaped}" target="_blank" rel="noopener" class="download-btn">Download PDF</a>
        <span class="note">The link expires in about 5 minutes.</span>"#,
    )
}

/// Page returned after enqueueing: shows the position and polls the status
/// API until the request finishes.
pub fn queued_page(turnstile_site_key: &str, request_id: &str) -> String {
    let status = r#"<div class="result info" id="queue-status">
        Working on it...
        <div style="margin-top: 10px; font-size: 14px;">
            <span id="queue-position"></span>
            <span id="queue-eta" style="display: block; margin-top: 5px; opacity: 0.8;"></span>
        </div>
    </div>"#;

    let script = format!(
        r#"<script>
        const requestId = '{request_id}';
        let pollTimer;

        async function checkStatus() {{
            try {{
                const res = await fetch('/api/queue/' + requestId);
                const data = await res.json();

                if (data.status === 'queued') {{
                    document.getElementById('queue-position').textContent =
                        'Position in queue: #' + data.position;
                    if (data.eta) {{
                        document.getElementById('queue-eta').textContent =
                            'Estimated wait: ~' + data.eta + 's';
                    }}
                }} else if (data.status === 'processing') {{
                    document.getElementById('queue-position').textContent =
                        'Processing your request...';
                    document.getElementById('queue-eta').textContent = '';
                }} else if (data.status === 'completed') {{
                    clearInterval(pollTimer);
                    window.location.href = '/result/' + requestId;
                }} else if (data.status === 'failed') {{
                    clearInterval(pollTimer);
                    document.getElementById('queue-status').outerHTML =
                        '<div class="result error">' + (data.error || 'Request failed') + '</div>';
                }}
            }} catch (e) {{
                console.error('status check failed', e);
            }}
        }}

        checkStatus();
        pollTimer = setInterval(checkStatus, 2000);
    </script>"#,
    );

    form_page(turnstile_site_key, status, &script)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html() {
        assert_eq!(html_escape("a & b"), "a &amp; b");
        assert_eq!(html_escape("<script>"), "&lt;script&gt;");
        assert_eq!(html_escape("\"q\""), "&quot;q&quot;");
    }

    #[test]
    fn form_page_contains_the_form() {
        let page = form_page("", "", "");
        assert!(page.contains("<form method=\"POST\""));
        assert!(page.contains("name=\"url\""));
        assert!(!page.contains("cf-turnstile"));
    }

    #[test]
    fn turnstile_widget_rendered_when_configured() {
        let page = form_page("site-key-1", "", "");
        assert!(page.contains("cf-turnstile"));
        assert!(page.contains("site-key-1"));
    }

    #[test]
    fn queued_page_embeds_request_id() {
        let page = queued_page("", "req_abc123");
        assert!(page.contains("const requestId = 'req_abc123'"));
        assert!(page.contains("/api/queue/"));
    }

    #[test]
    fn result_actions_escape_the_url() {
        let html = result_actions("https://dl.example/a?b=1&c=2");
        assert!(html.contains("b=1&amp;c=2"));
    }
}
