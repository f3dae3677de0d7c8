//! Credential login flow against the platform's login form.
//!
//! The form markup changes without notice, so every element is located
//! through an ordered list of selector candidates, and input is paced like
//! a person typing. A CSRF token is propagated when one can be found and
//! the flow tolerates its absence.

use chromiumoxide::Page;
use tracing::{debug, info, warn};

use crate::browser::nav::{self, Navigation};
use crate::config::Settings;
use crate::error::LoginError;
use crate::session::otp::OtpRetriever;

pub const LOGIN_URL: &str = "https://www.scribd.com/login";

/// Selector candidates for the email/login input, most specific first.
const LOGIN_FIELD_CANDIDATES: &[&str] = &[
    "input[name=\"user[login]\"]",
    "input[name=\"email\"]",
    "input[type=\"email\"]",
    "input[name=\"login\"]",
    "input[placeholder*=\"email\" i]",
    "input#email",
    "input#user_login",
    "form input[type=\"text\"]:first-of-type",
];

const PASSWORD_FIELD_CANDIDATES: &[&str] = &[
    "input[name=\"password\"]",
    "input[type=\"password\"]",
    "input[name=\"user[password]\"]",
];

const OTP_FIELD_CANDIDATES: &[&str] = &[
    "input[name=\"mfa_code\"]",
    "input[name=\"code\"]",
    "input[type=\"text\"]",
];

const SUBMIT_CANDIDATES: &[&str] = &["button[type=\"submit\"]", "button[name=\"action\"]"];

/// URL fragments that mean we are still on a login or auth-provider page.
const LOGIN_URL_MARKERS: &[&str] = &["login", "auth0.com", "auth.scribd.com"];

/// URL fragments that mean a two-factor challenge was presented.
const CHALLENGE_URL_MARKERS: &[&str] = &["mfa", "challenge", "verify"];

pub fn is_login_url(url: &str) -> bool {
    LOGIN_URL_MARKERS.iter().any(|m| url.contains(m))
}

pub fn is_challenge_url(url: &str) -> bool {
    CHALLENGE_URL_MARKERS.iter().any(|m| url.contains(m))
}

pub struct LoginFlow<'a> {
    settings: &'a Settings,
    otp: &'a OtpRetriever,
}

impl<'a> LoginFlow<'a> {
    pub fn new(settings: &'a Settings, otp: &'a OtpRetriever) -> Self {
        Self { settings, otp }
    }

    /// Drive the login form on `page` to a logged-in state.
    pub async fn run(&self, page: &Page) -> Result<(), LoginError> {
        let nav_timeout = self.settings.browser.nav_timeout;
        let per_candidate = self.settings.browser.element_timeout;

        if nav::navigate(page, LOGIN_URL, nav_timeout).await? == Navigation::TimedOut {
            return Err(LoginError::NavigationTimeout);
        }
        crate::browser::apply_stealth(page).await;

        let Some((selector, login_field)) =
            nav::find_first(page, LOGIN_FIELD_CANDIDATES, per_candidate).await
        else {
            return Err(LoginError::NoLoginForm);
        };
        debug!(%selector, "login field found");

        let csrf = read_csrf_token(page).await;

        nav::pace(500, 1000).await;
        login_field.click().await?;
        nav::pace(100, 200).await;
        clear_field(page, &selector).await;
        nav::type_slowly(&login_field, &self.settings.platform.email).await?;
        info!("Filled login field");
        nav::pace(800, 400).await;

        let Some((password_selector, password_field)) =
            nav::find_first(page, PASSWORD_FIELD_CANDIDATES, per_candidate).await
        else {
            return Err(LoginError::NoPasswordField);
        };
        nav::pace(300, 200).await;
        password_field.click().await?;
        nav::pace(400, 200).await;
        nav::type_slowly(&password_field, &self.settings.platform.password).await?;
        nav::pace(1000, 500).await;

        // Key events are sometimes swallowed by the form's own handlers;
        // verify the field took the input and inject directly if not.
        let expected = self.settings.platform.password.chars().count();
        let typed = field_value_len(page, &password_selector).await;
        if typed != expected {
            warn!(
                expected,
                typed, "password field length mismatch, injecting value directly"
            );
            inject_value(page, &password_selector, &self.settings.platform.password).await;
        }

        if let Some(token) = csrf {
            propagate_csrf(page, &token).await;
        }

        let Some((_, submit)) = nav::find_first(page, SUBMIT_CANDIDATES, per_candidate).await
        else {
            return Err(LoginError::NoSubmitButton);
        };
        info!("Submitting login form");
        submit.click().await?;

        // A timeout here is tolerated; the URL checks below decide.
        nav::settle(page, nav_timeout).await;

        let mut current = nav::current_url(page).await;
        debug!(url = %current, "post-submit location");

        if is_challenge_url(&current) {
            info!("Two-factor challenge presented, fetching code");
            let code = self.otp.fetch().await?;

            let Some((_, code_field)) =
                nav::find_first(page, OTP_FIELD_CANDIDATES, per_candidate).await
            else {
                return Err(LoginError::NoOtpInput);
            };
            code_field.click().await?;
            nav::type_slowly(&code_field, &code).await?;

            if let Some((_, submit)) = nav::find_first(page, SUBMIT_CANDIDATES, per_candidate).await
            {
                submit.click().await?;
            }
            nav::settle(page, nav_timeout).await;
            current = nav::current_url(page).await;
        }

        if current.is_empty() || is_login_url(&current) {
            return Err(LoginError::StillOnLoginPage);
        }

        info!(url = %current, "Login succeeded");
        Ok(())
    }
}

/// CSRF token from the meta tag, falling back to the hidden form input.
/// Absence is tolerated; the form is submitted without it.
async fn read_csrf_token(page: &Page) -> Option<String> {
    if let Ok(meta) = page.find_element("meta[name=\"csrf-token\"]").await {
        if let Ok(Some(content)) = meta.attribute("content").await {
            debug!("CSRF token read from meta tag");
            return Some(content);
        }
    }
    if let Ok(input) = page.find_element("input[name=\"authenticity_token\"]").await {
        if let Ok(Some(value)) = input.attribute("value").await {
            debug!("CSRF token read from hidden input");
            return Some(value);
        }
    }
    debug!("No CSRF token on page, submitting without one");
    None
}

/// Copy the token into the hidden form field when the form carries one.
async fn propagate_csrf(page: &Page, token: &str) {
    let script = format!(
        r#"(() => {{
            const field = document.querySelector('input[name="authenticity_token"]');
            if (field) field.value = {token};
        }})()"#,
        token = js_string(token),
    );
    if let Err(e) = page.evaluate(script).await {
        debug!("CSRF propagation skipped: {}", e);
    }
}

async fn clear_field(page: &Page, selector: &str) {
    let script = format!(
        r#"(() => {{
            const input = document.querySelector({sel});
            if (input) input.value = '';
        }})()"#,
        sel = js_string(selector),
    );
    if let Err(e) = page.evaluate(script).await {
        debug!("field clear skipped: {}", e);
    }
}

/// Set the field value directly and fire the framework events the page
/// listens for.
async fn inject_value(page: &Page, selector: &str, value: &str) {
    let script = format!(
        r#"(() => {{
            const input = document.querySelector({sel});
            if (input) {{
                input.value = {val};
                input.dispatchEvent(new Event('input', {{ bubbles: true }}));
                input.dispatchEvent(new Event('change', {{ bubbles: true }}));
            }}
        }})()"#,
        sel = js_string(selector),
        val = js_string(value),
    );
    if let Err(e) = page.evaluate(script).await {
        warn!("Value injection failed: {}", e);
    }
}

async fn field_value_len(page: &Page, selector: &str) -> usize {
    let script = format!(
        "(() => {{ const el = document.querySelector({sel}); return el ? el.value.length : 0; }})()",
        sel = js_string(selector),
    );
    page.evaluate(script)
        .await
        .ok()
        .and_then(|result| result.into_value::<usize>().ok())
        .unwrap_or(0)
}

/// Quote a Rust string as a JavaScript string literal.
fn js_string(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_urls_are_recognized() {
        assert!(is_login_url("https://www.scribd.com/login"));
        assert!(is_login_url("https://auth.scribd.com/u/login?state=x"));
        assert!(is_login_url("https://scribd.auth0.com/authorize"));
        assert!(!is_login_url("https://www.scribd.com/account"));
        assert!(!is_login_url("https://www.scribd.com/home"));
    }

    #[test]
    fn challenge_urls_are_recognized() {
        assert!(is_challenge_url("https://www.scribd.com/mfa"));
        assert!(is_challenge_url("https://auth.scribd.com/u/challenge?x=1"));
        assert!(is_challenge_url("https://www.scribd.com/verify_email"));
        assert!(!is_challenge_url("https://www.scribd.com/account"));
    }

    #[test]
    fn js_string_escapes_quotes() {
        assert_eq!(js_string("plain"), "\"plain\"");
        assert_eq!(js_string("a\"b"), "\"a\\\"b\"");
        assert_eq!(js_string("input[name=\"email\"]"), "\"input[name=\\\"email\\\"]\"");
    }
}
