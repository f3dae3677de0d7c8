//! Session lifecycle: one shared browser, cookie reuse, login fallback.
//!
//! Exactly one session is live process-wide. While it is within its TTL,
//! `ensure_session` returns the existing browser without touching the
//! network; past the TTL it first tries the stored cookies and only then
//! the full credential flow.

pub mod cookies;
pub mod login;
pub mod otp;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::browser::{self, nav, BrowserHandle};
use crate::config::Settings;
use crate::error::AuthError;
use crate::notify::Notifier;

use cookies::{CookieStore, StoredCookie};
use login::LoginFlow;
use otp::OtpRetriever;

/// Authenticated-only page used to probe whether stored cookies still work.
const ACCOUNT_URL: &str = "https://www.scribd.com/account";

/// Base URL cookies are scoped to when their stored domain is missing.
const BASE_URL: &str = "https://www.scribd.com";

/// Tracks when the session was last known-good.
#[derive(Debug, Clone, Copy)]
pub struct Freshness {
    last_authenticated: Option<Instant>,
    ttl: Duration,
}

impl Freshness {
    pub fn new(ttl: Duration) -> Self {
        Self {
            last_authenticated: None,
            ttl,
        }
    }

    /// Record a successful authentication now.
    pub fn mark(&mut self) {
        self.last_authenticated = Some(Instant::now());
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Instant::now())
    }

    fn is_fresh_at(&self, now: Instant) -> bool {
        match self.last_authenticated {
            Some(at) => now.duration_since(at) < self.ttl,
            None => false,
        }
    }
}

/// Owns the single shared browser and decides between reuse, cookie
/// restore and credential login. Only one caller (the queue worker) holds
/// this, which is what keeps browser access serialized.
pub struct SessionManager {
    settings: Arc<Settings>,
    store: CookieStore,
    otp: OtpRetriever,
    notifier: Notifier,
    browser: Option<BrowserHandle>,
    freshness: Freshness,
}

impl SessionManager {
    pub fn new(settings: Arc<Settings>, notifier: Notifier) -> Self {
        let store = CookieStore::new(settings.cookies_path());
        let otp = OtpRetriever::new(settings.mailbox.clone());
        let freshness = Freshness::new(settings.session_ttl);
        Self {
            settings,
            store,
            otp,
            notifier,
            browser: None,
            freshness,
        }
    }

    /// Return the shared authenticated browser, reusing it while fresh.
    pub async fn ensure_session(&mut self) -> Result<&BrowserHandle, AuthError> {
        if self.browser.is_some() && self.freshness.is_fresh() {
            debug!("Reusing session within TTL");
            return Ok(self.browser.as_ref().unwrap());
        }

        self.establish().await?;
        Ok(self.browser.as_ref().unwrap())
    }

    async fn establish(&mut self) -> Result<(), AuthError> {
        if self.browser.is_none() {
            let handle = BrowserHandle::launch(&self.settings.browser)
                .await
                .map_err(AuthError::Launch)?;
            self.browser = Some(handle);
        }

        let page = self.browser.as_ref().unwrap().new_page().await?;

        // Silent reuse first: inject stored cookies and probe an
        // authenticated-only page.
        if let Some(stored) = self.store.load() {
            info!("Trying stored cookies");
            for cookie in &stored {
                if let Some(param) = cookie.to_param(BASE_URL) {
                    if let Err(e) = page.set_cookie(param).await {
                        warn!("Failed to set cookie {}: {}", cookie.name, e);
                    }
                }
            }

            let _ = nav::navigate(&page, ACCOUNT_URL, self.settings.browser.nav_timeout).await?;
            let url = nav::current_url(&page).await;
            if !url.is_empty() && !login::is_login_url(&url) {
                info!("Session restored from stored cookies");
                self.freshness.mark();
                let _ = page.close().await;
                return Ok(());
            }

            warn!("Stored cookies rejected, falling back to credential login");
            self.notifier
                .alert("Stored session cookies have expired. Attempting credential login; manual intervention may be needed if 2FA fails.");
        }

        let flow = LoginFlow::new(&self.settings, &self.otp);
        match flow.run(&page).await {
            Ok(()) => {
                self.freshness.mark();
                self.persist_cookies(&page).await;
                self.notifier.alert("Logged in with credentials.");
                let _ = page.close().await;
                Ok(())
            }
            Err(e) => {
                browser::dump_page(&page, &self.settings.diagnostics_dir(), "login-failed").await;
                self.notifier
                    .alert(&format!("Login failed: {}. Check credentials or log in manually.", e));
                let _ = page.close().await;
                Err(AuthError::Login(e))
            }
        }
    }

    async fn persist_cookies(&self, page: &chromiumoxide::Page) {
        match page.get_cookies().await {
            Ok(cookies) => {
                let stored: Vec<StoredCookie> = cookies.iter().map(StoredCookie::from).collect();
                if let Err(e) = self.store.save(&stored) {
                    warn!("Failed to persist cookies: {}", e);
                }
            }
            Err(e) => warn!("Failed to read cookies from browser: {}", e),
        }
    }

    /// Launch a visible browser so the operator can log in by hand
    /// (including 2FA), then capture whatever cookies the session holds.
    pub async fn manual_capture(&mut self) -> anyhow::Result<()> {
        let mut browser_settings = self.settings.browser.clone();
        browser_settings.headless = false;

        let handle = BrowserHandle::launch(&browser_settings).await?;
        let page = handle.new_page().await?;
        nav::navigate(&page, login::LOGIN_URL, self.settings.browser.nav_timeout).await?;

        println!("\n========================================");
        println!("Log in to the site in the opened browser.");
        println!("Complete 2FA if prompted.");
        println!("When you can see your account, return here and press Enter.");
        println!("========================================\n");

        let mut input = String::new();
        let _ = std::io::stdin().read_line(&mut input);

        let cookies = page.get_cookies().await?;
        let stored: Vec<StoredCookie> = cookies.iter().map(StoredCookie::from).collect();
        self.store.save(&stored)?;
        self.freshness.mark();

        println!("Session saved ({} cookies).", stored.len());
        Ok(())
    }
}
