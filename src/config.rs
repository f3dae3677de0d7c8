//! Environment-driven configuration.
//!
//! Everything is read once at startup from the process environment (a
//! `.env` file is loaded in main via dotenvy). Account credentials and the
//! mailbox are required; webhooks, Turnstile and all timing knobs are
//! optional with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Platform account used for credential login.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub email: String,
    pub password: String,
}

/// Mailbox that receives the one-time login codes.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Subject substring that identifies the platform's code emails.
    pub subject_marker: String,
    /// Accept self-signed certificates on the IMAP endpoint.
    pub accept_invalid_certs: bool,
}

/// Cloudflare Turnstile keys; verification is skipped when unset.
#[derive(Debug, Clone)]
pub struct TurnstileConfig {
    pub site_key: String,
    pub secret_key: String,
}

/// Headless Chrome knobs.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    /// Extra Chrome arguments appended after the built-in set.
    pub chrome_args: Vec<String>,
    /// Upper bound for a single page navigation.
    pub nav_timeout: Duration,
    /// Per-candidate wait when probing selector fallbacks.
    pub element_timeout: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_args: Vec::new(),
            nav_timeout: Duration::from_secs(15),
            element_timeout: Duration::from_secs(2),
        }
    }
}

/// Per-IP request allowance on the web form.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub limit: u32,
    pub window: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            limit: 10,
            window: Duration::from_secs(60),
        }
    }
}

/// Top-level runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub platform: PlatformConfig,
    pub mailbox: MailboxConfig,
    pub browser: BrowserSettings,
    pub turnstile: Option<TurnstileConfig>,
    pub alert_webhook: Option<String>,
    pub log_webhook: Option<String>,
    /// How long a login stays trusted before it is re-verified.
    pub session_ttl: Duration,
    /// How long resolved links are served from cache.
    pub cache_ttl: Duration,
    pub rate_limit: RateLimitSettings,
    /// Pause between queue items.
    pub queue_cool_down: Duration,
    /// How long finished requests stay pollable.
    pub status_retention: Duration,
    /// Directory for cookies, stats and diagnostic snapshots.
    pub data_dir: PathBuf,
}

impl Settings {
    /// Read settings from the environment.
    pub fn from_env() -> Result<Self> {
        let platform = PlatformConfig {
            email: require("SCRIBD_EMAIL")?,
            password: require("SCRIBD_PASSWORD")?,
        };

        let mailbox = MailboxConfig {
            host: require("MAILBOX_IMAP_HOST")?,
            port: optional("MAILBOX_IMAP_PORT")
                .map(|v| v.parse())
                .transpose()
                .context("MAILBOX_IMAP_PORT must be a port number")?
                .unwrap_or(993),
            user: require("MAILBOX_EMAIL")?,
            password: require("MAILBOX_PASSWORD")?,
            subject_marker: optional("MAILBOX_SUBJECT_MARKER")
                .unwrap_or_else(|| "Scribd".to_string()),
            accept_invalid_certs: flag("MAILBOX_ACCEPT_INVALID_CERTS", true),
        };

        let turnstile = match (
            optional("TURNSTILE_SITE_KEY"),
            optional("TURNSTILE_SECRET_KEY"),
        ) {
            (Some(site_key), Some(secret_key)) => Some(TurnstileConfig {
                site_key,
                secret_key,
            }),
            _ => None,
        };

        let mut browser = BrowserSettings::default();
        browser.headless = flag("SCRIBDL_HEADLESS", true);
        if let Some(args) = optional("SCRIBDL_CHROME_ARGS") {
            browser.chrome_args = args.split_whitespace().map(str::to_string).collect();
        }

        let data_dir = optional("SCRIBDL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        Ok(Self {
            platform,
            mailbox,
            browser,
            turnstile,
            alert_webhook: optional("DISCORD_ALERT_WEBHOOK"),
            log_webhook: optional("DISCORD_LOG_WEBHOOK"),
            session_ttl: duration_secs("SCRIBDL_SESSION_TTL_SECS", 3600),
            cache_ttl: duration_secs("SCRIBDL_CACHE_TTL_SECS", 300),
            rate_limit: RateLimitSettings::default(),
            queue_cool_down: duration_secs("SCRIBDL_QUEUE_COOL_DOWN_SECS", 1),
            status_retention: duration_secs("SCRIBDL_STATUS_RETENTION_SECS", 300),
            data_dir,
        })
    }

    pub fn cookies_path(&self) -> PathBuf {
        self.data_dir.join("cookies.json")
    }

    pub fn stats_path(&self) -> PathBuf {
        self.data_dir.join("stats.json")
    }

    pub fn diagnostics_dir(&self) -> PathBuf {
        self.data_dir.join("diagnostics")
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("scribdl"))
        .unwrap_or_else(|| PathBuf::from(".scribdl"))
}

fn require(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{key} must be set"))
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn flag(key: &str, default: bool) -> bool {
    optional(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn duration_secs(key: &str, default: u64) -> Duration {
    Duration::from_secs(
        optional(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default),
    )
}
