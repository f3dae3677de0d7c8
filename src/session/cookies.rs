//! Cookie persistence for session reuse across restarts.
//!
//! The cookie file is a JSON array of name/value records with optional
//! attributes. A missing, empty or unreadable file means "no stored
//! session" and is never fatal.

use std::path::{Path, PathBuf};

use chromiumoxide::cdp::browser_protocol::network::{Cookie, CookieParam};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One cookie as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

fn default_path() -> String {
    "/".to_string()
}

impl StoredCookie {
    /// Build the CDP parameter for injecting this cookie into a context.
    /// Cookies without a recorded domain are scoped to `fallback_url`.
    pub fn to_param(&self, fallback_url: &str) -> Option<CookieParam> {
        if self.domain.is_empty() {
            let mut param = CookieParam::new(self.name.clone(), self.value.clone());
            param.url = Some(fallback_url.to_string());
            return Some(param);
        }
        CookieParam::builder()
            .name(&self.name)
            .value(&self.value)
            .domain(&self.domain)
            .path(&self.path)
            .build()
            .ok()
    }
}

impl From<&Cookie> for StoredCookie {
    fn from(cookie: &Cookie) -> Self {
        Self {
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            domain: cookie.domain.clone(),
            path: cookie.path.clone(),
            secure: cookie.secure,
            http_only: cookie.http_only,
        }
    }
}

/// Load/save of the on-disk cookie file.
pub struct CookieStore {
    path: PathBuf,
}

impl CookieStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored cookies, or None when there is no usable stored session.
    pub fn load(&self) -> Option<Vec<StoredCookie>> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<Vec<StoredCookie>>(&content) {
            Ok(cookies) if !cookies.is_empty() => {
                info!("Loaded {} cookies from {:?}", cookies.len(), self.path);
                Some(cookies)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(
                    "Cookie file {:?} unreadable, treating as no session: {}",
                    self.path, e
                );
                None
            }
        }
    }

    pub fn save(&self, cookies: &[StoredCookie]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(cookies)?)?;
        info!("Saved {} cookies to {:?}", cookies.len(), self.path);
        Ok(())
    }
}
