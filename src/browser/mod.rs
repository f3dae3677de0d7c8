//! Shared headless Chrome instance.
//!
//! Uses chromiumoxide (CDP) with stealth evasion so the automated session
//! looks like a regular browser. Exactly one browser process is kept alive
//! and reused for as long as the session is valid.

pub mod nav;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BrowserSettings;

/// User agent presented to the target site.
pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Stealth evasion JavaScript applied to new pages.
/// Based on puppeteer-extra-plugin-stealth techniques.
const STEALTH_SCRIPTS: &[&str] = &[
    // Remove webdriver property
    r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined,
        configurable: true
    });
    "#,
    // Fix chrome object
    r#"
    window.chrome = {
        runtime: {},
        loadTimes: function() {},
        csi: function() {},
        app: {}
    };
    "#,
    // Fix languages
    r#"
    Object.defineProperty(navigator, 'languages', {
        get: () => ['en-US', 'en'],
        configurable: true
    });
    "#,
    // Fix plugins (make it look like regular Chrome)
    r#"
    Object.defineProperty(navigator, 'plugins', {
        get: () => [
            { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
            { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai', description: '' },
            { name: 'Native Client', filename: 'internal-nacl-plugin', description: '' }
        ],
        configurable: true
    });
    "#,
    // Remove automation-related properties
    r#"
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Array;
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Promise;
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Symbol;
    "#,
];

/// One launched Chrome process plus its CDP event loop.
pub struct BrowserHandle {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl BrowserHandle {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        // Common install locations
        "/opt/google/chrome/google-chrome",
    ];

    /// Launch a browser with stealth flags applied.
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        info!("Launching browser (headless={})", settings.headless);

        let chrome_path = find_chrome()?;

        let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);

        // with_head means NOT headless, confusingly
        if !settings.headless {
            builder = builder.with_head();
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--disable-crash-reporter")
            .arg("--no-sandbox") // Often needed for headless in containers/restricted environments
            .arg("--disable-gpu")
            .arg("--disable-software-rasterizer");

        for arg in &settings.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
        })
    }

    /// Open a fresh page with the standard user agent set.
    pub async fn new_page(&self) -> Result<Page, CdpError> {
        let page = self.browser.new_page("about:blank").await?;
        page.execute(SetUserAgentOverrideParams::new(USER_AGENT.to_string()))
            .await?;
        Ok(page)
    }

}

impl Drop for BrowserHandle {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

/// Apply stealth evasion scripts to a page. Best-effort: individual script
/// failures (non-HTML pages, mid-transition) are not errors.
pub async fn apply_stealth(page: &Page) {
    debug!("Applying stealth scripts");

    for script in STEALTH_SCRIPTS {
        if let Err(e) = page.evaluate(script.to_string()).await {
            debug!("Stealth script injection skipped: {}", e);
        }
    }
}

/// Write a diagnostic snapshot (final URL + page HTML) for operator
/// inspection. Best-effort: snapshot failures only log.
pub async fn dump_page(page: &Page, dir: &Path, tag: &str) {
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!("Could not create diagnostics dir {:?}: {}", dir, e);
        return;
    }

    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    let url = page.url().await.ok().flatten().unwrap_or_default();

    match page.content().await {
        Ok(content) => {
            let path = dir.join(format!("{}-{}.html", tag, stamp));
            let snapshot = format!("<!-- url: {} -->\n{}", url, content);
            match std::fs::write(&path, snapshot) {
                Ok(()) => warn!("Wrote page snapshot to {:?}", path),
                Err(e) => warn!("Failed to write page snapshot: {}", e),
            }
        }
        Err(e) => warn!("Could not capture page content for snapshot: {}", e),
    }
}

/// Find a Chrome executable via known paths, then PATH.
fn find_chrome() -> Result<PathBuf> {
    for path in BrowserHandle::CHROME_PATHS {
        let p = Path::new(path);
        if p.exists() {
            info!("Found Chrome at: {}", path);
            return Ok(p.to_path_buf());
        }
    }

    for cmd in &[
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ] {
        if let Ok(path) = which::which(cmd) {
            info!("Found Chrome in PATH: {}", path.display());
            return Ok(path);
        }
    }

    Err(anyhow::anyhow!(
        "Chrome/Chromium not found. Please install it:\n\
         - Arch/Manjaro: sudo pacman -S chromium\n\
         - Ubuntu/Debian: sudo apt install chromium-browser\n\
         - Fedora: sudo dnf install chromium\n\
         - Or download from: https://www.google.com/chrome/"
    ))
}
