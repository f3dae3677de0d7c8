//! Production resolver: authenticated session plus extraction pipeline.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Settings;
use crate::extract::DownloadExtractor;
use crate::notify::Notifier;
use crate::queue::DownloadResolver;
use crate::session::SessionManager;

/// Owns the session manager. The queue worker is the only caller, which is
/// what keeps all browser access serialized.
pub struct BrowserResolver {
    settings: Arc<Settings>,
    session: SessionManager,
}

impl BrowserResolver {
    pub fn new(settings: Arc<Settings>, notifier: Notifier) -> Self {
        let session = SessionManager::new(Arc::clone(&settings), notifier);
        Self { settings, session }
    }
}

#[async_trait]
impl DownloadResolver for BrowserResolver {
    async fn resolve(&mut self, document_id: &str) -> anyhow::Result<String> {
        let browser = self.session.ensure_session().await?;
        let extractor = DownloadExtractor::new(browser, &self.settings);
        let url = extractor.extract(document_id).await?;
        Ok(url)
    }
}
