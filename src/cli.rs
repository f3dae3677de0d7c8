//! Command-line interface.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::cache::LinkCache;
use crate::config::Settings;
use crate::notify::Notifier;
use crate::queue::{self, DownloadResolver, RequestQueue};
use crate::resolver::BrowserResolver;
use crate::server::{self, AppState};
use crate::session::SessionManager;

#[derive(Parser)]
#[command(name = "scribdl")]
#[command(about = "Self-hosted download-link service for Scribd documents")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web service
    Serve {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0", env = "SCRIBDL_HOST")]
        host: String,
        /// Bind port
        #[arg(long, default_value = "5099", env = "SCRIBDL_PORT")]
        port: u16,
    },

    /// Establish a session and persist its cookies
    Login {
        /// Open a visible browser and log in by hand instead of automating
        #[arg(long)]
        manual: bool,
    },

    /// Resolve a single document link and print the download URL
    Fetch {
        /// Document URL or bare numeric id
        target: String,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Arc::new(Settings::from_env()?);

    match cli.command {
        Commands::Serve { host, port } => serve(settings, &host, port).await,
        Commands::Login { manual } => login(settings, manual).await,
        Commands::Fetch { target } => fetch(settings, &target).await,
    }
}

async fn serve(settings: Arc<Settings>, host: &str, port: u16) -> anyhow::Result<()> {
    let notifier = Notifier::new(settings.alert_webhook.clone(), settings.log_webhook.clone());
    let queue = RequestQueue::new(settings.status_retention);
    let cache = Arc::new(LinkCache::with_ttl(settings.cache_ttl));

    let resolver = BrowserResolver::new(Arc::clone(&settings), notifier.clone());
    let _worker = queue::spawn_worker(
        queue.clone(),
        resolver,
        Arc::clone(&cache),
        settings.queue_cool_down,
    );

    notifier.log(&format!("Service starting on port {port}"));
    let state = AppState::new(settings, queue, cache, notifier);
    server::serve(state, host, port).await
}

async fn login(settings: Arc<Settings>, manual: bool) -> anyhow::Result<()> {
    let notifier = Notifier::new(settings.alert_webhook.clone(), settings.log_webhook.clone());
    let mut session = SessionManager::new(settings, notifier);

    if manual {
        session.manual_capture().await?;
    } else {
        session.ensure_session().await?;
        println!("Login succeeded; cookies saved.");
    }
    Ok(())
}

async fn fetch(settings: Arc<Settings>, target: &str) -> anyhow::Result<()> {
    let document_id = crate::extract::parse_document_id(target)
        .ok_or_else(|| anyhow::anyhow!("not a document link or id: {target}"))?;

    let mut resolver = BrowserResolver::new(settings, Notifier::disabled());
    let url = resolver.resolve(&document_id).await?;
    println!("{url}");
    Ok(())
}
