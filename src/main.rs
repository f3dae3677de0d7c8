//! scribdl - turn a Scribd document link into a direct download URL.
//!
//! Drives an authenticated headless Chrome session behind a small web form,
//! with cookie reuse, mailbox-based one-time-code login, response caching
//! and per-IP rate limiting.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scribdl::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_verbose() {
        "scribdl=debug"
    } else {
        "scribdl=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    cli::run().await
}
