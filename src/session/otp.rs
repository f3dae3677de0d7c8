//! One-time-code retrieval from the operator mailbox.
//!
//! The platform mails a 6-digit code when it raises a two-factor challenge.
//! We connect over IMAPS, search the inbox for the platform's subject
//! marker and pull the code out of the newest few matches. The IMAP client
//! is blocking, so the round-trip runs on the blocking pool.

use mail_parser::MessageParser;
use regex::Regex;
use tracing::{debug, info};

use crate::config::MailboxConfig;
use crate::error::OtpError;

/// How many of the newest matching messages to inspect. Search results are
/// not guaranteed newest-first, so recency is approximated by taking the
/// tail of the sequence numbers.
const LOOKBACK: usize = 3;

pub struct OtpRetriever {
    config: MailboxConfig,
}

impl OtpRetriever {
    pub fn new(config: MailboxConfig) -> Self {
        Self { config }
    }

    /// Connect to the mailbox and pull the newest 6-digit login code.
    pub async fn fetch(&self) -> Result<String, OtpError> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || fetch_blocking(&config))
            .await
            .map_err(|e| OtpError::Connect(e.to_string()))?
    }
}

fn fetch_blocking(config: &MailboxConfig) -> Result<String, OtpError> {
    debug!("Connecting to mailbox at {}:{}", config.host, config.port);

    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .build()
        .map_err(|e| OtpError::Connect(e.to_string()))?;

    let client = imap::connect(
        (config.host.as_str(), config.port),
        config.host.as_str(),
        &tls,
    )
    .map_err(|e| OtpError::Connect(e.to_string()))?;

    let mut session = client
        .login(&config.user, &config.password)
        .map_err(|(e, _)| OtpError::Connect(e.to_string()))?;

    // Read-only open so inspected messages are not marked seen.
    session
        .examine("INBOX")
        .map_err(|e| OtpError::Connect(e.to_string()))?;

    let query = format!("SUBJECT \"{}\"", config.subject_marker);
    let matches = session
        .search(&query)
        .map_err(|e| OtpError::Connect(e.to_string()))?;

    if matches.is_empty() {
        let _ = session.logout();
        return Err(OtpError::NoMatches(config.subject_marker.clone()));
    }

    // Sequence numbers grow with arrival order; the tail is the newest.
    let mut sequence: Vec<u32> = matches.into_iter().collect();
    sequence.sort_unstable();
    let newest = newest_set(&sequence, LOOKBACK);

    let messages = session
        .fetch(&newest, "RFC822")
        .map_err(|e| OtpError::Connect(e.to_string()))?;

    let parser = MessageParser::default();
    for message in messages.iter() {
        let Some(body) = message.body() else { continue };
        let Some(parsed) = parser.parse(body) else {
            continue;
        };
        if let Some(subject) = parsed.subject() {
            if let Some(code) = extract_code(subject) {
                info!("Retrieved one-time code from mailbox");
                let _ = session.logout();
                return Ok(code);
            }
        }
    }

    let _ = session.logout();
    Err(OtpError::NoCode(LOOKBACK))
}

/// Comma-separated IMAP sequence set of the last `n` entries.
fn newest_set(sequence: &[u32], n: usize) -> String {
    let start = sequence.len().saturating_sub(n);
    sequence[start..]
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// First 6-digit run in a subject line.
fn extract_code(subject: &str) -> Option<String> {
    let re = Regex::new(r"\d{6}").unwrap();
    re.find(subject).map(|m| m.as_str().to_string())
}
