//! Error taxonomy for session establishment and download extraction.
//!
//! Failures inside the login flow and the extractor bubble up to the queue
//! worker as terminal outcomes for the current request; nothing here is
//! retried automatically.

use thiserror::Error;

/// An authenticated session could not be established by any means.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("browser launch failed: {0}")]
    Launch(anyhow::Error),

    #[error("stored cookies rejected and credential login failed: {0}")]
    Login(#[from] LoginError),

    #[error("browser error: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),
}

/// A specific failure inside the credential login flow.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("login form not found; the site layout may have changed")]
    NoLoginForm,

    #[error("password field not found")]
    NoPasswordField,

    #[error("submit button not found")]
    NoSubmitButton,

    #[error("login page did not load in time")]
    NavigationTimeout,

    #[error("still on the login page after submit")]
    StillOnLoginPage,

    #[error("one-time code input not found on the challenge page")]
    NoOtpInput,

    #[error("two-factor challenge: {0}")]
    TwoFactor(#[from] OtpError),

    #[error("browser error: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),
}

/// One-time code retrieval from the mailbox failed.
#[derive(Debug, Error)]
pub enum OtpError {
    #[error("mailbox connection failed: {0}")]
    Connect(String),

    #[error("no messages with subject containing {0:?}")]
    NoMatches(String),

    #[error("no 6-digit code in the {0} most recent matching messages")]
    NoCode(usize),
}

/// The download URL could not be resolved for a document.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no download control found on the document page")]
    NoDownloadControl,

    #[error("no download URL resolved after all fallbacks")]
    NoUrlResolved,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("browser error: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),
}
