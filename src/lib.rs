//! Library crate behind the `scribdl` binary.
//!
//! The pipeline is: [`session`] keeps one authenticated browser alive
//! (cookie reuse, credential login, one-time codes from a mailbox),
//! [`extract`] turns a document id into a transient download URL, and
//! [`queue`] serializes all of it because the browser session is a single
//! shared resource. [`server`] is the thin web front end.

pub mod browser;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod notify;
pub mod queue;
pub mod rate_limit;
pub mod resolver;
pub mod server;
pub mod session;
pub mod stats;
