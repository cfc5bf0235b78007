//! autopress: automated article production and publishing.
//!
//! This library turns campaign topics into researched, illustrated and
//! quality-scored articles, publishes them to WordPress sites, and
//! translates published posts into other languages.

pub mod campaign;
pub mod cli;
pub mod config;
pub mod error;
pub mod hosting;
pub mod ledger;
pub mod metrics;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod quality;
pub mod translation;
pub mod utils;

// Re-export commonly used error types
pub use error::{FetchError, HostError, LedgerError, ProviderError};
