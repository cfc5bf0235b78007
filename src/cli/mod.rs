//! Command-line interface for autopress.
//!
//! Provides commands for running campaigns, translating posts, repairing
//! post images, scoring content and inspecting translation history.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
