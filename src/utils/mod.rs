//! Shared utility functions for autopress.

pub mod html;

pub use html::{collapse_whitespace, decode_entities, escape, strip_tags, truncate_chars, word_count};
