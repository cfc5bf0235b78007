//! Translation of published posts into other languages and sites.
//!
//! Jobs are YAML files naming a source site, post filters and one or more
//! (site, language) targets. The durable history in the ledger guarantees a
//! (post, language, site) triple is published at most once.

pub mod pipeline;
pub mod postprocess;
pub mod types;

pub use pipeline::{parse_translation, TranslationPipeline};
pub use postprocess::TranslatedPost;
pub use types::{
    PostProcessOptions, TranslationError, TranslationItemReport, TranslationJob,
    TranslationOutcome, TranslationRecord, TranslationReport, TranslationStatus,
    TranslationTarget,
};
