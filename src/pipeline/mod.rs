//! Article production pipeline.
//!
//! One work item (a topic from a campaign) moves through a fixed sequence of
//! stages. Optional stages are controlled by the campaign's stage toggles.
//!
//! # Pipeline Flow
//!
//! 1. **Dedup**: the ledger is checked for an existing post on the topic
//! 2. **Research** (optional): notes from a research-capable handler
//! 3. **Generation**: the article is written and parsed into title, body,
//!    excerpt and slug
//! 4. **Images** (optional): cover and inline images from stock libraries
//!    or image generation
//! 5. **Enrichment** (optional): rewriting, internal links, structured data
//! 6. **Scoring**: E-E-A-T and fact-density scores drive an
//!    approve/flag/retry decision
//! 7. **Publication**: media upload, figure insertion, author resolution
//!    and post submission, then the ledger write
//!
//! Every status change goes through a [`StatusReporter`], so a UI or log can
//! follow a run without the pipeline knowing about it.
//!
//! # Example
//!
//! ```rust,ignore
//! use autopress::pipeline::ContentPipeline;
//!
//! let pipeline = ContentPipeline::new(&config, invoker, acquirer, publisher, ledger);
//! let results = pipeline.run_batch(&campaign, items).await;
//!
//! for result in results {
//!     match result {
//!         Ok(outcome) => println!("{}: {}", outcome.context().topic(), outcome.as_str()),
//!         Err(failure) => println!("{}", failure),
//!     }
//! }
//! ```

pub mod content;
pub mod context;
pub mod dedup;
pub mod enrich;
pub mod images;
pub mod orchestrator;
pub mod publish;
pub mod research;
pub mod status;

pub use content::{generate_article, parse_article, slugify};
pub use context::{
    AcquiredImage, GeneratedContent, GeneratedImages, ImageSlot, Placement, RunContext, RunStatus,
    SlotFailure,
};
pub use dedup::{DedupDecision, DedupGate};
pub use enrich::{EnrichError, Enricher, InternalLinker, Rewriter, SchemaInjector};
pub use images::{ImageAcquirer, ImageCandidate, StockImageSearch};
pub use orchestrator::{ContentPipeline, PipelineError, PipelineStats, RunFailure, RunOutcome};
pub use publish::{insert_figures, PublishError, PublishResult, Publisher, RepairReport};
pub use research::research_topic;
pub use status::{
    ActionCall, ActionTracker, MemorySink, NoopTracker, StatusReporter, StatusSink, StepState,
    TracingSink, TransitionEvent,
};
