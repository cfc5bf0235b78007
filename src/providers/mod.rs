//! Capability providers and the fallback invoker.
//!
//! A [`Capability`] (research, text generation, image generation) can be
//! served by several interchangeable [`HandlerKind`]s. The
//! [`FallbackInvoker`] resolves an ordered chain (campaign preference first,
//! then the capability's default order) and falls through on failure:
//!
//! ```ignore
//! use autopress::providers::{Capability, FallbackInvoker, HandlerKind, InvokePayload};
//!
//! let invoker = FallbackInvoker::new().with_handler(handler);
//! let outcome = invoker
//!     .invoke(Capability::GenerateText, &InvokePayload::new("Write..."), &[HandlerKind::OpenAi])
//!     .await?;
//! println!("served by {}", outcome.handler_used);
//! ```

pub mod capability;
pub mod invoker;
pub mod openai;

pub use capability::{resolve_order, Capability, HandlerKind};
pub use invoker::{
    CapabilityHandler, FallbackInvoker, HandlerAttempt, HandlerResponse, InvokeError,
    InvokeOutcome, InvokePayload,
};
pub use openai::OpenAiCompatibleHandler;
