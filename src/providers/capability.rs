//! Capabilities and the concrete handler kinds that can satisfy them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An abstract operation satisfiable by several interchangeable handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Topic research producing grounding notes.
    Research,
    /// Long-form text generation (articles, rewrites, translations).
    GenerateText,
    /// Image generation returning a URL.
    GenerateImage,
}

impl Capability {
    /// All capabilities, in pipeline order.
    pub const ALL: [Capability; 3] = [
        Capability::Research,
        Capability::GenerateText,
        Capability::GenerateImage,
    ];

    /// Stable name used in logs, metrics and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Research => "research",
            Capability::GenerateText => "generate",
            Capability::GenerateImage => "image",
        }
    }

    /// Fixed fallback order used when a campaign expresses no preference.
    pub fn default_order(&self) -> &'static [HandlerKind] {
        match self {
            Capability::Research => &[
                HandlerKind::Perplexity,
                HandlerKind::OpenAi,
                HandlerKind::Anthropic,
                HandlerKind::Gemini,
                HandlerKind::OpenRouter,
            ],
            Capability::GenerateText => &[
                HandlerKind::Anthropic,
                HandlerKind::OpenAi,
                HandlerKind::Gemini,
                HandlerKind::OpenRouter,
            ],
            Capability::GenerateImage => &[
                HandlerKind::OpenAi,
                HandlerKind::Flux,
                HandlerKind::StableDiffusion,
            ],
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete backend that implements one or more capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Gemini,
    Perplexity,
    #[serde(rename = "openrouter")]
    OpenRouter,
    Flux,
    StableDiffusion,
}

impl HandlerKind {
    /// Every known handler kind.
    pub const ALL: [HandlerKind; 7] = [
        HandlerKind::OpenAi,
        HandlerKind::Anthropic,
        HandlerKind::Gemini,
        HandlerKind::Perplexity,
        HandlerKind::OpenRouter,
        HandlerKind::Flux,
        HandlerKind::StableDiffusion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::OpenAi => "openai",
            HandlerKind::Anthropic => "anthropic",
            HandlerKind::Gemini => "gemini",
            HandlerKind::Perplexity => "perplexity",
            HandlerKind::OpenRouter => "openrouter",
            HandlerKind::Flux => "flux",
            HandlerKind::StableDiffusion => "stable_diffusion",
        }
    }

    /// Environment variable prefix for this handler's settings.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            HandlerKind::OpenAi => "AUTOPRESS_OPENAI",
            HandlerKind::Anthropic => "AUTOPRESS_ANTHROPIC",
            HandlerKind::Gemini => "AUTOPRESS_GEMINI",
            HandlerKind::Perplexity => "AUTOPRESS_PERPLEXITY",
            HandlerKind::OpenRouter => "AUTOPRESS_OPENROUTER",
            HandlerKind::Flux => "AUTOPRESS_FLUX",
            HandlerKind::StableDiffusion => "AUTOPRESS_STABLE_DIFFUSION",
        }
    }

    /// Whether this kind can ever serve the given capability.
    pub fn supports(&self, capability: Capability) -> bool {
        capability.default_order().contains(self)
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves the ordered candidate list for a capability.
///
/// Preferred handlers come first (in the given order, dropping any that
/// cannot serve the capability), followed by the remaining entries of the
/// default order. Duplicates are removed.
pub fn resolve_order(capability: Capability, preferred: &[HandlerKind]) -> Vec<HandlerKind> {
    let mut order: Vec<HandlerKind> = Vec::new();
    for kind in preferred
        .iter()
        .chain(capability.default_order().iter())
        .copied()
    {
        if kind.supports(capability) && !order.contains(&kind) {
            order.push(kind);
        }
    }
    order
}
