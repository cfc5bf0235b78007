//! Provider fallback invoker.
//!
//! Calls a [`Capability`] through an ordered chain of registered handlers:
//! - Preferred handlers first, then the capability's default order
//! - Falls through to the next handler on any failure
//! - Reports the handler that succeeded and every failed attempt

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use super::capability::{resolve_order, Capability, HandlerKind};
use crate::error::ProviderError;
use crate::metrics::MetricsCollector;

/// Payload passed to a capability handler.
#[derive(Debug, Clone, Default)]
pub struct InvokePayload {
    /// The main prompt.
    pub prompt: String,
    /// Optional system instructions.
    pub system: Option<String>,
    /// Token ceiling for text generation.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Extra grounding context appended by the handler.
    pub context: Option<String>,
}

impl InvokePayload {
    /// Create a payload with only a prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Set the system instructions.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the token ceiling.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Attach grounding context.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Successful output of a single handler.
#[derive(Debug, Clone)]
pub struct HandlerResponse {
    /// Generated text, or an image URL for image generation.
    pub text: String,
}

impl HandlerResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A concrete backend implementation of one or more capabilities.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// Which handler kind this is.
    fn kind(&self) -> HandlerKind;

    /// Whether this instance serves the capability.
    fn supports(&self, capability: Capability) -> bool {
        self.kind().supports(capability)
    }

    /// Execute the capability.
    async fn invoke(
        &self,
        capability: Capability,
        payload: &InvokePayload,
    ) -> Result<HandlerResponse, ProviderError>;
}

/// A single failed handler attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerAttempt {
    pub handler: HandlerKind,
    pub error: String,
}

impl fmt::Display for HandlerAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.handler, self.error)
    }
}

/// Result of a successful invocation.
#[derive(Debug, Clone)]
pub struct InvokeOutcome {
    /// Output of the winning handler.
    pub text: String,
    /// The handler that succeeded.
    pub handler_used: HandlerKind,
    /// Latency of the successful attempt in milliseconds.
    pub latency_ms: u64,
    /// Failed attempts that preceded the success.
    pub failed_attempts: Vec<HandlerAttempt>,
}

/// Error type for invoker operations.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    /// No registered handler can serve the capability.
    #[error("No handlers available for capability '{capability}'")]
    NoHandlers { capability: Capability },

    /// Every candidate handler failed.
    #[error("All handlers failed for capability '{capability}' (attempted: {}): {}", attempted_names(.attempts), join_attempts(.attempts))]
    AllHandlersFailed {
        capability: Capability,
        attempts: Vec<HandlerAttempt>,
    },
}

impl InvokeError {
    /// The handlers that were attempted before giving up.
    pub fn attempts(&self) -> &[HandlerAttempt] {
        match self {
            InvokeError::NoHandlers { .. } => &[],
            InvokeError::AllHandlersFailed { attempts, .. } => attempts,
        }
    }
}

fn attempted_names(attempts: &[HandlerAttempt]) -> String {
    attempts
        .iter()
        .map(|a| a.handler.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_attempts(attempts: &[HandlerAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Invokes capabilities through a prioritized handler chain.
#[derive(Default)]
pub struct FallbackInvoker {
    handlers: HashMap<HandlerKind, Arc<dyn CapabilityHandler>>,
    metrics: MetricsCollector,
}

impl FallbackInvoker {
    /// Create an invoker with no handlers registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous handler of the same kind.
    pub fn register(&mut self, handler: Arc<dyn CapabilityHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    /// Builder-style registration.
    pub fn with_handler(mut self, handler: Arc<dyn CapabilityHandler>) -> Self {
        self.register(handler);
        self
    }

    /// Registered handler kinds.
    pub fn registered(&self) -> Vec<HandlerKind> {
        let mut kinds: Vec<HandlerKind> = self.handlers.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    /// Whether any handler can serve the capability.
    pub fn can_serve(&self, capability: Capability) -> bool {
        self.handlers.values().any(|h| h.supports(capability))
    }

    /// The ordered handlers that would be attempted for a capability.
    pub fn candidates(&self, capability: Capability, preferred: &[HandlerKind]) -> Vec<HandlerKind> {
        resolve_order(capability, preferred)
            .into_iter()
            .filter(|kind| {
                self.handlers
                    .get(kind)
                    .is_some_and(|h| h.supports(capability))
            })
            .collect()
    }

    /// Invoke a capability, falling through the candidate chain on failure.
    pub async fn invoke(
        &self,
        capability: Capability,
        payload: &InvokePayload,
        preferred: &[HandlerKind],
    ) -> Result<InvokeOutcome, InvokeError> {
        let chain = self.candidates(capability, preferred);
        if chain.is_empty() {
            return Err(InvokeError::NoHandlers { capability });
        }

        let mut attempts = Vec::new();

        for kind in chain {
            let Some(handler) = self.handlers.get(&kind) else {
                continue;
            };

            let started = Instant::now();
            let result = handler.invoke(capability, payload).await;
            let elapsed = started.elapsed();

            match result {
                Ok(response) if !response.text.trim().is_empty() => {
                    self.metrics
                        .record_handler_attempt(capability.as_str(), kind.as_str(), true, elapsed.as_secs_f64());
                    tracing::debug!(
                        capability = %capability,
                        handler = %kind,
                        latency_ms = elapsed.as_millis() as u64,
                        fallbacks = attempts.len(),
                        "Capability served"
                    );
                    return Ok(InvokeOutcome {
                        text: response.text,
                        handler_used: kind,
                        latency_ms: elapsed.as_millis() as u64,
                        failed_attempts: attempts,
                    });
                }
                Ok(_) => {
                    self.metrics
                        .record_handler_attempt(capability.as_str(), kind.as_str(), false, elapsed.as_secs_f64());
                    tracing::warn!(
                        capability = %capability,
                        handler = %kind,
                        "Handler returned empty output, trying next"
                    );
                    attempts.push(HandlerAttempt {
                        handler: kind,
                        error: ProviderError::EmptyResponse.to_string(),
                    });
                }
                Err(e) => {
                    self.metrics
                        .record_handler_attempt(capability.as_str(), kind.as_str(), false, elapsed.as_secs_f64());
                    tracing::warn!(
                        capability = %capability,
                        handler = %kind,
                        transient = e.is_transient(),
                        error = %e,
                        "Handler failed, trying next in fallback chain"
                    );
                    attempts.push(HandlerAttempt {
                        handler: kind,
                        error: e.to_string(),
                    });
                }
            }
        }

        Err(InvokeError::AllHandlersFailed {
            capability,
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mock handler recording every invocation into a shared log.
    struct MockHandler {
        kind: HandlerKind,
        fail: bool,
        output: String,
        log: Arc<Mutex<Vec<HandlerKind>>>,
    }

    impl MockHandler {
        fn new(kind: HandlerKind, fail: bool, log: Arc<Mutex<Vec<HandlerKind>>>) -> Self {
            Self {
                kind,
                fail,
                output: format!("output from {}", kind),
                log,
            }
        }
    }

    #[async_trait]
    impl CapabilityHandler for MockHandler {
        fn kind(&self) -> HandlerKind {
            self.kind
        }

        async fn invoke(
            &self,
            _capability: Capability,
            _payload: &InvokePayload,
        ) -> Result<HandlerResponse, ProviderError> {
            self.log.lock().expect("lock poisoned").push(self.kind);
            if self.fail {
                return Err(ProviderError::RequestFailed(format!("{} is down", self.kind)));
            }
            Ok(HandlerResponse::new(self.output.clone()))
        }
    }

    fn invoker_with(failing: &[HandlerKind], log: &Arc<Mutex<Vec<HandlerKind>>>) -> FallbackInvoker {
        let mut invoker = FallbackInvoker::new();
        for kind in Capability::GenerateText.default_order() {
            invoker.register(Arc::new(MockHandler::new(
                *kind,
                failing.contains(kind),
                Arc::clone(log),
            )));
        }
        invoker
    }

    #[tokio::test]
    async fn test_first_handler_succeeds() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let invoker = invoker_with(&[], &log);

        let outcome = invoker
            .invoke(Capability::GenerateText, &InvokePayload::new("hi"), &[])
            .await
            .expect("should succeed");

        assert_eq!(outcome.handler_used, HandlerKind::Anthropic);
        assert!(outcome.failed_attempts.is_empty());
        assert_eq!(*log.lock().expect("lock"), vec![HandlerKind::Anthropic]);
    }

    #[tokio::test]
    async fn test_falls_through_in_order_and_stops() {
        let log = Arc::new(Mutex::new(Vec::new()));
        // Anthropic and OpenAI fail; Gemini succeeds; OpenRouter must not be tried.
        let invoker = invoker_with(&[HandlerKind::Anthropic, HandlerKind::OpenAi], &log);

        let outcome = invoker
            .invoke(Capability::GenerateText, &InvokePayload::new("hi"), &[])
            .await
            .expect("should succeed via fallback");

        assert_eq!(outcome.handler_used, HandlerKind::Gemini);
        assert_eq!(outcome.failed_attempts.len(), 2);
        assert_eq!(
            *log.lock().expect("lock"),
            vec![HandlerKind::Anthropic, HandlerKind::OpenAi, HandlerKind::Gemini]
        );
    }

    #[tokio::test]
    async fn test_all_fail_reports_every_attempt() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let all = Capability::GenerateText.default_order().to_vec();
        let invoker = invoker_with(&all, &log);

        let err = invoker
            .invoke(Capability::GenerateText, &InvokePayload::new("hi"), &[])
            .await
            .expect_err("should fail");

        assert_eq!(err.attempts().len(), 4);
        let message = err.to_string();
        assert!(message.contains("anthropic, openai, gemini, openrouter"));
        assert!(message.contains("gemini: HTTP request failed: gemini is down"));
    }

    #[tokio::test]
    async fn test_preferred_handler_goes_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let invoker = invoker_with(&[], &log);

        let outcome = invoker
            .invoke(
                Capability::GenerateText,
                &InvokePayload::new("hi"),
                &[HandlerKind::OpenRouter],
            )
            .await
            .expect("should succeed");

        assert_eq!(outcome.handler_used, HandlerKind::OpenRouter);
    }

    #[tokio::test]
    async fn test_no_handlers() {
        let invoker = FallbackInvoker::new();
        let err = invoker
            .invoke(Capability::Research, &InvokePayload::new("hi"), &[])
            .await
            .expect_err("no handlers");
        assert!(matches!(err, InvokeError::NoHandlers { .. }));
    }

    #[tokio::test]
    async fn test_unregistered_kinds_are_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let invoker = FallbackInvoker::new().with_handler(Arc::new(MockHandler::new(
            HandlerKind::OpenRouter,
            false,
            Arc::clone(&log),
        )));

        assert_eq!(
            invoker.candidates(Capability::GenerateText, &[]),
            vec![HandlerKind::OpenRouter]
        );
        let outcome = invoker
            .invoke(Capability::GenerateText, &InvokePayload::new("hi"), &[])
            .await
            .expect("should succeed");
        assert_eq!(outcome.handler_used, HandlerKind::OpenRouter);
    }

    #[test]
    fn test_payload_builder() {
        let payload = InvokePayload::new("prompt")
            .with_system("system")
            .with_max_tokens(100)
            .with_temperature(0.2)
            .with_context("notes");

        assert_eq!(payload.prompt, "prompt");
        assert_eq!(payload.system.as_deref(), Some("system"));
        assert_eq!(payload.max_tokens, Some(100));
        assert_eq!(payload.context.as_deref(), Some("notes"));
    }
}
