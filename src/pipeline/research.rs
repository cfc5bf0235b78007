//! Research stage.

use crate::campaign::{Campaign, SourceItem};
use crate::prompts::build_research_prompt;
use crate::providers::{Capability, FallbackInvoker, InvokePayload};

use super::orchestrator::PipelineError;

/// Token ceiling for research briefs.
const RESEARCH_MAX_TOKENS: u32 = 2048;

/// Gathers grounding notes for a topic through the research capability.
///
/// Returns `Ok(None)` when no registered handler can serve research, so the
/// stage degrades instead of failing the run.
pub async fn research_topic(
    invoker: &FallbackInvoker,
    campaign: &Campaign,
    source: &SourceItem,
) -> Result<Option<String>, PipelineError> {
    if !invoker.can_serve(Capability::Research) {
        return Ok(None);
    }

    let prompt =
        build_research_prompt(&source.topic, &source.keywords, source.source_url.as_deref())?;
    let payload = InvokePayload::new(prompt.user)
        .with_system(prompt.system)
        .with_max_tokens(RESEARCH_MAX_TOKENS)
        .with_temperature(0.2);

    let outcome = invoker
        .invoke(
            Capability::Research,
            &payload,
            campaign.providers.for_capability(Capability::Research),
        )
        .await
        .map_err(|source| PipelineError::Invoke {
            stage: "research",
            source,
        })?;

    tracing::debug!(
        topic = %source.topic,
        handler = %outcome.handler_used,
        chars = outcome.text.len(),
        "Research gathered"
    );
    Ok(Some(outcome.text.trim().to_string()))
}
