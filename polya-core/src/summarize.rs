//! First-response summarization

use async_trait::async_trait;
use tracing::debug;

use crate::generation::{EngineHandle, GenerationLoop, RunStatus};
use crate::prompt::PromptBuilder;

/// Condenses a long response into a short reference summary.
///
/// The session caches the result, so an implementation is called at most once
/// per conversation.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `raw` using the session's engine context
    async fn summarize(&self, engine: Option<&mut EngineHandle>, raw: &str) -> String;
}

/// Summarizer that asks the engine itself for the summary
#[derive(Debug, Clone, Default)]
pub struct EngineSummarizer {
    generation: GenerationLoop,
}

impl EngineSummarizer {
    /// Create a summarizer whose runs stop after `max_steps`
    pub fn new(max_steps: usize) -> Self {
        Self {
            generation: GenerationLoop::silent(max_steps),
        }
    }
}

#[async_trait]
impl Summarizer for EngineSummarizer {
    async fn summarize(&self, engine: Option<&mut EngineHandle>, raw: &str) -> String {
        let prompt = PromptBuilder::summary_prompt(raw);
        let outcome = self.generation.run(engine, &prompt).await;

        debug!(steps = outcome.steps, status = ?outcome.status, "summary generated");

        if outcome.status == RunStatus::NotReady {
            return outcome.text;
        }
        outcome.trimmed().to_string()
    }
}
