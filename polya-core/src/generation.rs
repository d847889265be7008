//! Bounded generation loop
//!
//! Drives one prompt to completion against an [`EngineContext`]. The loop
//! stops when the engine reports it is done or when the step cap is reached,
//! whichever comes first, and publishes the accumulated text after every step.

use tracing::{debug, warn};

use crate::engine::EngineContext;
use crate::error::messages;
use crate::events::EventEmitter;

/// Owned engine context as held by a session
pub type EngineHandle = Box<dyn EngineContext>;

/// Default step cap
pub const DEFAULT_MAX_STEPS: usize = 1000;

/// Output that counts as "nothing generated"
const DEGENERATE_OUTPUT: &str = "```";

/// One in-flight request: accumulated text and step bookkeeping
#[derive(Debug, Clone)]
pub struct GenerationRun {
    text: String,
    step: usize,
    max_steps: usize,
}

impl GenerationRun {
    /// Start an empty run
    pub fn new(max_steps: usize) -> Self {
        Self {
            text: String::new(),
            step: 0,
            max_steps,
        }
    }

    /// Append a fragment and advance the step counter
    pub fn push(&mut self, fragment: &str) {
        self.text.push_str(fragment);
        self.step += 1;
    }

    /// Accumulated text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Steps taken so far
    pub fn step(&self) -> usize {
        self.step
    }

    /// Whether the step cap has been reached
    pub fn exhausted(&self) -> bool {
        self.step >= self.max_steps
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Engine signalled completion
    Completed,
    /// Step cap reached before completion
    StepCapReached,
    /// Engine failed to start or failed mid-run
    EngineFailed,
    /// No engine context existed
    NotReady,
}

/// Result of a finished run
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    /// Raw accumulated text, untrimmed
    pub raw: String,
    /// Surfaced text: trimmed output, or a fixed message when degenerate
    pub text: String,
    /// Steps taken
    pub steps: usize,
    /// How the run ended
    pub status: RunStatus,
}

impl GenerationOutcome {
    fn not_ready() -> Self {
        Self {
            raw: String::new(),
            text: messages::MODEL_NOT_READY.to_string(),
            steps: 0,
            status: RunStatus::NotReady,
        }
    }

    fn finish(raw: String, steps: usize, status: RunStatus) -> Self {
        let trimmed = raw.trim();
        let text = if is_degenerate(trimmed) {
            messages::FALLBACK.to_string()
        } else {
            trimmed.to_string()
        };
        Self {
            raw,
            text,
            steps,
            status,
        }
    }

    /// Whether the raw output is empty or a bare code fence
    pub fn is_degenerate(&self) -> bool {
        is_degenerate(self.raw.trim())
    }

    /// Trimmed raw output
    pub fn trimmed(&self) -> &str {
        self.raw.trim()
    }
}

fn is_degenerate(trimmed: &str) -> bool {
    trimmed.is_empty() || trimmed == DEGENERATE_OUTPUT
}

/// Runs prompts against an engine context with a step cap
#[derive(Debug, Clone)]
pub struct GenerationLoop {
    max_steps: usize,
    emitter: EventEmitter,
}

impl GenerationLoop {
    /// Create a loop publishing to `emitter`
    pub fn new(max_steps: usize, emitter: EventEmitter) -> Self {
        Self {
            max_steps: max_steps.max(1),
            emitter,
        }
    }

    /// Create a loop that publishes nothing
    pub fn silent(max_steps: usize) -> Self {
        Self::new(max_steps, EventEmitter::disabled())
    }

    /// Drive `prompt` to completion.
    ///
    /// Engine state is cleared and reset before the prompt is submitted.
    pub async fn run(&self, engine: Option<&mut EngineHandle>, prompt: &str) -> GenerationOutcome {
        let Some(engine) = engine else {
            warn!("generation requested without an engine context");
            return GenerationOutcome::not_ready();
        };

        engine.clear().await;
        engine.reset_state().await;

        let prompt_chars = prompt.chars().count();
        self.emitter.generation_started(prompt_chars);
        debug!(prompt_chars, "submitting prompt");

        if let Err(e) = engine.completion_init(prompt).await {
            warn!(error = %e, "engine rejected prompt");
            let outcome = GenerationOutcome::finish(String::new(), 0, RunStatus::EngineFailed);
            self.emitter.generation_finished(0, false, &outcome.text, &outcome.raw);
            return outcome;
        }

        let mut run = GenerationRun::new(self.max_steps);
        let mut failed = false;

        while !engine.is_done() && !run.exhausted() {
            match engine.completion_loop().await {
                Ok(fragment) => run.push(&fragment),
                Err(e) => {
                    warn!(error = %e, step = run.step(), "engine failed mid-run");
                    failed = true;
                    break;
                }
            }
            self.emitter.stream_chunk(run.text(), run.step());
        }

        let status = if failed {
            RunStatus::EngineFailed
        } else if engine.is_done() {
            RunStatus::Completed
        } else {
            warn!(max_steps = self.max_steps, "max step count reached");
            RunStatus::StepCapReached
        };

        let steps = run.step();
        debug!(steps, ?status, chars = run.text().chars().count(), "generation finished");

        let outcome = GenerationOutcome::finish(run.text, steps, status);
        self.emitter.generation_finished(
            steps,
            status == RunStatus::Completed,
            &outcome.text,
            &outcome.raw,
        );
        outcome
    }
}

impl Default for GenerationLoop {
    fn default() -> Self {
        Self::silent(DEFAULT_MAX_STEPS)
    }
}
