//! Session Manager
//!
//! A [`SessionManager`] owns the conversation state and the single engine
//! context of one tutoring session, and exposes the two generation flows:
//!
//! - [`SessionManager::solve`] produces the initial multi-step solution
//! - [`SessionManager::continue_conversation`] answers a follow-up question
//!
//! Both flows hold the session lock for the whole clear, submit and stream
//! sequence, so at most one generation run is in flight. A flow that finds the
//! session busy replies with a fixed message instead of waiting. Resets wait
//! for the in-flight flow to finish.
//!
//! Every failure is turned into a fixed user-facing reply at the flow
//! boundary; the session stays usable afterwards.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::config::{LimitsConfig, PolyaConfig};
use crate::conversation::{BudgetWindow, ConversationState, Turn};
use crate::engine::EngineLoader;
use crate::error::{PolyaError, Rejection, Result};
use crate::events::{EventEmitter, EventReceiver, event_channel};
use crate::generation::{EngineHandle, GenerationLoop};
use crate::problem::Problem;
use crate::prompt::{PromptBuilder, SolutionRequest, estimate_tokens};
use crate::summarize::{EngineSummarizer, Summarizer};

/// State guarded by the session lock
#[derive(Default)]
struct SessionCore {
    engine: Option<EngineHandle>,
    state: ConversationState,
}

/// Check a follow-up message before any engine work.
///
/// Rules apply in order and the first match wins: blank input, stop intent
/// (case-insensitive substring match), then the length cap in characters.
pub fn validate_follow_up(message: &str, limits: &LimitsConfig) -> std::result::Result<(), Rejection> {
    if message.trim().is_empty() {
        debug!("ignored empty message");
        return Err(Rejection::EmptyInput);
    }

    let lowered = message.to_lowercase();
    if limits
        .stop_phrases
        .iter()
        .any(|phrase| lowered.contains(&phrase.to_lowercase()))
    {
        info!("detected stop intent in input");
        return Err(Rejection::StopIntent);
    }

    let chars = message.chars().count();
    if chars > limits.max_input_chars {
        warn!(chars, max = limits.max_input_chars, "follow-up message too long");
        return Err(Rejection::InputTooLong);
    }

    Ok(())
}

/// One tutoring session over a single engine context
pub struct SessionManager {
    loader: Arc<dyn EngineLoader>,
    config: PolyaConfig,
    emitter: EventEmitter,
    summarizer: Arc<dyn Summarizer>,
    prompts: PromptBuilder,
    window: BudgetWindow,
    generation: GenerationLoop,
    core: Mutex<SessionCore>,
    ready: AtomicBool,
}

impl SessionManager {
    /// Create a session. No engine context exists until first use.
    pub fn new(loader: Arc<dyn EngineLoader>, config: PolyaConfig) -> Self {
        let limits = &config.limits;
        Self {
            prompts: PromptBuilder::new(limits.max_prompt_chars),
            window: BudgetWindow::new(limits.token_budget, limits.token_reserve),
            generation: GenerationLoop::silent(limits.max_steps),
            summarizer: Arc::new(EngineSummarizer::new(limits.max_steps)),
            emitter: EventEmitter::disabled(),
            loader,
            config,
            core: Mutex::new(SessionCore::default()),
            ready: AtomicBool::new(false),
        }
    }

    /// Publish session events through `emitter`
    pub fn with_emitter(mut self, emitter: EventEmitter) -> Self {
        self.generation = GenerationLoop::new(self.config.limits.max_steps, emitter.clone());
        self.emitter = emitter;
        self
    }

    /// Publish session events on a new channel sized from the event config.
    ///
    /// When events are disabled the returned receiver yields nothing.
    pub fn with_event_channel(self) -> (Self, EventReceiver) {
        let (tx, rx) = event_channel(self.config.events.buffer_size);
        if self.config.events.enabled {
            (self.with_emitter(EventEmitter::new(tx)), rx)
        } else {
            (self, rx)
        }
    }

    /// Watch the accumulated text of the run in flight.
    ///
    /// Returns `None` unless events are enabled.
    pub fn subscribe_stream(&self) -> Option<watch::Receiver<String>> {
        self.emitter.subscribe_stream()
    }

    /// Replace the summarizer used for follow-up prompts
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn config(&self) -> &PolyaConfig {
        &self.config
    }

    /// Whether an engine context exists
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Create the engine context if it does not exist yet.
    ///
    /// Repeated calls after a success are no-ops.
    pub async fn ensure_ready(&self) -> Result<()> {
        let mut core = self.core.lock().await;
        self.ensure_ready_locked(&mut core).await
    }

    /// Drop history and every cached value. The engine context is kept.
    pub async fn reset_chat(&self) {
        let mut core = self.core.lock().await;
        core.state.clear();
        info!("chat reset");
    }

    /// Clear conversation state and the engine's generation state.
    ///
    /// Conversation state is cleared even when no engine context can be
    /// created; the creation error is returned afterwards.
    pub async fn force_reset(&self) -> Result<()> {
        let mut core = self.core.lock().await;
        self.force_reset_locked(&mut core).await
    }

    /// Generate the initial solution for a problem
    pub async fn solve(&self, request: &SolutionRequest) -> String {
        info!(
            problem_chars = request.problem.chars().count(),
            technique = %request.technique,
            "solve requested"
        );

        let reply = match self.core.try_lock() {
            Ok(mut core) => self
                .solve_locked(&mut core, request)
                .await
                .unwrap_or_else(|e| e.reply_text().to_string()),
            Err(_) => {
                warn!("solve requested while a response is in flight");
                Rejection::Busy.message().to_string()
            }
        };

        self.emitter.reply(&reply);
        reply
    }

    /// Answer a follow-up question about the current solution
    pub async fn continue_conversation(&self, message: &str) -> String {
        let reply = match validate_follow_up(message, &self.config.limits) {
            Err(rejection) => rejection.message().to_string(),
            Ok(()) => match self.core.try_lock() {
                Ok(mut core) => self
                    .continue_locked(&mut core, message)
                    .await
                    .unwrap_or_else(|e| e.reply_text().to_string()),
                Err(_) => {
                    warn!("follow-up requested while a response is in flight");
                    Rejection::Busy.message().to_string()
                }
            },
        };

        self.emitter.reply(&reply);
        reply
    }

    /// Reset for `problem` and generate its solution
    pub async fn open_problem(&self, problem: &Problem) -> String {
        info!(id = %problem.id, "opening problem");
        if let Err(e) = self.force_reset().await {
            debug!(error = %e, "reset before solve left the session not ready");
        }
        self.solve(&SolutionRequest::from(problem)).await
    }

    /// Snapshot of the stored turns, oldest first
    pub async fn history(&self) -> Vec<Turn> {
        self.core.lock().await.state.history().turns().to_vec()
    }

    /// Cached summary of the first response, if computed
    pub async fn cached_summary(&self) -> Option<String> {
        self.core.lock().await.state.summary().map(str::to_string)
    }

    /// Tear down the engine context and clear all state
    pub async fn shutdown(&self) {
        let mut core = self.core.lock().await;
        core.state.clear();
        if core.engine.take().is_some() {
            self.ready.store(false, Ordering::SeqCst);
            self.emitter.readiness_changed(false);
            info!("session shut down");
        }
    }

    async fn ensure_ready_locked(&self, core: &mut SessionCore) -> Result<()> {
        if core.engine.is_some() {
            return Ok(());
        }

        let model_path = &self.config.engine.model_path;
        match self.loader.create_context(model_path).await {
            Ok(context) => {
                core.engine = Some(context);
                self.ready.store(true, Ordering::SeqCst);
                info!(engine = self.loader.name(), path = %model_path.display(), "engine context initialized");
                self.emitter.readiness_changed(true);
                Ok(())
            }
            Err(e) => {
                warn!(engine = self.loader.name(), error = %e, "failed to initialize engine context");
                self.ready.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn force_reset_locked(&self, core: &mut SessionCore) -> Result<()> {
        let ready = self.ensure_ready_locked(core).await;
        core.state.clear();

        match core.engine.as_mut() {
            Some(engine) => {
                engine.clear().await;
                engine.reset_state().await;
                info!("context and history reset for new problem");
            }
            None => warn!("reset requested without an engine context"),
        }
        ready
    }

    async fn solve_locked(&self, core: &mut SessionCore, request: &SolutionRequest) -> Result<String> {
        self.ensure_ready_locked(core).await?;

        let prompt = self.prompts.solution_prompt(request);
        let chars = self.prompts.metrics(&prompt, "solution");
        if !self.prompts.fits(&prompt) {
            warn!(chars, max = self.prompts.max_prompt_chars(), "solution prompt too long");
            return Err(Rejection::SolutionPromptTooLong.into());
        }

        self.force_reset_locked(core).await?;
        core.state.set_technique(request.technique.as_str());

        let outcome = self.generation.run(core.engine.as_mut(), &prompt).await;
        info!(
            steps = outcome.steps,
            chars = outcome.raw.chars().count(),
            status = ?outcome.status,
            "solution generated"
        );

        if !outcome.is_degenerate() {
            core.state.push(Turn::user(request.problem.as_str()));
            core.state.push(Turn::assistant(outcome.trimmed()));
        }
        core.state.dump("after solve");

        Ok(outcome.text)
    }

    async fn continue_locked(&self, core: &mut SessionCore, message: &str) -> Result<String> {
        self.ensure_ready_locked(core).await?;
        core.state.dump("before follow-up");

        debug!(
            chars = message.chars().count(),
            tokens = estimate_tokens(message),
            "follow-up input"
        );
        core.state.push(Turn::user(message));

        let prompt = self.follow_up_prompt(core, message).await;
        let chars = self.prompts.metrics(&prompt, "follow-up");
        if !self.prompts.fits(&prompt) {
            warn!(chars, max = self.prompts.max_prompt_chars(), "follow-up prompt too long");
            return Err(PolyaError::Rejected(Rejection::FollowUpPromptTooLong));
        }

        let outcome = self.generation.run(core.engine.as_mut(), &prompt).await;
        info!(
            steps = outcome.steps,
            chars = outcome.raw.chars().count(),
            status = ?outcome.status,
            "follow-up answered"
        );

        if !outcome.is_degenerate() {
            core.state.push_assistant(outcome.trimmed());
        }

        Ok(outcome.text)
    }

    /// Build the follow-up prompt, summarizing the first response on first use
    async fn follow_up_prompt(&self, core: &mut SessionCore, message: &str) -> String {
        if !core.state.has_summary() {
            let window = self.window.select(core.state.history().turns());
            debug!(
                turns = window.len(),
                tokens = BudgetWindow::cost(window),
                budget = self.window.working_budget(),
                "history window selected"
            );

            let first = ConversationState::first_assistant(window).map(|t| t.content().to_string());
            if let Some(first) = first {
                let summary = self.summarizer.summarize(core.engine.as_mut(), &first).await;
                debug!(chars = summary.chars().count(), "first response summarized");
                core.state.cache_summary(first, summary);
            }
        } else {
            debug!(
                source_chars = core.state.first_response().map_or(0, |r| r.chars().count()),
                "reusing cached summary"
            );
        }

        let summary = core.state.summary().filter(|s| !s.is_empty());
        self.prompts
            .follow_up_prompt(summary, core.state.technique(), message)
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("engine", &self.loader.name())
            .field("ready", &self.is_ready())
            .field("emitter", &self.emitter)
            .finish()
    }
}
