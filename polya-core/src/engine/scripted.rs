//! Scripted engine for deterministic sessions
//!
//! Returns predetermined fragments instead of running a model, so flows can be
//! exercised offline. Every call is counted in a shared [`EngineStats`].

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use super::{EngineContext, EngineLoader};
use crate::error::{PolyaError, Result};

/// Counters shared between a loader, its contexts and the test observing them
#[derive(Debug, Default)]
pub struct EngineStats {
    contexts_created: AtomicUsize,
    inits: AtomicUsize,
    loops: AtomicUsize,
    clears: AtomicUsize,
    resets: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl EngineStats {
    /// Number of contexts the loader handed out
    pub fn contexts_created(&self) -> usize {
        self.contexts_created.load(Ordering::SeqCst)
    }

    /// Number of completions started
    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    /// Number of fragments pulled
    pub fn loops(&self) -> usize {
        self.loops.load(Ordering::SeqCst)
    }

    /// Number of `clear` calls
    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    /// Number of `reset_state` calls
    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    /// Every prompt submitted, oldest first
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }

    /// The most recently submitted prompt
    pub async fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().await.last().cloned()
    }
}

#[derive(Debug, Clone)]
enum Script {
    /// Fragments for one completion, in order
    Fragments(Vec<String>),
    /// Emit the same fragment forever without finishing
    Endless(String),
}

/// Loader for [`ScriptedContext`]s
#[derive(Debug, Clone)]
pub struct ScriptedLoader {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    default_script: Script,
    init_error: Option<String>,
    stats: Arc<EngineStats>,
}

impl ScriptedLoader {
    /// Create a loader whose completions are empty unless scripted
    pub fn new() -> Self {
        Self {
            scripts: Arc::new(Mutex::new(VecDeque::new())),
            default_script: Script::Fragments(Vec::new()),
            init_error: None,
            stats: Arc::new(EngineStats::default()),
        }
    }

    /// Queue the fragments of the next completion
    pub fn with_completion<I, S>(self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let script = Script::Fragments(fragments.into_iter().map(Into::into).collect());
        // Uncontended while the loader is still being built
        if let Ok(mut queue) = self.scripts.try_lock() {
            queue.push_back(script);
        }
        self
    }

    /// Fragments used once the queued completions run out
    pub fn with_default_completion<I, S>(mut self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_script = Script::Fragments(fragments.into_iter().map(Into::into).collect());
        self
    }

    /// Every completion emits `fragment` forever and never reports done
    pub fn endless(mut self, fragment: impl Into<String>) -> Self {
        self.default_script = Script::Endless(fragment.into());
        self
    }

    /// Make `create_context` fail
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.init_error = Some(message.into());
        self
    }

    /// Queue another completion after construction
    pub async fn push_completion<I, S>(&self, fragments: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scripts
            .lock()
            .await
            .push_back(Script::Fragments(fragments.into_iter().map(Into::into).collect()));
    }

    /// Shared call counters
    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }

    /// Build a context directly, bypassing the loader contract
    pub fn context(&self) -> ScriptedContext {
        self.stats.contexts_created.fetch_add(1, Ordering::SeqCst);
        ScriptedContext {
            scripts: Arc::clone(&self.scripts),
            default_script: self.default_script.clone(),
            current: None,
            cursor: 0,
            stats: Arc::clone(&self.stats),
        }
    }
}

impl Default for ScriptedLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EngineLoader for ScriptedLoader {
    async fn create_context(&self, model_path: &Path) -> Result<Box<dyn EngineContext>> {
        if let Some(ref message) = self.init_error {
            return Err(PolyaError::EngineInit(format!(
                "{}: {}",
                model_path.display(),
                message
            )));
        }
        Ok(Box::new(self.context()))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Engine context that replays scripted completions
#[derive(Debug)]
pub struct ScriptedContext {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    default_script: Script,
    current: Option<Script>,
    cursor: usize,
    stats: Arc<EngineStats>,
}

#[async_trait]
impl EngineContext for ScriptedContext {
    async fn clear(&mut self) {
        self.stats.clears.fetch_add(1, Ordering::SeqCst);
        self.current = None;
        self.cursor = 0;
    }

    async fn reset_state(&mut self) {
        self.stats.resets.fetch_add(1, Ordering::SeqCst);
        self.current = None;
        self.cursor = 0;
    }

    async fn completion_init(&mut self, prompt: &str) -> Result<()> {
        self.stats.inits.fetch_add(1, Ordering::SeqCst);
        self.stats.prompts.lock().await.push(prompt.to_string());

        let next = self.scripts.lock().await.pop_front();
        self.current = Some(next.unwrap_or_else(|| self.default_script.clone()));
        self.cursor = 0;
        Ok(())
    }

    fn is_done(&self) -> bool {
        match &self.current {
            None => true,
            Some(Script::Fragments(fragments)) => self.cursor >= fragments.len(),
            Some(Script::Endless(_)) => false,
        }
    }

    async fn completion_loop(&mut self) -> Result<String> {
        self.stats.loops.fetch_add(1, Ordering::SeqCst);
        let fragment = match &self.current {
            None => String::new(),
            Some(Script::Fragments(fragments)) => {
                fragments.get(self.cursor).cloned().unwrap_or_default()
            }
            Some(Script::Endless(fragment)) => fragment.clone(),
        };
        self.cursor += 1;
        Ok(fragment)
    }
}
