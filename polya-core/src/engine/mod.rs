//! Engine Adapter contract
//!
//! The text-generation engine lives outside this crate. A session talks to it
//! through two narrow traits:
//!
//! - [`EngineLoader`] builds an [`EngineContext`] from a model resource.
//! - [`EngineContext`] runs one completion at a time, pulled fragment by
//!   fragment until the engine reports it is done.
//!
//! # Example
//!
//! ```rust,ignore
//! use polya_core::engine::{EngineLoader, ScriptedLoader};
//!
//! let loader = ScriptedLoader::new().with_completion(["1. Guess ", "and check."]);
//! let mut ctx = loader.create_context("model.gguf".as_ref()).await?;
//! ctx.completion_init("Solve ...").await?;
//! while !ctx.is_done() {
//!     print!("{}", ctx.completion_loop().await?);
//! }
//! ```

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

mod scripted;

#[cfg(feature = "engine-llama-server")]
pub mod llama_server;

pub use scripted::{EngineStats, ScriptedContext, ScriptedLoader};

#[cfg(feature = "engine-llama-server")]
pub use llama_server::{LlamaServerContext, LlamaServerLoader};

/// Per-session handle onto the engine's generation state.
///
/// Implementations are driven by one caller at a time; the session owns the
/// context exclusively and never shares it between flows.
#[async_trait]
pub trait EngineContext: Send {
    /// Discard any buffered output of the previous completion.
    async fn clear(&mut self);

    /// Discard engine-held sequence state (KV cache and the like).
    async fn reset_state(&mut self);

    /// Begin a new completion from `prompt`.
    async fn completion_init(&mut self, prompt: &str) -> Result<()>;

    /// Whether the current completion has finished.
    fn is_done(&self) -> bool;

    /// Produce the next fragment of the current completion (may be empty).
    async fn completion_loop(&mut self) -> Result<String>;
}

/// Builds engine contexts from a model resource.
#[async_trait]
pub trait EngineLoader: Send + Sync {
    /// Create a context for the model at `model_path`.
    async fn create_context(&self, model_path: &Path) -> Result<Box<dyn EngineContext>>;

    /// Loader name for diagnostics
    fn name(&self) -> &'static str {
        "unknown"
    }
}
