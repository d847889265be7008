//! # Polya - Guided Math-Problem Sessions on a Local Engine
//!
//! Polya orchestrates a tutoring conversation about a single math problem on
//! top of a local text-generation engine:
//! - Initial multi-step solution generated under a named problem-solving technique
//! - Bounded follow-up answers that never re-solve or switch technique
//! - Character-capped prompts and a word-based token budget for history
//! - Streaming generation with a hard step cap
//! - Math-safe text cleanup that keeps `$$...$$` spans byte-for-byte
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use polya_core::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = PolyaConfig::load()?;
//!     let loader = ScriptedLoader::new().with_completion(["1. Try 5.\n", "2. $$2+3=5$$"]);
//!     let session = SessionManager::new(Arc::new(loader), config);
//!
//!     let solution = session
//!         .solve(&SolutionRequest::new("What is $$2+3$$?", "Guess and check"))
//!         .await;
//!     println!("{}", solution);
//!
//!     let answer = session.continue_conversation("Why 5?").await;
//!     println!("{}", answer);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Engine adapter**: [`engine::EngineLoader`] / [`engine::EngineContext`] traits
//! - **Sanitizer**: [`sanitize::sanitize`]
//! - **Prompt builder**: [`prompt::PromptBuilder`]
//! - **Summarizer**: [`summarize::Summarizer`]
//! - **Generation loop**: [`generation::GenerationLoop`]
//! - **Session manager**: [`session::SessionManager`]
//!
//! ## Feature Flags
//!
//! - `engine-llama-server`: adapter for a llama.cpp-compatible HTTP server

pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod events;
pub mod generation;
pub mod problem;
pub mod prompt;
pub mod sanitize;
pub mod session;
pub mod summarize;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{EngineConfig, EventConfig, LimitsConfig, PolyaConfig};
    pub use crate::conversation::{BudgetWindow, ConversationHistory, ConversationState, Role, Turn};
    pub use crate::engine::{EngineContext, EngineLoader, EngineStats, ScriptedContext, ScriptedLoader};
    pub use crate::error::{PolyaError, Rejection, Result, messages};
    pub use crate::events::{EventEmitter, EventReceiver, EventSender, SessionEvent, event_channel};
    pub use crate::generation::{
        EngineHandle, GenerationLoop, GenerationOutcome, GenerationRun, RunStatus,
    };
    pub use crate::problem::{Problem, ProblemStore};
    pub use crate::prompt::{PromptBuilder, SolutionRequest};
    pub use crate::sanitize::sanitize;
    pub use crate::session::{SessionManager, validate_follow_up};
    pub use crate::summarize::{EngineSummarizer, Summarizer};

    #[cfg(feature = "engine-llama-server")]
    pub use crate::engine::{LlamaServerContext, LlamaServerLoader};
}
