//! Conversation State Management
//!
//! Turn history for a single problem walkthrough plus the values cached from
//! the first solution.
//!
//! # Features
//!
//! - Append-only turn history (oldest first)
//! - Cached first assistant response and its summary
//! - Token-budgeted history window for prompt construction
//!
//! # Example
//!
//! ```rust,ignore
//! use polya_core::conversation::{BudgetWindow, ConversationState, Turn};
//!
//! let mut state = ConversationState::new();
//! state.push(Turn::user("What is 2^5?"));
//! state.push(Turn::assistant("1. $$2^5 = 32$$"));
//!
//! let window = BudgetWindow::new(2048, 300).select(state.history().turns());
//! ```

mod history;
mod state;
mod window;

pub use history::{ConversationHistory, Role, Turn};
pub use state::ConversationState;
pub use window::BudgetWindow;
