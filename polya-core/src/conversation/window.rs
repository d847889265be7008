//! Token-budgeted history window

use super::history::Turn;

/// Selects the most recent turns that fit a word-based token budget.
///
/// The window is always a contiguous suffix of the history in chronological
/// order. Walking back from the newest turn, selection stops at the first turn
/// that would push the running total past the working budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetWindow {
    total_budget: usize,
    reserve: usize,
}

impl BudgetWindow {
    /// Create a window over `total_budget` tokens with `reserve` held back
    pub fn new(total_budget: usize, reserve: usize) -> Self {
        Self {
            total_budget,
            reserve,
        }
    }

    /// Tokens available for history
    pub fn working_budget(&self) -> usize {
        self.total_budget.saturating_sub(self.reserve)
    }

    /// Select the suffix of `turns` that fits the working budget
    pub fn select<'a>(&self, turns: &'a [Turn]) -> &'a [Turn] {
        let budget = self.working_budget();
        let mut total = 0;
        let mut start = turns.len();

        for (index, turn) in turns.iter().enumerate().rev() {
            let cost = turn.estimate_tokens();
            if total + cost > budget {
                break;
            }
            total += cost;
            start = index;
        }

        &turns[start..]
    }

    /// Estimated tokens of a selected window
    pub fn cost(turns: &[Turn]) -> usize {
        turns.iter().map(Turn::estimate_tokens).sum()
    }
}

impl Default for BudgetWindow {
    fn default() -> Self {
        Self::new(2048, 300)
    }
}
