//! Prompt assembly
//!
//! Three prompt shapes are sent to the engine:
//!
//! - the initial solution prompt, built from a [`SolutionRequest`]
//! - the follow-up prompt, built from the cached summary and the new message
//! - the summary prompt, wrapping the first response for condensation
//!
//! Solution and follow-up prompts are capped at a fixed number of characters.
//! The cap is checked by the caller through [`PromptBuilder::fits`]; a prompt
//! over the cap is never submitted.

use tracing::debug;

use crate::error::messages;
use crate::problem::Problem;
use crate::sanitize::sanitize;

/// Default hard cap on prompt length, in characters
pub const DEFAULT_MAX_PROMPT_CHARS: usize = 1855;

/// Inputs of the initial solution prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionRequest {
    pub problem: String,
    pub technique: String,
    pub figure_description: Option<String>,
    pub final_answer: Option<String>,
    pub solution: Option<String>,
}

impl SolutionRequest {
    pub fn new(problem: impl Into<String>, technique: impl Into<String>) -> Self {
        Self {
            problem: problem.into(),
            technique: technique.into(),
            figure_description: None,
            final_answer: None,
            solution: None,
        }
    }

    pub fn with_figure_description(mut self, description: impl Into<String>) -> Self {
        self.figure_description = Some(description.into());
        self
    }

    pub fn with_final_answer(mut self, answer: impl Into<String>) -> Self {
        self.final_answer = Some(answer.into());
        self
    }

    pub fn with_solution(mut self, solution: impl Into<String>) -> Self {
        self.solution = Some(solution.into());
        self
    }
}

impl From<&Problem> for SolutionRequest {
    fn from(problem: &Problem) -> Self {
        Self {
            problem: problem.body.clone(),
            technique: problem.technique_label(),
            figure_description: problem.figure_description.clone(),
            final_answer: problem.final_answer.clone(),
            solution: problem.solution.clone(),
        }
    }
}

/// Builds prompts and checks them against the character cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptBuilder {
    max_prompt_chars: usize,
}

impl PromptBuilder {
    pub fn new(max_prompt_chars: usize) -> Self {
        Self { max_prompt_chars }
    }

    pub fn max_prompt_chars(&self) -> usize {
        self.max_prompt_chars
    }

    /// Prompt for the initial multi-step solution
    pub fn solution_prompt(&self, request: &SolutionRequest) -> String {
        let figure = request
            .figure_description
            .as_deref()
            .map(|d| format!("Figure: {}", d))
            .unwrap_or_default();

        format!(
            "Solve the problem using the Polya-style technique: {technique}. \
             Problem: {problem} {figure} \
             Provided Solution: {solution} \
             Rewrite the reasoning clearly in **no more than 8 steps**, preserving all original logic, numbers, and guesses. \
             Do not break down or expand algebraic expressions unless absolutely necessary. \
             Do not explain how to solve equations or do arithmetic. \
             Use new lines for each step (e.g., 1. ..., 2. ...). \
             Use only double dollar signs for math expressions (e.g., $$2^5 = 32$$). \
             Never use a single dollar sign \"$\". \
             Finish with the final answer: {final_answer} and nothing else.",
            technique = request.technique,
            problem = request.problem,
            figure = figure,
            solution = request.solution.as_deref().unwrap_or_default(),
            final_answer = request.final_answer.as_deref().unwrap_or_default(),
        )
    }

    /// Prompt for a follow-up question.
    ///
    /// `summary` falls back to a fixed placeholder when no summary exists.
    /// Both the summary and the message are sanitized before embedding.
    pub fn follow_up_prompt(
        &self,
        summary: Option<&str>,
        technique: Option<&str>,
        user_input: &str,
    ) -> String {
        let technique_line = technique.map(|t| format!("- {}", t)).unwrap_or_default();
        let summary = summary.unwrap_or(messages::NO_SUMMARY);

        format!(
            "Continue the conversation focused only on the new user message. \
             Be brief, clear, and to the point. Use a single-column format. \
             Use only $$...$$ for math, never $...$. \
             Do NOT use a single dollar sign ($) for math or currency. \
             Do not solve the problem again or attempt any alternative solution, even if explicitly requested. \
             Do not introduce new techniques. \
             Do not use or mention techniques that were not used in the assistant summary. \
             The assistant summary uses the Polya's technique(s): \"{technique_line}\". \
             Do not repeat reasoning or sentences. \
             Answer only based on the assistant summary. \
             If the question is unrelated to the summary, reply: \"{out_of_scope}\" \
             Assistant (summary):{summary} User (new): {input}. Assistant:",
            technique_line = technique_line,
            out_of_scope = messages::OUT_OF_SCOPE,
            summary = sanitize(summary),
            input = sanitize(user_input),
        )
    }

    /// Prompt asking the engine to condense a first response
    pub fn summary_prompt(raw: &str) -> String {
        format!(
            "Summarize the following explanation in 5\u{2013}7 plain sentences. \
             Use only double dollar signs for math expressions like $$3 \u{d7} 0.6 = 1.8$$. \
             For prices, write as \"3.5 dollars\", never \"$3.5\". \
             Do not use single dollar signs \"$...$\" under any condition. \
             Be concise and preserve all numeric accuracy. \
             End with a final sentence stating the answer clearly. \
             Explanation to summarize: {}",
            sanitize(raw)
        )
    }

    /// Whether `prompt` is within the character cap
    pub fn fits(&self, prompt: &str) -> bool {
        prompt_chars(prompt) <= self.max_prompt_chars
    }

    /// Log size metrics for `prompt` and return its character count
    pub fn metrics(&self, prompt: &str, label: &str) -> usize {
        let chars = prompt_chars(prompt);
        let tokens = estimate_tokens(prompt);
        debug!(label, chars, tokens, max = self.max_prompt_chars, "prompt metrics");
        chars
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PROMPT_CHARS)
    }
}

/// Literal character count
pub fn prompt_chars(prompt: &str) -> usize {
    prompt.chars().count()
}

/// Word-based token estimate
pub fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace().count() + crate::conversation::Turn::TOKEN_OVERHEAD
}
