//! Problem records
//!
//! Problems are read-only JSON records supplied from outside the session. Only
//! the body, techniques, figure description, final answer and solution feed
//! into prompts; `figure` and `image` are carried for the presentation layer.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub id: String,
    pub body: String,
    #[serde(default)]
    pub figure: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub techniques: Vec<String>,
    #[serde(default)]
    pub figure_description: Option<String>,
    #[serde(default)]
    pub final_answer: Option<String>,
    #[serde(default)]
    pub solution: Option<String>,
}

impl Problem {
    /// Techniques joined into a single label
    pub fn technique_label(&self) -> String {
        self.techniques.join(", ")
    }
}

/// In-memory set of problems, looked up by id
#[derive(Debug, Clone, Default)]
pub struct ProblemStore {
    problems: Vec<Problem>,
}

impl ProblemStore {
    pub fn new(problems: Vec<Problem>) -> Self {
        Self { problems }
    }

    /// Parse a JSON array of problem records
    pub fn from_json_str(json: &str) -> Result<Self> {
        let problems: Vec<Problem> = serde_json::from_str(json)?;
        Ok(Self::new(problems))
    }

    /// Load a JSON array of problem records from disk
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let store = Self::from_json_str(&content)?;
        info!(path = %path.display(), count = store.len(), "loaded problems");
        Ok(store)
    }

    /// First problem with the given id
    pub fn get(&self, id: &str) -> Option<&Problem> {
        self.problems.iter().find(|p| p.id == id)
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}
