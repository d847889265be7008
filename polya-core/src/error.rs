//! Error types for Polya operations

/// Result type for Polya operations
pub type Result<T> = std::result::Result<T, PolyaError>;

/// Error types for the session orchestration layer
#[derive(Debug, thiserror::Error)]
pub enum PolyaError {
    /// Engine construction failed (bad or missing model resource)
    #[error("Engine initialization error: {0}")]
    EngineInit(String),

    /// A flow needed the engine before it was ready
    #[error("Engine not ready")]
    EngineNotReady,

    /// The engine failed while serving a request
    #[error("Engine error: {0}")]
    Engine(String),

    /// Input or prompt rejected locally, the engine was never invoked
    #[error("Rejected: {0:?}")]
    Rejected(Rejection),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl PolyaError {
    /// The fixed user-facing text a public flow replies with for this error.
    pub fn reply_text(&self) -> &'static str {
        match self {
            PolyaError::Rejected(rejection) => rejection.message(),
            PolyaError::EngineInit(_) | PolyaError::EngineNotReady => Rejection::NotReady.message(),
            _ => messages::FALLBACK,
        }
    }
}

impl From<Rejection> for PolyaError {
    fn from(rejection: Rejection) -> Self {
        PolyaError::Rejected(rejection)
    }
}

impl From<String> for PolyaError {
    fn from(s: String) -> Self {
        PolyaError::Other(s)
    }
}

impl From<&str> for PolyaError {
    fn from(s: &str) -> Self {
        PolyaError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for PolyaError {
    fn from(err: anyhow::Error) -> Self {
        PolyaError::Other(err.to_string())
    }
}

/// Reasons a flow is resolved locally without calling the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Empty or whitespace-only follow-up
    EmptyInput,
    /// Follow-up contains a stop phrase
    StopIntent,
    /// Follow-up longer than the input cap
    InputTooLong,
    /// Assembled follow-up prompt longer than the prompt cap
    FollowUpPromptTooLong,
    /// Assembled solution prompt longer than the prompt cap
    SolutionPromptTooLong,
    /// No engine context could be created
    NotReady,
    /// Another generation flow is already in flight
    Busy,
}

impl Rejection {
    /// Fixed user-facing reply
    pub fn message(&self) -> &'static str {
        match self {
            Rejection::EmptyInput => messages::EMPTY_INPUT,
            Rejection::StopIntent => messages::STOP_ACK,
            Rejection::InputTooLong => messages::INPUT_TOO_LONG,
            Rejection::FollowUpPromptTooLong => messages::CANNOT_PROCESS,
            Rejection::SolutionPromptTooLong => messages::SOLUTION_TOO_LONG,
            Rejection::NotReady => messages::CONTEXT_UNAVAILABLE,
            Rejection::Busy => messages::BUSY,
        }
    }
}

/// Fixed user-facing strings
pub mod messages {
    pub const EMPTY_INPUT: &str = "Please enter a message.";
    pub const STOP_ACK: &str = "Okay, I'll stop here.";
    pub const INPUT_TOO_LONG: &str = "Your message is too long. Please shorten it and try again.";
    pub const CANNOT_PROCESS: &str = "Sorry, I can't process that. Please ask another question.";
    pub const SOLUTION_TOO_LONG: &str = "Prompt is too long! Choose another problem to analyze.";
    pub const CONTEXT_UNAVAILABLE: &str = "Model context could not be created.";
    pub const MODEL_NOT_READY: &str = "Model not ready.";
    pub const FALLBACK: &str =
        "Sorry, I couldn't process that. The input may be too large or too complex.";
    pub const BUSY: &str = "A response is already being generated. Please wait for it to finish.";
    pub const OUT_OF_SCOPE: &str = "This question is outside the scope of this problem. Please ask about the solution or technique used.";
    pub const NO_SUMMARY: &str = "No summary available.";
}
