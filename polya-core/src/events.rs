//! Session Event Protocol
//!
//! Observable session state is published as [`SessionEvent`]s on an mpsc
//! channel instead of living in shared fields. A session writes to the channel
//! after every generation step, so a subscriber that keeps up sees:
//!
//! - [`SessionEvent::ReadinessChanged`] when the engine context appears or goes away
//! - [`SessionEvent::GenerationStarted`] before a prompt is submitted
//! - [`SessionEvent::StreamChunk`] once per step, carrying the text so far
//! - [`SessionEvent::GenerationFinished`] when a run ends
//! - [`SessionEvent::Reply`] with the text a public flow returned
//!
//! Publishing never waits. When the buffer is full the event is dropped, so a
//! slow subscriber may miss chunks, but a run never stalls on it. The latest
//! accumulated text is also kept in a `watch` channel
//! ([`EventEmitter::subscribe_stream`]) whose final value after a run equals
//! the run's raw text, and `GenerationFinished` carries that raw text too.
//!
//! # Example
//!
//! ```rust,ignore
//! use polya_core::events::{event_channel, SessionEvent};
//!
//! let (tx, mut rx) = event_channel(256);
//!
//! tokio::spawn(async move {
//!     while let Some(event) = rx.recv().await {
//!         if let SessionEvent::StreamChunk { text, .. } = event {
//!             println!("{}", text);
//!         }
//!     }
//! });
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::trace;

/// Events published by a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Engine readiness changed
    ReadinessChanged {
        ready: bool,
        timestamp: DateTime<Utc>,
    },

    /// A prompt is about to be submitted
    GenerationStarted {
        /// Prompt length in characters
        prompt_chars: usize,
        timestamp: DateTime<Utc>,
    },

    /// Accumulated text after one generation step
    StreamChunk {
        /// Everything generated so far in this run
        text: String,
        /// 1-based step counter
        step: usize,
        timestamp: DateTime<Utc>,
    },

    /// A generation run ended
    GenerationFinished {
        /// Steps taken
        steps: usize,
        /// Whether the engine signalled completion (false = step cap hit)
        completed: bool,
        /// Surfaced text (trimmed, or the fallback message)
        text: String,
        /// Raw accumulated text of the run
        raw: String,
        timestamp: DateTime<Utc>,
    },

    /// Final text returned by a public flow
    Reply {
        text: String,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::ReadinessChanged { .. } => "readiness_changed",
            SessionEvent::GenerationStarted { .. } => "generation_started",
            SessionEvent::StreamChunk { .. } => "stream_chunk",
            SessionEvent::GenerationFinished { .. } => "generation_finished",
            SessionEvent::Reply { .. } => "reply",
        }
    }

    /// Get the timestamp of the event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            SessionEvent::ReadinessChanged { timestamp, .. }
            | SessionEvent::GenerationStarted { timestamp, .. }
            | SessionEvent::StreamChunk { timestamp, .. }
            | SessionEvent::GenerationFinished { timestamp, .. }
            | SessionEvent::Reply { timestamp, .. } => *timestamp,
        }
    }
}

/// Sender half of an event channel
pub type EventSender = mpsc::Sender<SessionEvent>;

/// Receiver half of an event channel
pub type EventReceiver = mpsc::Receiver<SessionEvent>;

/// Creates a new event channel with the specified buffer capacity.
///
/// Events published while the buffer is full are dropped.
pub fn event_channel(buffer_size: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(buffer_size)
}

/// A clonable event emitter that wraps an optional [`EventSender`].
///
/// A disabled emitter drops every event.
#[derive(Clone, Default)]
pub struct EventEmitter {
    sender: Option<EventSender>,
    stream: Option<Arc<watch::Sender<String>>>,
}

impl EventEmitter {
    /// Create an emitter publishing to `sender`
    pub fn new(sender: EventSender) -> Self {
        let (stream, _) = watch::channel(String::new());
        Self {
            sender: Some(sender),
            stream: Some(Arc::new(stream)),
        }
    }

    /// Create an emitter that publishes nothing
    pub fn disabled() -> Self {
        Self {
            sender: None,
            stream: None,
        }
    }

    /// Whether events go anywhere
    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Watch the accumulated text of the current run.
    ///
    /// Returns `None` for a disabled emitter.
    pub fn subscribe_stream(&self) -> Option<watch::Receiver<String>> {
        self.stream.as_ref().map(|stream| stream.subscribe())
    }

    /// Emit a readiness change
    pub fn readiness_changed(&self, ready: bool) {
        self.emit(SessionEvent::ReadinessChanged {
            ready,
            timestamp: Utc::now(),
        });
    }

    /// Emit a generation start
    pub fn generation_started(&self, prompt_chars: usize) {
        if let Some(ref stream) = self.stream {
            stream.send_replace(String::new());
        }
        self.emit(SessionEvent::GenerationStarted {
            prompt_chars,
            timestamp: Utc::now(),
        });
    }

    /// Emit the accumulated text after a step
    pub fn stream_chunk(&self, text: &str, step: usize) {
        let Some(ref stream) = self.stream else {
            return;
        };
        stream.send_replace(text.to_string());
        self.emit(SessionEvent::StreamChunk {
            text: text.to_string(),
            step,
            timestamp: Utc::now(),
        });
    }

    /// Emit the end of a run
    pub fn generation_finished(&self, steps: usize, completed: bool, text: &str, raw: &str) {
        if let Some(ref stream) = self.stream {
            stream.send_if_modified(|current| {
                if current == raw {
                    return false;
                }
                *current = raw.to_string();
                true
            });
        }
        self.emit(SessionEvent::GenerationFinished {
            steps,
            completed,
            text: text.to_string(),
            raw: raw.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Emit a flow reply
    pub fn reply(&self, text: &str) {
        self.emit(SessionEvent::Reply {
            text: text.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Emit an arbitrary event without waiting for buffer space
    pub fn emit(&self, event: SessionEvent) {
        let Some(ref sender) = self.sender else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                trace!(event_type = event.event_type(), "event buffer full, dropping event");
            }
            // A dropped receiver just means nobody is listening
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
