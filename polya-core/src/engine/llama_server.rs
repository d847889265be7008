//! llama.cpp-compatible HTTP server engine
//!
//! Streams the server's `/completion` endpoint and hands out one content
//! fragment per `completion_loop` call.
//!
//! There is no limit on the length of a whole stream. Instead every wait on
//! the server (connecting, the response head, each streamed line) is bounded
//! by the fragment timeout.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing::{debug, info, warn};

use super::{EngineContext, EngineLoader};
use crate::config::EngineConfig;
use crate::error::{PolyaError, Result};

type LineStream = Pin<Box<dyn Stream<Item = std::io::Result<String>> + Send>>;

const DEFAULT_FRAGMENT_TIMEOUT: Duration = Duration::from_secs(120);

/// Loader that connects to a running llama.cpp server
pub struct LlamaServerLoader {
    client: reqwest::Client,
    base_url: String,
    n_predict: usize,
    fragment_timeout: Duration,
}

impl LlamaServerLoader {
    /// Create a loader for the server at `base_url`.
    pub fn new(base_url: impl Into<String>, n_predict: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            n_predict,
            fragment_timeout: DEFAULT_FRAGMENT_TIMEOUT,
        }
    }

    /// Create a loader from engine configuration.
    ///
    /// `request_timeout` bounds connecting and each wait for streamed output,
    /// never the stream as a whole.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|e| PolyaError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            n_predict: config.n_predict,
            fragment_timeout: config.request_timeout,
        })
    }

    /// Set the longest wait for the response head or a single streamed line
    pub fn with_fragment_timeout(mut self, timeout: Duration) -> Self {
        self.fragment_timeout = timeout;
        self
    }

    /// Get the server base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn context(&self) -> LlamaServerContext {
        LlamaServerContext {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            n_predict: self.n_predict,
            fragment_timeout: self.fragment_timeout,
            lines: None,
            done: true,
        }
    }
}

#[async_trait]
impl EngineLoader for LlamaServerLoader {
    async fn create_context(&self, model_path: &Path) -> Result<Box<dyn EngineContext>> {
        tokio::fs::metadata(model_path).await.map_err(|e| {
            PolyaError::EngineInit(format!("model resource {}: {}", model_path.display(), e))
        })?;

        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.fragment_timeout)
            .send()
            .await
            .map_err(|e| {
                PolyaError::EngineInit(format!(
                    "Failed to reach llama server at {}: {}. Make sure the server is running.",
                    self.base_url, e
                ))
            })?;

        if !response.status().is_success() {
            return Err(PolyaError::EngineInit(format!(
                "llama server not healthy ({})",
                response.status()
            )));
        }

        info!(server = %self.base_url, model = %model_path.display(), "llama server context ready");

        Ok(Box::new(self.context()))
    }

    fn name(&self) -> &'static str {
        "llama-server"
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: usize,
    stream: bool,
    cache_prompt: bool,
}

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    content: String,
    #[serde(default)]
    stop: bool,
}

/// Engine context backed by one streaming server request at a time
pub struct LlamaServerContext {
    client: reqwest::Client,
    base_url: String,
    n_predict: usize,
    fragment_timeout: Duration,
    lines: Option<LineStream>,
    done: bool,
}

impl LlamaServerContext {
    fn finish(&mut self) {
        self.lines = None;
        self.done = true;
    }
}

#[async_trait]
impl EngineContext for LlamaServerContext {
    async fn clear(&mut self) {
        self.finish();
    }

    async fn reset_state(&mut self) {
        // Prompts are sent with cache_prompt=false, so dropping the stream
        // leaves no sequence state behind on the server.
        self.finish();
    }

    async fn completion_init(&mut self, prompt: &str) -> Result<()> {
        self.finish();

        let url = format!("{}/completion", self.base_url);
        let request = CompletionRequest {
            prompt,
            n_predict: self.n_predict,
            stream: true,
            cache_prompt: false,
        };

        let send = self.client.post(&url).json(&request).send();
        let response = tokio::time::timeout(self.fragment_timeout, send)
            .await
            .map_err(|_| {
                PolyaError::Engine(format!(
                    "llama server did not answer within {:?}",
                    self.fragment_timeout
                ))
            })?
            .map_err(|e| PolyaError::Engine(format!("Failed to send completion request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PolyaError::Engine(format!(
                "llama server error ({}): {}",
                status, text
            )));
        }

        let bytes_stream = response.bytes_stream();
        let reader = tokio_util::io::StreamReader::new(
            bytes_stream.map(|r| r.map_err(std::io::Error::other)),
        );
        let lines = tokio::io::BufReader::new(reader).lines();

        self.lines = Some(Box::pin(LinesStream::new(lines)));
        self.done = false;
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.done
    }

    async fn completion_loop(&mut self) -> Result<String> {
        let Some(lines) = self.lines.as_mut() else {
            self.done = true;
            return Ok(String::new());
        };

        loop {
            let Ok(next) = tokio::time::timeout(self.fragment_timeout, lines.next()).await else {
                warn!(timeout = ?self.fragment_timeout, "llama server stream stalled");
                self.finish();
                return Err(PolyaError::Engine(format!(
                    "no output from llama server within {:?}",
                    self.fragment_timeout
                )));
            };
            match next {
                None => {
                    self.finish();
                    return Ok(String::new());
                }
                Some(Err(e)) => {
                    self.finish();
                    return Err(PolyaError::Engine(format!("Stream read error: {}", e)));
                }
                Some(Ok(line)) => {
                    // SSE format: "data: {...}"
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let chunk: CompletionChunk = serde_json::from_str(data)?;
                    if chunk.stop {
                        debug!("llama server signalled stop");
                        self.finish();
                    }
                    return Ok(chunk.content);
                }
            }
        }
    }
}
