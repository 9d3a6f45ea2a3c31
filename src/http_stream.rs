//! HTTP event-stream transport.
//!
//! Each turn is one POST whose response body is the same `data: <json>`
//! frame stream the duplex channel carries. Answers to confirmation tools
//! travel back as tool outputs in the next turn's history.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use futures_util::stream::{self, Stream};
use futures_util::StreamExt;
use reqwest::Client;
use tracing::{debug, info};

use crate::models::TurnRequest;
use crate::sse::{FrameDecoder, ProtocolEvent};

/// Error type for HTTP stream operations
#[derive(Debug)]
pub enum HttpStreamError {
    /// HTTP request failed
    Http(reqwest::Error),
    /// Server returned an error status
    ServerError { status: u16, message: String },
}

impl HttpStreamError {
    pub fn is_retryable(&self) -> bool {
        match self {
            HttpStreamError::Http(e) => e.is_timeout() || e.is_connect(),
            HttpStreamError::ServerError { status, .. } => *status >= 500,
        }
    }
}

impl std::fmt::Display for HttpStreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpStreamError::Http(e) => write!(f, "HTTP error: {}", e),
            HttpStreamError::ServerError { status, message } => {
                write!(f, "Server error ({}): {}", status, message)
            }
        }
    }
}

impl std::error::Error for HttpStreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HttpStreamError::Http(e) => Some(e),
            HttpStreamError::ServerError { .. } => None,
        }
    }
}

impl From<reqwest::Error> for HttpStreamError {
    fn from(e: reqwest::Error) -> Self {
        HttpStreamError::Http(e)
    }
}

/// Events decoded from one streamed response.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<ProtocolEvent, HttpStreamError>> + Send>>;

/// Client for the agent backend's HTTP streaming endpoint.
#[derive(Debug, Clone)]
pub struct HttpStreamClient {
    /// Full URL of the streaming endpoint
    pub url: String,
    /// Reusable HTTP client
    client: Client,
}

impl HttpStreamClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
        }
    }

    /// Fail connection attempts that take longer than `timeout`.
    ///
    /// The streamed body itself has no deadline.
    pub fn with_connect_timeout(
        url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, HttpStreamError> {
        let client = Client::builder().connect_timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// POST one turn and stream the decoded response events.
    ///
    /// Malformed frames are skipped by the decoder; transport failures end
    /// the stream with a single `Err` item.
    pub async fn stream_turn(&self, request: &TurnRequest) -> Result<EventStream, HttpStreamError> {
        info!(url = %self.url, chat_id = %request.id, "Streaming turn over HTTP");

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(HttpStreamError::ServerError { status, message });
        }

        let bytes_stream = response.bytes_stream();

        let event_stream = stream::unfold(
            (bytes_stream, FrameDecoder::new(), VecDeque::new(), false),
            |(mut bytes_stream, mut decoder, mut pending, mut finished)| async move {
                loop {
                    if let Some(event) = pending.pop_front() {
                        return Some((Ok(event), (bytes_stream, decoder, pending, finished)));
                    }
                    if finished {
                        return None;
                    }

                    match bytes_stream.next().await {
                        Some(Ok(chunk)) => pending.extend(decoder.decode(&chunk)),
                        Some(Err(e)) => {
                            finished = true;
                            return Some((
                                Err(HttpStreamError::Http(e)),
                                (bytes_stream, decoder, pending, finished),
                            ));
                        }
                        None => {
                            debug!(skipped = decoder.skipped_frames(), "Response body ended");
                            pending.extend(decoder.finish());
                            finished = true;
                        }
                    }
                }
            },
        );

        Ok(Box::pin(event_stream))
    }
}
