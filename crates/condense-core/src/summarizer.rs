//! Conversation summarization through an external chat-completion call

use std::sync::Arc;
use std::time::Duration;

use condense_ai::{ChatCompletion, ChatRequest, Message};
use tokio_util::sync::CancellationToken;

use crate::config::CompactionConfig;
use crate::error::{Error, Result};

/// Sampling temperature for summaries; low for consistency
pub const SUMMARY_TEMPERATURE: f32 = 0.3;

/// How long a summarization call may take by default
pub const DEFAULT_SUMMARY_TIMEOUT: Duration = Duration::from_secs(60);

const TRANSCRIPT_HEADER: &str = "Conversation to summarize:\n\n";

/// Provider/model a summarization call is sent to.
///
/// Targets are layered with [`or`](Self::or): explicit overrides first, then
/// the configured defaults, then the request's own provider/model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryTarget {
    pub provider: Option<String>,
    pub model: Option<String>,
}

impl SummaryTarget {
    pub fn new(provider: Option<String>, model: Option<String>) -> Self {
        Self { provider, model }
    }

    /// The summarizer override from config
    pub fn of_config(config: &CompactionConfig) -> Self {
        Self::new(config.provider.clone(), config.model.clone())
    }

    /// The provider/model a request is addressed to
    pub fn of_request(request: &ChatRequest) -> Self {
        Self::new(request.provider.clone(), request.model.clone())
    }

    /// Fill unset fields from `fallback`
    pub fn or(self, fallback: SummaryTarget) -> Self {
        Self {
            provider: self.provider.or(fallback.provider),
            model: self.model.or(fallback.model),
        }
    }
}

/// Render messages as a numbered plain-text transcript
pub fn format_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .enumerate()
        .map(|(i, msg)| {
            format!(
                "[{}] {}: {}",
                i + 1,
                msg.role.as_str().to_uppercase(),
                msg.text()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Produces summaries of message slices
pub struct Summarizer {
    client: Arc<dyn ChatCompletion>,
    timeout: Duration,
}

impl Summarizer {
    pub fn new(client: Arc<dyn ChatCompletion>) -> Self {
        Self {
            client,
            timeout: DEFAULT_SUMMARY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the summarization request; unset target fields are left out
    pub fn build_request(
        messages: &[Message],
        instruction: &str,
        target: &SummaryTarget,
    ) -> ChatRequest {
        let prompt = vec![
            Message::user(instruction),
            Message::user(format!("{}{}", TRANSCRIPT_HEADER, format_transcript(messages))),
        ];
        ChatRequest {
            temperature: Some(SUMMARY_TEMPERATURE),
            ..ChatRequest::new(target.provider.clone(), target.model.clone(), prompt)
        }
    }

    /// Summarize `messages`.
    ///
    /// Every failure (transport, status, empty text, timeout, cancellation) is
    /// returned as an error value and logged here.
    pub async fn summarize(
        &self,
        messages: &[Message],
        instruction: &str,
        target: &SummaryTarget,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let result = self
            .request_summary(messages, instruction, target, cancel)
            .await;

        match result {
            Ok(ref summary) => tracing::info!(
                "Generated summary of {} messages ({} chars)",
                messages.len(),
                summary.len()
            ),
            Err(ref e) => tracing::warn!("Error generating summary: {}", e),
        }
        result
    }

    async fn request_summary(
        &self,
        messages: &[Message],
        instruction: &str,
        target: &SummaryTarget,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let request = Self::build_request(messages, instruction, target);

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            outcome = tokio::time::timeout(self.timeout, self.client.chat_completion(&request)) => {
                match outcome {
                    Ok(response) => response?,
                    Err(_) => return Err(Error::Timeout(self.timeout)),
                }
            }
        };

        let summary = response
            .first_text()
            .map(|text| text.trim().to_string())
            .unwrap_or_default();
        if summary.is_empty() {
            return Err(Error::EmptySummary);
        }
        Ok(summary)
    }
}
