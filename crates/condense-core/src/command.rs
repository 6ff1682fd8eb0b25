//! The `/compact` chat command

use std::sync::Arc;

use condense_ai::{ChatRequest, Message, Role};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::CompactionConfig;
use crate::rewrite::{COMPACT_FAILED_NOTICE, NOTHING_TO_COMPACT_NOTICE, replace_with_summary};
use crate::summarizer::{SummaryTarget, Summarizer};

/// Literal a user message must start with to trigger a manual compaction
pub const COMPACT_COMMAND: &str = "/compact";

/// What the command filter did to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    /// The last message is not a `/compact` command
    NotTriggered,
    /// There was no history before the command
    NothingToCompact,
    /// History was replaced by a summary
    Compacted,
    /// Summarization failed; history is untouched
    Failed,
}

/// Whether the last message of `messages` is a `/compact` command
pub fn is_compact_command(messages: &[Message]) -> bool {
    messages.last().is_some_and(|last| {
        last.role == Role::User && last.text().trim_start().starts_with(COMPACT_COMMAND)
    })
}

/// Handles `/compact` by summarizing everything before the command
pub struct CompactCommand {
    summarizer: Arc<Summarizer>,
    target: SummaryTarget,
}

impl CompactCommand {
    /// `target` takes precedence over the configured summarizer target
    pub fn new(summarizer: Arc<Summarizer>, target: SummaryTarget) -> Self {
        Self { summarizer, target }
    }

    /// Rewrite `request` if it ends with a `/compact` command.
    ///
    /// The request is left untouched until summarization has returned, so a
    /// dropped future never leaves it half rewritten.
    pub async fn apply(
        &self,
        request: &mut ChatRequest,
        config: &CompactionConfig,
        cancel: &CancellationToken,
    ) -> CommandOutcome {
        if !is_compact_command(&request.messages) {
            return CommandOutcome::NotTriggered;
        }
        tracing::info!("Intercepted {} command", COMPACT_COMMAND);

        let history_len = request.messages.len() - 1;
        if history_len == 0 {
            set_trigger_text(request, NOTHING_TO_COMPACT_NOTICE);
            return CommandOutcome::NothingToCompact;
        }

        let target = self
            .target
            .clone()
            .or(SummaryTarget::of_config(config))
            .or(SummaryTarget::of_request(request));

        let summary = self
            .summarizer
            .summarize(
                &request.messages[..history_len],
                config.active_prompt(),
                &target,
                cancel,
            )
            .await;

        match summary {
            Ok(summary) => {
                let Some(trigger) = request.messages.pop() else {
                    return CommandOutcome::NotTriggered;
                };
                request.messages = replace_with_summary(&summary, trigger);
                tracing::info!("Compacted {} messages into a summary", history_len);
                CommandOutcome::Compacted
            }
            Err(e) => {
                tracing::warn!("Manual compaction failed: {}", e);
                set_trigger_text(request, COMPACT_FAILED_NOTICE);
                CommandOutcome::Failed
            }
        }
    }
}

fn set_trigger_text(request: &mut ChatRequest, text: &str) {
    if let Some(last) = request.messages.last_mut() {
        last.content.set_primary_text(text);
    }
}
