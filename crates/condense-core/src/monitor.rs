//! Context pressure tracking from reported token usage

use std::sync::Arc;

use crate::state::{ConversationState, ConversationStore};

/// Turns token usage reports into conversation state updates
pub struct UsageMonitor {
    store: Arc<ConversationStore>,
}

impl UsageMonitor {
    pub fn new(store: Arc<ConversationStore>) -> Self {
        Self { store }
    }

    /// Record one response's usage for `conversation_id`.
    ///
    /// Arms compaction when `prompt_tokens / context_limit` reaches
    /// `threshold`. A zero `context_limit` is skipped and returns `None`.
    pub fn observe(
        &self,
        conversation_id: &str,
        prompt_tokens: u64,
        context_limit: u64,
        message_count: usize,
        threshold: f64,
    ) -> Option<ConversationState> {
        if context_limit == 0 {
            tracing::warn!(
                conversation_id,
                "No context limit available, skipping usage update"
            );
            return None;
        }

        let usage_ratio = prompt_tokens as f64 / context_limit as f64;
        let over_threshold = usage_ratio >= threshold;
        if over_threshold {
            tracing::warn!(
                conversation_id,
                "Context usage at {:.1}%, threshold: {:.1}%",
                usage_ratio * 100.0,
                threshold * 100.0
            );
        } else {
            tracing::debug!(conversation_id, usage_ratio, "Recorded context usage");
        }

        Some(
            self.store
                .record_usage(conversation_id, usage_ratio, message_count, over_threshold),
        )
    }
}
