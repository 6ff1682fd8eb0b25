//! The compaction engine.
//!
//! [`CompactionEngine`] is the object a proxy holds for its whole lifetime.
//! It exposes the two filter hooks a chat pipeline calls around each upstream
//! round-trip:
//!
//! - [`on_request`](CompactionEngine::on_request) runs before the request is
//!   forwarded. It handles `/compact` commands, and otherwise rewrites the
//!   history when a previous response armed compaction for the conversation.
//! - [`on_response`](CompactionEngine::on_response) runs after the upstream
//!   replied and records how full the context window was.
//!
//! Neither hook fails: summarization problems are logged and the request goes
//! through with its original messages.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use condense_ai::{ChatCompletion, ChatRequest, ChatResponse, Message, ProviderRegistry};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::command::{CommandOutcome, CompactCommand};
use crate::config::{CompactionConfig, ConfigPatch, ConfigStore};
use crate::conversation::conversation_id;
use crate::error::{Error, Result};
use crate::limits::ContextLimitResolver;
use crate::monitor::UsageMonitor;
use crate::rewrite::apply_compaction;
use crate::state::{ConversationState, ConversationStore, StoreLimits};
use crate::summarizer::{DEFAULT_SUMMARY_TIMEOUT, SummaryTarget, Summarizer};

/// Runtime options that are not part of the persisted config
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Upper bound on one summarization call
    pub summary_timeout: Duration,
    pub limits: StoreLimits,
    /// Summarizer target for `/compact`, ahead of the configured one
    pub command_target: SummaryTarget,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            summary_timeout: DEFAULT_SUMMARY_TIMEOUT,
            limits: StoreLimits::default(),
            command_target: SummaryTarget::default(),
        }
    }
}

/// What the request filter did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    /// The request passes through as-is
    Unchanged,
    /// History was summarized; message counts before and after
    Compacted { before: usize, after: usize },
    /// Compaction was due but summarization failed; it will be retried
    SummaryFailed,
    /// The request was a `/compact` command
    Command(CommandOutcome),
}

/// Snapshot of the engine for the status surface
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub enabled: bool,
    pub conversations: BTreeMap<String, ConversationState>,
}

/// Context compaction for chat-completion traffic
pub struct CompactionEngine {
    config: ConfigStore,
    store: Arc<ConversationStore>,
    monitor: UsageMonitor,
    resolver: ContextLimitResolver,
    summarizer: Arc<Summarizer>,
    command: CompactCommand,
}

impl CompactionEngine {
    pub fn new(
        config: ConfigStore,
        registry: Arc<dyn ProviderRegistry>,
        client: Arc<dyn ChatCompletion>,
        options: EngineOptions,
    ) -> Self {
        let store = Arc::new(ConversationStore::new(options.limits));
        let summarizer = Arc::new(Summarizer::new(client).with_timeout(options.summary_timeout));

        Self {
            config,
            monitor: UsageMonitor::new(Arc::clone(&store)),
            store,
            resolver: ContextLimitResolver::new(registry),
            command: CompactCommand::new(Arc::clone(&summarizer), options.command_target),
            summarizer,
        }
    }

    /// Copy of the live config
    pub fn config(&self) -> CompactionConfig {
        self.config.snapshot()
    }

    /// Apply, validate and persist a config change
    pub fn update_config(&self, patch: &ConfigPatch) -> Result<CompactionConfig> {
        self.config.update(patch)
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            enabled: self.config.snapshot().enabled,
            conversations: self.store.snapshot(),
        }
    }

    /// Tracking state for one conversation
    pub fn conversation(&self, id: &str) -> Option<ConversationState> {
        self.store.get(id)
    }

    /// Context window of a provider/model pair
    pub fn context_limit(&self, provider: Option<&str>, model: &str) -> u64 {
        self.resolver.resolve(provider, model)
    }

    /// Request filter
    pub async fn on_request(&self, request: &mut ChatRequest) -> RequestOutcome {
        self.on_request_with(request, &CancellationToken::new()).await
    }

    /// Request filter with caller-controlled cancellation.
    ///
    /// A cancelled summarization leaves the request and the conversation's
    /// pending compaction as they were.
    pub async fn on_request_with(
        &self,
        request: &mut ChatRequest,
        cancel: &CancellationToken,
    ) -> RequestOutcome {
        let config = self.config.snapshot();

        let command = self.command.apply(request, &config, cancel).await;
        if command != CommandOutcome::NotTriggered {
            return RequestOutcome::Command(command);
        }

        if !config.enabled {
            return RequestOutcome::Unchanged;
        }

        let before = request.messages.len();
        if before < 2 {
            return RequestOutcome::Unchanged;
        }

        let id = conversation_id(request);
        let Some(claim) = self.store.try_claim(&id) else {
            return RequestOutcome::Unchanged;
        };
        tracing::info!(conversation_id = %claim.conversation_id(), "Applying compaction");

        let target = SummaryTarget::of_config(&config).or(SummaryTarget::of_request(request));
        let summary = self
            .summarizer
            .summarize(
                &request.messages[..before - 1],
                config.active_prompt(),
                &target,
                cancel,
            )
            .await;

        match summary {
            Ok(summary) => {
                request.messages =
                    apply_compaction(&request.messages, &summary, config.notify_user);
                let after = request.messages.len();
                claim.complete();
                tracing::info!(
                    conversation_id = %id,
                    "Compacted {} messages to {} messages",
                    before,
                    after
                );
                RequestOutcome::Compacted { before, after }
            }
            Err(_) => {
                tracing::warn!(conversation_id = %id, "Failed to generate summary, skipping compaction");
                RequestOutcome::SummaryFailed
            }
        }
    }

    /// Response filter: record context usage for the request's conversation.
    ///
    /// Returns the updated state, or `None` when nothing was recorded.
    pub fn on_response(
        &self,
        request: &ChatRequest,
        response: &ChatResponse,
    ) -> Option<ConversationState> {
        let config = self.config.snapshot();
        if !config.enabled {
            return None;
        }

        let id = conversation_id(request);
        let prompt_tokens = response
            .usage
            .as_ref()
            .map(|usage| usage.prompt_tokens)
            .unwrap_or(0);
        let context_limit = self.resolver.resolve(
            request.provider.as_deref(),
            request.model.as_deref().unwrap_or_default(),
        );

        self.monitor.observe(
            &id,
            prompt_tokens,
            context_limit,
            request.messages.len(),
            config.threshold,
        )
    }

    /// Summarize `messages` right away and return the rewritten history.
    ///
    /// Unlike the filters this reports failures to the caller.
    pub async fn compact_now(
        &self,
        messages: Vec<Message>,
        provider: Option<String>,
        model: Option<String>,
    ) -> Result<Vec<Message>> {
        if messages.is_empty() {
            return Err(Error::NoMessages);
        }

        let config = self.config.snapshot();
        let target = SummaryTarget::new(provider, model).or(SummaryTarget::of_config(&config));
        let summary = self
            .summarizer
            .summarize(
                &messages,
                config.active_prompt(),
                &target,
                &CancellationToken::new(),
            )
            .await?;

        let compacted = apply_compaction(&messages, &summary, config.notify_user);
        tracing::info!(
            "Manually compacted {} messages to {} messages",
            messages.len(),
            compacted.len()
        );
        Ok(compacted)
    }
}
