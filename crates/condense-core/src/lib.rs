//! condense-core: context compaction for chat-completion traffic
//!
//! This crate tracks how full each conversation's context window is and,
//! once a configured threshold is crossed, replaces older history with an
//! LLM-written summary before the next request goes upstream. It also
//! implements the `/compact` chat command for on-demand compaction.

pub mod command;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod limits;
pub mod monitor;
pub mod rewrite;
pub mod state;
pub mod summarizer;

#[cfg(test)]
pub(crate) mod testing;

pub use command::{COMPACT_COMMAND, CommandOutcome, CompactCommand};
pub use config::{CompactionConfig, ConfigPatch, ConfigStore};
pub use conversation::conversation_id;
pub use engine::{CompactionEngine, EngineOptions, RequestOutcome, StatusReport};
pub use error::{Error, Result};
pub use limits::ContextLimitResolver;
pub use state::{ConversationState, ConversationStore, StoreLimits};
pub use summarizer::{SummaryTarget, Summarizer};
