//! History rewriting once a summary is available

use condense_ai::{Message, Role};

/// Prefix of the summary message inserted by threshold compaction
pub const CONTEXT_SUMMARY_PREFIX: &str = "[Context Summary]\n\n";

/// Prefix of the system message produced by the `/compact` command
pub const PREVIOUS_SUMMARY_PREFIX: &str = "[Previous conversation summary]\n";

/// Trailing messages carried over verbatim by threshold compaction
pub const RECENT_MESSAGES_KEPT: usize = 2;

/// Replaces a `/compact` trigger when there is no history before it
pub const NOTHING_TO_COMPACT_NOTICE: &str =
    "There is no earlier conversation to compact. Reply that the history is already empty.";

/// Replaces a `/compact` trigger after a successful compaction
pub const COMPACT_ACK_INSTRUCTION: &str = "The conversation history above has been compacted \
into a summary. Briefly acknowledge that the context was compacted and that you are ready to continue.";

/// Replaces a `/compact` trigger when summarization failed
pub const COMPACT_FAILED_NOTICE: &str = "Compacting the conversation failed and the history was \
left unchanged. Let the user know the compaction did not happen.";

/// Threshold rewrite: system messages, then the summary, then the most recent
/// messages.
///
/// `messages` is the full list the summary stands in for. System messages
/// falling inside the recent tail are not repeated.
pub fn apply_compaction(messages: &[Message], summary: &str, notify_user: bool) -> Vec<Message> {
    let heads = messages.iter().filter(|m| m.role == Role::System);

    let tail_start = messages.len().saturating_sub(RECENT_MESSAGES_KEPT);
    let tail = messages[tail_start..]
        .iter()
        .filter(|m| m.role != Role::System);

    let mut content = format!("{}{}", CONTEXT_SUMMARY_PREFIX, summary);
    if notify_user {
        content.push_str(&format!(
            "\n\n---\n*Note: Context compacted to save memory. {} messages summarized into this summary.*",
            messages.len()
        ));
    }

    heads
        .cloned()
        .chain(std::iter::once(Message::assistant(content)))
        .chain(tail.cloned())
        .collect()
}

/// Command rewrite: the whole history collapses into one system summary
/// followed by the trigger message, with the trigger's text replaced.
///
/// The trigger keeps its other content blocks and fields.
pub fn replace_with_summary(summary: &str, mut trigger: Message) -> Vec<Message> {
    trigger.content.set_primary_text(COMPACT_ACK_INSTRUCTION);
    vec![
        Message::system(format!("{}{}", PREVIOUS_SUMMARY_PREFIX, summary)),
        trigger,
    ]
}
