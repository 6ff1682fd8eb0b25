//! Conversation identity.
//!
//! Requests carry no conversation key of their own, so consecutive requests are
//! correlated by fingerprinting the first message. Two unrelated conversations
//! that open with the same message share an id; callers with a real session id
//! should set `ChatRequest::conversation_id`, which always takes precedence.

use condense_ai::{ChatRequest, Message};
use sha2::{Digest, Sha256};

/// Id used for requests with no messages
pub const DEFAULT_CONVERSATION_ID: &str = "default";

/// Bytes of the digest kept in the id
const FINGERPRINT_BYTES: usize = 8;

/// Derive the conversation id for a request
pub fn conversation_id(request: &ChatRequest) -> String {
    if let Some(id) = request
        .conversation_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
    {
        return id.to_string();
    }

    match request.messages.first() {
        Some(first) => fingerprint(first),
        None => DEFAULT_CONVERSATION_ID.to_string(),
    }
}

/// Stable hex fingerprint of a message's role and text
pub fn fingerprint(message: &Message) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message.role.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(message.text().as_bytes());
    let digest = hasher.finalize();

    digest[..FINGERPRINT_BYTES]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use condense_ai::{Block, ContentBlock, MessageContent, Role};

    fn request(messages: Vec<Message>) -> ChatRequest {
        ChatRequest::new(None, Some("gpt-4".into()), messages)
    }

    #[test]
    fn test_same_first_message_same_id() {
        let a = request(vec![Message::system("You are helpful."), Message::user("hi")]);
        let b = request(vec![
            Message::system("You are helpful."),
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("more"),
        ]);
        assert_eq!(conversation_id(&a), conversation_id(&b));
        assert_eq!(conversation_id(&a).len(), FINGERPRINT_BYTES * 2);
    }

    #[test]
    fn test_different_first_message_different_id() {
        let a = request(vec![Message::user("first")]);
        let b = request(vec![Message::user("second")]);
        assert_ne!(conversation_id(&a), conversation_id(&b));
    }

    #[test]
    fn test_role_is_part_of_fingerprint() {
        assert_ne!(
            fingerprint(&Message::user("same")),
            fingerprint(&Message::system("same"))
        );
    }

    #[test]
    fn test_block_and_plain_text_agree() {
        let blocks = Message::new(
            Role::User,
            MessageContent::Blocks(vec![ContentBlock::Structured(Block::text("hello"))]),
        );
        assert_eq!(fingerprint(&blocks), fingerprint(&Message::user("hello")));
    }

    #[test]
    fn test_empty_request_uses_sentinel() {
        assert_eq!(conversation_id(&request(vec![])), DEFAULT_CONVERSATION_ID);
    }

    #[test]
    fn test_explicit_id_wins() {
        let mut req = request(vec![Message::user("hi")]);
        req.conversation_id = Some("session-42".into());
        assert_eq!(conversation_id(&req), "session-42");

        req.conversation_id = Some("   ".into());
        assert_eq!(conversation_id(&req), fingerprint(&Message::user("hi")));
    }
}
