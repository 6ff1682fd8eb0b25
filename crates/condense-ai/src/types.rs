//! Core types for chat requests and responses

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Message roles.
///
/// Roles this crate does not know (e.g. `developer`) are kept as `Other` and
/// serialized back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    Other(String),
}

impl Role {
    /// Get the role as a string
    pub fn as_str(&self) -> &str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::Other(role) => role,
        }
    }
}

impl From<String> for Role {
    fn from(role: String) -> Self {
        match role.as_str() {
            "system" => Role::System,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "tool" => Role::Tool,
            _ => Role::Other(role),
        }
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Role::from)
    }
}

/// A structured content block such as `{"type": "text", "text": "..."}`.
///
/// Fields other than `type` and `text` are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Block {
    /// Create a text block
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(text.into()),
            extra: Map::new(),
        }
    }
}

/// One entry of a block-sequence message body.
///
/// Anything that does not parse as a [`Block`] is kept verbatim as `Raw`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ContentBlock {
    Structured(Block),
    Raw(Value),
}

impl ContentBlock {
    fn from_value(value: Value) -> Self {
        if !value.is_object() {
            return Self::Raw(value);
        }
        match serde_json::from_value::<Block>(value.clone()) {
            Ok(block) => Self::Structured(block),
            Err(_) => Self::Raw(value),
        }
    }

    /// Text carried by this block, or its string form when it is not a structured block
    pub fn text(&self) -> String {
        match self {
            Self::Structured(block) => block.text.clone().unwrap_or_default(),
            Self::Raw(Value::String(s)) => s.clone(),
            Self::Raw(Value::Null) => String::new(),
            Self::Raw(other) => other.to_string(),
        }
    }
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_value(Value::deserialize(deserializer)?))
    }
}

/// Message body: either a plain string or an ordered sequence of blocks
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl<'de> Deserialize<'de> for MessageContent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(text) => Self::Text(text),
            Value::Array(items) => {
                Self::Blocks(items.into_iter().map(ContentBlock::from_value).collect())
            }
            Value::Null => Self::Text(String::new()),
            other => Self::Text(other.to_string()),
        })
    }
}

impl MessageContent {
    /// The primary text of this content.
    ///
    /// Plain text is returned as-is; for blocks only the first block counts.
    pub fn primary_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks.first().map(ContentBlock::text).unwrap_or_default(),
        }
    }

    /// Rewrite the primary text, leaving every other block and field alone
    pub fn set_primary_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        match self {
            Self::Text(current) => *current = text,
            Self::Blocks(blocks) => match blocks.first_mut() {
                Some(ContentBlock::Structured(block)) => block.text = Some(text),
                Some(first) => *first = ContentBlock::Structured(Block::text(text)),
                None => blocks.push(ContentBlock::Structured(Block::text(text))),
            },
        }
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// A chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: MessageContent,
    /// Provider-specific fields (`name`, `tool_calls`, ...) passed through as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// Create a message with the given role and content
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
            extra: Map::new(),
        }
    }

    /// Create a system message
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text.into())
    }

    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text.into())
    }

    /// Create an assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text.into())
    }

    /// Primary text of the message body
    pub fn text(&self) -> String {
        self.content.primary_text()
    }
}

/// A chat-completion request as it travels through the filters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Stable session identifier supplied by the caller, if it has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatRequest {
    /// Create a request for a provider/model pair
    pub fn new(provider: Option<String>, model: Option<String>, messages: Vec<Message>) -> Self {
        Self {
            provider,
            model,
            messages,
            ..Default::default()
        }
    }
}

/// Token usage reported by the upstream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Message carried by a completion choice
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default)]
    pub content: MessageContent,
}

/// One completion choice
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub message: ChoiceMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// A chat-completion response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatResponse {
    /// Build a single-choice assistant response
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                index: 0,
                message: ChoiceMessage {
                    role: Some(Role::Assistant),
                    content: MessageContent::Text(content.into()),
                },
                finish_reason: Some("stop".to_string()),
            }],
            ..Default::default()
        }
    }

    /// Text of the first choice, if there is one
    pub fn first_text(&self) -> Option<String> {
        self.choices
            .first()
            .map(|choice| choice.message.content.primary_text())
    }
}

/// Context and output limits for a model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelLimit {
    pub context: u64,
    pub output: u64,
}

/// Model metadata as reported by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelInfo {
    pub limit: ModelLimit,
}

impl ModelInfo {
    pub fn new(context: u64, output: u64) -> Self {
        Self {
            limit: ModelLimit { context, output },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn content(value: Value) -> MessageContent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_primary_text_plain() {
        assert_eq!(content(json!("hello")).primary_text(), "hello");
    }

    #[test]
    fn test_primary_text_first_block_only() {
        let c = content(json!([
            {"type": "text", "text": "first"},
            {"type": "text", "text": "second"}
        ]));
        assert_eq!(c.primary_text(), "first");
    }

    #[test]
    fn test_primary_text_block_without_text() {
        let c = content(json!([{"type": "image_url", "image_url": {"url": "x"}}]));
        assert_eq!(c.primary_text(), "");
    }

    #[test]
    fn test_primary_text_raw_block() {
        assert_eq!(content(json!(["bare string"])).primary_text(), "bare string");
        assert_eq!(content(json!([42])).primary_text(), "42");
    }

    #[test]
    fn test_primary_text_empty_and_null() {
        assert_eq!(content(json!([])).primary_text(), "");
        assert_eq!(content(Value::Null).primary_text(), "");
    }

    #[test]
    fn test_malformed_block_text_kept_raw() {
        // `text` that is not a string cannot be a structured block
        let c = content(json!([{"type": "text", "text": 7}]));
        match &c {
            MessageContent::Blocks(blocks) => assert!(matches!(blocks[0], ContentBlock::Raw(_))),
            other => panic!("expected blocks, got {:?}", other),
        }
        assert!(c.primary_text().contains(r#""text":7"#));
    }

    #[test]
    fn test_set_primary_text_preserves_other_fields() {
        let mut c = content(json!([
            {"type": "text", "text": "/compact", "cache_control": {"type": "ephemeral"}},
            {"type": "image_url", "image_url": {"url": "x"}}
        ]));
        c.set_primary_text("rewritten");

        let value = serde_json::to_value(&c).unwrap();
        assert_eq!(
            value,
            json!([
                {"type": "text", "text": "rewritten", "cache_control": {"type": "ephemeral"}},
                {"type": "image_url", "image_url": {"url": "x"}}
            ])
        );
    }

    #[test]
    fn test_set_primary_text_plain_and_empty() {
        let mut plain = MessageContent::from("old");
        plain.set_primary_text("new");
        assert_eq!(plain, MessageContent::Text("new".into()));

        let mut empty = MessageContent::Blocks(vec![]);
        empty.set_primary_text("new");
        assert_eq!(empty.primary_text(), "new");

        let mut raw = content(json!(["bare"]));
        raw.set_primary_text("new");
        assert_eq!(raw.primary_text(), "new");
    }

    #[test]
    fn test_message_extra_fields_pass_through() {
        let raw = json!({"role": "assistant", "content": null, "tool_calls": [{"id": "c1"}]});
        let msg: Message = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.text(), "");
        assert_eq!(msg.extra["tool_calls"], json!([{"id": "c1"}]));
    }

    #[test]
    fn test_unknown_role_passes_through() {
        let raw = json!({
            "model": "o3",
            "messages": [
                {"role": "developer", "content": "be brief"},
                {"role": "user", "content": "hi"}
            ]
        });
        let req: ChatRequest = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(req.messages[0].role, Role::Other("developer".into()));
        assert_eq!(req.messages[0].role.as_str(), "developer");
        assert_eq!(req.messages[1].role, Role::User);

        let back = serde_json::to_value(&req).unwrap();
        assert_eq!(back["messages"], raw["messages"]);
    }

    #[test]
    fn test_block_without_type_keeps_shape() {
        let c = content(json!([{"text": "untyped"}]));
        assert_eq!(c.primary_text(), "untyped");
        assert_eq!(serde_json::to_value(&c).unwrap(), json!([{"text": "untyped"}]));
    }

    #[test]
    fn test_request_unknown_fields_kept() {
        let raw = json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": true
        });
        let req: ChatRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(req.model.as_deref(), Some("gpt-4"));
        assert!(req.provider.is_none());
        assert_eq!(req.extra["stream"], json!(true));

        let back = serde_json::to_value(&req).unwrap();
        assert!(back.get("provider").is_none());
        assert_eq!(back["stream"], json!(true));
    }

    #[test]
    fn test_response_first_text() {
        let raw = json!({
            "choices": [{"message": {"role": "assistant", "content": "  summary  "}}],
            "usage": {"prompt_tokens": 12}
        });
        let resp: ChatResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(resp.first_text().as_deref(), Some("  summary  "));
        assert_eq!(resp.usage.unwrap().prompt_tokens, 12);

        assert!(ChatResponse::default().first_text().is_none());
    }
}
