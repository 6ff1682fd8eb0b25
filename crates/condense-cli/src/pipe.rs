//! JSON-lines driver for the compaction filters.
//!
//! A proxy writes one event per line to stdin and reads one reply per line
//! from stdout. Events are handled concurrently, so replies can arrive out of
//! order; an `id` given on an event is echoed on its reply.
//!
//! ```text
//! {"id":1,"event":"request","request":{"model":"gpt-4","messages":[...]}}
//! {"id":2,"event":"response","request":{...},"response":{"choices":[...],"usage":{...}}}
//! {"id":3,"event":"status"}
//! {"id":4,"event":"config","patch":{"threshold":0.7}}
//! ```

use std::sync::Arc;

use condense_ai::{ChatRequest, ChatResponse};
use condense_core::{
    CompactionConfig, CompactionEngine, ConfigPatch, ConversationState, RequestOutcome,
    StatusReport,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Replies buffered between handler tasks and the writer
const REPLY_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<Value>,
    #[serde(flatten)]
    event: PipeEvent,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum PipeEvent {
    /// A request about to be sent upstream
    Request { request: ChatRequest },
    /// An upstream reply to a request
    Response {
        request: ChatRequest,
        response: ChatResponse,
    },
    Status,
    /// Read the config, or update it when a patch is given
    Config {
        #[serde(default)]
        patch: Option<ConfigPatch>,
    },
}

#[derive(Debug, Serialize)]
struct Reply {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(flatten)]
    body: PipeReply,
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum PipeReply {
    Request {
        request: ChatRequest,
        outcome: RequestOutcome,
    },
    Response {
        state: Option<ConversationState>,
    },
    Status {
        status: StatusReport,
    },
    Config {
        config: CompactionConfig,
    },
    Error {
        message: String,
    },
}

/// Serve events from `reader` until EOF, writing replies to `writer`.
///
/// Events still in flight at EOF are answered before returning. A line that
/// is not valid UTF-8 gets an error reply like any other unparsable line.
pub async fn run<R, W>(
    engine: Arc<CompactionEngine>,
    reader: R,
    writer: &mut W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.split(b'\n');
    let (reply_tx, mut reply_rx) = mpsc::channel::<Reply>(REPLY_CHANNEL_CAPACITY);
    let mut reply_tx = Some(reply_tx);

    loop {
        tokio::select! {
            biased;

            line = lines.next_segment(), if reply_tx.is_some() => {
                match line? {
                    Some(line) if line.iter().all(u8::is_ascii_whitespace) => {}
                    Some(line) => {
                        let engine = Arc::clone(&engine);
                        let tx = reply_tx.clone();
                        tokio::spawn(async move {
                            let reply = handle_line(&engine, &line).await;
                            if let Some(tx) = tx {
                                let _ = tx.send(reply).await;
                            }
                        });
                    }
                    None => {
                        tracing::debug!("Input closed, waiting for in-flight events");
                        reply_tx = None;
                    }
                }
            }

            Some(reply) = reply_rx.recv() => {
                write_reply(writer, &reply).await?;
            }

            else => break,
        }
    }

    Ok(())
}

fn error_reply(message: String) -> Reply {
    Reply {
        id: None,
        body: PipeReply::Error { message },
    }
}

async fn handle_line(engine: &CompactionEngine, line: &[u8]) -> Reply {
    let line = match std::str::from_utf8(line) {
        Ok(line) => line,
        Err(e) => {
            tracing::warn!("Invalid event encoding: {}", e);
            return error_reply(format!("Invalid UTF-8: {}", e));
        }
    };
    let envelope: Envelope = match serde_json::from_str(line) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("Invalid event: {}", e);
            return error_reply(format!("Parse error: {}", e));
        }
    };

    let body = match envelope.event {
        PipeEvent::Request { mut request } => {
            let outcome = engine.on_request(&mut request).await;
            PipeReply::Request { request, outcome }
        }
        PipeEvent::Response { request, response } => PipeReply::Response {
            state: engine.on_response(&request, &response),
        },
        PipeEvent::Status => PipeReply::Status {
            status: engine.status(),
        },
        PipeEvent::Config { patch: None } => PipeReply::Config {
            config: engine.config(),
        },
        PipeEvent::Config { patch: Some(patch) } => match engine.update_config(&patch) {
            Ok(config) => PipeReply::Config { config },
            Err(e) => PipeReply::Error {
                message: e.to_string(),
            },
        },
    };

    Reply {
        id: envelope.id,
        body,
    }
}

async fn write_reply<W: AsyncWrite + Unpin>(writer: &mut W, reply: &Reply) -> anyhow::Result<()> {
    let mut line = serde_json::to_string(reply)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use condense_ai::{ChatCompletion, ProviderCatalog};
    use condense_core::{ConfigStore, EngineOptions};
    use serde_json::json;
    use tokio::io::BufReader;

    struct FixedSummary;

    #[async_trait]
    impl ChatCompletion for FixedSummary {
        async fn chat_completion(
            &self,
            _request: &ChatRequest,
        ) -> condense_ai::Result<ChatResponse> {
            Ok(ChatResponse::text("a short summary"))
        }
    }

    fn engine() -> Arc<CompactionEngine> {
        Arc::new(CompactionEngine::new(
            ConfigStore::default(),
            Arc::new(ProviderCatalog::default()),
            Arc::new(FixedSummary),
            EngineOptions::default(),
        ))
    }

    async fn exchange(engine: Arc<CompactionEngine>, input: &str) -> Vec<Value> {
        exchange_bytes(engine, input.as_bytes()).await
    }

    async fn exchange_bytes(engine: Arc<CompactionEngine>, input: &[u8]) -> Vec<Value> {
        let mut output = Vec::new();
        run(engine, BufReader::new(input), &mut output)
            .await
            .unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_status_event() {
        let replies = exchange(engine(), "{\"id\":7,\"event\":\"status\"}\n").await;

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["id"], 7);
        assert_eq!(replies[0]["event"], "status");
        assert_eq!(replies[0]["status"]["enabled"], true);
    }

    #[tokio::test]
    async fn test_compact_command_event() {
        let event = json!({
            "id": "a",
            "event": "request",
            "request": {
                "model": "gpt-4",
                "messages": [
                    {"role": "user", "content": "hello"},
                    {"role": "assistant", "content": "hi"},
                    {"role": "user", "content": "/compact"}
                ]
            }
        });
        let replies = exchange(engine(), &format!("{}\n", event)).await;

        let reply = &replies[0];
        assert_eq!(reply["id"], "a");
        assert_eq!(reply["outcome"]["command"], "compacted");
        let messages = reply["request"]["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0]["content"],
            "[Previous conversation summary]\na short summary"
        );
    }

    #[tokio::test]
    async fn test_response_then_request_compacts() {
        let engine = engine();
        let request = json!({
            "model": "gpt-4",
            "conversation_id": "s1",
            "messages": [
                {"role": "user", "content": "one"},
                {"role": "assistant", "content": "two"},
                {"role": "user", "content": "three"}
            ]
        });
        let response = json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "ok"}}],
            "usage": {"prompt_tokens": 8000, "completion_tokens": 5, "total_tokens": 8005}
        });

        let first = exchange(
            Arc::clone(&engine),
            &format!(
                "{}\n",
                json!({"event": "response", "request": request, "response": response})
            ),
        )
        .await;
        assert_eq!(first[0]["state"]["needs_compaction"], true);

        let second = exchange(
            engine,
            &format!("{}\n", json!({"event": "request", "request": request})),
        )
        .await;
        assert_eq!(second[0]["outcome"]["compacted"]["before"], 3);
        assert!(second[0].get("id").is_none());
    }

    #[tokio::test]
    async fn test_config_events() {
        let input = "{\"id\":1,\"event\":\"config\",\"patch\":{\"threshold\":0.6}}\n";
        let replies = exchange(engine(), input).await;
        assert_eq!(replies[0]["config"]["threshold"], 0.6);

        let input = "{\"id\":2,\"event\":\"config\",\"patch\":{\"threshold\":3.0}}\n";
        let replies = exchange(engine(), input).await;
        assert_eq!(replies[0]["event"], "error");
    }

    #[tokio::test]
    async fn test_bad_lines_get_error_replies() {
        let input = "not json\n\n{\"event\":\"unknown\"}\n";
        let replies = exchange(engine(), input).await;

        assert_eq!(replies.len(), 2);
        assert!(replies.iter().all(|r| r["event"] == "error"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_does_not_stop_the_loop() {
        let mut input = b"{\"id\":1,\"event\":\"status\"}\n".to_vec();
        input.extend_from_slice(b"\xff\xfe garbage\n");
        input.extend_from_slice(b"{\"id\":2,\"event\":\"status\"}\r\n");
        let replies = exchange_bytes(engine(), &input).await;

        assert_eq!(replies.len(), 3);
        let mut ids: Vec<i64> = replies.iter().filter_map(|r| r["id"].as_i64()).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);

        let errors: Vec<&Value> = replies.iter().filter(|r| r["event"] == "error").collect();
        assert_eq!(errors.len(), 1);
        let message = errors[0]["message"].as_str().unwrap();
        assert!(message.starts_with("Invalid UTF-8"));
    }
}
