//! Defines the JSON message protocol between the chat client and the document service.
//!
//! Outbound frames carry a single question: `{"query": "..."}`. Inbound frames carry
//! the answer, optionally with the context snippets the service retrieved for it:
//! `{"response": "...", "source": ["..."]}`.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Close code that marks an intentional, orderly shutdown of the connection.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code reported when the peer sent a close frame without a status.
pub const NO_STATUS_RECEIVED: u16 = 1005;

/// An answer pushed by the service for a previously sent query.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BotReply {
    /// The answer text shown in the conversation.
    pub response: String,
    /// Context snippets the answer was grounded on. Absent on cached or error replies.
    #[serde(default, rename = "source", deserialize_with = "lenient_sources")]
    pub sources: Vec<String>,
}

/// An inbound frame that could not be interpreted as a [`BotReply`].
#[derive(Debug, thiserror::Error)]
#[error("malformed inbound frame: {0}")]
pub struct MalformedFrame(#[from] serde_json::Error);

/// Serializes a user question into an outbound text frame.
pub fn encode_query(text: &str) -> String {
    serde_json::json!({ "query": text }).to_string()
}

/// Parses an inbound text frame.
///
/// Only the `response` field is required; anything that is not a JSON object with
/// a string `response` is reported as [`MalformedFrame`].
pub fn parse_inbound(raw: &str) -> Result<BotReply, MalformedFrame> {
    Ok(serde_json::from_str::<BotReply>(raw)?)
}

// The service sends `source` as a list, but older builds sent a bare string.
fn lenient_sources<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => vec![s],
        _ => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_query_escapes_text() {
        let frame = encode_query("what is \"RAG\"?");
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, serde_json::json!({ "query": "what is \"RAG\"?" }));
    }

    #[test]
    fn test_parse_plain_response() {
        let reply = parse_inbound(r#"{"response":"hi"}"#).unwrap();
        assert_eq!(reply.response, "hi");
        assert!(reply.sources.is_empty());
    }

    #[test]
    fn test_parse_response_with_sources() {
        let reply =
            parse_inbound(r#"{"response":"42","source":["chapter one", 7, "chapter two"]}"#)
                .unwrap();
        assert_eq!(reply.response, "42");
        assert_eq!(reply.sources, vec!["chapter one", "chapter two"]);

        let reply = parse_inbound(r#"{"response":"42","source":"single"}"#).unwrap();
        assert_eq!(reply.sources, vec!["single"]);
    }

    #[test]
    fn test_parse_rejects_malformed_frames() {
        assert!(parse_inbound("not json").is_err());
        assert!(parse_inbound(r#"{"answer":"hi"}"#).is_err());
        assert!(parse_inbound(r#"{"response":12}"#).is_err());
        assert!(parse_inbound(r#"["response"]"#).is_err());
        assert!(parse_inbound("").is_err());
    }

    #[test]
    fn test_malformed_frame_display() {
        let err = parse_inbound("{").unwrap_err();
        assert!(err.to_string().starts_with("malformed inbound frame:"));
    }
}
