use serde::Serialize;
use serde_json::Value;

pub const SEND_MESSAGE_ACTION: &str = "sendMessage";

/// Fields checked for the reply, highest priority first. Backends disagree
/// on where they put the text; this order is part of the wire contract.
pub const REPLY_FIELDS: [&str; 5] = ["text", "response", "message", "output", "content"];

// --- Request types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest<'a> {
    pub session_id: &'a str,
    pub action: &'static str,
    pub chat_input: &'a str,
}

impl<'a> WebhookRequest<'a> {
    pub fn send_message(session_id: &'a str, chat_input: &'a str) -> Self {
        Self {
            session_id,
            action: SEND_MESSAGE_ACTION,
            chat_input,
        }
    }
}

// --- Response handling ---

/// Pull the reply out of a response body: the first non-empty field in
/// [`REPLY_FIELDS`], or the whole body serialized when none is present.
pub fn extract_reply(body: &Value) -> String {
    REPLY_FIELDS
        .iter()
        .filter_map(|field| body.get(field))
        .find(|value| is_present(value))
        .map(value_text)
        .unwrap_or_else(|| body.to_string())
}

/// `null`, `false`, zero and the empty string count as absent.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
