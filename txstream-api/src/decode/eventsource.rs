use super::DecodeError;
use crate::record::Record;
use serde_json::Value;
use tracing::debug;
use tracing::trace;

const DEFAULT_EVENT: &str = "message";

/// One event-stream block, built line by line until a blank line ends it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    pub id: Option<String>,
    pub event: String,
    pub data: String,
}

impl Default for SseMessage {
    fn default() -> Self {
        Self {
            id: None,
            event: DEFAULT_EVENT.to_string(),
            data: String::new(),
        }
    }
}

/// Decodes the buffered event stream once it ends on a line boundary.
///
/// Partial lines are never interpreted: while `pending` does not end in a
/// newline it is left untouched. Otherwise every line is folded into
/// `message`, `pending` is cleared and the records carried by the finished
/// blocks are returned.
pub fn decode_eventsource(
    pending: &mut Vec<u8>,
    message: &mut SseMessage,
    last_event_id: &mut Option<String>,
) -> Result<Vec<Record>, DecodeError> {
    if !pending.ends_with(b"\n") {
        return Ok(Vec::new());
    }
    let text = std::str::from_utf8(pending).map_err(|_| DecodeError::InvalidUtf8)?;
    let complete = &text[..text.len() - 1];
    let finished = fold_lines(message, last_event_id, complete.split('\n'));
    pending.clear();
    Ok(push_records(finished))
}

/// Folds event-stream lines into `current`, returning every block that a
/// blank line finished. Blocks without data are dropped.
pub fn fold_lines<'a>(
    current: &mut SseMessage,
    last_event_id: &mut Option<String>,
    lines: impl IntoIterator<Item = &'a str>,
) -> Vec<SseMessage> {
    let mut finished = Vec::new();
    for line in lines {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            let mut message = std::mem::take(current);
            if message.id.is_some() {
                last_event_id.clone_from(&message.id);
            }
            current.id = last_event_id.clone();
            if message.data.ends_with('\n') {
                message.data.pop();
            }
            if !message.data.is_empty() {
                finished.push(message);
            }
            continue;
        }
        if line.starts_with(':') {
            continue;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (trim_one_space(field), trim_one_space(value)),
            None => (line, ""),
        };
        match field {
            "id" => {
                if !value.is_empty() {
                    current.id = Some(value.to_string());
                }
            }
            "event" => current.event = value.to_string(),
            "data" => {
                current.data.push_str(value);
                current.data.push('\n');
            }
            // `retry` is recognised by the format but reconnect pacing is
            // owned by the listener, so it is ignored like unknown fields.
            _ => {}
        }
    }
    finished
}

/// Unwraps `{"type": "push", "data": [...]}` envelopes into records.
pub fn push_records(messages: Vec<SseMessage>) -> Vec<Record> {
    let mut records = Vec::new();
    for message in messages {
        let envelope = match serde_json::from_str::<Value>(&message.data) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!(
                    "Failed to parse event-stream payload: {err}, data: {}",
                    message.data
                );
                continue;
            }
        };
        let Value::Object(mut envelope) = envelope else {
            continue;
        };
        if envelope.get("type").and_then(Value::as_str) != Some("push") {
            trace!(event = %message.event, "skipping non-push envelope");
            continue;
        }
        if let Some(Value::Array(items)) = envelope.remove("data") {
            records.extend(items.into_iter().map(Record::Json));
        }
    }
    records
}

fn trim_one_space(s: &str) -> &str {
    let s = s.strip_prefix(' ').unwrap_or(s);
    s.strip_suffix(' ').unwrap_or(s)
}
