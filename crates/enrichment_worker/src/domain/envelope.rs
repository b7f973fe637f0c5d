use serde_json::Value;
use uuid::Uuid;

const TRANSACTION_ID_KEYS: [&str; 3] = ["transactionId", "transaction_id", "transactionID"];
const EVENT_TYPE_KEYS: [&str; 2] = ["event_type", "eventType"];

/// Parsed transaction-completion event.
///
/// Producers are inconsistent about casing and nesting, so only the
/// transaction id is required. Everything else in the event body is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    pub event_type: Option<String>,
    pub transaction_id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("event payload is not a JSON object: {0}")]
    MalformedPayload(String),
    #[error("event with type {event_type:?} carries no transaction id")]
    MissingTransactionId { event_type: Option<String> },
    #[error("transaction id is not a valid UUID: {0}")]
    InvalidTransactionId(String),
}

/// Parse a raw queue delivery into an [`EventEnvelope`].
///
/// The transaction id is searched under the nested `payload` object first,
/// then at the top level, accepting `transactionId`, `transaction_id`, and
/// `transactionID` spellings in that order.
pub fn parse_event(payload: &[u8]) -> Result<EventEnvelope, EnvelopeError> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| EnvelopeError::MalformedPayload(e.to_string()))?;

    let object = value
        .as_object()
        .ok_or_else(|| EnvelopeError::MalformedPayload(format!("got {}", json_type(&value))))?;

    let event_type = EVENT_TYPE_KEYS
        .iter()
        .find_map(|key| object.get(*key))
        .and_then(Value::as_str)
        .map(str::to_string);

    let nested = object.get("payload").and_then(Value::as_object);

    let raw_id = nested
        .and_then(|inner| find_transaction_id(inner))
        .or_else(|| find_transaction_id(object));

    let Some(raw_id) = raw_id else {
        return Err(EnvelopeError::MissingTransactionId { event_type });
    };

    let transaction_id = Uuid::parse_str(raw_id)
        .map_err(|_| EnvelopeError::InvalidTransactionId(raw_id.to_string()))?;

    Ok(EventEnvelope {
        event_type,
        transaction_id,
    })
}

fn find_transaction_id(object: &serde_json::Map<String, Value>) -> Option<&str> {
    TRANSACTION_ID_KEYS
        .iter()
        .find_map(|key| object.get(*key))
        .and_then(Value::as_str)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
