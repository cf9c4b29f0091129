//! JSON payload envelope shared between clients and agents.
//!
//! Positional arguments are packed under `data` as `_1..=_n`. Replies
//! reuse the envelope, with the result under `data.r` or an agent-side
//! error string under `data.e`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::call::CallId;

/// Result key within `data`.
const RESULT_KEY: &str = "r";

/// Error key within `data`.
const ERROR_KEY: &str = "e";

fn arg_key(index: usize) -> String {
    format!("_{}", index + 1)
}

/// Payload published to a call topic.
///
/// Agents may annotate the envelope with routing fields (`context`,
/// `method`) before replying; decoders tolerate them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallPayload {
    /// Correlation id echoed back in the reply.
    pub id: CallId,
    /// Reply topic of the issuing client.
    pub sender: String,
    /// Packed positional arguments.
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl CallPayload {
    /// Pack a request's arguments for the wire.
    #[must_use]
    pub fn new(id: CallId, sender: impl Into<String>, arguments: &[Value]) -> Self {
        let mut data = Map::new();
        for (index, value) in arguments.iter().enumerate() {
            data.insert(arg_key(index), value.clone());
        }
        Self {
            id,
            sender: sender.into(),
            data,
        }
    }

    /// Unpack positional arguments in declaration order.
    #[must_use]
    pub fn arguments(&self) -> Vec<Value> {
        let mut arguments = Vec::with_capacity(self.data.len());
        for index in 0..self.data.len() {
            match self.data.get(&arg_key(index)) {
                Some(value) => arguments.push(value.clone()),
                None => break,
            }
        }
        arguments
    }
}

/// Payload published back to the `sender` topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyPayload {
    /// Correlation id of the originating call.
    pub id: CallId,
    /// Result or error, under `r`/`e`.
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl ReplyPayload {
    /// Successful reply carrying a result value.
    #[must_use]
    pub fn result(id: CallId, value: Value) -> Self {
        let mut data = Map::new();
        data.insert(RESULT_KEY.to_string(), value);
        Self { id, data }
    }

    /// Failed reply carrying the agent-side error text.
    #[must_use]
    pub fn error(id: CallId, message: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert(ERROR_KEY.to_string(), Value::String(message.into()));
        Self { id, data }
    }

    /// Resolve the reply. An `e` entry wins over any `r` entry; a reply
    /// carrying neither resolves to JSON `null` (void function).
    ///
    /// # Errors
    /// Returns the agent-side error text when `e` is present.
    pub fn into_result(mut self) -> Result<Value, String> {
        if let Some(error) = self.data.get(ERROR_KEY) {
            let message = match error {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            return Err(message);
        }
        Ok(self.data.remove(RESULT_KEY).unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn arguments_pack_as_numbered_keys() {
        let id = Uuid::new_v4();
        let payload = CallPayload::new(id, "lab/rcc1", &[json!(13), json!("high")]);
        assert_eq!(payload.data.get("_1"), Some(&json!(13)));
        assert_eq!(payload.data.get("_2"), Some(&json!("high")));
        assert_eq!(payload.arguments(), vec![json!(13), json!("high")]);
    }

    #[test]
    fn decode_tolerates_agent_annotations() {
        let raw = r#"{
            "id": "9f2c43c0-6a4e-4ab8-a9d1-2b9a4f6e0c11",
            "sender": "lab/rcc1",
            "context": "__global__",
            "method": "ledOn",
            "data": {}
        }"#;
        let payload: CallPayload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.sender, "lab/rcc1");
        assert!(payload.arguments().is_empty());
    }

    #[test]
    fn error_wins_over_result() {
        let id = Uuid::new_v4();
        let mut reply = ReplyPayload::result(id, json!(42));
        reply
            .data
            .insert("e".to_string(), json!("could not find function: ledOn"));
        assert_eq!(
            reply.into_result(),
            Err("could not find function: ledOn".to_string())
        );
    }

    #[test]
    fn void_reply_resolves_to_null() {
        let reply = ReplyPayload {
            id: Uuid::new_v4(),
            data: Map::new(),
        };
        assert_eq!(reply.into_result(), Ok(Value::Null));
    }
}
