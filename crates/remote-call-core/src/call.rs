//! Call identity and agent presence types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Class marker for calls not bound to an instance.
pub const GLOBAL_CLASS: &str = "__global__";

/// Correlation identifier carried by every call and its reply.
pub type CallId = Uuid;

/// A static function invocation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    /// Class exposing the function; [`GLOBAL_CLASS`] for free functions.
    pub class_name: String,
    /// Function to invoke.
    pub function_name: String,
    /// Positional arguments.
    #[serde(default)]
    pub arguments: Vec<serde_json::Value>,
}

impl CallRequest {
    /// Create a request against a named class.
    #[must_use]
    pub fn new(class_name: impl Into<String>, function_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            function_name: function_name.into(),
            arguments: Vec::new(),
        }
    }

    /// Create a request for a free function (class [`GLOBAL_CLASS`]).
    #[must_use]
    pub fn global(function_name: impl Into<String>) -> Self {
        Self::new(GLOBAL_CLASS, function_name)
    }

    /// Append a positional argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.arguments.push(value.into());
        self
    }

    /// Whether this call targets a free function.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.class_name == GLOBAL_CLASS
    }
}

/// Agent availability as reported on its retained info topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Agent announced itself online.
    Online,
    /// Agent signed off, or its last will fired.
    Offline,
    /// No presence payload observed yet.
    #[default]
    Unknown,
}

/// Retained presence payload published by agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    /// Current availability.
    pub status: AgentStatus,
    /// Hostname the agent reports, when it reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn global_request_uses_marker_class() {
        let request = CallRequest::global("ledOn");
        assert_eq!(request.class_name, GLOBAL_CLASS);
        assert!(request.is_global());
        assert!(request.arguments.is_empty());
    }

    #[test]
    fn arg_builder_preserves_order() {
        let request = CallRequest::new("Gpio", "write").arg(13).arg("high");
        assert!(!request.is_global());
        assert_eq!(request.arguments, vec![json!(13), json!("high")]);
    }

    #[test]
    fn agent_info_matches_wire_shape() {
        let info: AgentInfo =
            serde_json::from_str(r#"{"status":"online","hostname":"board-7"}"#).unwrap();
        assert_eq!(info.status, AgentStatus::Online);
        assert_eq!(info.hostname.as_deref(), Some("board-7"));

        let bare: AgentInfo = serde_json::from_str(r#"{"status":"offline"}"#).unwrap();
        assert_eq!(bare.status, AgentStatus::Offline);
        assert!(bare.hostname.is_none());
    }
}
