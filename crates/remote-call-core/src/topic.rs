//! MQTT topic scheme for call routing.
//!
//! Calls travel on `{domain}/{agent}/{class}/__static__/{function}`.
//! Replies come back on the per-client topic carried in each request's
//! `sender` field. Agents keep a retained presence payload on
//! `{domain}/{agent}/__agentInfo__`.

use thiserror::Error;

/// Instance marker for static function invocations.
pub const STATIC_INSTANCE: &str = "__static__";

/// Leaf segment of the retained agent presence topic.
pub const AGENT_INFO: &str = "__agentInfo__";

/// Topic error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopicError {
    #[error("empty {0} segment")]
    Empty(&'static str),
    #[error("{0} segment contains a reserved character (`/`, `+`, `#` or NUL)")]
    Reserved(&'static str),
    #[error("not a call topic: {0}")]
    Malformed(String),
}

/// Validate a single topic segment.
///
/// # Errors
/// Returns an error if the segment is empty or contains MQTT routing
/// characters.
pub fn validate_segment(name: &'static str, segment: &str) -> Result<(), TopicError> {
    if segment.is_empty() {
        return Err(TopicError::Empty(name));
    }
    if segment.contains(['/', '+', '#', '\0']) {
        return Err(TopicError::Reserved(name));
    }
    Ok(())
}

/// Topic a static call is published on.
#[must_use]
pub fn call(domain: &str, agent: &str, class: &str, function: &str) -> String {
    format!("{domain}/{agent}/{class}/{STATIC_INSTANCE}/{function}")
}

/// Per-client reply topic, carried as `sender` in every request.
#[must_use]
pub fn reply(domain: &str, client_id: &str) -> String {
    format!("{domain}/{client_id}")
}

/// Retained presence topic of an agent.
#[must_use]
pub fn agent_info(domain: &str, agent: &str) -> String {
    format!("{domain}/{agent}/{AGENT_INFO}")
}

/// A call topic split back into its segments, as an agent sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTopic {
    /// Namespace the call was routed in.
    pub domain: String,
    /// Addressed agent.
    pub agent: String,
    /// Class exposing the function.
    pub class: String,
    /// Invoked function.
    pub function: String,
}

impl CallTopic {
    /// Parse a call topic.
    ///
    /// # Errors
    /// Returns an error unless the topic has exactly five segments with
    /// the static instance marker in fourth position.
    pub fn parse(topic: &str) -> Result<Self, TopicError> {
        let segments: Vec<&str> = topic.split('/').collect();
        match segments.as_slice() {
            [domain, agent, class, marker, function] if *marker == STATIC_INSTANCE => Ok(Self {
                domain: (*domain).to_string(),
                agent: (*agent).to_string(),
                class: (*class).to_string(),
                function: (*function).to_string(),
            }),
            _ => Err(TopicError::Malformed(topic.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::GLOBAL_CLASS;

    #[test]
    fn call_topic_layout() {
        assert_eq!(
            call("lab", "board-1", GLOBAL_CLASS, "ledOn"),
            "lab/board-1/__global__/__static__/ledOn"
        );
    }

    #[test]
    fn parse_round_trips() {
        let topic = call("lab", "board-1", "Gpio", "write");
        let parsed = CallTopic::parse(&topic).unwrap();
        assert_eq!(parsed.domain, "lab");
        assert_eq!(parsed.agent, "board-1");
        assert_eq!(parsed.class, "Gpio");
        assert_eq!(parsed.function, "write");
    }

    #[test]
    fn parse_rejects_other_shapes() {
        assert!(matches!(
            CallTopic::parse("lab/board-1/__agentInfo__"),
            Err(TopicError::Malformed(_))
        ));
        // Right arity, wrong instance marker.
        assert!(matches!(
            CallTopic::parse("lab/board-1/Gpio/instance-3/write"),
            Err(TopicError::Malformed(_))
        ));
    }

    #[test]
    fn segment_validation() {
        assert!(validate_segment("agent", "board-1").is_ok());
        assert_eq!(validate_segment("agent", ""), Err(TopicError::Empty("agent")));
        assert_eq!(
            validate_segment("agent", "a/b"),
            Err(TopicError::Reserved("agent"))
        );
        assert_eq!(
            validate_segment("domain", "lab/#"),
            Err(TopicError::Reserved("domain"))
        );
    }
}
