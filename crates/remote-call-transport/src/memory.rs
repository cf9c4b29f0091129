//! In-process broker for tests and single-process deployments.
//!
//! Exact-topic routing with retained message support; no wildcard
//! matching. Endpoints and retained messages are lost when the broker is
//! dropped.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::traits::{Transport, TransportError, TransportEvent};

const EVENT_CAPACITY: usize = 256;

type EndpointId = u64;

struct Endpoint {
    subscriptions: HashSet<String>,
    event_tx: mpsc::Sender<TransportEvent>,
}

#[derive(Default)]
struct Inner {
    endpoints: HashMap<EndpointId, Endpoint>,
    retained: HashMap<String, Bytes>,
    next_id: EndpointId,
}

/// Loop-back broker handing out connected endpoints.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBroker {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new endpoint.
    ///
    /// The receiver observes [`TransportEvent::Connected`] immediately.
    #[must_use]
    pub fn connect(&self) -> (MemoryTransport, mpsc::Receiver<TransportEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        let id = {
            let mut inner = self.inner.lock().unwrap();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.endpoints.insert(
                id,
                Endpoint {
                    subscriptions: HashSet::new(),
                    event_tx: event_tx.clone(),
                },
            );
            id
        };
        // Fresh channel, the send cannot fail.
        let _ = event_tx.try_send(TransportEvent::Connected);
        (
            MemoryTransport {
                id,
                broker: self.clone(),
            },
            event_rx,
        )
    }

    /// Publish without an endpoint, as test fixtures do for retained
    /// presence payloads.
    pub async fn publish_retained(&self, topic: &str, payload: Vec<u8>) {
        // Routing from the broker itself cannot fail.
        let _ = self.route(None, topic, Bytes::from(payload), true).await;
    }

    async fn route(
        &self,
        from: Option<EndpointId>,
        topic: &str,
        payload: Bytes,
        retain: bool,
    ) -> Result<(), TransportError> {
        let targets: Vec<mpsc::Sender<TransportEvent>> = {
            let mut inner = self.inner.lock().unwrap();
            if let Some(id) = from {
                if !inner.endpoints.contains_key(&id) {
                    return Err(TransportError::Closed);
                }
            }
            if retain {
                inner.retained.insert(topic.to_string(), payload.clone());
            }
            inner
                .endpoints
                .values()
                .filter(|endpoint| endpoint.subscriptions.contains(topic))
                .map(|endpoint| endpoint.event_tx.clone())
                .collect()
        };
        for target in targets {
            let _ = target
                .send(TransportEvent::Message {
                    topic: topic.to_string(),
                    payload: payload.clone(),
                })
                .await;
        }
        Ok(())
    }

    async fn subscribe(&self, id: EndpointId, topic: &str) -> Result<(), TransportError> {
        let (event_tx, retained) = {
            let mut inner = self.inner.lock().unwrap();
            let Some(endpoint) = inner.endpoints.get_mut(&id) else {
                return Err(TransportError::Closed);
            };
            endpoint.subscriptions.insert(topic.to_string());
            let event_tx = endpoint.event_tx.clone();
            (event_tx, inner.retained.get(topic).cloned())
        };
        if let Some(payload) = retained {
            let _ = event_tx
                .send(TransportEvent::Message {
                    topic: topic.to_string(),
                    payload,
                })
                .await;
        }
        Ok(())
    }

    async fn disconnect(&self, id: EndpointId) {
        let removed = self.inner.lock().unwrap().endpoints.remove(&id);
        if let Some(endpoint) = removed {
            let _ = endpoint
                .event_tx
                .send(TransportEvent::Closed { reason: None })
                .await;
        }
    }
}

/// Endpoint attached to a [`MemoryBroker`].
///
/// Clones address the same endpoint; disconnecting one disconnects all.
#[derive(Clone)]
pub struct MemoryTransport {
    id: EndpointId,
    broker: MemoryBroker,
}

impl MemoryTransport {
    /// Publish with the retained flag set, as agents do for presence.
    ///
    /// # Errors
    /// Returns an error if the endpoint is already released.
    pub async fn publish_retained(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.broker
            .route(Some(self.id), topic, Bytes::from(payload), true)
            .await
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.broker
            .route(Some(self.id), topic, Bytes::from(payload), false)
            .await
    }

    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.broker.subscribe(self.id, topic).await
    }

    async fn disconnect(&self) {
        self.broker.disconnect(self.id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next_message(events: &mut mpsc::Receiver<TransportEvent>) -> (String, Bytes) {
        loop {
            match events.recv().await.expect("event stream ended") {
                TransportEvent::Message { topic, payload } => return (topic, payload),
                TransportEvent::Connected => {}
                TransportEvent::Closed { reason } => panic!("unexpected close: {reason:?}"),
            }
        }
    }

    #[tokio::test]
    async fn routes_to_exact_subscribers() {
        let broker = MemoryBroker::new();
        let (subscriber, mut events) = broker.connect();
        let (publisher, _publisher_events) = broker.connect();

        subscriber.subscribe("lab/board-1").await.unwrap();
        publisher
            .publish("lab/board-1", b"ping".to_vec())
            .await
            .unwrap();
        publisher
            .publish("lab/board-2", b"other".to_vec())
            .await
            .unwrap();

        let (topic, payload) = next_message(&mut events).await;
        assert_eq!(topic, "lab/board-1");
        assert_eq!(payload.as_ref(), b"ping");
    }

    #[tokio::test]
    async fn retained_payload_arrives_on_subscribe() {
        let broker = MemoryBroker::new();
        broker
            .publish_retained("lab/board-1/__agentInfo__", b"{\"status\":\"online\"}".to_vec())
            .await;

        let (subscriber, mut events) = broker.connect();
        subscriber
            .subscribe("lab/board-1/__agentInfo__")
            .await
            .unwrap();

        let (topic, payload) = next_message(&mut events).await;
        assert_eq!(topic, "lab/board-1/__agentInfo__");
        assert_eq!(payload.as_ref(), b"{\"status\":\"online\"}");
    }

    #[tokio::test]
    async fn disconnect_closes_and_rejects_further_use() {
        let broker = MemoryBroker::new();
        let (endpoint, mut events) = broker.connect();
        assert!(matches!(
            events.recv().await,
            Some(TransportEvent::Connected)
        ));

        endpoint.disconnect().await;
        assert!(matches!(
            events.recv().await,
            Some(TransportEvent::Closed { reason: None })
        ));

        let err = endpoint.publish("lab/x", Vec::new()).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));

        // A second disconnect is a no-op.
        endpoint.disconnect().await;
    }
}
