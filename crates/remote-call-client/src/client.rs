//! The remote procedure call client.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use remote_call_core::{
    call::{AgentInfo, AgentStatus, CallId, CallRequest},
    topic::{self, TopicError},
    wire::{CallPayload, ReplyPayload},
};
use remote_call_transport::{
    Transport, TransportError, TransportEvent,
    mqtt::{BrokerAddr, Credentials, MqttSettings, MqttTransport},
};
use serde_json::Value;
use tokio::{
    sync::{Notify, mpsc, oneshot, watch},
    time::timeout,
};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::session::SessionState;

/// Client id prefix on the broker.
const CLIENT_ID_PREFIX: &str = "rcc";

/// Client error.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid topic segment: {0}")]
    InvalidName(#[from] TopicError),
    #[error("broker connection failed: {0}")]
    Connection(#[from] TransportError),
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("session is not connected")]
    NotConnected,
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("remote invocation failed: {0}")]
    Remote(String),
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// State shared between client handles and the dispatch task.
struct Shared {
    /// Waiters keyed by call id; each reply wakes exactly one.
    pending: Mutex<HashMap<CallId, oneshot::Sender<Result<Value, ClientError>>>>,
    state: watch::Sender<SessionState>,
    agent_status: watch::Sender<AgentStatus>,
    /// Signalled whenever the pending table drains to empty.
    idle: Notify,
}

impl Shared {
    fn forget(&self, id: CallId) {
        let mut pending = self.pending.lock().unwrap();
        pending.remove(&id);
        if pending.is_empty() {
            self.idle.notify_waiters();
        }
    }

    fn fail_all(&self, reason: &str) {
        let waiters: Vec<_> = {
            let mut pending = self.pending.lock().unwrap();
            pending.drain().collect()
        };
        for (_, waiter) in waiters {
            let _ = waiter.send(Err(ClientError::ConnectionLost(reason.to_string())));
        }
        self.idle.notify_waiters();
    }
}

/// Client session against a single remote agent.
///
/// All methods take `&self` and the handle is cheap to clone, so calls
/// may be issued concurrently from multiple tasks. Clones share one
/// logical session: ending any of them ends the session.
#[derive(Clone)]
pub struct RemoteClient {
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    domain: String,
    agent: String,
    reply_topic: String,
    call_timeout: Duration,
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient")
            .field("domain", &self.domain)
            .field("agent", &self.agent)
            .field("reply_topic", &self.reply_topic)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl RemoteClient {
    /// Connect to the broker and wait for the session acknowledgment.
    ///
    /// # Errors
    /// Returns an error when the configuration is invalid, the broker is
    /// unreachable or refuses the session, or no acknowledgment arrives
    /// within `connect_timeout`.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let addr = BrokerAddr::parse(&config.broker)?;
        let client_id = new_client_id();
        let credentials = config
            .credentials()
            .map(|(username, password)| Credentials { username, password });
        let settings = MqttSettings {
            addr,
            client_id: client_id.clone(),
            keep_alive: config.keep_alive,
            credentials,
        };
        let (transport, events) = MqttTransport::connect(settings);
        Self::start(Arc::new(transport), events, &config, client_id).await
    }

    /// Connect over an already-established transport.
    ///
    /// Seam for tests and single-process deployments; the receiver must
    /// stem from the same connection.
    ///
    /// # Errors
    /// Same acknowledgment rules as [`RemoteClient::connect`].
    pub async fn connect_with<T>(
        transport: T,
        events: mpsc::Receiver<TransportEvent>,
        config: &ClientConfig,
    ) -> Result<Self, ClientError>
    where
        T: Transport + 'static,
    {
        config.validate()?;
        Self::start(Arc::new(transport), events, config, new_client_id()).await
    }

    async fn start(
        transport: Arc<dyn Transport>,
        mut events: mpsc::Receiver<TransportEvent>,
        config: &ClientConfig,
        client_id: String,
    ) -> Result<Self, ClientError> {
        let (state, _) = watch::channel(SessionState::Connecting);
        let (agent_status, _) = watch::channel(AgentStatus::Unknown);
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            state,
            agent_status,
            idle: Notify::new(),
        });

        wait_for_ack(&mut events, config.connect_timeout).await?;

        let reply_topic = topic::reply(&config.domain, &client_id);
        transport.subscribe(&reply_topic).await?;
        let info_topic = topic::agent_info(&config.domain, &config.agent);
        transport.subscribe(&info_topic).await?;

        shared.state.send_replace(SessionState::Connected);
        tracing::debug!(
            domain = %config.domain,
            agent = %config.agent,
            client_id = %client_id,
            "session connected"
        );

        let dispatch_shared = Arc::clone(&shared);
        let dispatch_reply_topic = reply_topic.clone();
        tokio::spawn(async move {
            dispatch_loop(events, dispatch_shared, dispatch_reply_topic, info_topic).await;
        });

        Ok(Self {
            transport,
            shared,
            domain: config.domain.clone(),
            agent: config.agent.clone(),
            reply_topic,
            call_timeout: config.call_timeout,
        })
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// Last observed availability of the target agent.
    #[must_use]
    pub fn agent_status(&self) -> AgentStatus {
        *self.shared.agent_status.borrow()
    }

    /// Domain this session lives in.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Agent this session addresses.
    #[must_use]
    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Invoke a static function on the remote agent.
    ///
    /// Suspends until the correlated reply arrives or `call_timeout`
    /// elapses. Replies are matched by call id, so calls may be issued
    /// concurrently and replies may arrive in any order.
    ///
    /// # Errors
    /// [`ClientError::NotConnected`] when the session is not connected,
    /// [`ClientError::Timeout`] when no reply arrives in time, and
    /// [`ClientError::Remote`] when the agent reports an exception.
    pub async fn call_static(&self, request: CallRequest) -> Result<Value, ClientError> {
        if !self.state().is_connected() {
            return Err(ClientError::NotConnected);
        }
        topic::validate_segment("class", &request.class_name)?;
        topic::validate_segment("function", &request.function_name)?;

        let id = Uuid::new_v4();
        let call_topic = topic::call(
            &self.domain,
            &self.agent,
            &request.class_name,
            &request.function_name,
        );
        let payload = CallPayload::new(id, self.reply_topic.clone(), &request.arguments);
        let bytes = serde_json::to_vec(&payload)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.shared.pending.lock().unwrap().insert(id, reply_tx);

        tracing::debug!(%call_topic, call_id = %id, "issuing static call");
        if let Err(e) = self.transport.publish(&call_topic, bytes).await {
            self.shared.forget(id);
            return Err(e.into());
        }

        match timeout(self.call_timeout, reply_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ClientError::ConnectionLost(
                "dispatch task dropped the call".to_string(),
            )),
            Err(_) => {
                self.shared.forget(id);
                tracing::warn!(call_id = %id, timeout = ?self.call_timeout, "call timed out");
                Err(ClientError::Timeout(self.call_timeout))
            }
        }
    }

    /// End the session.
    ///
    /// New calls are rejected immediately; in-flight calls get up to
    /// `call_timeout` to settle before being cancelled. The transport is
    /// released in every case. Idempotent.
    pub async fn end(&self) {
        let previous = self.shared.state.send_replace(SessionState::Ended);
        if previous == SessionState::Ended {
            return;
        }
        tracing::debug!(agent = %self.agent, "ending session");

        let drained = timeout(self.call_timeout, async {
            loop {
                let notified = self.shared.idle.notified();
                if self.shared.pending.lock().unwrap().is_empty() {
                    break;
                }
                notified.await;
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!("cancelling calls still in flight at shutdown");
            self.shared.fail_all("session ended");
        }

        self.transport.disconnect().await;
    }
}

fn new_client_id() -> String {
    // Strict MQTT 3.1 brokers cap client ids at 23 bytes.
    let id = Uuid::new_v4().simple().to_string();
    format!("{CLIENT_ID_PREFIX}{}", &id[..20])
}

async fn wait_for_ack(
    events: &mut mpsc::Receiver<TransportEvent>,
    connect_timeout: Duration,
) -> Result<(), ClientError> {
    let deadline = tokio::time::Instant::now() + connect_timeout;
    loop {
        let event = tokio::time::timeout_at(deadline, events.recv())
            .await
            .map_err(|_| {
                TransportError::Unreachable(format!(
                    "no session acknowledgment within {connect_timeout:?}"
                ))
            })?;
        match event {
            Some(TransportEvent::Connected) => return Ok(()),
            Some(TransportEvent::Message { topic, .. }) => {
                tracing::debug!(%topic, "message before session acknowledgment");
            }
            Some(TransportEvent::Closed { reason }) => {
                return Err(match reason {
                    Some(reason) => TransportError::Refused(reason),
                    None => TransportError::Closed,
                }
                .into());
            }
            None => return Err(TransportError::Closed.into()),
        }
    }
}

async fn dispatch_loop(
    mut events: mpsc::Receiver<TransportEvent>,
    shared: Arc<Shared>,
    reply_topic: String,
    info_topic: String,
) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Message { topic, payload } if topic == reply_topic => {
                handle_reply(&shared, &payload);
            }
            TransportEvent::Message { topic, payload } if topic == info_topic => {
                handle_agent_info(&shared, &payload);
            }
            TransportEvent::Message { topic, .. } => {
                tracing::debug!(%topic, "message on unexpected topic");
            }
            TransportEvent::Connected => {}
            TransportEvent::Closed { reason } => {
                shutdown(&shared, reason.as_deref().unwrap_or("connection closed"));
                return;
            }
        }
    }
    shutdown(&shared, "transport event channel closed");
}

fn shutdown(shared: &Shared, reason: &str) {
    shared.state.send_if_modified(|state| {
        if *state == SessionState::Ended {
            false
        } else {
            *state = SessionState::Disconnected;
            true
        }
    });
    shared.fail_all(reason);
    tracing::debug!(%reason, "session dispatch stopped");
}

fn handle_reply(shared: &Shared, payload: &[u8]) {
    let reply: ReplyPayload = match serde_json::from_slice(payload) {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(error = %e, "discarding malformed reply");
            return;
        }
    };
    let waiter = {
        let mut pending = shared.pending.lock().unwrap();
        let waiter = pending.remove(&reply.id);
        if waiter.is_some() && pending.is_empty() {
            shared.idle.notify_waiters();
        }
        waiter
    };
    match waiter {
        Some(waiter) => {
            let outcome = reply.into_result().map_err(ClientError::Remote);
            let _ = waiter.send(outcome);
        }
        // Late reply after a timeout, or not ours at all.
        None => tracing::debug!(call_id = %reply.id, "reply with no pending call"),
    }
}

fn handle_agent_info(shared: &Shared, payload: &[u8]) {
    match serde_json::from_slice::<AgentInfo>(payload) {
        Ok(info) => {
            let previous = shared.agent_status.send_replace(info.status);
            if previous != info.status {
                tracing::info!(status = ?info.status, "agent availability changed");
            }
        }
        Err(e) => tracing::warn!(error = %e, "discarding malformed agent info"),
    }
}
