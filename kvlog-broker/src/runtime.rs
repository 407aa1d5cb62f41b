//! Serving requests from a transport.
//!
//! The transport owns routing, node identity and wire framing. [`Node`]
//! pulls messages from it, handles each on its own task and sends the reply
//! back to the sender.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  recv   ┌──────────┐  spawn  ┌────────────────────────┐
//! │ Transport  │ ──────► │   Node   │ ──────► │ LogService::handle_body│
//! │            │ ◄────── │          │ ◄────── │  (one task / request)  │
//! └────────────┘  send   └──────────┘  reply  └────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{BrokerError, Result};
use crate::protocol::Message;
use crate::service::LogService;

/// Delivers inbound messages and routes replies.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Stable identity of this node.
    fn node_id(&self) -> &str;

    /// Next inbound message, or `None` once the transport is closed.
    async fn recv(&self) -> Option<Message>;

    /// Deliver a message to `message.dest`.
    async fn send(&self, message: Message) -> Result<()>;
}

/// Runs a [`LogService`] against a [`Transport`].
pub struct Node<T> {
    transport: Arc<T>,
    service: Arc<LogService>,
}

impl<T> Node<T>
where
    T: Transport + 'static,
{
    pub fn new(transport: Arc<T>, service: Arc<LogService>) -> Self {
        Self { transport, service }
    }

    /// Serve until `shutdown` fires or the transport closes.
    ///
    /// In-flight requests are allowed to finish before this returns.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let node_id = self.transport.node_id().to_string();
        info!(node_id, "Log service started");

        let mut handlers = JoinSet::new();
        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => break,
                message = self.transport.recv() => message,
            };
            let Some(message) = message else {
                debug!(node_id, "Transport closed");
                break;
            };

            if is_reply(&message.body) {
                debug!(src = %message.src, "Ignoring unsolicited reply");
                continue;
            }

            let transport = Arc::clone(&self.transport);
            let service = Arc::clone(&self.service);
            handlers.spawn(async move {
                let body = service.handle_body(&message.body).await;
                let reply = Message {
                    src: transport.node_id().to_string(),
                    dest: message.src,
                    body,
                };
                if let Err(error) = transport.send(reply).await {
                    error!(%error, "Failed to deliver reply");
                }
            });

            while let Some(finished) = handlers.try_join_next() {
                log_join_error(finished);
            }
        }

        while let Some(finished) = handlers.join_next().await {
            log_join_error(finished);
        }

        info!(node_id, "Log service stopped");
        Ok(())
    }
}

fn is_reply(body: &Value) -> bool {
    body.get("in_reply_to").is_some() && body.get("msg_id").is_none()
}

fn log_join_error(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(error) = result {
        error!(%error, "Request handler panicked");
    }
}

/// In-process [`Transport`] over tokio channels.
pub struct ChannelTransport {
    node_id: String,
    inbound: Mutex<mpsc::Receiver<Message>>,
    outbound: mpsc::Sender<Message>,
}

impl ChannelTransport {
    /// A transport for `node_id` and the client end wired to it.
    pub fn pair(
        node_id: impl Into<String>,
        client_id: impl Into<String>,
        capacity: usize,
    ) -> (Self, ChannelClient) {
        let node_id = node_id.into();
        let (to_node, inbound) = mpsc::channel(capacity);
        let (outbound, from_node) = mpsc::channel(capacity);

        let transport = Self {
            node_id: node_id.clone(),
            inbound: Mutex::new(inbound),
            outbound,
        };
        let client = ChannelClient {
            client_id: client_id.into(),
            node_id,
            to_node,
            from_node,
            next_msg_id: 1,
            replies: HashMap::new(),
        };
        (transport, client)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn recv(&self) -> Option<Message> {
        self.inbound.lock().await.recv().await
    }

    async fn send(&self, message: Message) -> Result<()> {
        self.outbound
            .send(message)
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))
    }
}

/// Client end of a [`ChannelTransport`].
///
/// Requests get increasing `msg_id`s; replies are matched by `in_reply_to`
/// and may arrive in any order.
pub struct ChannelClient {
    client_id: String,
    node_id: String,
    to_node: mpsc::Sender<Message>,
    from_node: mpsc::Receiver<Message>,
    next_msg_id: u64,
    replies: HashMap<u64, Value>,
}

impl ChannelClient {
    /// Send a request body and return its `msg_id` without waiting.
    pub async fn submit(&mut self, mut body: Value) -> Result<u64> {
        let Some(fields) = body.as_object_mut() else {
            return Err(BrokerError::MalformedRequest(
                "request body must be an object".to_string(),
            ));
        };

        let msg_id = self.next_msg_id;
        self.next_msg_id += 1;
        fields.insert("msg_id".to_string(), msg_id.into());

        self.to_node
            .send(Message {
                src: self.client_id.clone(),
                dest: self.node_id.clone(),
                body,
            })
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;
        Ok(msg_id)
    }

    /// Wait for the reply to `msg_id`.
    pub async fn wait(&mut self, msg_id: u64) -> Result<Value> {
        loop {
            if let Some(reply) = self.replies.remove(&msg_id) {
                return Ok(reply);
            }

            let message = self
                .from_node
                .recv()
                .await
                .ok_or_else(|| BrokerError::Transport("node closed".to_string()))?;

            match message.body.get("in_reply_to").and_then(Value::as_u64) {
                Some(id) => {
                    self.replies.insert(id, message.body);
                }
                None => debug!(src = %message.src, "Dropping uncorrelated message"),
            }
        }
    }

    /// Send a request body and wait for its reply.
    pub async fn call(&mut self, body: Value) -> Result<Value> {
        let msg_id = self.submit(body).await?;
        self.wait(msg_id).await
    }
}
