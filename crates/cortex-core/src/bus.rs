//! Publish/subscribe message bus with request/response semantics.
//!
//! [`MessageBus`] is the process-wide fabric every plugin communicates over.
//! Subscribers register an async handler per channel; senders either collect
//! the **first** response ([`MessageBus::send`]) or fan out with no response
//! ([`MessageBus::broadcast`]).
//!
//! Delivery within a single channel preserves subscription order for each
//! message, and handler failures are contained: a handler cannot take down
//! the bus or its sibling subscribers.
//!
//! # Example
//!
//! ```rust,ignore
//! let bus = MessageBus::new();
//! bus.subscribe("greetings", Arc::new(|msg| {
//!     Box::pin(async move { Some(MessageResponse::data(msg.payload)) })
//! }));
//! let reply = bus.send("greetings", json!("hi"), "demo").await;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::channel::Channel;
use crate::error::BusError;
use crate::message::{BusMessage, MessageResponse};

/// Future returned by a subscriber handler.
pub type HandlerFuture = BoxFuture<'static, Option<MessageResponse>>;

/// Type-erased async subscriber handler.
///
/// Returning `None` means "not handled" — the bus keeps polling further
/// subscribers for a response.
pub type MessageHandler = Arc<dyn Fn(BusMessage) -> HandlerFuture + Send + Sync>;

/// Handle returned by `subscribe`; pass to [`MessageBus::unsubscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    channel: String,
    id: u64,
}

struct SubscriberEntry {
    id: u64,
    handler: MessageHandler,
}

/// The process-wide publish/subscribe bus.
///
/// Subscriber lists are guarded by a short-lived [`parking_lot::RwLock`];
/// handlers run outside the lock, so a subscriber may itself publish or
/// subscribe while handling a message.
pub struct MessageBus {
    subscribers: RwLock<HashMap<String, Vec<SubscriberEntry>>>,
    next_id: AtomicU64,
}

impl MessageBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers `handler` on `channel`.
    pub fn subscribe(&self, channel: impl Into<String>, handler: MessageHandler) -> Subscription {
        let channel = channel.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .entry(channel.clone())
            .or_default()
            .push(SubscriberEntry {
                id,
                handler,
            });
        debug!(channel = %channel, subscription = id, "Subscriber registered");
        Subscription { channel, id }
    }

    /// Registers a typed handler on `channel`.
    ///
    /// The payload is validated by deserializing into `P`. On mismatch the
    /// handler is **never called**: the bus logs a warning and the
    /// subscription yields a no-op response, so a malformed publisher cannot
    /// propagate invalid data into consumers.
    pub fn subscribe_channel<P, R, F, Fut>(&self, channel: &Channel<P, R>, handler: F) -> Subscription
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, String>> + Send + 'static,
    {
        let name = channel.name();
        let handler = Arc::new(handler);
        self.subscribe(name, Arc::new(move |msg: BusMessage| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let payload: P = match serde_json::from_value(msg.payload) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(
                            channel = %msg.channel,
                            source = %msg.source,
                            error = %e,
                            "Channel payload failed validation — handler skipped"
                        );
                        return None;
                    }
                };
                match handler(payload).await {
                    Ok(response) => match serde_json::to_value(response) {
                        Ok(Value::Null) => Some(MessageResponse::success()),
                        Ok(v) => Some(MessageResponse::data(v)),
                        Err(e) => Some(MessageResponse::error(e.to_string())),
                    },
                    Err(e) => Some(MessageResponse::error(e)),
                }
            })
        }))
    }

    /// Removes a subscription. Calling twice is a no-op.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        let mut map = self.subscribers.write();
        if let Some(entries) = map.get_mut(&subscription.channel) {
            entries.retain(|e| e.id != subscription.id);
            if entries.is_empty() {
                map.remove(&subscription.channel);
            }
        }
    }

    /// Number of subscribers currently registered on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.subscribers
            .read()
            .get(channel)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    /// Sends a request and returns the **first** response.
    ///
    /// Handlers run sequentially in subscription order; the first subscriber
    /// producing `Some(response)` wins and later subscribers are not invoked.
    pub async fn send(
        &self,
        channel: &str,
        payload: Value,
        source: &str,
    ) -> Option<MessageResponse> {
        self.send_message(BusMessage::new(channel, payload, source))
            .await
    }

    /// Fans a message out to every subscriber, collecting no response.
    pub async fn broadcast(&self, channel: &str, payload: Value, source: &str) {
        self.send_message(BusMessage::new(channel, payload, source).into_broadcast())
            .await;
    }

    /// Sends a prepared [`BusMessage`], honoring its `broadcast` flag.
    pub async fn send_message(&self, message: BusMessage) -> Option<MessageResponse> {
        let handlers: Vec<MessageHandler> = {
            let map = self.subscribers.read();
            match map.get(&message.channel) {
                Some(entries) => entries.iter().map(|e| Arc::clone(&e.handler)).collect(),
                None => Vec::new(),
            }
        };

        if handlers.is_empty() {
            debug!(channel = %message.channel, "No subscribers for message");
            return None;
        }

        if message.broadcast {
            for handler in handlers {
                handler(message.clone()).await;
            }
            return None;
        }

        for handler in handlers {
            if let Some(response) = handler(message.clone()).await {
                return Some(response);
            }
        }
        None
    }

    /// Sends a typed request on `channel` and deserializes the response.
    ///
    /// Returns `Ok(None)` when no subscriber produced a response.
    pub async fn send_channel<P, R>(
        &self,
        channel: &Channel<P, R>,
        payload: &P,
        source: &str,
    ) -> Result<Option<R>, BusError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let value = serde_json::to_value(payload)?;
        match self.send(channel.name(), value, source).await {
            Some(MessageResponse::Success { data }) => match data {
                Some(data) => Ok(Some(serde_json::from_value(data)?)),
                None => Ok(None),
            },
            Some(MessageResponse::Error { message }) => Err(BusError::Handler(message)),
            None => Ok(None),
        }
    }

    /// Broadcasts a typed payload on `channel`.
    pub async fn broadcast_channel<P, R>(
        &self,
        channel: &Channel<P, R>,
        payload: &P,
        source: &str,
    ) -> Result<(), BusError>
    where
        P: Serialize,
    {
        let value = serde_json::to_value(payload)?;
        self.broadcast(channel.name(), value, source).await;
        Ok(())
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("channels", &self.subscribers.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn recording_handler(
        log: Arc<parking_lot::Mutex<Vec<&'static str>>>,
        tag: &'static str,
        respond: bool,
    ) -> MessageHandler {
        Arc::new(move |_msg| {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().push(tag);
                respond.then(MessageResponse::success)
            })
        })
    }

    #[tokio::test]
    async fn first_response_wins() {
        let bus = MessageBus::new();
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        bus.subscribe("ch", recording_handler(Arc::clone(&log), "a", false));
        bus.subscribe("ch", recording_handler(Arc::clone(&log), "b", true));
        bus.subscribe("ch", recording_handler(Arc::clone(&log), "c", true));

        let response = bus.send("ch", json!({}), "test").await;
        assert_eq!(response, Some(MessageResponse::success()));
        // "c" never runs: "b" already produced a response.
        assert_eq!(*log.lock(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers() {
        let bus = MessageBus::new();
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        bus.subscribe("ch", recording_handler(Arc::clone(&log), "a", true));
        bus.subscribe("ch", recording_handler(Arc::clone(&log), "b", true));

        bus.broadcast("ch", json!({}), "test").await;
        assert_eq!(*log.lock(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn delivery_preserves_subscription_order() {
        let bus = MessageBus::new();
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            bus.subscribe("ordered", recording_handler(Arc::clone(&log), tag, false));
        }
        bus.broadcast("ordered", json!(1), "test").await;
        bus.broadcast("ordered", json!(2), "test").await;
        assert_eq!(
            *log.lock(),
            vec!["first", "second", "third", "first", "second", "third"]
        );
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let bus = MessageBus::new();
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sub = bus.subscribe("ch", recording_handler(Arc::clone(&log), "a", false));
        assert_eq!(bus.subscriber_count("ch"), 1);
        bus.unsubscribe(&sub);
        bus.unsubscribe(&sub);
        assert_eq!(bus.subscriber_count("ch"), 0);
        bus.broadcast("ch", json!({}), "test").await;
        assert!(log.lock().is_empty());
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
    }

    #[tokio::test]
    async fn typed_channel_roundtrip() {
        const PING: Channel<Ping, u32> = Channel::new("test:ping");
        let bus = MessageBus::new();
        bus.subscribe_channel(&PING, |ping: Ping| async move { Ok(ping.seq + 1) });

        let reply = bus.send_channel(&PING, &Ping { seq: 41 }, "test").await.unwrap();
        assert_eq!(reply, Some(42));
    }

    #[tokio::test]
    async fn typed_channel_rejects_invalid_payload() {
        const PING: Channel<Ping, u32> = Channel::new("test:ping");
        let bus = MessageBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = Arc::clone(&calls);
        bus.subscribe_channel(&PING, move |ping: Ping| {
            let calls = Arc::clone(&calls_in);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(ping.seq)
            }
        });

        // Malformed payload: handler is never called, response is a no-op.
        let response = bus.send("test:ping", json!({"seq": "nope"}), "test").await;
        assert_eq!(response, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
