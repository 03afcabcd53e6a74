//! Publish/subscribe transport boundary
//!
//! The adapter talks to the bus only through [`Transport`]. Two
//! implementations exist:
//! - [`MqttConnection`]: a real broker connection via `rumqttc`
//! - [`LocalBroker`] / [`LocalConnection`]: an in-process bus for tests and
//!   offline demos
//!
//! All trait methods are non-blocking. Inbound traffic is read from a
//! [`Subscription`], which yields every message for its own topics in
//! delivery order and ends once the connection is closed. Each subscription
//! has its own unbounded queue, so a slow reader delays its messages but never
//! loses them.

mod local;
mod mqtt;

pub use local::{LocalBroker, LocalConnection};
pub use mqtt::MqttConnection;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::trace;

/// Delivery assurance for a publish or subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeliveryLevel {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl DeliveryLevel {
    /// The strongest level the bus offers
    pub fn strongest() -> Self {
        DeliveryLevel::ExactlyOnce
    }
}

impl Default for DeliveryLevel {
    fn default() -> Self {
        DeliveryLevel::AtMostOnce
    }
}

/// Raw message received on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Transport errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("not connected to the broker")]
    NotConnected,

    #[error("connection closed")]
    Closed,

    #[error("broker client rejected the request: {0}")]
    Client(String),

    #[error("timed out waiting for the broker connection")]
    ConnectTimeout,
}

/// A single client's connection to the bus
pub trait Transport: Send + Sync {
    /// Whether the outbound path is currently usable
    fn is_connected(&self) -> bool;

    /// Hand a payload to the outbound path. Does not wait for delivery.
    fn publish(&self, topic: &str, payload: Vec<u8>, level: DeliveryLevel)
        -> Result<(), TransportError>;

    /// Subscribe to `topics`. The subscription survives reconnects.
    fn subscribe(&self, topics: &[String], level: DeliveryLevel)
        -> Result<Subscription, TransportError>;

    /// Release one `subscribe` of each of `topics`. Delivery on a topic stops
    /// once every subscription that named it has been released.
    fn unsubscribe(&self, topics: &[String]) -> Result<(), TransportError>;

    /// Close the connection. Open subscriptions end.
    fn disconnect(&self) -> Result<(), TransportError>;
}

// ============================================================================
// Subscription fan-out
// ============================================================================

struct Route {
    topics: Vec<String>,
    tx: mpsc::UnboundedSender<InboundMessage>,
}

struct TopicRefs {
    level: DeliveryLevel,
    refs: usize,
}

#[derive(Default)]
struct Routing {
    open: bool,
    routes: Vec<Route>,
    topics: HashMap<String, TopicRefs>,
}

/// Per-connection inbound fan-out shared by both transports.
///
/// Each subscription gets its own queue. Topics are reference counted so they
/// can be re-issued after a reconnect and released only when the last
/// subscription that named them lets go.
pub(crate) struct Fanout {
    routing: RwLock<Routing>,
}

impl Fanout {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            routing: RwLock::new(Routing {
                open: true,
                ..Routing::default()
            }),
        })
    }

    pub(crate) fn is_open(&self) -> bool {
        self.routing.read().open
    }

    pub(crate) fn subscribe(
        self: &Arc<Self>,
        topics: &[String],
        level: DeliveryLevel,
    ) -> Result<Subscription, TransportError> {
        let mut routing = self.routing.write();
        if !routing.open {
            return Err(TransportError::Closed);
        }

        for topic in topics {
            let entry = routing
                .topics
                .entry(topic.clone())
                .or_insert(TopicRefs { level, refs: 0 });
            entry.level = entry.level.max(level);
            entry.refs += 1;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        routing.routes.push(Route {
            topics: topics.to_vec(),
            tx,
        });

        Ok(Subscription {
            rx,
            topics: topics.to_vec(),
            fanout: Arc::clone(self),
        })
    }

    /// Release one reference per topic. Returns the topics nobody holds any
    /// more, which the caller should unsubscribe at the broker.
    pub(crate) fn unsubscribe(&self, topics: &[String]) -> Vec<String> {
        let mut routing = self.routing.write();
        let mut released = Vec::new();

        for topic in topics {
            if let Some(entry) = routing.topics.get_mut(topic) {
                entry.refs = entry.refs.saturating_sub(1);
                if entry.refs == 0 {
                    routing.topics.remove(topic);
                    released.push(topic.clone());
                }
            }
        }

        released
    }

    /// Snapshot of active topics and their levels
    pub(crate) fn active_topics(&self) -> Vec<(String, DeliveryLevel)> {
        self.routing
            .read()
            .topics
            .iter()
            .map(|(topic, entry)| (topic.clone(), entry.level))
            .collect()
    }

    /// Queue a message for every subscription on its topic.
    ///
    /// Routes whose reader is gone are pruned here.
    pub(crate) fn deliver(&self, message: InboundMessage) {
        let mut routing = self.routing.write();
        if !routing.topics.contains_key(&message.topic) {
            trace!(topic = %message.topic, "No active subscription");
            return;
        }

        routing.routes.retain(|route| {
            if !route.topics.iter().any(|t| *t == message.topic) {
                return !route.tx.is_closed();
            }
            route.tx.send(message.clone()).is_ok()
        });
    }

    /// End every subscription. Messages already queued are discarded.
    pub(crate) fn close(&self) {
        let mut routing = self.routing.write();
        routing.open = false;
        routing.routes.clear();
        routing.topics.clear();
    }
}

/// Stream of inbound messages for a set of topics
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<InboundMessage>,
    topics: Vec<String>,
    fanout: Arc<Fanout>,
}

impl Subscription {
    /// Topics this subscription was created for
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Next message on one of this subscription's topics.
    ///
    /// Returns `None` once the connection is closed.
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        if !self.fanout.is_open() {
            return None;
        }
        // Closing drops every sender, which ends a pending wait
        self.rx.recv().await
    }
}
