//! In-process broker
//!
//! Every connection to a [`LocalBroker`] is registered with it, and a publish
//! is queued directly on each connection's subscriptions. A connection's
//! outbound path can be switched off with [`LocalConnection::set_connected`]
//! to simulate a client that has not reached the broker yet; inbound delivery
//! is unaffected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::debug;

use super::{DeliveryLevel, Fanout, InboundMessage, Subscription, Transport, TransportError};

/// In-process publish/subscribe bus
#[derive(Clone, Default)]
pub struct LocalBroker {
    connections: Arc<RwLock<Vec<Weak<Fanout>>>>,
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection with a live outbound path
    pub fn connect(&self) -> LocalConnection {
        let fanout = Fanout::new();
        {
            let mut connections = self.connections.write();
            connections.retain(|c| c.strong_count() > 0);
            connections.push(Arc::downgrade(&fanout));
        }

        LocalConnection {
            broker: self.clone(),
            fanout,
            connected: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        }
    }

    /// Open a connection whose outbound path starts offline
    pub fn connect_offline(&self) -> LocalConnection {
        let connection = self.connect();
        connection.set_connected(false);
        connection
    }

    fn route(&self, message: InboundMessage) {
        let targets: Vec<Arc<Fanout>> = self
            .connections
            .read()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();

        if targets.is_empty() {
            debug!(topic = %message.topic, "No connections on local bus");
        }
        for fanout in targets {
            fanout.deliver(message.clone());
        }
    }
}

/// One client's connection to a [`LocalBroker`]
pub struct LocalConnection {
    broker: LocalBroker,
    fanout: Arc<Fanout>,
    connected: AtomicBool,
    closed: AtomicBool,
}

impl LocalConnection {
    /// Switch the outbound path on or off
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl Transport for LocalConnection {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        _level: DeliveryLevel,
    ) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }

        self.broker.route(InboundMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    fn subscribe(
        &self,
        topics: &[String],
        level: DeliveryLevel,
    ) -> Result<Subscription, TransportError> {
        self.fanout.subscribe(topics, level)
    }

    fn unsubscribe(&self, topics: &[String]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.fanout.unsubscribe(topics);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.fanout.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_other_connection() {
        let broker = LocalBroker::default();
        let a = broker.connect();
        let b = broker.connect();

        let mut sub = b
            .subscribe(&["t".to_string()], DeliveryLevel::AtMostOnce)
            .unwrap();
        a.publish("t", b"hello".to_vec(), DeliveryLevel::ExactlyOnce)
            .unwrap();

        let message = sub.recv().await.unwrap();
        assert_eq!(message.payload, b"hello");
    }

    #[tokio::test]
    async fn test_offline_publish_rejected() {
        let broker = LocalBroker::default();
        let conn = broker.connect_offline();
        assert!(!conn.is_connected());
        assert_eq!(
            conn.publish("t", Vec::new(), DeliveryLevel::AtMostOnce),
            Err(TransportError::NotConnected)
        );

        conn.set_connected(true);
        assert!(conn.is_connected());
        assert!(conn.publish("t", Vec::new(), DeliveryLevel::AtMostOnce).is_ok());
    }

    #[tokio::test]
    async fn test_offline_connection_still_receives() {
        let broker = LocalBroker::default();
        let controller = broker.connect();
        let client = broker.connect_offline();

        let mut sub = client
            .subscribe(&["t".to_string()], DeliveryLevel::AtMostOnce)
            .unwrap();
        controller
            .publish("t", b"state".to_vec(), DeliveryLevel::AtMostOnce)
            .unwrap();

        assert_eq!(sub.recv().await.unwrap().payload, b"state");
    }

    #[tokio::test]
    async fn test_burst_is_delivered_in_order() {
        let broker = LocalBroker::new();
        let controller = broker.connect();
        let client = broker.connect();

        let mut sub = client
            .subscribe(&["t".to_string()], DeliveryLevel::AtMostOnce)
            .unwrap();
        for i in 0..600 {
            controller
                .publish("t", i.to_string().into_bytes(), DeliveryLevel::AtMostOnce)
                .unwrap();
        }

        for i in 0..600 {
            assert_eq!(sub.recv().await.unwrap().payload, i.to_string().into_bytes());
        }
    }

    #[tokio::test]
    async fn test_dropped_connection_leaves_bus() {
        let broker = LocalBroker::new();
        let controller = broker.connect();
        drop(broker.connect());

        let _live = broker.connect();
        assert_eq!(broker.connections.read().len(), 2);
        controller
            .publish("t", Vec::new(), DeliveryLevel::AtMostOnce)
            .unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_is_final() {
        let broker = LocalBroker::default();
        let conn = broker.connect();
        let mut sub = conn
            .subscribe(&["t".to_string()], DeliveryLevel::AtMostOnce)
            .unwrap();

        conn.disconnect().unwrap();
        assert!(!conn.is_connected());
        assert!(sub.recv().await.is_none());
        assert_eq!(conn.disconnect(), Err(TransportError::Closed));
        assert_eq!(
            conn.publish("t", Vec::new(), DeliveryLevel::AtMostOnce),
            Err(TransportError::Closed)
        );
    }
}
