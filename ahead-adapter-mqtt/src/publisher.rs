//! Command publisher
//!
//! Fire-and-forget: `publish` never waits and never reports failure to the
//! caller. A command issued while the connection is down is dropped, logged
//! and counted. There is no retry and no outbound buffer, so a command
//! dropped here never reaches the controller later.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahead_core::Command;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::transport::{DeliveryLevel, Transport};

/// Publishes commands on the command-input channel
pub struct CommandPublisher {
    transport: Arc<dyn Transport>,
    topic: String,
    level: DeliveryLevel,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl CommandPublisher {
    /// Publisher at the strongest delivery level
    pub fn new(transport: Arc<dyn Transport>, topic: impl Into<String>) -> Self {
        Self {
            transport,
            topic: topic.into(),
            level: DeliveryLevel::strongest(),
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn from_config(transport: Arc<dyn Transport>, config: &ClientConfig) -> Self {
        Self::new(transport, config.topics.command_input.clone()).with_level(config.command_level)
    }

    pub fn with_level(mut self, level: DeliveryLevel) -> Self {
        self.level = level;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Hand a command to the transport
    pub fn publish(&self, command: &Command) {
        if !self.transport.is_connected() {
            warn!(command = command.tag(), "Not connected; command dropped");
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let payload = match command.to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(command = command.tag(), "Failed to encode command: {}", e);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        match self.transport.publish(&self.topic, payload, self.level) {
            Ok(()) => {
                debug!(command = command.tag(), topic = %self.topic, "Command published");
                self.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(command = command.tag(), "Command dropped: {}", e);
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Commands handed to the transport so far
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Commands dropped so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalBroker;

    #[tokio::test]
    async fn test_publish_uses_command_input() {
        let broker = LocalBroker::default();
        let controller = broker.connect();
        let mut inbox = controller
            .subscribe(&["in".to_string()], DeliveryLevel::AtMostOnce)
            .unwrap();

        let publisher = CommandPublisher::new(Arc::new(broker.connect()), "in");
        publisher.publish(&Command::status_available_charger("north"));

        let message = inbox.recv().await.unwrap();
        assert_eq!(
            Command::decode(&message.payload).unwrap().known(),
            Some(Command::status_available_charger("north"))
        );
        assert_eq!(publisher.sent(), 1);
        assert_eq!(publisher.dropped(), 0);
    }

    #[test]
    fn test_offline_publish_is_counted() {
        let broker = LocalBroker::default();
        let publisher = CommandPublisher::new(Arc::new(broker.connect_offline()), "in");

        publisher.publish(&Command::register_to_queue("1", "AAAAAAAAAA"));
        publisher.publish(&Command::register_to_queue("1", "BBBBBBBBBB"));

        assert_eq!(publisher.dropped(), 2);
        assert_eq!(publisher.sent(), 0);
    }

    #[test]
    fn test_default_level_is_strongest() {
        let broker = LocalBroker::default();
        let config = ClientConfig::default();
        let publisher = CommandPublisher::from_config(Arc::new(broker.connect()), &config);
        assert_eq!(publisher.level, DeliveryLevel::ExactlyOnce);
        assert_eq!(publisher.topic(), "charging_ahead/queue/server_input");
    }
}
