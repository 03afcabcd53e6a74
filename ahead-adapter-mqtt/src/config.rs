//! Configuration for Charging Ahead clients
//!
//! Broker endpoint, topic names and delivery levels for one client.

use std::time::Duration;

use uuid::Uuid;

use crate::transport::DeliveryLevel;

/// Complete client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// MQTT client identifier, unique per connection
    pub client_id: String,

    pub broker: BrokerConfig,

    pub topics: Topics,

    /// Level used for outbound commands
    pub command_level: DeliveryLevel,

    /// Level requested for inbound subscriptions
    pub subscribe_level: DeliveryLevel,

    /// Minimum time between search dispatches (`None` sends every call)
    pub search_min_interval: Option<Duration>,

    /// Request queue of the MQTT client and the queue-notice channel
    pub channel_capacity: usize,
}

/// Broker connection settings
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,

    /// MQTT keep-alive
    pub keep_alive: Duration,

    /// Initial reconnect delay
    pub reconnect_delay: Duration,

    /// Maximum reconnect delay (exponential backoff cap)
    pub max_reconnect_delay: Duration,

    /// How long callers wait for the first CONNACK
    pub connect_timeout: Duration,
}

/// Logical channel names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// Commands, client to controller
    pub command_input: String,
    /// Replies, controller to consoles
    pub command_output: String,
    /// Station snapshots, controller to dashboards
    pub dashboard_update: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: format!("ahead-{}", Uuid::new_v4().simple()),
            broker: BrokerConfig::default(),
            topics: Topics::default(),
            command_level: DeliveryLevel::strongest(),
            subscribe_level: DeliveryLevel::AtMostOnce,
            search_min_interval: None,
            channel_capacity: 256,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "broker.hivemq.com".to_string(),
            port: 1883,
            keep_alive: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            command_input: "charging_ahead/queue/server_input".to_string(),
            command_output: "charging_ahead/queue/server_output".to_string(),
            dashboard_update: "charging_ahead/dashboard/update".to_string(),
        }
    }
}

impl Topics {
    /// Topics a state subscriber listens on
    pub fn inbound(&self) -> Vec<String> {
        vec![self.command_output.clone(), self.dashboard_update.clone()]
    }
}

impl ClientConfig {
    /// Create config for a broker endpoint
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            broker: BrokerConfig {
                host: host.into(),
                port,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Set client id
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Set keep-alive
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.broker.keep_alive = keep_alive;
        self
    }

    /// Set reconnect backoff bounds
    pub fn with_reconnect_delay(mut self, initial: Duration, max: Duration) -> Self {
        self.broker.reconnect_delay = initial;
        self.broker.max_reconnect_delay = max;
        self
    }

    /// Set connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.broker.connect_timeout = timeout;
        self
    }

    /// Replace all topic names
    pub fn with_topics(mut self, topics: Topics) -> Self {
        self.topics = topics;
        self
    }

    /// Set command delivery level
    pub fn with_command_level(mut self, level: DeliveryLevel) -> Self {
        self.command_level = level;
        self
    }

    /// Set subscription delivery level
    pub fn with_subscribe_level(mut self, level: DeliveryLevel) -> Self {
        self.subscribe_level = level;
        self
    }

    /// Throttle search dispatch
    pub fn with_search_min_interval(mut self, interval: Duration) -> Self {
        self.search_min_interval = Some(interval);
        self
    }

    /// Set fan-out channel capacity
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert!(config.client_id.starts_with("ahead-"));
        assert_eq!(config.broker.host, "broker.hivemq.com");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.command_level, DeliveryLevel::ExactlyOnce);
        assert_eq!(config.subscribe_level, DeliveryLevel::AtMostOnce);
        assert!(config.search_min_interval.is_none());
        assert_eq!(config.topics.command_input, "charging_ahead/queue/server_input");
    }

    #[test]
    fn test_client_ids_are_unique() {
        assert_ne!(ClientConfig::default().client_id, ClientConfig::default().client_id);
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new("localhost", 1884)
            .with_client_id("console-1")
            .with_reconnect_delay(Duration::from_millis(100), Duration::from_secs(5))
            .with_search_min_interval(Duration::from_millis(250))
            .with_channel_capacity(32);

        assert_eq!(config.client_id, "console-1");
        assert_eq!(config.broker.host, "localhost");
        assert_eq!(config.broker.port, 1884);
        assert_eq!(config.broker.max_reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.search_min_interval, Some(Duration::from_millis(250)));
        assert_eq!(config.channel_capacity, 32);
    }

    #[test]
    fn test_inbound_topics() {
        let topics = Topics::default();
        assert_eq!(
            topics.inbound(),
            vec![
                "charging_ahead/queue/server_output".to_string(),
                "charging_ahead/dashboard/update".to_string(),
            ]
        );
    }
}
