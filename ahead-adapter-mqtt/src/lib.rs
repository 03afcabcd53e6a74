//! # Charging Ahead MQTT Adapter
//!
//! Connects Charging Ahead clients (per-car consoles, fleet dashboards) to the
//! station controller over an MQTT broker.
//!
//! ## Architecture
//!
//! ```text
//!   console / dashboard
//!     │ intents            ▲ snapshots, search results, queue notices
//!     ▼                    │
//! ┌──────────────────────────────────────┐
//! │          ahead-adapter-mqtt          │
//! │  ┌─────────┐ ┌───────────┐ ┌───────┐ │
//! │  │ Intents │►│ Publisher │ │ State │ │
//! │  └─────────┘ └─────┬─────┘ │ Subsc.│ │
//! │                    │       └───▲───┘ │
//! │              ┌─────▼───────────┴──┐  │
//! │              │  Transport (MQTT)  │  │
//! │              └─────────┬──────────┘  │
//! └────────────────────────┼─────────────┘
//!                          │ server_input / server_output / dashboard/update
//!                          ▼
//!                     MQTT broker ◄──► controller
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use ahead_adapter_mqtt::{ClientConfig, CommandPublisher, Intents, MqttConnection, StateSubscriber, Transport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("broker.hivemq.com", 1883);
//!
//!     let mqtt = MqttConnection::connect(&config);
//!     mqtt.wait_connected(config.broker.connect_timeout).await?;
//!     let connection: Arc<dyn Transport> = Arc::new(mqtt);
//!
//!     let subscriber = StateSubscriber::start(Arc::clone(&connection), &config)?;
//!     let publisher = Arc::new(CommandPublisher::from_config(connection, &config));
//!     let intents = Intents::from_config(publisher, &config);
//!
//!     let car_id = intents.register_to_queue("1");
//!     println!("Queued as {}", car_id);
//!
//!     subscriber.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod intents;
pub mod publisher;
pub mod subscriber;
pub mod transport;

pub use config::{BrokerConfig, ClientConfig, Topics};
pub use intents::Intents;
pub use publisher::CommandPublisher;
pub use subscriber::StateSubscriber;
pub use transport::{
    DeliveryLevel, InboundMessage, LocalBroker, LocalConnection, MqttConnection, Subscription,
    Transport, TransportError,
};
