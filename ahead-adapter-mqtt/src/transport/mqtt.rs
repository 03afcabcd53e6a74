//! MQTT broker connection
//!
//! Wraps a `rumqttc` client and drives its event loop on a background task:
//! - connectivity follows CONNACK and connection errors
//! - reconnects with exponential backoff
//! - re-issues every active subscription on each fresh CONNACK
//! - commands are never queued while offline; publish fails fast instead
//!
//! The offline check only covers requests made while the connection is known
//! to be down. A publish accepted just before the link drops may already sit
//! in rumqttc's outgoing or in-flight state, and rumqttc retransmits those
//! after reconnecting. For commands sent at the strongest level, no replay is
//! therefore best effort over MQTT.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{DeliveryLevel, Fanout, InboundMessage, Subscription, Transport, TransportError};
use crate::config::{BrokerConfig, ClientConfig};

/// rumqttc rejects keep-alive intervals below this
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

fn qos(level: DeliveryLevel) -> QoS {
    match level {
        DeliveryLevel::AtMostOnce => QoS::AtMostOnce,
        DeliveryLevel::AtLeastOnce => QoS::AtLeastOnce,
        DeliveryLevel::ExactlyOnce => QoS::ExactlyOnce,
    }
}

struct Shared {
    fanout: Arc<Fanout>,
    connected: watch::Sender<bool>,
    finished: watch::Sender<bool>,
    closing: AtomicBool,
    wake: Notify,
}

/// Connection to an MQTT broker
pub struct MqttConnection {
    client: AsyncClient,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl MqttConnection {
    /// Create the client and start its event loop.
    ///
    /// Must be called from within a Tokio runtime. Returns immediately; use
    /// [`MqttConnection::wait_connected`] to wait for the broker.
    pub fn connect(config: &ClientConfig) -> Self {
        let mut options =
            MqttOptions::new(&config.client_id, &config.broker.host, config.broker.port);
        options.set_keep_alive(config.broker.keep_alive.max(MIN_KEEP_ALIVE));

        let capacity = config.channel_capacity.max(1);
        let (client, eventloop) = AsyncClient::new(options, capacity);
        let (connected, _) = watch::channel(false);
        let (finished, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            fanout: Fanout::new(),
            connected,
            finished,
            closing: AtomicBool::new(false),
            wake: Notify::new(),
        });

        let task = tokio::spawn(drive(
            eventloop,
            client.clone(),
            Arc::clone(&shared),
            config.broker.clone(),
        ));

        Self {
            client,
            shared,
            task,
        }
    }

    /// Wait for the first successful CONNACK
    pub async fn wait_connected(&self, timeout: Duration) -> Result<(), TransportError> {
        let mut connected = self.shared.connected.subscribe();
        let result = tokio::time::timeout(timeout, connected.wait_for(|up| *up))
            .await
            .map(|r| r.map(|_| ()));
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::ConnectTimeout),
        }
    }

    /// Wait for the event loop to stop after [`Transport::disconnect`].
    ///
    /// Requests queued before the disconnect are flushed first. Returns
    /// `false` if the loop was still running when `timeout` elapsed.
    pub async fn wait_closed(&self, timeout: Duration) -> bool {
        let mut finished = self.shared.finished.subscribe();
        let result = tokio::time::timeout(timeout, finished.wait_for(|done| *done))
            .await
            .map(|r| r.map(|_| ()));
        matches!(result, Ok(Ok(())))
    }

    fn is_closing(&self) -> bool {
        self.shared.closing.load(Ordering::SeqCst)
    }
}

impl Transport for MqttConnection {
    fn is_connected(&self) -> bool {
        *self.shared.connected.borrow() && !self.is_closing()
    }

    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        level: DeliveryLevel,
    ) -> Result<(), TransportError> {
        if self.is_closing() {
            return Err(TransportError::Closed);
        }
        // rumqttc would hold the request until reconnect; refuse instead
        if !*self.shared.connected.borrow() {
            return Err(TransportError::NotConnected);
        }

        self.client
            .try_publish(topic, qos(level), false, payload)
            .map_err(|e| TransportError::Client(e.to_string()))
    }

    fn subscribe(
        &self,
        topics: &[String],
        level: DeliveryLevel,
    ) -> Result<Subscription, TransportError> {
        if self.is_closing() {
            return Err(TransportError::Closed);
        }

        let subscription = self.shared.fanout.subscribe(topics, level)?;

        // Offline subscriptions go out with the next CONNACK
        if *self.shared.connected.borrow() {
            for topic in topics {
                self.client
                    .try_subscribe(topic.as_str(), qos(level))
                    .map_err(|e| TransportError::Client(e.to_string()))?;
            }
        }

        Ok(subscription)
    }

    fn unsubscribe(&self, topics: &[String]) -> Result<(), TransportError> {
        if self.is_closing() {
            return Err(TransportError::Closed);
        }

        let released = self.shared.fanout.unsubscribe(topics);

        if *self.shared.connected.borrow() {
            for topic in &released {
                self.client
                    .try_unsubscribe(topic.as_str())
                    .map_err(|e| TransportError::Client(e.to_string()))?;
            }
        }
        Ok(())
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        if self.shared.closing.swap(true, Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let was_connected = self.shared.connected.send_replace(false);
        self.shared.fanout.close();

        // A live session gets a clean DISCONNECT; otherwise stop the loop now
        if !(was_connected && self.client.try_disconnect().is_ok()) {
            self.shared.wake.notify_one();
        }

        info!("Disconnecting from broker");
        Ok(())
    }
}

impl Drop for MqttConnection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Event loop: connection tracking, inbound fan-out and reconnect backoff
async fn drive(
    mut eventloop: EventLoop,
    client: AsyncClient,
    shared: Arc<Shared>,
    broker: BrokerConfig,
) {
    let mut reconnect_delay = broker.reconnect_delay;

    info!("Connecting to broker: {}:{}", broker.host, broker.port);

    loop {
        let event = tokio::select! {
            _ = shared.wake.notified() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Connected to broker {}:{}", broker.host, broker.port);
                reconnect_delay = broker.reconnect_delay;
                shared.connected.send_replace(true);

                for (topic, level) in shared.fanout.active_topics() {
                    debug!(topic = %topic, "Subscribing");
                    if let Err(e) = client.try_subscribe(topic.as_str(), qos(level)) {
                        warn!(topic = %topic, "Failed to subscribe: {}", e);
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!(topic = %publish.topic, bytes = publish.payload.len(), "Received");
                shared.fanout.deliver(InboundMessage {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                });
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("DISCONNECT sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if shared.closing.load(Ordering::SeqCst) {
                    break;
                }

                if shared.connected.send_replace(false) {
                    warn!("Broker connection lost: {}", e);
                } else {
                    error!("Connection error: {}", e);
                }

                // Exponential backoff
                info!("Reconnecting in {:?}", reconnect_delay);
                tokio::select! {
                    _ = shared.wake.notified() => break,
                    _ = tokio::time::sleep(reconnect_delay) => {}
                }
                reconnect_delay = std::cmp::min(reconnect_delay * 2, broker.max_reconnect_delay);
            }
        }
    }

    shared.connected.send_replace(false);
    shared.fanout.close();
    shared.finished.send_replace(true);
    info!("Broker connection closed");
}
