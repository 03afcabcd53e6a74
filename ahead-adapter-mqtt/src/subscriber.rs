//! State subscriber
//!
//! Listens on the command-output and dashboard-update channels, decodes each
//! message and routes it:
//! - `available_chargers` -> latest search result (registry untouched)
//! - `charger_assigned` / `registered_in_queue` -> queue notice broadcast
//! - dashboard snapshot -> registry reconciliation, then a new snapshot
//!
//! Malformed and unrecognized messages are dropped; the dispatch loop never
//! ends because of one message.
//!
//! Teardown and dispatch share one lock. A message racing teardown is either
//! fully applied before it or discarded.

use std::sync::Arc;

use ahead_core::{
    AvailableChargers, Decoded, Event, QueueNotice, RegistrySnapshot, StationRegistry,
};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::transport::{InboundMessage, Subscription, Transport, TransportError};

struct DispatchState {
    registry: StationRegistry,
    active: bool,
}

struct Shared {
    state: Mutex<DispatchState>,
    snapshots: watch::Sender<RegistrySnapshot>,
    search_results: watch::Sender<Option<AvailableChargers>>,
    notices: broadcast::Sender<QueueNotice>,
}

impl Shared {
    fn dispatch(&self, message: &InboundMessage) {
        let event = match Event::decode(&message.payload) {
            Ok(Decoded::Known(event)) => event,
            Ok(Decoded::Unrecognized { command }) => {
                debug!(topic = %message.topic, command = %command, "Ignoring unrecognized command");
                return;
            }
            Err(e) => {
                warn!(topic = %message.topic, "Dropping malformed message: {}", e);
                return;
            }
        };

        let mut state = self.state.lock();
        if !state.active {
            debug!(kind = event.kind(), "Subscriber stopped; message discarded");
            return;
        }

        match event {
            Event::AvailableChargers(result) => {
                debug!(stations = result.stations.len(), "Search results received");
                self.search_results.send_replace(Some(result));
            }
            Event::Queue(notice) => {
                debug!(car_id = notice.car_id(), "Queue notice received");
                // No readers is fine
                let _ = self.notices.send(notice);
            }
            Event::DashboardSnapshot(stations) => {
                let report = state.registry.apply_update(stations);
                if report.changed() {
                    self.snapshots.send_replace(state.registry.snapshot());
                }
            }
        }
    }
}

/// Subscribes to station state and keeps the local registry current
pub struct StateSubscriber {
    transport: Arc<dyn Transport>,
    topics: Vec<String>,
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl StateSubscriber {
    /// Subscribe and start dispatching.
    ///
    /// Must be called from within a Tokio runtime. The subscriber owns the
    /// connection's lifetime: teardown unsubscribes and disconnects it.
    pub fn start(
        transport: Arc<dyn Transport>,
        config: &ClientConfig,
    ) -> Result<Self, TransportError> {
        let topics = config.topics.inbound();
        let subscription = transport.subscribe(&topics, config.subscribe_level)?;

        let (snapshots, _) = watch::channel(RegistrySnapshot::default());
        let (search_results, _) = watch::channel(None);
        let (notices, _) = broadcast::channel(config.channel_capacity.max(1));

        let shared = Arc::new(Shared {
            state: Mutex::new(DispatchState {
                registry: StationRegistry::new(),
                active: true,
            }),
            snapshots,
            search_results,
            notices,
        });

        let task = tokio::spawn(run(subscription, Arc::clone(&shared)));
        info!(topics = ?topics, "State subscriber started");

        Ok(Self {
            transport,
            topics,
            shared,
            task: Some(task),
        })
    }

    /// Registry snapshots, updated after every change
    pub fn snapshots(&self) -> watch::Receiver<RegistrySnapshot> {
        self.shared.snapshots.subscribe()
    }

    /// Current registry snapshot
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.shared.snapshots.borrow().clone()
    }

    /// Latest console search result
    pub fn search_results(&self) -> watch::Receiver<Option<AvailableChargers>> {
        self.shared.search_results.subscribe()
    }

    /// Queue notices received from now on
    pub fn queue_notices(&self) -> broadcast::Receiver<QueueNotice> {
        self.shared.notices.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.shared.state.lock().active
    }

    /// Stop dispatching, release the subscription and the connection, and
    /// wait for the dispatch task to finish
    pub async fn shutdown(mut self) {
        let task = self.task.take();
        self.stop();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
    }

    /// Synchronous teardown. Idempotent.
    fn stop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            if !state.active {
                return;
            }
            state.active = false;
        }

        if let Some(task) = self.task.take() {
            task.abort();
        }

        if let Err(e) = self.transport.unsubscribe(&self.topics) {
            debug!("Unsubscribe during teardown failed: {}", e);
        }
        if let Err(e) = self.transport.disconnect() {
            debug!("Disconnect during teardown failed: {}", e);
        }

        info!("State subscriber stopped");
    }
}

impl Drop for StateSubscriber {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(mut subscription: Subscription, shared: Arc<Shared>) {
    while let Some(message) = subscription.recv().await {
        shared.dispatch(&message);
    }
    debug!("Subscription ended");
}
