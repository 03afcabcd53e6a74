//! Intent builders
//!
//! Turns user actions into commands on the [`CommandPublisher`].
//!
//! Searches go out on every call by default. With a minimum interval set, a
//! call inside the interval is held and only the most recent held text is
//! sent when the interval ends, so the final keystroke always goes out.

use std::sync::Arc;
use std::time::Duration;

use ahead_core::{AlphanumericTickets, CarId, ChargerId, Command, StationId, TicketGenerator};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::ClientConfig;
use crate::publisher::CommandPublisher;

#[derive(Default)]
struct ThrottleState {
    last_dispatch: Option<Instant>,
    pending: Option<String>,
    flush_scheduled: bool,
}

struct SearchThrottle {
    min_interval: Duration,
    state: Mutex<ThrottleState>,
}

/// Client-side command construction
pub struct Intents {
    publisher: Arc<CommandPublisher>,
    tickets: Arc<dyn TicketGenerator>,
    throttle: Option<Arc<SearchThrottle>>,
}

impl Intents {
    /// Random alphanumeric tickets, no search throttle
    pub fn new(publisher: Arc<CommandPublisher>) -> Self {
        Self {
            publisher,
            tickets: Arc::new(AlphanumericTickets::new()),
            throttle: None,
        }
    }

    pub fn from_config(publisher: Arc<CommandPublisher>, config: &ClientConfig) -> Self {
        Self::new(publisher).with_search_min_interval(config.search_min_interval)
    }

    /// Swap the car-id source
    pub fn with_tickets(mut self, tickets: Arc<dyn TicketGenerator>) -> Self {
        self.tickets = tickets;
        self
    }

    /// Set or clear the search throttle
    pub fn with_search_min_interval(mut self, interval: Option<Duration>) -> Self {
        self.throttle = interval.map(|min_interval| {
            Arc::new(SearchThrottle {
                min_interval,
                state: Mutex::new(ThrottleState::default()),
            })
        });
        self
    }

    pub fn publisher(&self) -> &Arc<CommandPublisher> {
        &self.publisher
    }

    /// Join the queue at a station. Returns the car id used as the ticket.
    pub fn register_to_queue(&self, station_id: impl Into<StationId>) -> CarId {
        let car_id = self.tickets.next_ticket();
        self.publisher
            .publish(&Command::register_to_queue(station_id, car_id.clone()));
        car_id
    }

    /// Leave a station queue
    pub fn unregister_from_queue(&self, station_id: impl Into<StationId>, car_id: impl Into<CarId>) {
        self.publisher
            .publish(&Command::unregister_from_queue(station_id, car_id));
    }

    /// Search stations.
    ///
    /// With a throttle configured this must be called from within a Tokio
    /// runtime, since held text is flushed by a spawned timer.
    pub fn status_available_charger(&self, search_string: impl Into<String>) {
        let search_string = search_string.into();

        let throttle = match &self.throttle {
            Some(throttle) => throttle,
            None => {
                self.publisher
                    .publish(&Command::status_available_charger(search_string));
                return;
            }
        };

        let now = Instant::now();
        let mut state = throttle.state.lock();

        let due = match state.last_dispatch {
            None => true,
            Some(last) => now.duration_since(last) >= throttle.min_interval,
        };

        if due && !state.flush_scheduled {
            state.last_dispatch = Some(now);
            drop(state);
            self.publisher
                .publish(&Command::status_available_charger(search_string));
            return;
        }

        state.pending = Some(search_string);
        if state.flush_scheduled {
            return;
        }
        state.flush_scheduled = true;

        let wait = state
            .last_dispatch
            .map(|last| (last + throttle.min_interval).saturating_duration_since(now))
            .unwrap_or_default();
        drop(state);

        debug!(?wait, "Search held");
        let throttle = Arc::clone(throttle);
        let publisher = Arc::clone(&self.publisher);
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let text = {
                let mut state = throttle.state.lock();
                state.flush_scheduled = false;
                state.last_dispatch = Some(Instant::now());
                state.pending.take()
            };
            if let Some(text) = text {
                publisher.publish(&Command::status_available_charger(text));
            }
        });
    }

    /// A car was plugged into its charger
    pub fn charger_connected(&self, station_id: impl Into<StationId>, charger_id: impl Into<ChargerId>) {
        self.publisher.publish(&Command::ChargerConnected {
            station_id: station_id.into(),
            charger_id: charger_id.into(),
        });
    }

    /// A car was unplugged
    pub fn charger_disconnected(
        &self,
        station_id: impl Into<StationId>,
        charger_id: impl Into<ChargerId>,
    ) {
        self.publisher.publish(&Command::ChargerDisconnected {
            station_id: station_id.into(),
            charger_id: charger_id.into(),
        });
    }

    /// A charger is free again
    pub fn charger_available(&self, station_id: impl Into<StationId>, charger_id: impl Into<ChargerId>) {
        self.publisher.publish(&Command::ChargerAvailable {
            station_id: station_id.into(),
            charger_id: charger_id.into(),
        });
    }

    /// A charger needs service
    pub fn out_of_order(&self, station_id: impl Into<StationId>, charger_id: impl Into<ChargerId>) {
        self.publisher.publish(&Command::OutOfOrder {
            station_id: station_id.into(),
            charger_id: charger_id.into(),
        });
    }
}
