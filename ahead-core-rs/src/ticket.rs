//! Car-id tickets
//!
//! A car id doubles as the queue ticket. It is generated on the client with
//! no uniqueness check against ids already in use; with 62^10 possible
//! values the collision risk is acceptable at small fleet scale only.
//! [`TicketGenerator`] lets a deployment switch to [`UuidTickets`] or a
//! server-assigned id without touching the callers.

use std::collections::HashMap;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;
use uuid::Uuid;

use crate::protocol::QueueNotice;
use crate::types::{CarId, ChargerId, StationId};

/// Characters a generated ticket is drawn from
pub const TICKET_ALPHABET: &[u8; 62] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Length of a generated ticket
pub const TICKET_LENGTH: usize = 10;

/// Source of car ids for queue registration
pub trait TicketGenerator: Send + Sync {
    fn next_ticket(&self) -> CarId;
}

/// Fixed-length tickets, each character drawn uniformly from
/// [`TICKET_ALPHABET`]
pub struct AlphanumericTickets {
    rng: Mutex<StdRng>,
}

impl AlphanumericTickets {
    /// Generator seeded from OS entropy
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic generator for tests and replays
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for AlphanumericTickets {
    fn default() -> Self {
        Self::new()
    }
}

impl TicketGenerator for AlphanumericTickets {
    fn next_ticket(&self) -> CarId {
        let mut rng = self.rng.lock();
        (0..TICKET_LENGTH)
            .map(|_| TICKET_ALPHABET[rng.gen_range(0..TICKET_ALPHABET.len())] as char)
            .collect()
    }
}

/// UUID v4 tickets (32 hex characters)
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidTickets;

impl TicketGenerator for UuidTickets {
    fn next_ticket(&self) -> CarId {
        Uuid::new_v4().simple().to_string()
    }
}

// ============================================================================
// Ticket book
// ============================================================================

/// Progress of one of our queue registrations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketState {
    /// Sent, no reply yet
    Pending,
    /// Waiting in line at `position` (1-based)
    Queued { position: u32 },
    /// A charger is reserved for the car
    Assigned { charger_id: ChargerId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub station_id: StationId,
    pub state: TicketState,
}

/// Tickets this client registered, keyed by car id.
///
/// Replies for car ids we did not register are ignored.
#[derive(Debug, Default)]
pub struct TicketBook {
    tickets: HashMap<CarId, Ticket>,
}

impl TicketBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a registration we just sent
    pub fn register(&mut self, car_id: impl Into<CarId>, station_id: impl Into<StationId>) {
        self.tickets.insert(
            car_id.into(),
            Ticket {
                station_id: station_id.into(),
                state: TicketState::Pending,
            },
        );
    }

    /// Forget a ticket after unregistering
    pub fn remove(&mut self, car_id: &str) -> Option<Ticket> {
        self.tickets.remove(car_id)
    }

    pub fn get(&self, car_id: &str) -> Option<&Ticket> {
        self.tickets.get(car_id)
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Apply a queue notice. Returns the new state if the notice was ours.
    pub fn apply(&mut self, notice: &QueueNotice) -> Option<&TicketState> {
        let ticket = match self.tickets.get_mut(notice.car_id()) {
            Some(ticket) => ticket,
            None => {
                debug!(car_id = notice.car_id(), "Ignoring notice for foreign car");
                return None;
            }
        };

        ticket.state = match notice {
            QueueNotice::ChargerAssigned { charger_id, .. } => TicketState::Assigned {
                charger_id: charger_id.clone(),
            },
            QueueNotice::RegisteredInQueue { position, .. } => {
                TicketState::Queued { position: *position }
            }
        };

        Some(&ticket.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_shape() {
        let tickets = AlphanumericTickets::with_seed(7);
        let ticket = tickets.next_ticket();
        assert_eq!(ticket.len(), TICKET_LENGTH);
        assert!(ticket.bytes().all(|b| TICKET_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_seeded_generators_repeat() {
        let a = AlphanumericTickets::with_seed(42);
        let b = AlphanumericTickets::with_seed(42);
        assert_eq!(a.next_ticket(), b.next_ticket());
    }

    #[test]
    fn test_uuid_tickets() {
        let ticket = UuidTickets.next_ticket();
        assert_eq!(ticket.len(), 32);
        assert!(ticket.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_ticket_book_lifecycle() {
        let mut book = TicketBook::new();
        book.register("car1", "1");
        assert_eq!(book.get("car1").unwrap().state, TicketState::Pending);

        let queued = QueueNotice::RegisteredInQueue {
            car_id: "car1".to_string(),
            position: 2,
        };
        assert_eq!(book.apply(&queued), Some(&TicketState::Queued { position: 2 }));

        let assigned = QueueNotice::ChargerAssigned {
            car_id: "car1".to_string(),
            charger_id: "0".to_string(),
            queue: None,
        };
        assert_eq!(
            book.apply(&assigned),
            Some(&TicketState::Assigned {
                charger_id: "0".to_string()
            })
        );

        assert!(book.remove("car1").is_some());
        assert!(book.is_empty());
    }

    #[test]
    fn test_ticket_book_ignores_foreign_cars() {
        let mut book = TicketBook::new();
        book.register("mine", "1");

        let notice = QueueNotice::RegisteredInQueue {
            car_id: "theirs".to_string(),
            position: 1,
        };
        assert!(book.apply(&notice).is_none());
        assert_eq!(book.get("mine").unwrap().state, TicketState::Pending);
    }
}
