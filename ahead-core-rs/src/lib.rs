//! Charging Ahead Core Library
//!
//! Client-side protocol core for keeping fleet displays consistent with a
//! charging-station controller over a publish/subscribe bus.
//!
//! - `types`: station and charger records as they travel on the wire
//! - `classify`: user-facing charger status from the three charger flags
//! - `protocol`: command encoding and event decoding
//! - `registry`: reconciliation of dashboard snapshots into local state
//! - `ticket`: car-id generation and tracking of this client's queue tickets

pub mod types;
pub mod classify;
pub mod protocol;
pub mod registry;
pub mod ticket;

pub use types::*;
pub use classify::{classify, ChargerStatus, Classification};
pub use protocol::{
    AvailableChargers, Command, Decoded, DecodeError, Event, QueueNotice,
};
pub use registry::{ApplyReport, RegistrySnapshot, StationRegistry};
pub use ticket::{
    AlphanumericTickets, Ticket, TicketBook, TicketGenerator, TicketState, UuidTickets,
};
