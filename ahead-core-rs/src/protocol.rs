//! Charging Ahead wire protocol
//!
//! Every message is a single flat JSON object (or, for dashboard snapshots,
//! possibly an array):
//! - Commands: `{"command": "<tag>", ...payload fields}` (client -> controller)
//! - Replies: `{"command": "<tag>", ...}` on the command-output channel
//! - Dashboard snapshots: one station object or an array of them, with no tag
//!
//! Decoding only fails on malformed payloads. A well-formed message with an
//! unknown `command` decodes to [`Decoded::Unrecognized`], which callers drop.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::*;

/// Name of the discriminator field in every tagged message
pub const COMMAND_TAG: &str = "command";

/// Errors decoding an inbound payload
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Syntax(#[source] serde_json::Error),

    #[error("payload does not match the {envelope} envelope: {source}")]
    Shape {
        envelope: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("discriminator must be a string, got {0}")]
    InvalidDiscriminator(&'static str),

    #[error("unexpected top-level JSON {0}")]
    UnexpectedRoot(&'static str),
}

/// Result of a successful decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<T> {
    /// A message this client understands
    Known(T),
    /// Well-formed, but the discriminator names nothing we handle
    Unrecognized { command: String },
}

impl<T> Decoded<T> {
    /// The known value, if any
    pub fn known(self) -> Option<T> {
        match self {
            Decoded::Known(value) => Some(value),
            Decoded::Unrecognized { .. } => None,
        }
    }
}

// ============================================================================
// Commands (client -> controller)
// ============================================================================

/// Intent published on the command-input channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Ask for a charger at a station, queueing if none is free
    RegisterToQueue {
        #[serde(deserialize_with = "crate::types::deserialize_id")]
        station_id: StationId,
        #[serde(deserialize_with = "crate::types::deserialize_id")]
        car_id: CarId,
    },

    /// Search stations by free text
    StatusAvailableCharger { search_string: String },

    /// Leave a station queue
    UnregisterFromQueue {
        #[serde(deserialize_with = "crate::types::deserialize_id")]
        station_id: StationId,
        #[serde(deserialize_with = "crate::types::deserialize_id")]
        car_id: CarId,
    },

    /// A car was plugged into its assigned charger
    ChargerConnected {
        #[serde(deserialize_with = "crate::types::deserialize_id")]
        station_id: StationId,
        #[serde(deserialize_with = "crate::types::deserialize_id")]
        charger_id: ChargerId,
    },

    /// A car was unplugged
    ChargerDisconnected {
        #[serde(deserialize_with = "crate::types::deserialize_id")]
        station_id: StationId,
        #[serde(deserialize_with = "crate::types::deserialize_id")]
        charger_id: ChargerId,
    },

    /// A charger is free again (or came back from service)
    ChargerAvailable {
        #[serde(deserialize_with = "crate::types::deserialize_id")]
        station_id: StationId,
        #[serde(deserialize_with = "crate::types::deserialize_id")]
        charger_id: ChargerId,
    },

    /// A charger needs service
    OutOfOrder {
        #[serde(deserialize_with = "crate::types::deserialize_id")]
        station_id: StationId,
        #[serde(deserialize_with = "crate::types::deserialize_id")]
        charger_id: ChargerId,
    },
}

impl Command {
    /// Every discriminator value a command can carry
    pub const TAGS: &'static [&'static str] = &[
        "register_to_queue",
        "status_available_charger",
        "unregister_from_queue",
        "charger_connected",
        "charger_disconnected",
        "charger_available",
        "out_of_order",
    ];

    /// Discriminator value of this command
    pub fn tag(&self) -> &'static str {
        match self {
            Command::RegisterToQueue { .. } => "register_to_queue",
            Command::StatusAvailableCharger { .. } => "status_available_charger",
            Command::UnregisterFromQueue { .. } => "unregister_from_queue",
            Command::ChargerConnected { .. } => "charger_connected",
            Command::ChargerDisconnected { .. } => "charger_disconnected",
            Command::ChargerAvailable { .. } => "charger_available",
            Command::OutOfOrder { .. } => "out_of_order",
        }
    }

    pub fn register_to_queue(station_id: impl Into<StationId>, car_id: impl Into<CarId>) -> Self {
        Command::RegisterToQueue {
            station_id: station_id.into(),
            car_id: car_id.into(),
        }
    }

    pub fn status_available_charger(search_string: impl Into<String>) -> Self {
        Command::StatusAvailableCharger {
            search_string: search_string.into(),
        }
    }

    pub fn unregister_from_queue(station_id: impl Into<StationId>, car_id: impl Into<CarId>) -> Self {
        Command::UnregisterFromQueue {
            station_id: station_id.into(),
            car_id: car_id.into(),
        }
    }

    /// Serialize to the flat wire envelope
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode a command envelope
    pub fn decode(bytes: &[u8]) -> Result<Decoded<Command>, DecodeError> {
        let value: Value = serde_json::from_slice(bytes).map_err(DecodeError::Syntax)?;

        let tag = match &value {
            Value::Object(map) => match map.get(COMMAND_TAG) {
                Some(Value::String(tag)) => tag.clone(),
                Some(other) => return Err(DecodeError::InvalidDiscriminator(json_kind(other))),
                None => {
                    return Err(DecodeError::Shape {
                        envelope: "command",
                        source: serde::de::Error::missing_field(COMMAND_TAG),
                    })
                }
            },
            other => return Err(DecodeError::UnexpectedRoot(json_kind(other))),
        };

        if !Self::TAGS.contains(&tag.as_str()) {
            return Ok(Decoded::Unrecognized { command: tag });
        }

        serde_json::from_value(value)
            .map(Decoded::Known)
            .map_err(|source| DecodeError::Shape {
                envelope: "command",
                source,
            })
    }
}

// ============================================================================
// Events (controller -> clients)
// ============================================================================

/// Search result on the command-output channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableChargers {
    #[serde(default)]
    pub stations: Vec<StationSummary>,

    /// Free-text status the controller sends instead of a station list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Queue progress for a single car
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueNotice {
    /// A charger was assigned to the car
    ChargerAssigned {
        car_id: CarId,
        charger_id: ChargerId,
        /// Remaining queue of the station, when the controller includes it
        queue: Option<Vec<CarId>>,
    },
    /// No charger was free; the car is waiting at `position` (1-based)
    RegisteredInQueue { car_id: CarId, position: u32 },
}

impl QueueNotice {
    pub fn car_id(&self) -> &str {
        match self {
            QueueNotice::ChargerAssigned { car_id, .. } => car_id,
            QueueNotice::RegisteredInQueue { car_id, .. } => car_id,
        }
    }
}

/// Decoded inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Console search results
    AvailableChargers(AvailableChargers),
    /// Queue progress notice
    Queue(QueueNotice),
    /// Station details for the dashboard, always normalized to a list
    DashboardSnapshot(Vec<StationDetail>),
}

/// Tagged replies as they appear on the wire
#[derive(Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum Reply {
    AvailableChargers(AvailableChargers),
    ChargerAssigned {
        #[serde(deserialize_with = "crate::types::deserialize_id")]
        car_id: CarId,
        #[serde(deserialize_with = "crate::types::deserialize_id")]
        charger_id: ChargerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        queue: Option<Vec<CarId>>,
    },
    RegisteredInQueue {
        #[serde(deserialize_with = "crate::types::deserialize_id")]
        car_id: CarId,
        position: u32,
    },
}

impl Reply {
    const TAGS: &'static [&'static str] =
        &["available_chargers", "charger_assigned", "registered_in_queue"];
}

impl From<Reply> for Event {
    fn from(reply: Reply) -> Self {
        match reply {
            Reply::AvailableChargers(result) => Event::AvailableChargers(result),
            Reply::ChargerAssigned {
                car_id,
                charger_id,
                queue,
            } => Event::Queue(QueueNotice::ChargerAssigned {
                car_id,
                charger_id,
                queue,
            }),
            Reply::RegisteredInQueue { car_id, position } => {
                Event::Queue(QueueNotice::RegisteredInQueue { car_id, position })
            }
        }
    }
}

impl Event {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Event::AvailableChargers(_) => "available_chargers",
            Event::Queue(QueueNotice::ChargerAssigned { .. }) => "charger_assigned",
            Event::Queue(QueueNotice::RegisteredInQueue { .. }) => "registered_in_queue",
            Event::DashboardSnapshot(_) => "dashboard_snapshot",
        }
    }

    /// Decode an inbound payload.
    ///
    /// Tagged objects are replies; untagged objects and arrays are dashboard
    /// snapshots. Both snapshot forms are accepted and normalized to a list.
    pub fn decode(bytes: &[u8]) -> Result<Decoded<Event>, DecodeError> {
        let value: Value = serde_json::from_slice(bytes).map_err(DecodeError::Syntax)?;

        match value {
            Value::Array(_) => decode_snapshot(value),
            Value::Object(map) => {
                let tag = match map.get(COMMAND_TAG) {
                    None => None,
                    Some(Value::String(tag)) => Some(tag.clone()),
                    Some(other) => {
                        return Err(DecodeError::InvalidDiscriminator(json_kind(other)))
                    }
                };

                match tag {
                    None => decode_snapshot(Value::Object(map)),
                    Some(tag) if !Reply::TAGS.contains(&tag.as_str()) => {
                        Ok(Decoded::Unrecognized { command: tag })
                    }
                    Some(_) => serde_json::from_value::<Reply>(Value::Object(map))
                        .map(|reply| Decoded::Known(reply.into()))
                        .map_err(|source| DecodeError::Shape {
                            envelope: "reply",
                            source,
                        }),
                }
            }
            other => Err(DecodeError::UnexpectedRoot(json_kind(&other))),
        }
    }

    /// Serialize to the wire format. Snapshots are always written as arrays.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Event::DashboardSnapshot(stations) => serde_json::to_vec(stations),
            Event::AvailableChargers(result) => {
                serde_json::to_vec(&Reply::AvailableChargers(result.clone()))
            }
            Event::Queue(QueueNotice::ChargerAssigned {
                car_id,
                charger_id,
                queue,
            }) => serde_json::to_vec(&Reply::ChargerAssigned {
                car_id: car_id.clone(),
                charger_id: charger_id.clone(),
                queue: queue.clone(),
            }),
            Event::Queue(QueueNotice::RegisteredInQueue { car_id, position }) => {
                serde_json::to_vec(&Reply::RegisteredInQueue {
                    car_id: car_id.clone(),
                    position: *position,
                })
            }
        }
    }
}

fn decode_snapshot(value: Value) -> Result<Decoded<Event>, DecodeError> {
    let stations = match value {
        Value::Array(_) => serde_json::from_value::<Vec<StationDetail>>(value),
        single => serde_json::from_value::<StationDetail>(single).map(|station| vec![station]),
    }
    .map_err(|source| DecodeError::Shape {
        envelope: "dashboard snapshot",
        source,
    })?;

    Ok(Decoded::Known(Event::DashboardSnapshot(stations)))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
