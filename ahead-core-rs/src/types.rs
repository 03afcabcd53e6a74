//! Core types for the Charging Ahead protocol
//!
//! Station and charger records exactly as the controller publishes them.
//! The controller is loose about identifier types (it emits both `1` and
//! `"1"`), so every identifier is normalized to a string on the way in.

use serde::{Deserialize, Deserializer, Serialize};

/// Identifier of a charging station
pub type StationId = String;

/// Identifier of a charger within a station
pub type ChargerId = String;

/// Car identifier, also used as the queue ticket
pub type CarId = String;

/// One chargeable port at a station.
///
/// The three flags are independent; no combination is rejected here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charger {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: ChargerId,

    /// Car occupying the charger. Only meaningful while `assigned` or
    /// `charging` is set, see [`Charger::active_car_id`].
    #[serde(
        rename = "carId",
        alias = "car_id",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_id"
    )]
    pub car_id: Option<CarId>,

    pub operational: bool,
    pub charging: bool,
    pub assigned: bool,
}

impl Charger {
    /// A free, operational charger
    pub fn new(id: impl Into<ChargerId>) -> Self {
        Self {
            id: id.into(),
            car_id: None,
            operational: true,
            charging: false,
            assigned: false,
        }
    }

    /// Car id, ignoring stale values left on an idle charger
    pub fn active_car_id(&self) -> Option<&str> {
        if self.assigned || self.charging {
            self.car_id.as_deref()
        } else {
            None
        }
    }

    pub fn with_car(mut self, car_id: impl Into<CarId>) -> Self {
        self.car_id = Some(car_id.into());
        self
    }

    pub fn assigned(mut self, assigned: bool) -> Self {
        self.assigned = assigned;
        self
    }

    pub fn charging(mut self, charging: bool) -> Self {
        self.charging = charging;
        self
    }

    pub fn operational(mut self, operational: bool) -> Self {
        self.operational = operational;
        self
    }
}

/// Full station record carried by dashboard snapshots.
///
/// `available_chargers` and `unavailable_chargers` are computed by the
/// controller and are not guaranteed to agree with `chargers.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationDetail {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: StationId,

    #[serde(rename = "stationName", alias = "name", default)]
    pub name: String,

    #[serde(default)]
    pub available_chargers: u32,

    #[serde(default)]
    pub unavailable_chargers: u32,

    /// Waiting cars, front first
    #[serde(default, deserialize_with = "deserialize_id_list")]
    pub queue: Vec<CarId>,

    #[serde(default)]
    pub chargers: Vec<Charger>,
}

impl StationDetail {
    pub fn new(id: impl Into<StationId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            available_chargers: 0,
            unavailable_chargers: 0,
            queue: Vec::new(),
            chargers: Vec::new(),
        }
    }

    pub fn with_counts(mut self, available: u32, unavailable: u32) -> Self {
        self.available_chargers = available;
        self.unavailable_chargers = unavailable;
        self
    }

    pub fn with_charger(mut self, charger: Charger) -> Self {
        self.chargers.push(charger);
        self
    }

    pub fn with_queue<I, S>(mut self, queue: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CarId>,
    {
        self.queue = queue.into_iter().map(Into::into).collect();
        self
    }

    /// Find a charger by id
    pub fn charger(&self, id: &str) -> Option<&Charger> {
        self.chargers.iter().find(|c| c.id == id)
    }

    /// Car at the front of the queue
    pub fn next_in_queue(&self) -> Option<&str> {
        self.queue.first().map(String::as_str)
    }
}

/// Reduced station projection returned for console searches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationSummary {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: StationId,

    #[serde(alias = "stationName", default)]
    pub name: String,

    #[serde(default)]
    pub available_chargers: u32,

    #[serde(default, deserialize_with = "deserialize_id_list")]
    pub queue: Vec<CarId>,
}

impl StationSummary {
    pub fn new(id: impl Into<StationId>, name: impl Into<String>, available_chargers: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            available_chargers,
            queue: Vec::new(),
        }
    }
}

impl From<&StationDetail> for StationSummary {
    fn from(detail: &StationDetail) -> Self {
        Self {
            id: detail.id.clone(),
            name: detail.name.clone(),
            available_chargers: detail.available_chargers,
            queue: detail.queue.clone(),
        }
    }
}

// ============================================================================
// Identifier normalization
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s,
            RawId::Signed(n) => n.to_string(),
            RawId::Unsigned(n) => n.to_string(),
        }
    }
}

pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(String::from)
}

pub(crate) fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawId>::deserialize(deserializer)?.map(String::from))
}

pub(crate) fn deserialize_id_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Vec::<RawId>::deserialize(deserializer)?
        .into_iter()
        .map(String::from)
        .collect())
}
