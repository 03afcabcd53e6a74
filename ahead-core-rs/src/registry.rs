//! Station registry reconciliation
//!
//! Holds the client's copy of station state and merges dashboard snapshots
//! into it:
//! - empty registry: the first batch becomes the registry, in order
//! - otherwise: stations whose id appears in the batch are replaced wholesale,
//!   all others are left untouched
//! - stations not already present are ignored
//!
//! The last rule means a station missing from the first snapshot never shows
//! up later. Controllers currently always open with a full snapshot.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::types::{StationDetail, StationId};

/// What a single `apply_update` did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Ids taken from the batch that populated an empty registry
    pub initialized: Vec<StationId>,
    /// Ids whose record was replaced
    pub replaced: Vec<StationId>,
    /// Ids in the batch that are not in the registry
    pub ignored: Vec<StationId>,
}

impl ApplyReport {
    /// Whether the registry changed
    pub fn changed(&self) -> bool {
        !self.initialized.is_empty() || !self.replaced.is_empty()
    }
}

/// Immutable view of the registry handed to readers.
///
/// Stations are shared with the registry; a station that an update did not
/// touch keeps the same allocation across snapshots.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    pub version: u64,
    pub updated_at: Option<DateTime<Utc>>,
    pub stations: Vec<Arc<StationDetail>>,
}

impl RegistrySnapshot {
    /// Find a station by id
    pub fn station(&self, id: &str) -> Option<&Arc<StationDetail>> {
        self.stations.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

/// Local registry of station details, in first-snapshot order
#[derive(Debug, Default)]
pub struct StationRegistry {
    stations: Vec<Arc<StationDetail>>,
    version: u64,
    updated_at: Option<DateTime<Utc>>,
}

impl StationRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Number of batches that changed the registry
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Get a station by id
    pub fn get(&self, id: &str) -> Option<&Arc<StationDetail>> {
        self.stations.iter().find(|s| s.id == id)
    }

    /// Merge a batch of station records.
    ///
    /// Runs in O(registry + batch): the batch is indexed by id once and each
    /// existing station does a single lookup. If the batch repeats an id, the
    /// later record wins and keeps the slot of the first occurrence.
    pub fn apply_update(&mut self, batch: Vec<StationDetail>) -> ApplyReport {
        let mut report = ApplyReport::default();
        let (order, mut incoming) = index_batch(batch);

        if self.stations.is_empty() {
            self.stations = order
                .iter()
                .filter_map(|id| incoming.remove(id.as_str()))
                .collect();
            report.initialized = order;
        } else {
            for slot in self.stations.iter_mut() {
                if let Some(update) = incoming.get(slot.id.as_str()) {
                    *slot = Arc::clone(update);
                    report.replaced.push(slot.id.clone());
                }
            }

            let matched: HashSet<&str> = report.replaced.iter().map(String::as_str).collect();

            report.ignored = order
                .into_iter()
                .filter(|id| !matched.contains(id.as_str()))
                .collect();
        }

        if report.changed() {
            self.version += 1;
            self.updated_at = Some(Utc::now());
        }

        debug!(
            version = self.version,
            initialized = report.initialized.len(),
            replaced = report.replaced.len(),
            ignored = ?report.ignored,
            "Applied station update"
        );

        report
    }

    /// Snapshot for readers
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            version: self.version,
            updated_at: self.updated_at,
            stations: self.stations.clone(),
        }
    }
}

/// Index a batch by id, keeping first-seen order. Later duplicates overwrite.
fn index_batch(
    batch: Vec<StationDetail>,
) -> (Vec<StationId>, HashMap<StationId, Arc<StationDetail>>) {
    let mut order: Vec<StationId> = Vec::with_capacity(batch.len());
    let mut incoming: HashMap<StationId, Arc<StationDetail>> = HashMap::with_capacity(batch.len());

    for station in batch {
        if !incoming.contains_key(&station.id) {
            order.push(station.id.clone());
        }
        incoming.insert(station.id.clone(), Arc::new(station));
    }

    (order, incoming)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Charger;

    fn station(id: &str, name: &str) -> StationDetail {
        StationDetail::new(id, name)
            .with_counts(1, 0)
            .with_charger(Charger::new("0"))
    }

    #[test]
    fn test_empty_registry_takes_batch() {
        let mut registry = StationRegistry::new();
        let report = registry.apply_update(vec![station("x", "X"), station("y", "Y")]);

        assert_eq!(report.initialized, vec!["x".to_string(), "y".to_string()]);
        let snapshot = registry.snapshot();
        let ids: Vec<_> = snapshot.stations.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y"]);
        assert_eq!(*snapshot.stations[0].as_ref(), station("x", "X"));
        assert_eq!(snapshot.version, 1);
        assert!(snapshot.updated_at.is_some());
    }

    #[test]
    fn test_matching_station_replaced_wholesale() {
        let mut registry = StationRegistry::new();
        registry.apply_update(vec![station("a", "A"), station("b", "B"), station("c", "C")]);
        let before = registry.snapshot();

        // B' drops its charger and adds a queue: no field survives from B
        let b_prime = StationDetail::new("b", "B prime").with_queue(["car1"]);
        let report = registry.apply_update(vec![b_prime.clone()]);

        assert_eq!(report.replaced, vec!["b".to_string()]);
        let after = registry.snapshot();
        assert_eq!(after.len(), 3);
        assert!(Arc::ptr_eq(&before.stations[0], &after.stations[0]));
        assert!(Arc::ptr_eq(&before.stations[2], &after.stations[2]));
        assert_eq!(*after.stations[1].as_ref(), b_prime);
        assert!(after.stations[1].chargers.is_empty());
    }

    #[test]
    fn test_unknown_station_not_added() {
        let mut registry = StationRegistry::new();
        registry.apply_update(vec![station("a", "A")]);

        let report = registry.apply_update(vec![station("z", "Z")]);

        assert_eq!(report.ignored, vec!["z".to_string()]);
        assert!(!report.changed());
        assert_eq!(registry.len(), 1);
        assert!(registry.get("z").is_none());
        assert_eq!(registry.version(), 1);
    }

    #[test]
    fn test_mixed_batch_replaces_known_ignores_new() {
        let mut registry = StationRegistry::new();
        registry.apply_update(vec![station("a", "A"), station("b", "B")]);

        let report = registry.apply_update(vec![station("z", "Z"), station("a", "A2")]);

        assert_eq!(report.replaced, vec!["a".to_string()]);
        assert_eq!(report.ignored, vec!["z".to_string()]);
        assert_eq!(registry.get("a").unwrap().name, "A2");
    }

    #[test]
    fn test_duplicate_ids_last_wins() {
        let mut registry = StationRegistry::new();
        registry.apply_update(vec![station("a", "A")]);

        registry.apply_update(vec![station("a", "first"), station("a", "second")]);

        assert_eq!(registry.get("a").unwrap().name, "second");
    }

    #[test]
    fn test_duplicate_ids_in_first_batch_collapse() {
        let mut registry = StationRegistry::new();
        let report = registry.apply_update(vec![
            station("a", "first"),
            station("b", "B"),
            station("a", "second"),
        ]);

        assert_eq!(report.initialized, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("a").unwrap().name, "second");
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.station("a").unwrap().name, "second");
        assert_eq!(snapshot.stations[0].id, "a");
        assert_eq!(snapshot.stations[1].id, "b");
    }

    #[test]
    fn test_order_is_preserved_on_replace() {
        let mut registry = StationRegistry::new();
        registry.apply_update(vec![station("2", "Two"), station("1", "One")]);
        registry.apply_update(vec![station("1", "One'"), station("2", "Two'")]);

        let ids: Vec<_> = registry.snapshot().stations.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec!["2".to_string(), "1".to_string()]);
    }

    #[test]
    fn test_empty_batch_on_empty_registry() {
        let mut registry = StationRegistry::new();
        let report = registry.apply_update(Vec::new());
        assert!(!report.changed());
        assert!(registry.is_empty());
        assert_eq!(registry.version(), 0);
    }
}
