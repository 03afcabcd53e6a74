//! Property tests for ticket generation and reconciliation
//!
//! Tests:
//! - generated tickets have fixed length and stay in the alphabet
//! - character draws are close to uniform
//! - reconciliation never grows the registry past its first snapshot

use std::collections::HashSet;

use ahead_core::ticket::{TICKET_ALPHABET, TICKET_LENGTH};
use ahead_core::*;
use proptest::prelude::*;

// ============================================================================
// Tickets
// ============================================================================

proptest! {
    /// Every ticket is TICKET_LENGTH characters from the alphabet
    #[test]
    fn ticket_shape(seed in any::<u64>()) {
        let tickets = AlphanumericTickets::with_seed(seed);
        for _ in 0..8 {
            let ticket = tickets.next_ticket();
            prop_assert_eq!(ticket.len(), TICKET_LENGTH);
            prop_assert!(
                ticket.bytes().all(|b| TICKET_ALPHABET.contains(&b)),
                "Ticket {} has a character outside the alphabet",
                ticket
            );
        }
    }

    /// Same seed, same sequence
    #[test]
    fn ticket_sequence_deterministic(seed in any::<u64>()) {
        let a = AlphanumericTickets::with_seed(seed);
        let b = AlphanumericTickets::with_seed(seed);
        for _ in 0..4 {
            prop_assert_eq!(a.next_ticket(), b.next_ticket());
        }
    }
}

/// Chi-square over 20k characters. With 61 degrees of freedom the 99.9th
/// percentile is about 100; a fixed seed keeps this deterministic.
#[test]
fn ticket_characters_roughly_uniform() {
    let tickets = AlphanumericTickets::with_seed(0x5eed);
    let mut counts = [0u32; 62];

    for _ in 0..2000 {
        for b in tickets.next_ticket().bytes() {
            let index = TICKET_ALPHABET.iter().position(|&c| c == b).unwrap();
            counts[index] += 1;
        }
    }

    let total = (2000 * TICKET_LENGTH) as f64;
    let expected = total / 62.0;
    let chi_square: f64 = counts
        .iter()
        .map(|&observed| {
            let diff = observed as f64 - expected;
            diff * diff / expected
        })
        .sum();

    assert!(chi_square < 130.0, "Chi-square {chi_square} too large");
}

#[test]
fn tickets_rarely_collide() {
    let tickets = AlphanumericTickets::new();
    let issued: HashSet<_> = (0..1000).map(|_| tickets.next_ticket()).collect();
    assert_eq!(issued.len(), 1000);
}

// ============================================================================
// Reconciliation
// ============================================================================

fn station_ids() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-e]", 0..8)
}

proptest! {
    /// After the first batch the set of station ids never changes
    #[test]
    fn registry_ids_fixed_after_first_batch(
        first in station_ids(),
        later in prop::collection::vec(station_ids(), 0..5)
    ) {
        let mut registry = StationRegistry::new();
        registry.apply_update(first.iter().map(|id| StationDetail::new(id.clone(), "")).collect());
        let initial: Vec<_> = registry.snapshot().stations.iter().map(|s| s.id.clone()).collect();

        for batch in later {
            registry.apply_update(batch.iter().map(|id| StationDetail::new(id.clone(), "x")).collect());
            let now: Vec<_> = registry.snapshot().stations.iter().map(|s| s.id.clone()).collect();
            if initial.is_empty() {
                // An empty registry takes the next batch whole
                break;
            }
            prop_assert_eq!(&now, &initial, "Registry ids changed after first snapshot");
        }
    }

    /// Applying the same batch twice leaves the registry equal to applying it once
    #[test]
    fn registry_apply_idempotent(ids in station_ids(), names in prop::collection::vec("[a-z]{1,5}", 8)) {
        let batch: Vec<_> = ids
            .iter()
            .zip(names.iter())
            .map(|(id, name)| StationDetail::new(id.clone(), name.clone()))
            .collect();

        let mut registry = StationRegistry::new();
        registry.apply_update(ids.iter().map(|id| StationDetail::new(id.clone(), "")).collect());
        registry.apply_update(batch.clone());
        let once: Vec<StationDetail> =
            registry.snapshot().stations.iter().map(|s| (**s).clone()).collect();

        registry.apply_update(batch);
        let twice: Vec<StationDetail> =
            registry.snapshot().stations.iter().map(|s| (**s).clone()).collect();

        prop_assert_eq!(once, twice);
    }
}
