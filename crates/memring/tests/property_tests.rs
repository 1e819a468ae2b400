//! Property-based tests for the structural ring invariants.
//!
//! After every public operation completes, a ring must satisfy:
//! - emptiness and the root reference agree
//! - following the chain visits exactly `len` items and returns to root
//! - positions are a bijection onto `[0, len)` once numbering is current
//! - active key maps are complete and collision-free
//! - the id watermark never falls below any stored id

use memring_rs::{Ring, RingConfig};
use proptest::prelude::*;

/// The operations a random test program is built from.
#[derive(Debug, Clone)]
enum Op {
    Add(i32),
    InsertAt(i32, i32),
    InsertSorted(i32),
    Remove(i32),
    Pop,
    Shift,
    MoveItem(i32, i32),
    SortOnce(bool),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<i32>().prop_map(Op::Add),
        (any::<i32>(), -20i32..20).prop_map(|(v, nr)| Op::InsertAt(v, nr)),
        any::<i32>().prop_map(Op::InsertSorted),
        (-20i32..20).prop_map(Op::Remove),
        Just(Op::Pop),
        Just(Op::Shift),
        ((-20i32..20), (-20i32..20)).prop_map(|(a, b)| Op::MoveItem(a, b)),
        any::<bool>().prop_map(Op::SortOnce),
    ]
}

/// Checks the universal invariants through the public surface.
fn assert_ring_invariants(ring: &Ring<i32>) {
    let len = ring.len();

    // emptiness and the root agree
    assert_eq!(len == 0, ring.is_empty());
    if len == 0 {
        assert!(ring.get(0).is_err());
        return;
    }

    // the chain snapshot covers exactly len items
    let items = ring.items();
    assert_eq!(items.len(), len);

    // positions are a bijection onto [0, len)
    let mut seen = vec![false; len];
    for nr in 0..len as i32 {
        let item = ring.get_item(nr).expect("position within range");
        let got = item.nr();
        assert!(got >= 0 && (got as usize) < len, "nr {got} out of [0, {len})");
        assert!(!seen[got as usize], "nr {got} occupied twice");
        seen[got as usize] = true;
    }

    // active maps resolve every item, ids are unique, watermark holds
    if ring.is_id_map_used() {
        let mut ids = std::collections::HashSet::new();
        for nr in 0..len as i32 {
            let id = ring.id_of(nr).unwrap();
            assert!(ids.insert(id), "duplicate id {id}");
            assert_eq!(ring.nr_of_id(id).unwrap(), nr);
            assert!(ring.max_id() >= id);
        }
    }
    if ring.is_name_map_used() {
        let mut names = std::collections::HashSet::new();
        for nr in 0..len as i32 {
            let name = ring.name_of(nr).unwrap();
            assert!(names.insert(name.clone()), "duplicate name {name}");
            assert_eq!(ring.nr_of_name(&name).unwrap(), nr);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The invariants hold after every operation of a random program, on a
    /// fully mapped ring.
    #[test]
    fn prop_invariants_under_random_ops_mapped(
        ops in prop::collection::vec(op_strategy(), 1..60),
    ) {
        let ring: Ring<i32> = Ring::new(&RingConfig::new(true, true));
        for op in ops {
            match op {
                Op::Add(v) => { ring.add_value(v, 0, "").unwrap(); }
                Op::InsertAt(v, nr) => { ring.insert_value(v, nr, 0, "").unwrap(); }
                Op::InsertSorted(v) => { ring.insert_sorted_value(v, 0, "", true).unwrap(); }
                Op::Remove(nr) => { ring.remove(nr); }
                Op::Pop => { ring.pop(); }
                Op::Shift => { ring.shift(); }
                Op::MoveItem(a, b) => { let _ = ring.move_item(a, b); }
                Op::SortOnce(asc) => { ring.sort_once(asc).unwrap(); }
            }
            assert_ring_invariants(&ring);
        }
    }

    /// The invariants hold on a bare ring (no maps, no tracking) as well.
    #[test]
    fn prop_invariants_under_random_ops_bare(
        ops in prop::collection::vec(op_strategy(), 1..60),
    ) {
        let ring: Ring<i32> = Ring::new(&RingConfig::new(false, false).without_tracking());
        for op in ops {
            match op {
                Op::Add(v) => { ring.add_value(v, 0, "").unwrap(); }
                Op::InsertAt(v, nr) => { ring.insert_value(v, nr, 0, "").unwrap(); }
                Op::InsertSorted(v) => { ring.insert_sorted_value(v, 0, "", true).unwrap(); }
                Op::Remove(nr) => { ring.remove(nr); }
                Op::Pop => { ring.pop(); }
                Op::Shift => { ring.shift(); }
                Op::MoveItem(a, b) => { let _ = ring.move_item(a, b); }
                Op::SortOnce(asc) => { ring.sort_once(asc).unwrap(); }
            }
            assert_ring_invariants(&ring);
        }
    }

    /// Sorting terminates fully ordered, and sorting again moves nothing.
    #[test]
    fn prop_sort_is_idempotent(values in prop::collection::vec(any::<i32>(), 0..40)) {
        let ring: Ring<i32> = Ring::new(&RingConfig::new(false, false));
        for v in &values {
            ring.add_value(*v, 0, "").unwrap();
        }
        ring.sort(true).unwrap();

        let sorted: Vec<i32> = ring.payloads().iter().map(|p| **p).collect();
        let mut expected = values.clone();
        expected.sort_unstable();
        prop_assert_eq!(sorted, expected);
        prop_assert_eq!(ring.sort_once(true).unwrap(), 0);
    }

    /// Sorted insertion produces the same ordering as sorting afterwards.
    #[test]
    fn prop_sorted_insert_matches_sort(values in prop::collection::vec(any::<i32>(), 0..40)) {
        let incremental: Ring<i32> = Ring::new(&RingConfig::new(false, false));
        for v in &values {
            incremental.insert_sorted_value(*v, 0, "", true).unwrap();
        }
        let mut expected = values.clone();
        expected.sort_unstable();
        let got: Vec<i32> = incremental.payloads().iter().map(|p| **p).collect();
        prop_assert_eq!(got, expected);
    }

    /// Wrapped positions: a negative or oversized position resolves to the
    /// same payload as its folded counterpart.
    #[test]
    fn prop_position_wrapping(len in 1usize..20, nr in -100i32..100) {
        let ring: Ring<i32> = Ring::new(&RingConfig::new(false, false));
        for v in 0..len as i32 {
            ring.add_value(v, 0, "").unwrap();
        }
        let wrapped = *ring.get(nr).unwrap();
        prop_assert!(wrapped >= 0 && (wrapped as usize) < len);
        // folding twice changes nothing
        prop_assert_eq!(*ring.get(wrapped).unwrap(), wrapped);
    }

    /// Insert-then-remove at the same position restores the sequence.
    #[test]
    fn prop_insert_remove_round_trip(
        values in prop::collection::vec(any::<i32>(), 1..20),
        v in any::<i32>(),
        pos in 0i32..20,
    ) {
        let ring: Ring<i32> = Ring::new(&RingConfig::new(false, false));
        for value in &values {
            ring.add_value(*value, 0, "").unwrap();
        }
        let before: Vec<i32> = ring.payloads().iter().map(|p| **p).collect();
        let pos = pos % values.len() as i32;
        let final_nr = ring.insert_value(v, pos, 0, "").unwrap();
        ring.remove(final_nr);
        let after: Vec<i32> = ring.payloads().iter().map(|p| **p).collect();
        prop_assert_eq!(before, after);
    }

    /// Save/load reproduces sequence, ids, names and map flags for any
    /// payloads and names the textual format can carry.
    #[test]
    fn prop_save_load_round_trip(
        entries in prop::collection::vec(
            ("[a-zA-Z0-9_]{0,12}", 0u32..50, "[a-zA-Z0-9 .:_-]{0,12}"),
            0..12,
        ),
    ) {
        let ring: Ring<String> = Ring::new(&RingConfig::new(true, true));
        for (payload, id, name) in &entries {
            ring.add_value(payload.clone(), *id, name).unwrap();
        }
        let mut buffer = Vec::new();
        ring.save(&mut buffer).unwrap();

        let restored: Ring<String> = Ring::new(&RingConfig::new(false, false));
        restored.load(&mut buffer.as_slice(), false).unwrap();

        prop_assert_eq!(restored.len(), ring.len());
        for nr in 0..ring.len() as i32 {
            prop_assert_eq!(ring.get(nr).unwrap(), restored.get(nr).unwrap());
            prop_assert_eq!(ring.id_of(nr).unwrap(), restored.id_of(nr).unwrap());
            prop_assert_eq!(ring.name_of(nr).unwrap(), restored.name_of(nr).unwrap());
        }
        prop_assert_eq!(restored.is_id_map_used(), ring.is_id_map_used());
        prop_assert_eq!(restored.is_name_map_used(), ring.is_name_map_used());
    }
}
