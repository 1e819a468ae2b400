//! The view: a per-thread handle onto a shared ring.
//!
//! A ring remembers which item it touched last to speed up loop-shaped
//! access. From several threads that cursor would be invalidated on every
//! access, so each thread takes its own [`RingView`], which owns a private
//! cursor and re-synchronizes it against the ring before every operation:
//! if the ring's root or size changed since the last look, the private
//! cursor is discarded and the ring's current cursor adopted.
//!
//! Mutations go through the ring lock with the view's cursor temporarily
//! swapped in for the ring's own, so the ring's single-threaded cursor
//! contract holds while the fine-grained position work was already done.
//!
//! Sorting through a view is cooperative: the pass skips items whose lock
//! another thread holds, re-verifies every placement under the ring lock,
//! and can be interrupted at any time through a [`SortInterrupter`].

use crate::error::{Result, RingError};
use crate::item::{Item, Node};
use crate::ring::{
    cmp_by_data, cmp_by_id, cmp_by_name, fold_name, normalize_nr, Ring, SortProbe,
};
use crossbeam_utils::Backoff;
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

/// A per-thread cursor over a shared ring.
///
/// The view is `Send` but deliberately not `Sync`: one view per thread is
/// the contract. It holds no ownership over items; dropping it frees only
/// the private cursor.
pub struct RingView<T> {
    ring: Ring<T>,
    cursor: RefCell<Option<Node<T>>>,
    last_root: Cell<usize>,
    last_len: Cell<usize>,
    keep_sorting: Arc<AtomicBool>,
    unsorted: Cell<i32>,
}

/// A cloneable, thread-safe handle that can stop a view's running sort.
#[derive(Clone)]
pub struct SortInterrupter {
    flag: Arc<AtomicBool>,
}

impl SortInterrupter {
    /// Asks the sorting view to stop after its current step. The flag is
    /// re-armed at the start of every pass, so a later sort call resumes
    /// normally.
    pub fn interrupt(&self) {
        self.flag.store(false, AtomicOrdering::Release);
    }
}

impl<T: Send + Sync + 'static> Ring<T> {
    /// Creates a per-thread view onto this ring.
    pub fn view(&self) -> RingView<T> {
        RingView::new(self)
    }
}

impl<T: Send + Sync + 'static> RingView<T> {
    /// Creates a view onto the given ring.
    pub fn new(ring: &Ring<T>) -> Self {
        let view = Self {
            ring: ring.clone(),
            cursor: RefCell::new(None),
            last_root: Cell::new(0),
            last_len: Cell::new(0),
            keep_sorting: Arc::new(AtomicBool::new(false)),
            unsorted: Cell::new(0),
        };
        view.resync();
        view
    }

    // ---------------------------------------------------------------------
    // RE-SYNC
    // ---------------------------------------------------------------------

    /// Compares the cached `(root, size)` pair against the ring's atomic
    /// mirrors; on any mismatch the private cursor is dropped in favor of
    /// the ring's current one.
    fn resync(&self) {
        let len = self.ring.core.len_hint();
        let root_tag = self.ring.core.root_tag();
        let stale = len != self.last_len.get()
            || root_tag != self.last_root.get()
            || (len > 0 && self.cursor.borrow().is_none());
        if stale {
            let state = self.ring.core.lock_state();
            *self.cursor.borrow_mut() = state.cursor.clone().or_else(|| state.root.clone());
            self.last_len.set(state.len);
            let tag = state
                .root
                .as_ref()
                .map(|root| Arc::as_ptr(root) as usize)
                .unwrap_or(0);
            self.last_root.set(tag);
        }
    }

    /// Refreshes the cached mirrors after a mutation this view performed.
    fn refresh_cache(&self) {
        self.last_len.set(self.ring.core.len_hint());
        self.last_root.set(self.ring.core.root_tag());
    }

    /// Drops the private cursor and adopts the ring's, for callers that
    /// know their item just became unsafe to use.
    pub fn reset(&self) {
        let state = self.ring.core.lock_state();
        *self.cursor.borrow_mut() = state.cursor.clone().or_else(|| state.root.clone());
        drop(state);
        self.refresh_cache();
    }

    fn gone(&self) -> bool {
        self.ring.core.is_destroyed()
    }

    /// Runs an operation under the ring lock with this view's cursor
    /// swapped in.
    fn with_cursor<R>(&self, op: impl FnOnce(&mut crate::ring::RingState<T>) -> R) -> R {
        let mut cursor = self.cursor.borrow_mut();
        let result = self.ring.with_view_cursor(&mut cursor, op);
        drop(cursor);
        self.refresh_cache();
        result
    }

    // ---------------------------------------------------------------------
    // STATUS
    // ---------------------------------------------------------------------

    /// Element count of the viewed ring.
    pub fn len(&self) -> usize {
        self.resync();
        self.ring.len()
    }

    /// Whether the viewed ring is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The viewed ring's display name.
    pub fn name(&self) -> String {
        self.ring.name()
    }

    /// Whether the viewed ring keeps an id map.
    pub fn is_id_map_used(&self) -> bool {
        self.ring.is_id_map_used()
    }

    /// Whether the viewed ring keeps a name map.
    pub fn is_name_map_used(&self) -> bool {
        self.ring.is_name_map_used()
    }

    /// Position of the item this view currently points at, 0 when unknown.
    pub fn current_nr(&self) -> i32 {
        self.resync();
        self.cursor.borrow().as_ref().map_or(0, |node| node.nr())
    }

    /// Number of unsorted items found by the most recent sort pass.
    pub fn unsorted_count(&self) -> i32 {
        self.unsorted.get()
    }

    // ---------------------------------------------------------------------
    // INSERTION
    // ---------------------------------------------------------------------

    /// Appends a payload through this view. On a destroyed ring this is a
    /// no-op reporting position -1.
    pub fn add(&self, payload: Arc<T>, id: u32, name: &str) -> Result<i32> {
        if self.gone() {
            return Ok(-1);
        }
        self.resync();
        let hint = self.cursor.borrow().clone();
        let (nr, node) = self
            .ring
            .insert_with(payload, id, name, Some(hint), true, |_| -1)?;
        *self.cursor.borrow_mut() = Some(node);
        self.refresh_cache();
        Ok(nr)
    }

    /// Appends a plain value through this view.
    pub fn add_value(&self, value: T, id: u32, name: &str) -> Result<i32> {
        self.add(Arc::new(value), id, name)
    }

    /// Inserts a payload at its sorted position. The position is resolved
    /// under the ring lock right before the item is attached, so a
    /// concurrent mutation between re-syncs cannot misplace it.
    pub fn add_sorted(&self, payload: Arc<T>, id: u32, name: &str, asc: bool) -> Result<i32>
    where
        T: Ord,
    {
        if self.gone() {
            return Ok(-1);
        }
        self.resync();
        let hint = self.cursor.borrow().clone();
        let probe = SortProbe {
            payload: payload.clone(),
            id,
            name_folded: fold_name(name),
        };
        let (nr, node) = self
            .ring
            .insert_with(payload, id, name, Some(hint), true, move |state| {
                state.seek_ordered(asc, &|node| cmp_by_data(node, &probe))
            })?;
        *self.cursor.borrow_mut() = Some(node);
        self.refresh_cache();
        Ok(nr)
    }

    /// Inserts a payload at a position, with the position semantics of
    /// [`Ring::insert`].
    pub fn insert(&self, payload: Arc<T>, nr: i32, id: u32, name: &str) -> Result<i32> {
        if self.gone() {
            return Ok(-1);
        }
        self.resync();
        let hint = self.cursor.borrow().clone();
        let (final_nr, node) = self
            .ring
            .insert_with(payload, id, name, Some(hint), true, move |_| nr)?;
        *self.cursor.borrow_mut() = Some(node);
        self.refresh_cache();
        Ok(final_nr)
    }

    /// Inserts a plain value at a position.
    pub fn insert_value(&self, value: T, nr: i32, id: u32, name: &str) -> Result<i32> {
        self.insert(Arc::new(value), nr, id, name)
    }

    // ---------------------------------------------------------------------
    // SINGLE-ITEM MANIPULATION
    // ---------------------------------------------------------------------

    /// Moves an item, with the position semantics of [`Ring::move_item`].
    pub fn move_item(&self, old_nr: i32, new_nr: i32) -> Result<i32> {
        if self.gone() {
            return Ok(-1);
        }
        self.resync();
        let result = self.with_cursor(|state| Ring::move_locked(state, old_nr, new_nr));
        self.resync();
        result
    }

    /// Rewrites an item's id, with the uniqueness rules of
    /// [`Ring::set_item_id`].
    pub fn set_item_id(&self, nr: i32, id: u32) -> Result<u32> {
        if self.gone() {
            return Ok(id);
        }
        self.resync();
        let result = self.ring.set_item_id(nr, id);
        self.resync();
        result
    }

    /// Rewrites an item's name, with the uniqueness rules of
    /// [`Ring::set_item_name`].
    pub fn set_item_name(&self, nr: i32, name: &str) -> Result<String> {
        if self.gone() {
            return Ok(name.to_string());
        }
        self.resync();
        let result = self.ring.set_item_name(nr, name);
        self.resync();
        result
    }

    // ---------------------------------------------------------------------
    // LOOKUPS
    // ---------------------------------------------------------------------

    /// The payload at the given (wrapped) position.
    pub fn get(&self, nr: i32) -> Result<Arc<T>> {
        if self.gone() {
            return Err(RingError::NrOutOfRange);
        }
        self.resync();
        self.with_cursor(|state| {
            if state.len == 0 {
                return Err(RingError::NrOutOfRange);
            }
            let folded = normalize_nr(state.len, nr);
            let node = state.seek_nr(folded).ok_or(RingError::NrOutOfRange)?;
            Ok(node.payload())
        })
    }

    /// The payload with the given id, found through the ring's id map when
    /// it is active.
    pub fn get_by_id(&self, id: u32) -> Result<Arc<T>> {
        if self.gone() {
            return Err(RingError::IdNotFound { id });
        }
        self.resync();
        self.with_cursor(|state| {
            let node = state.seek_id(id).ok_or(RingError::IdNotFound { id })?;
            Ok(node.payload())
        })
    }

    /// The payload with the given name, found through the ring's name map
    /// when it is active.
    pub fn get_by_name(&self, name: &str) -> Result<Arc<T>> {
        if self.gone() {
            return Err(RingError::NameNotFound {
                name: name.to_string(),
            });
        }
        self.resync();
        self.with_cursor(|state| {
            let node = state.seek_name(name).ok_or_else(|| RingError::NameNotFound {
                name: name.to_string(),
            })?;
            Ok(node.payload())
        })
    }

    /// The item at the given (wrapped) position.
    pub fn get_item(&self, nr: i32) -> Option<Item<T>> {
        if self.gone() {
            return None;
        }
        self.resync();
        self.with_cursor(|state| {
            if state.len == 0 {
                return None;
            }
            let folded = normalize_nr(state.len, nr);
            state.seek_nr(folded).map(|node| Item { node })
        })
    }

    /// The item with the given id, if any.
    pub fn get_item_by_id(&self, id: u32) -> Option<Item<T>> {
        if self.gone() {
            return None;
        }
        self.resync();
        self.with_cursor(|state| state.seek_id(id).map(|node| Item { node }))
    }

    /// The item with the given name, if any.
    pub fn get_item_by_name(&self, name: &str) -> Option<Item<T>> {
        if self.gone() {
            return None;
        }
        self.resync();
        self.with_cursor(|state| state.seek_name(name).map(|node| Item { node }))
    }

    /// The id of the item at the given (wrapped) position.
    pub fn id_of(&self, nr: i32) -> Result<u32> {
        if self.gone() {
            return Err(RingError::NrOutOfRange);
        }
        self.resync();
        self.with_cursor(|state| {
            if state.len == 0 {
                return Err(RingError::NrOutOfRange);
            }
            let folded = normalize_nr(state.len, nr);
            let node = state.seek_nr(folded).ok_or(RingError::NrOutOfRange)?;
            Ok(node.id())
        })
    }

    /// The name of the item at the given (wrapped) position.
    pub fn name_of(&self, nr: i32) -> Result<String> {
        if self.gone() {
            return Err(RingError::NrOutOfRange);
        }
        self.resync();
        self.with_cursor(|state| {
            if state.len == 0 {
                return Err(RingError::NrOutOfRange);
            }
            let folded = normalize_nr(state.len, nr);
            let node = state.seek_nr(folded).ok_or(RingError::NrOutOfRange)?;
            Ok(node.name())
        })
    }

    /// The position of the item with the given id.
    pub fn nr_of_id(&self, id: u32) -> Result<i32> {
        if self.gone() {
            return Err(RingError::IdNotFound { id });
        }
        self.resync();
        self.with_cursor(|state| {
            let node = state.seek_id(id).ok_or(RingError::IdNotFound { id })?;
            state.ensure_numbered();
            Ok(node.nr())
        })
    }

    /// The position of the item with the given name.
    pub fn nr_of_name(&self, name: &str) -> Result<i32> {
        if self.gone() {
            return Err(RingError::NameNotFound {
                name: name.to_string(),
            });
        }
        self.resync();
        self.with_cursor(|state| {
            let node = state.seek_name(name).ok_or_else(|| RingError::NameNotFound {
                name: name.to_string(),
            })?;
            state.ensure_numbered();
            Ok(node.nr())
        })
    }

    /// The reference count of the payload at the given position.
    pub fn ref_count(&self, nr: i32) -> Result<i32> {
        if self.gone() {
            return Err(RingError::NrOutOfRange);
        }
        self.resync();
        self.with_cursor(|state| {
            if state.len == 0 {
                return Err(RingError::NrOutOfRange);
            }
            let folded = normalize_nr(state.len, nr);
            let node = state.seek_nr(folded).ok_or(RingError::NrOutOfRange)?;
            Ok(node.ref_count())
        })
    }

    /// The reference count of the given payload address.
    pub fn data_ref_count(&self, payload: &Arc<T>) -> Result<i32> {
        if self.gone() {
            return Err(RingError::DataNotFound);
        }
        self.resync();
        self.with_cursor(|state| {
            let node = state.seek_payload(payload).ok_or(RingError::DataNotFound)?;
            Ok(node.ref_count())
        })
    }

    /// Whether an item with the given id exists.
    pub fn exists_id(&self, id: u32) -> bool {
        !self.gone() && {
            self.resync();
            self.with_cursor(|state| state.seek_id(id).is_some())
        }
    }

    /// Whether an item with the given name exists.
    pub fn exists_name(&self, name: &str) -> bool {
        !self.gone() && {
            self.resync();
            self.with_cursor(|state| state.seek_name(name).is_some())
        }
    }

    /// Whether an item with the given, unwrapped position exists.
    pub fn exists_nr(&self, nr: i32) -> bool {
        !self.gone() && nr >= 0 && (nr as usize) < self.len()
    }

    /// Whether the given payload address is stored in the viewed ring.
    pub fn is_in(&self, payload: &Arc<T>) -> bool {
        !self.gone() && {
            self.resync();
            self.with_cursor(|state| state.seek_payload(payload).is_some())
        }
    }

    /// Whether a payload equal to the given value is stored in the viewed
    /// ring.
    pub fn is_value_in(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        !self.gone() && self.ring.is_value_in(value)
    }

    // ---------------------------------------------------------------------
    // SORTING
    // ---------------------------------------------------------------------

    /// A handle other threads can use to interrupt this view's sort.
    pub fn interrupter(&self) -> SortInterrupter {
        SortInterrupter {
            flag: Arc::clone(&self.keep_sorting),
        }
    }

    /// Stops a sort running on this view after its current step.
    pub fn interrupt_sorting(&self) {
        self.keep_sorting.store(false, AtomicOrdering::Release);
    }

    /// Sorts by payload value until a pass moves nothing or the sort is
    /// interrupted. An interrupted ring may be left partially sorted; a
    /// later call picks up from there.
    pub fn sort(&self, asc: bool) -> Result<()>
    where
        T: Ord,
    {
        loop {
            if self.sort_once(asc)? == 0 {
                return Ok(());
            }
            if !self.keep_sorting.load(AtomicOrdering::Acquire) {
                return Ok(());
            }
        }
    }

    /// Sorts by id until done or interrupted.
    pub fn sort_by_id(&self, asc: bool) -> Result<()> {
        loop {
            if self.sort_once_by_id(asc)? == 0 {
                return Ok(());
            }
            if !self.keep_sorting.load(AtomicOrdering::Acquire) {
                return Ok(());
            }
        }
    }

    /// Sorts by name until done or interrupted.
    pub fn sort_by_name(&self, asc: bool) -> Result<()> {
        loop {
            if self.sort_once_by_name(asc)? == 0 {
                return Ok(());
            }
            if !self.keep_sorting.load(AtomicOrdering::Acquire) {
                return Ok(());
            }
        }
    }

    /// One cooperative sorting pass by payload value.
    pub fn sort_once(&self, asc: bool) -> Result<i32>
    where
        T: Ord,
    {
        self.sort_pass(asc, &cmp_by_data)
    }

    /// One cooperative sorting pass by id.
    pub fn sort_once_by_id(&self, asc: bool) -> Result<i32> {
        self.sort_pass(asc, &cmp_by_id)
    }

    /// One cooperative sorting pass by name.
    pub fn sort_once_by_name(&self, asc: bool) -> Result<i32> {
        self.sort_pass(asc, &cmp_by_name)
    }

    /// The fine-grained pass: probe each item under its own lock (skipping
    /// items another thread holds), then re-verify and move under the ring
    /// lock. Returns the number of items moved.
    fn sort_pass(&self, asc: bool, cmp: &dyn Fn(&Node<T>, &SortProbe<T>) -> Ordering) -> Result<i32> {
        // Re-arm the flag so a sort interrupted earlier can resume.
        self.keep_sorting.store(true, AtomicOrdering::Release);
        self.unsorted.set(0);
        if self.gone() {
            return Ok(0);
        }
        self.resync();

        let mut moved = 0;

        // The two-item ring short-circuits to a conditional swap.
        {
            let mut state = self.ring.core.lock_state();
            if state.len <= 2 {
                if state.len == 2 {
                    moved = state.sort_two(asc, cmp);
                }
                self.ring.core.publish(&state);
                drop(state);
                self.refresh_cache();
                self.unsorted.set(moved);
                return Ok(moved);
            }
        }

        let Some(root) = ({
            let state = self.ring.core.lock_state();
            state.root.clone()
        }) else {
            return Ok(0);
        };
        let mut cur = root.clone();
        let mut steps = 0usize;
        let limit = self.ring.len() * 2 + 4;
        let backoff = &mut Backoff::new();

        loop {
            if !self.keep_sorting.load(AtomicOrdering::Acquire) {
                break;
            }

            // Probe under the item's own lock; a held lock means another
            // thread is working the item, so it is skipped this pass.
            let probe = cur.try_lock().map(|guard| SortProbe {
                payload: guard.payload.clone(),
                id: guard.id,
                name_folded: fold_name(&guard.name),
            });

            if let Some(probe) = probe {
                backoff.reset();
                let mut state = self.ring.core.lock_state();
                state.ensure_numbered();
                // The item may have left the ring while this thread held no
                // lock at all; a detached item has no forward link.
                if cur.next().is_some() {
                    let old_nr = cur.nr();
                    state.cursor = Some(cur.clone());
                    let new_nr = state.seek_ordered(asc, &|node| cmp(node, &probe));
                    if new_nr != old_nr {
                        if let Some(target) = state.cursor.clone() {
                            if !Arc::ptr_eq(&target, &cur) {
                                state.relocate(&cur, &target, new_nr < 0)?;
                                moved += 1;
                                self.unsorted.set(moved);
                            }
                        }
                    }
                }
                self.ring.core.publish(&state);
            } else {
                backoff.snooze();
            }

            // Advance along the chain as it is now.
            let Some(next) = cur.next() else { break };
            if Arc::ptr_eq(&next, &root) {
                break;
            }
            cur = next;
            steps += 1;
            if steps > limit {
                break;
            }
        }

        self.refresh_cache();
        self.resync();
        self.unsorted.set(moved);
        Ok(moved)
    }
}

impl<T: Send + Sync + 'static> std::fmt::Debug for RingView<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingView")
            .field("ring", &self.ring.name())
            .field("cached_len", &self.last_len.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RingConfig, BULK_CONFIG};

    fn sequence(ring: &Ring<i32>) -> Vec<i32> {
        ring.payloads().iter().map(|p| **p).collect()
    }

    #[test]
    fn test_view_reads_through_cursor() {
        let ring: Ring<i32> = Ring::new(&RingConfig::new(true, true));
        ring.add_value(10, 1, "ten").unwrap();
        ring.add_value(20, 2, "twenty").unwrap();

        let view = ring.view();
        assert_eq!(view.len(), 2);
        assert_eq!(*view.get(1).unwrap(), 20);
        assert_eq!(*view.get_by_id(1).unwrap(), 10);
        assert_eq!(*view.get_by_name("twenty").unwrap(), 20);
        assert_eq!(view.nr_of_name("ten").unwrap(), 0);
        assert!(view.exists_id(2));
        assert!(!view.exists_id(3));
    }

    #[test]
    fn test_view_add_and_insert() {
        let ring: Ring<i32> = Ring::new(&BULK_CONFIG);
        let view = ring.view();
        assert_eq!(view.add_value(1, 0, "").unwrap(), 0);
        assert_eq!(view.add_value(2, 0, "").unwrap(), 1);
        assert_eq!(view.insert_value(9, 1, 0, "").unwrap(), 1);
        assert_eq!(sequence(&ring), vec![1, 9, 2]);
        assert_eq!(view.current_nr(), 1);
    }

    #[test]
    fn test_view_survives_concurrent_removal() {
        let ring: Ring<i32> = Ring::new(&BULK_CONFIG);
        for value in 0..5 {
            ring.add_value(value, 0, "").unwrap();
        }
        let view = ring.view();
        assert_eq!(*view.get(4).unwrap(), 4);

        // Another handle rips out the item the view points at.
        ring.remove(4);
        ring.remove(0);

        // The stale view re-syncs instead of touching the dead item.
        assert_eq!(view.len(), 3);
        assert_eq!(*view.get(0).unwrap(), 1);
    }

    #[test]
    fn test_view_sorted_insert() {
        let ring: Ring<i32> = Ring::new(&BULK_CONFIG);
        let view = ring.view();
        for value in [5, 3, 8, 3, 1] {
            view.add_sorted(Arc::new(value), 0, "", true).unwrap();
        }
        assert_eq!(sequence(&ring), vec![1, 3, 3, 5, 8]);
    }

    #[test]
    fn test_view_sort_and_interrupt_flag() {
        let ring: Ring<i32> = Ring::new(&BULK_CONFIG);
        for value in [4, 2, 5, 1, 3] {
            ring.add_value(value, 0, "").unwrap();
        }
        let view = ring.view();
        view.sort(true).unwrap();
        assert_eq!(sequence(&ring), vec![1, 2, 3, 4, 5]);
        assert_eq!(view.sort_once(true).unwrap(), 0);

        // An interrupter fired before the next sort does not wedge it;
        // the flag is re-armed per pass.
        view.interrupter().interrupt();
        view.sort(false).unwrap();
        assert_eq!(sequence(&ring), vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_view_on_destroyed_ring_is_noop() {
        let ring: Ring<i32> = Ring::new(&BULK_CONFIG);
        ring.add_value(1, 0, "").unwrap();
        let view = ring.view();
        ring.destroy();

        assert_eq!(view.add_value(2, 0, "").unwrap(), -1);
        assert!(view.get(0).is_err());
        assert!(view.get_item(0).is_none());
        assert_eq!(view.sort_once_by_id(true).unwrap(), 0);
    }

    #[test]
    fn test_view_move_and_keys() {
        let ring: Ring<i32> = Ring::new(&RingConfig::new(true, true));
        for (value, id) in [(1, 1), (2, 2), (3, 3)] {
            ring.add_value(value, id, "").unwrap();
        }
        let view = ring.view();
        view.move_item(0, -1).unwrap();
        assert_eq!(sequence(&ring), vec![2, 3, 1]);
        assert_eq!(view.set_item_id(0, 50).unwrap(), 50);
        assert_eq!(view.id_of(0).unwrap(), 50);
        let name = view.set_item_name(0, "head").unwrap();
        assert_eq!(name, "head");
        assert_eq!(view.name_of(0).unwrap(), "head");
    }
}
