//! The item: one node of a memory ring.
//!
//! Items form a circular doubly-chained sequence. The forward direction
//! holds strong references (`next: Arc`), the backward direction weak ones
//! (`prev: Weak`), so the only reference cycle is the forward chain itself,
//! which the owning ring breaks explicitly when items are unlinked or the
//! ring is cleared.
//!
//! Every mutable field sits behind the per-item mutex. Chain surgery
//! (splice, unlink) is only performed while the owning ring's lock is held;
//! the per-item lock is what lets concurrent readers traverse a ring that
//! is being mutated and see either the old or the new neighbor set, never a
//! half-linked one.

use crate::error::{Result, RingError};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError, Weak};

/// Shared handle to an item's storage.
pub(crate) type Node<T> = Arc<ItemCore<T>>;

/// Backing storage of one item.
pub(crate) struct ItemCore<T> {
    state: Mutex<ItemState<T>>,
}

/// The mutable fields of an item, guarded by the per-item mutex.
pub(crate) struct ItemState<T> {
    /// The caller's value. Identified by address, never copied.
    pub payload: Arc<T>,
    /// Position within the ring, 0 at root. Stale while the owning ring's
    /// renumber flag is set.
    pub nr: i32,
    /// Caller-supplied or generated integer key.
    pub id: u32,
    /// Caller-supplied or generated text key.
    pub name: String,
    /// Backward neighbor. `None` while detached.
    pub prev: Option<Weak<ItemCore<T>>>,
    /// Forward neighbor. `None` while detached.
    pub next: Option<Node<T>>,
    /// Items in other rings that carry the same payload address.
    pub copies: Vec<Weak<ItemCore<T>>>,
}

impl<T> ItemCore<T> {
    pub(crate) fn new(payload: Arc<T>, nr: i32, id: u32, name: String) -> Node<T> {
        Arc::new(Self {
            state: Mutex::new(ItemState {
                payload,
                nr,
                id,
                name,
                prev: None,
                next: None,
                copies: Vec::new(),
            }),
        })
    }

    /// Locks the item state. A poisoned lock is taken over; item state is
    /// repaired by the owning ring's rollback paths, not abandoned.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ItemState<T>> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Non-blocking lock attempt, used by the view's sort pass to skip
    /// contended items.
    pub(crate) fn try_lock(&self) -> Option<MutexGuard<'_, ItemState<T>>> {
        match self.state.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poison)) => Some(poison.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    pub(crate) fn next(&self) -> Option<Node<T>> {
        self.lock().next.clone()
    }

    pub(crate) fn prev(&self) -> Option<Node<T>> {
        self.lock().prev.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn nr(&self) -> i32 {
        self.lock().nr
    }

    pub(crate) fn id(&self) -> u32 {
        self.lock().id
    }

    pub(crate) fn name(&self) -> String {
        self.lock().name.clone()
    }

    pub(crate) fn payload(&self) -> Arc<T> {
        self.lock().payload.clone()
    }

    /// Number of items (this one included) that reference this payload,
    /// counting only copies that are still alive.
    pub(crate) fn ref_count(&self) -> i32 {
        let live = self
            .lock()
            .copies
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count();
        1 + live as i32
    }
}

// -----------------------------------------------------------------------------
// Chain surgery. All callers hold the owning ring's lock; item locks are
// taken one at a time, never nested.
// -----------------------------------------------------------------------------

/// Links a node as the sole member of a ring: its own predecessor and
/// successor.
pub(crate) fn link_solo<T>(node: &Node<T>) {
    let mut state = node.lock();
    state.next = Some(Arc::clone(node));
    state.prev = Some(Arc::downgrade(node));
    state.nr = 0;
}

/// Splices `node` between `prev` and `next`, which must be adjacent.
///
/// The adjacency of the declared neighbors is re-verified under `prev`'s
/// lock. A mismatch means another thread relinked without the required
/// external lock; the splice is aborted without touching any link. This is
/// a last-line-of-defense detector, not a soundness guarantee.
pub(crate) fn splice_between<T>(node: &Node<T>, prev: &Node<T>, next: &Node<T>) -> Result<()> {
    {
        let mut prev_state = prev.lock();
        let declared = prev_state
            .next
            .as_ref()
            .map(|n| Arc::ptr_eq(n, next))
            .unwrap_or(false);
        if !declared {
            return Err(RingError::StrayItem);
        }
        prev_state.next = Some(Arc::clone(node));
    }
    {
        let mut state = node.lock();
        state.prev = Some(Arc::downgrade(prev));
        state.next = Some(Arc::clone(next));
    }
    {
        let mut next_state = next.lock();
        next_state.prev = Some(Arc::downgrade(node));
    }
    Ok(())
}

/// Unlinks a node from its neighbors, leaving it detached.
///
/// Returns the forward neighbor that survives, or `None` if the node was
/// the only member of its ring.
pub(crate) fn unlink<T>(node: &Node<T>) -> Option<Node<T>> {
    let (prev, next) = {
        let mut state = node.lock();
        let prev = state.prev.take().and_then(|weak| weak.upgrade());
        let next = state.next.take();
        (prev, next)
    };
    let next = next?;
    if Arc::ptr_eq(&next, node) {
        // Sole member; the self-cycle is already severed.
        return None;
    }
    if let Some(prev) = prev {
        prev.lock().next = Some(Arc::clone(&next));
        next.lock().prev = Some(Arc::downgrade(&prev));
    }
    Some(next)
}

// -----------------------------------------------------------------------------
// Copy sets
// -----------------------------------------------------------------------------

/// Registers `other` as a copy of `node` and vice versa. With `cascade`
/// set, every member already known to `node` is introduced to `other` as
/// well, so the whole set stays symmetric and transitively closed without
/// re-entrancy.
pub(crate) fn add_to_copies<T>(node: &Node<T>, other: &Node<T>, cascade: bool) {
    if Arc::ptr_eq(node, other) {
        return;
    }
    let members = {
        let mut state = node.lock();
        let known = state
            .copies
            .iter()
            .any(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(other)));
        if !known {
            state.copies.push(Arc::downgrade(other));
        }
        if cascade {
            state
                .copies
                .iter()
                .filter_map(Weak::upgrade)
                .collect::<Vec<_>>()
        } else {
            Vec::new()
        }
    };
    if cascade {
        add_to_copies(other, node, false);
        for member in members {
            if Arc::ptr_eq(&member, other) {
                continue;
            }
            add_to_copies(&member, other, false);
            add_to_copies(other, &member, false);
        }
    }
}

/// Withdraws `node` from every copy set it is a member of and empties its
/// own set. Called on every item destruction so stale back-references never
/// accumulate.
pub(crate) fn remove_from_copies<T>(node: &Node<T>) {
    let members: Vec<Node<T>> = {
        let mut state = node.lock();
        let members = state.copies.iter().filter_map(Weak::upgrade).collect();
        state.copies.clear();
        members
    };
    let own = Arc::as_ptr(node);
    for member in members {
        member
            .lock()
            .copies
            .retain(|weak| !std::ptr::eq(weak.as_ptr(), own));
    }
}

// -----------------------------------------------------------------------------
// Public handle
// -----------------------------------------------------------------------------

/// A handle to one item of a ring.
///
/// The handle keeps the item's storage alive but confers no ring
/// membership; an item removed by another thread simply stops being
/// reachable from its ring while existing handles stay valid.
pub struct Item<T> {
    pub(crate) node: Node<T>,
}

impl<T> Item<T> {
    /// The stored payload.
    pub fn payload(&self) -> Arc<T> {
        self.node.payload()
    }

    /// The item's position at the last renumbering.
    pub fn nr(&self) -> i32 {
        self.node.nr()
    }

    /// The item's integer key.
    pub fn id(&self) -> u32 {
        self.node.id()
    }

    /// The item's text key.
    pub fn name(&self) -> String {
        self.node.name()
    }

    /// How many items across all rings reference this payload.
    pub fn ref_count(&self) -> i32 {
        self.node.ref_count()
    }
}

impl<T> Clone for Item<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<T> std::fmt::Debug for Item<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.node.lock();
        f.debug_struct("Item")
            .field("nr", &state.nr)
            .field("id", &state.id)
            .field("name", &state.name)
            .field("copies", &state.copies.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(value: i32) -> Node<i32> {
        ItemCore::new(Arc::new(value), 0, 0, String::new())
    }

    #[test]
    fn test_link_solo_is_self_cycle() {
        let a = node(1);
        link_solo(&a);
        assert!(Arc::ptr_eq(&a.next().unwrap(), &a));
        assert!(Arc::ptr_eq(&a.prev().unwrap(), &a));
        // Break the cycle so the test does not leak.
        assert!(unlink(&a).is_none());
    }

    #[test]
    fn test_splice_and_unlink() {
        let a = node(1);
        let b = node(2);
        let c = node(3);
        link_solo(&a);
        splice_between(&b, &a, &a).unwrap();
        splice_between(&c, &b, &a).unwrap();

        // a -> b -> c -> a
        assert!(Arc::ptr_eq(&a.next().unwrap(), &b));
        assert!(Arc::ptr_eq(&b.next().unwrap(), &c));
        assert!(Arc::ptr_eq(&c.next().unwrap(), &a));
        assert!(Arc::ptr_eq(&a.prev().unwrap(), &c));

        let survivor = unlink(&b).unwrap();
        assert!(Arc::ptr_eq(&survivor, &c));
        assert!(Arc::ptr_eq(&a.next().unwrap(), &c));
        assert!(Arc::ptr_eq(&c.prev().unwrap(), &a));
        assert!(b.next().is_none());

        assert!(unlink(&c).is_some());
        assert!(unlink(&a).is_none());
    }

    #[test]
    fn test_splice_detects_stray_neighbors() {
        let a = node(1);
        let b = node(2);
        let c = node(3);
        let d = node(4);
        link_solo(&a);
        splice_between(&b, &a, &a).unwrap();
        // c declared between a and b is fine, d declared between a and b is
        // stale once c went in.
        splice_between(&c, &a, &b).unwrap();
        assert!(matches!(
            splice_between(&d, &a, &b),
            Err(RingError::StrayItem)
        ));
        // Chain is untouched by the failed splice.
        assert!(Arc::ptr_eq(&a.next().unwrap(), &c));

        assert!(unlink(&b).is_some());
        assert!(unlink(&c).is_some());
        assert!(unlink(&a).is_none());
    }

    #[test]
    fn test_copy_cascade_is_symmetric_and_closed() {
        let a = node(7);
        let b = node(7);
        let c = node(7);

        add_to_copies(&a, &b, true);
        add_to_copies(&a, &c, true);

        assert_eq!(a.ref_count(), 3);
        assert_eq!(b.ref_count(), 3);
        assert_eq!(c.ref_count(), 3);

        remove_from_copies(&b);
        assert_eq!(a.ref_count(), 2);
        assert_eq!(b.ref_count(), 1);
        assert_eq!(c.ref_count(), 2);
    }

    #[test]
    fn test_copy_set_ignores_dead_members() {
        let a = node(9);
        {
            let b = node(9);
            add_to_copies(&a, &b, true);
            assert_eq!(a.ref_count(), 2);
        }
        // b dropped without explicit removal; the dead weak no longer counts.
        assert_eq!(a.ref_count(), 1);
    }
}
