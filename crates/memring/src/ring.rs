//! The ring: a typed circular container over items.
//!
//! A `Ring<T>` is a handle onto shared storage, cheap to clone and safe to
//! send across threads. The authoritative structure (root, cursor, key maps,
//! element count) lives behind one container mutex; the element count and the
//! root identity are mirrored into atomics so that views can re-synchronize
//! and readers can ask for `len` without blocking.
//!
//! Numbering starts at 0 on the root item. Every method that takes a
//! position accepts negative numbers (counted from the end) and wraps
//! numbers that are out of range, so with ten items position 15 is position
//! 5 and position -1 is position 9. Position-changing mutations only flag
//! the ring as needing renumbering; the next position-dependent operation
//! renumbers under the lock.

use crate::config::RingConfig;
use crate::error::{Result, RingError};
use crate::factory::{self, FactoryCore};
use crate::invariants::{
    debug_assert_map_bounded, debug_assert_root_consistent, debug_assert_tail_nr,
};
use crate::item::{self, Item, ItemCore, Node};
use crate::serial;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Display;
use std::io::{BufRead, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

// -----------------------------------------------------------------------------
// Sort probes
// -----------------------------------------------------------------------------

/// Snapshot of the keys of the element being placed by an ordered search.
pub(crate) struct SortProbe<T> {
    pub payload: Arc<T>,
    pub id: u32,
    pub name_folded: String,
}

impl<T> SortProbe<T> {
    pub(crate) fn of(node: &Node<T>) -> Self {
        let state = node.lock();
        Self {
            payload: state.payload.clone(),
            id: state.id,
            name_folded: fold_name(&state.name),
        }
    }
}

/// Case folding used for all name ordering; name sorts are case-insensitive.
pub(crate) fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

/// Compares a candidate item against a probe by payload value.
pub(crate) fn cmp_by_data<T: Ord>(candidate: &Node<T>, probe: &SortProbe<T>) -> Ordering {
    candidate.payload().as_ref().cmp(probe.payload.as_ref())
}

/// Compares a candidate item against a probe by id.
pub(crate) fn cmp_by_id<T>(candidate: &Node<T>, probe: &SortProbe<T>) -> Ordering {
    candidate.id().cmp(&probe.id)
}

/// Compares a candidate item against a probe by folded name.
pub(crate) fn cmp_by_name<T>(candidate: &Node<T>, probe: &SortProbe<T>) -> Ordering {
    fold_name(&candidate.name()).cmp(&probe.name_folded)
}

// -----------------------------------------------------------------------------
// Position normalization
// -----------------------------------------------------------------------------

/// Folds a signed position into `[0, len)`.
///
/// With two items every odd input is position 1; with one item everything is
/// position 0. Callers must handle the empty case themselves.
pub(crate) fn normalize_nr(len: usize, nr: i32) -> i32 {
    let ilen = len as i32;
    if ilen > 2 {
        let mut result = nr;
        if result >= ilen {
            result %= ilen;
        } else if result < 0 {
            result = ilen - (nr.unsigned_abs() as i32 % ilen);
            result %= ilen;
        }
        result
    } else if ilen == 2 {
        nr.unsigned_abs() as i32 % 2
    } else {
        0
    }
}

// -----------------------------------------------------------------------------
// Ring state
// -----------------------------------------------------------------------------

/// The authoritative, lock-guarded state of a ring.
pub(crate) struct RingState<T> {
    pub(crate) root: Option<Node<T>>,
    pub(crate) cursor: Option<Node<T>>,
    pub(crate) len: usize,
    pub(crate) max_id: u32,
    pub(crate) id_map: HashMap<u32, Node<T>>,
    pub(crate) name_map: HashMap<String, Node<T>>,
    pub(crate) id_map_used: bool,
    pub(crate) name_map_used: bool,
    pub(crate) needs_renumber: bool,
    pub(crate) name: String,
    pub(crate) owner: Option<Weak<FactoryCore>>,
}

impl<T> RingState<T> {
    fn is_root(&self, node: &Node<T>) -> bool {
        self.root
            .as_ref()
            .map(|root| Arc::ptr_eq(root, node))
            .unwrap_or(false)
    }

    /// Recomputes every item's position from the root forward, then clears
    /// the renumber flag.
    pub(crate) fn ensure_numbered(&mut self) {
        if !self.needs_renumber {
            return;
        }
        if let Some(root) = self.root.clone() {
            let mut nr = 0i32;
            let mut node = root.clone();
            loop {
                node.lock().nr = nr;
                nr += 1;
                let Some(next) = node.next() else { break };
                if Arc::ptr_eq(&next, &root) {
                    break;
                }
                node = next;
            }
            debug_assert_tail_nr!(nr - 1, self.len);
        }
        self.needs_renumber = false;
    }

    /// Parks the cursor on the item with the given (already folded)
    /// position. `-1` is accepted as a shortcut for the tail.
    pub(crate) fn seek_nr(&mut self, nr: i32) -> Option<Node<T>> {
        if self.len == 0 {
            return None;
        }
        self.ensure_numbered();
        let len = self.len as i32;
        let target = if nr == -1 { len - 1 } else { nr };
        if target < 0 || target >= len {
            return None;
        }
        let root = self.root.clone()?;

        // Fast paths: the cursor itself and its direct neighbors serve loop
        // patterns without any walking. A detached cursor (no forward link)
        // never qualifies.
        if let Some(cursor) = self.cursor.clone().filter(|c| c.next().is_some()) {
            if cursor.nr() == target {
                return Some(cursor);
            }
            if let Some(next) = cursor.next() {
                if next.nr() == target {
                    self.cursor = Some(next.clone());
                    return Some(next);
                }
            }
            if let Some(prev) = cursor.prev() {
                if prev.nr() == target {
                    self.cursor = Some(prev.clone());
                    return Some(prev);
                }
            }
        }

        // Pick the cheapest of four walks: up or down from the root, up or
        // down from the cursor.
        let cursor_nr = self.cursor.as_ref().map(|c| c.nr());
        let (mut node, mut forward, mut distance) = match cursor_nr {
            Some(nr_now) => {
                let from_cursor = (target - nr_now).abs();
                let up_from_root = target;
                let down_from_root = len - target;
                if up_from_root <= from_cursor && up_from_root <= down_from_root {
                    (root.clone(), true, up_from_root)
                } else if down_from_root <= from_cursor {
                    (root.clone(), false, down_from_root)
                } else {
                    (
                        self.cursor.clone().unwrap_or_else(|| root.clone()),
                        target > nr_now,
                        from_cursor,
                    )
                }
            }
            None => {
                if target <= len - target {
                    (root.clone(), true, target)
                } else {
                    (root.clone(), false, len - target)
                }
            }
        };
        while distance > 0 && node.nr() != target {
            let step = if forward { node.next() } else { node.prev() };
            match step {
                Some(next) => node = next,
                None => {
                    // A neighbor vanished mid-walk; restart from the root.
                    node = root.clone();
                    forward = true;
                    distance = target + 1;
                }
            }
            distance -= 1;
        }
        if node.nr() == target {
            self.cursor = Some(node.clone());
            Some(node)
        } else {
            None
        }
    }

    /// Parks the cursor on the first item with the given id, using the id
    /// map when active.
    pub(crate) fn seek_id(&mut self, id: u32) -> Option<Node<T>> {
        if let Some(cursor) = self.cursor.clone().filter(|c| c.next().is_some()) {
            if cursor.id() == id {
                return Some(cursor);
            }
        }
        if self.id_map_used {
            let hit = self.id_map.get(&id).cloned()?;
            self.cursor = Some(hit.clone());
            return Some(hit);
        }
        self.seek_where(|node| node.id() == id)
    }

    /// Parks the cursor on the first item with the given name, using the
    /// name map when active.
    pub(crate) fn seek_name(&mut self, name: &str) -> Option<Node<T>> {
        if let Some(cursor) = self.cursor.clone().filter(|c| c.next().is_some()) {
            if cursor.lock().name == name {
                return Some(cursor);
            }
        }
        if self.name_map_used {
            let hit = self.name_map.get(name).cloned()?;
            self.cursor = Some(hit.clone());
            return Some(hit);
        }
        self.seek_where(|node| node.lock().name == name)
    }

    /// Parks the cursor on the first item whose payload has the given
    /// address.
    pub(crate) fn seek_payload(&mut self, payload: &Arc<T>) -> Option<Node<T>> {
        let wanted = Arc::as_ptr(payload);
        if let Some(cursor) = self.cursor.clone().filter(|c| c.next().is_some()) {
            if Arc::as_ptr(&cursor.lock().payload) == wanted {
                return Some(cursor);
            }
        }
        self.seek_where(|node| Arc::as_ptr(&node.lock().payload) == wanted)
    }

    /// Walks the whole ring until the predicate matches. Tolerates a
    /// forward link going away mid-walk by re-deriving it from the prior
    /// neighbor, as concurrent unlinks briefly null it.
    fn seek_where(&mut self, matches: impl Fn(&Node<T>) -> bool) -> Option<Node<T>> {
        let root = self.root.clone()?;
        let mut node = root.clone();
        let mut prior = root.clone();
        let mut steps = 0usize;
        let limit = self.len + 2;
        loop {
            if matches(&node) {
                self.cursor = Some(node.clone());
                return Some(node);
            }
            let next = node.next().or_else(|| prior.next());
            let next = next?;
            if Arc::ptr_eq(&next, &root) {
                return None;
            }
            prior = node;
            node = next;
            steps += 1;
            if steps > limit {
                return None;
            }
        }
    }

    /// Ordered position search anchored at the cursor.
    ///
    /// Returns the position the probe should be inserted *before*, or `-1`
    /// if it belongs after the tail. On a non-negative result the cursor is
    /// parked on the item to insert before; on `-1` it is parked on the
    /// future predecessor. Items comparing equal count as correctly placed,
    /// otherwise equal but ordered items would swap forever.
    pub(crate) fn seek_ordered(
        &mut self,
        asc: bool,
        cmp: &dyn Fn(&Node<T>) -> Ordering,
    ) -> i32 {
        self.ensure_numbered();
        let Some(root) = self.root.clone() else {
            return 0;
        };
        let fits_here = |node: &Node<T>| {
            // "not smaller" than the probe in sort direction
            if asc {
                cmp(node) != Ordering::Less
            } else {
                cmp(node) != Ordering::Greater
            }
        };
        let prev_is_smaller = |node: &Node<T>| {
            if asc {
                cmp(node) != Ordering::Greater
            } else {
                cmp(node) != Ordering::Less
            }
        };

        if self.len > 1 {
            let mut up = true;
            let mut cur = self.cursor.clone().unwrap_or_else(|| root.clone());
            let mut steps = 0usize;
            let limit = self.len * 2 + 4;
            while steps <= limit {
                steps += 1;
                let (Some(prev), Some(next)) = (cur.prev(), cur.next()) else {
                    cur = root.clone();
                    continue;
                };
                let smaller_prev = prev_is_smaller(&prev);
                if fits_here(&cur) {
                    if Arc::ptr_eq(&cur, &root) || smaller_prev {
                        self.cursor = Some(cur.clone());
                        return cur.nr();
                    }
                    if up && !Arc::ptr_eq(&cur, &root) && !smaller_prev {
                        up = false;
                    }
                } else {
                    if Arc::ptr_eq(&next, &root) && smaller_prev {
                        self.cursor = Some(cur.clone());
                        return -1;
                    }
                    if Arc::ptr_eq(&cur, &root) || (!up && smaller_prev) {
                        up = true;
                    }
                }
                cur = if up { next } else { prev };
            }
        }

        // Down to checking the root alone.
        self.cursor = Some(root.clone());
        if fits_here(&root) {
            0
        } else {
            -1
        }
    }

    /// Mints a unique id. The watermark advances on every call so that name
    /// synthesis stays cheap.
    pub(crate) fn unique_id(&mut self, requested: u32) -> u32 {
        let mut result = if requested == 0 { 1 } else { requested };
        self.max_id += 1;
        if self.id_map_used && self.id_map.contains_key(&result) {
            result = self.max_id;
        } else if result > self.max_id {
            self.max_id = result;
        }
        result
    }

    /// Mints a unique name. Empty requests synthesize one from the id
    /// watermark; collisions grow a numeric suffix.
    pub(crate) fn unique_name(&mut self, requested: &str) -> String {
        let base = if requested.is_empty() {
            format!("data_{:010}", self.max_id)
        } else {
            requested.to_string()
        };
        if !self.name_map.contains_key(&base) {
            return base;
        }
        let mut counter = 0u32;
        loop {
            counter += 1;
            let candidate = format!("{base}_{counter:08}");
            if !self.name_map.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Attaches a freshly created, registered item at the requested
    /// position, uniquifying its keys and filling the maps. On a map
    /// failure the item is fully rolled back before the error surfaces.
    fn attach_new(&mut self, node: &Node<T>, a_nr: i32) -> Result<i32> {
        let restore_cursor = self.cursor.clone();

        // Resolve final keys before the item becomes reachable.
        let (requested_id, requested_name) = {
            let state = node.lock();
            (state.id, state.name.clone())
        };
        let final_id = if self.id_map_used {
            self.unique_id(requested_id)
        } else {
            if requested_id > self.max_id {
                self.max_id = requested_id;
            }
            requested_id
        };
        let final_name = if self.name_map_used {
            self.unique_name(&requested_name)
        } else if requested_name.is_empty() {
            "Item".to_string()
        } else {
            requested_name
        };
        {
            let mut state = node.lock();
            state.id = final_id;
            state.name = final_name.clone();
        }

        if let Err(error) = self.place_new(node, a_nr) {
            // Not linked, but possibly already announced to copies.
            item::remove_from_copies(node);
            self.cursor = restore_cursor;
            return Err(error);
        }
        self.cursor = Some(Arc::clone(node));

        // Fill the maps, rolling the insertion back if a key is already
        // taken despite the uniquifier (a map was toggled mid-flight).
        if self.id_map_used {
            if self.id_map.contains_key(&final_id) {
                self.rollback_insert(node, restore_cursor);
                return Err(RingError::NoIdMapAvailable);
            }
            self.id_map.insert(final_id, Arc::clone(node));
        }
        if self.name_map_used {
            if self.name_map.contains_key(&final_name) {
                self.rollback_insert(node, restore_cursor);
                return Err(RingError::NoNameMapAvailable);
            }
            self.name_map.insert(final_name, Arc::clone(node));
        }

        debug_assert_root_consistent!(self.root, self.len);
        debug_assert_map_bounded!(self.id_map.len(), self.len);
        debug_assert_map_bounded!(self.name_map.len(), self.len);

        self.ensure_numbered();
        Ok(node.nr())
    }

    /// Links a keyed, registered item at the requested position.
    fn place_new(&mut self, node: &Node<T>, a_nr: i32) -> Result<()> {
        let folded = if a_nr < -1 || a_nr >= self.len as i32 {
            normalize_nr(self.len, a_nr)
        } else {
            a_nr
        };
        if self.root.is_none() {
            item::link_solo(node);
            self.root = Some(Arc::clone(node));
            self.len = 1;
            return Ok(());
        }
        let anchor = self
            .seek_nr(if a_nr == -1 { -1 } else { folded })
            .or_else(|| self.root.clone())
            .ok_or(RingError::CantCreateItem)?;
        if a_nr < 0 {
            // negative: new item goes after the anchor
            let next = anchor.next().ok_or(RingError::StrayItem)?;
            item::splice_between(node, &anchor, &next)?;
            if Arc::ptr_eq(&next, self.root.as_ref().ok_or(RingError::StrayItem)?) {
                // appended at the tail: numbering stays intact
                node.lock().nr = anchor.nr() + 1;
            } else {
                self.needs_renumber = true;
            }
        } else {
            // positive: new item takes the anchor's position
            let prev = anchor.prev().ok_or(RingError::StrayItem)?;
            item::splice_between(node, &prev, &anchor)?;
            if self.is_root(&anchor) {
                self.root = Some(Arc::clone(node));
            }
            self.needs_renumber = true;
        }
        self.len += 1;
        Ok(())
    }

    /// Reverts a partially completed insertion: the node leaves the chain,
    /// its copy registrations, the count and the cursor are restored.
    fn rollback_insert(&mut self, node: &Node<T>, restore_cursor: Option<Node<T>>) {
        let final_id = node.id();
        self.id_map.retain(|&id, entry| {
            id != final_id || !Arc::ptr_eq(entry, node)
        });
        item::remove_from_copies(node);
        let was_root = self.is_root(node);
        let survivor = item::unlink(node);
        if was_root {
            self.root = survivor;
        }
        self.len -= 1;
        if self.len == 0 {
            self.root = None;
            self.cursor = None;
        } else {
            self.cursor = restore_cursor.or_else(|| self.root.clone());
        }
        self.needs_renumber = true;
    }

    /// Detaches a node, parking the cursor on its predecessor (or on the
    /// old successor when the root died) and keeping the maps in sync.
    /// Returns the payload so the caller decides whether to hand it out.
    pub(crate) fn detach(&mut self, node: &Node<T>) -> Arc<T> {
        let was_root = self.is_root(node);
        let parked = if was_root { node.next() } else { node.prev() };
        let (old_id, old_name, payload) = {
            let state = node.lock();
            (state.id, state.name.clone(), state.payload.clone())
        };

        item::remove_from_copies(node);
        let survivor = item::unlink(node);
        self.len -= 1;
        if was_root {
            self.root = survivor;
        }
        self.needs_renumber = true;
        if self.len == 0 {
            self.root = None;
            self.cursor = None;
        } else {
            self.cursor = parked
                .filter(|p| !Arc::ptr_eq(p, node))
                .or_else(|| self.root.clone());
        }

        if self.id_map_used && self.id_map.remove(&old_id).is_none() {
            self.rebuild_id_map();
        }
        if self.name_map_used && !old_name.is_empty() && self.name_map.remove(&old_name).is_none()
        {
            self.rebuild_name_map();
        }

        debug_assert_root_consistent!(self.root, self.len);
        payload
    }

    /// Moves an already linked node directly before or after a target.
    pub(crate) fn relocate(&mut self, source: &Node<T>, target: &Node<T>, after: bool) -> Result<()> {
        if Arc::ptr_eq(source, target) {
            return Ok(());
        }
        let was_root = self.is_root(source);
        let survivor = item::unlink(source);
        if was_root {
            self.root = survivor.clone();
        }
        if survivor.is_none() {
            // The source was alone; nothing to order against.
            item::link_solo(source);
            self.root = Some(Arc::clone(source));
            return Ok(());
        }
        if after {
            let next = target.next().ok_or(RingError::StrayItem)?;
            item::splice_between(source, target, &next)?;
        } else {
            let prev = target.prev().ok_or(RingError::StrayItem)?;
            item::splice_between(source, &prev, target)?;
            if self.is_root(target) {
                self.root = Some(Arc::clone(source));
            }
        }
        self.needs_renumber = true;
        Ok(())
    }

    /// One sorting pass. Walks every item once, moving each to the position
    /// the ordered search picks, and returns the number of moves.
    pub(crate) fn sort_pass(
        &mut self,
        asc: bool,
        cmp: &dyn Fn(&Node<T>, &SortProbe<T>) -> Ordering,
    ) -> Result<i32> {
        let mut moved = 0;
        if self.len > 2 {
            self.ensure_numbered();
            let Some(root) = self.root.clone() else {
                return Ok(0);
            };
            let mut cur = root.clone();
            let mut steps = 0usize;
            let limit = self.len * 2 + 4;
            loop {
                let Some(captured_next) = cur.next() else { break };
                self.ensure_numbered();
                let old_nr = cur.nr();
                let probe = SortProbe::of(&cur);
                self.cursor = Some(cur.clone());
                let new_nr = self.seek_ordered(asc, &|node| cmp(node, &probe));
                if new_nr != old_nr {
                    if let Some(target) = self.cursor.clone() {
                        if !Arc::ptr_eq(&target, &cur) {
                            self.relocate(&cur, &target, new_nr < 0)?;
                            moved += 1;
                        }
                    }
                }
                if Arc::ptr_eq(&captured_next, &root) {
                    break;
                }
                cur = captured_next;
                steps += 1;
                if steps > limit {
                    break;
                }
            }
            self.ensure_numbered();
        } else if self.len == 2 {
            moved += self.sort_two(asc, cmp);
        }
        Ok(moved)
    }

    /// Two-item short circuit: a single conditional swap of root and tail.
    pub(crate) fn sort_two(
        &mut self,
        asc: bool,
        cmp: &dyn Fn(&Node<T>, &SortProbe<T>) -> Ordering,
    ) -> i32 {
        let Some(root) = self.root.clone() else { return 0 };
        let Some(second) = root.next() else { return 0 };
        if Arc::ptr_eq(&second, &root) {
            return 0;
        }
        let probe = SortProbe::of(&second);
        let out_of_order = if asc {
            cmp(&root, &probe) == Ordering::Greater
        } else {
            cmp(&root, &probe) == Ordering::Less
        };
        if out_of_order {
            root.lock().nr = 1;
            second.lock().nr = 0;
            self.root = Some(second);
            1
        } else {
            0
        }
    }

    /// Rebuilds the id map from the chain. A collision during the rebuild
    /// clears the map and turns its use off; rebuild paths must not fail.
    pub(crate) fn rebuild_id_map(&mut self) {
        self.id_map.clear();
        if !self.id_map_used {
            return;
        }
        let Some(root) = self.root.clone() else { return };
        let mut node = root.clone();
        loop {
            let id = node.id();
            if self.id_map.contains_key(&id) {
                tracing::warn!(id, "id collision while rebuilding; id map disabled");
                self.id_map.clear();
                self.id_map_used = false;
                return;
            }
            self.id_map.insert(id, node.clone());
            let Some(next) = node.next() else { return };
            if Arc::ptr_eq(&next, &root) {
                return;
            }
            node = next;
        }
    }

    /// As [`RingState::rebuild_id_map`], for the name map.
    pub(crate) fn rebuild_name_map(&mut self) {
        self.name_map.clear();
        if !self.name_map_used {
            return;
        }
        let Some(root) = self.root.clone() else { return };
        let mut node = root.clone();
        loop {
            let name = node.name();
            if self.name_map.contains_key(&name) {
                tracing::warn!(name = %name, "name collision while rebuilding; name map disabled");
                self.name_map.clear();
                self.name_map_used = false;
                return;
            }
            self.name_map.insert(name, node.clone());
            let Some(next) = node.next() else { return };
            if Arc::ptr_eq(&next, &root) {
                return;
            }
            node = next;
        }
    }

    /// Clears every item, tail to head, with both maps disabled for the
    /// bulk run so no per-item map bookkeeping happens.
    fn clear_items(&mut self) {
        let id_state = self.id_map_used;
        let name_state = self.name_map_used;
        self.id_map_used = false;
        self.name_map_used = false;
        self.id_map.clear();
        self.name_map.clear();

        while let Some(root) = self.root.clone() {
            let tail = root.prev().unwrap_or(root);
            self.detach(&tail);
        }

        self.id_map_used = id_state;
        self.name_map_used = name_state;
        self.max_id = 0;
        debug_assert_root_consistent!(self.root, self.len);
    }

    /// Snapshot of every item in ring order.
    pub(crate) fn nodes(&self) -> Vec<Node<T>> {
        let mut out = Vec::with_capacity(self.len);
        let Some(root) = self.root.clone() else {
            return out;
        };
        let mut node = root.clone();
        loop {
            out.push(node.clone());
            let Some(next) = node.next() else { break };
            if Arc::ptr_eq(&next, &root) {
                break;
            }
            node = next;
        }
        out
    }
}

// -----------------------------------------------------------------------------
// Ring core and handle
// -----------------------------------------------------------------------------

/// Shared backing storage of a ring.
pub(crate) struct RingCore<T> {
    state: Mutex<RingState<T>>,
    /// Lock-free mirror of the element count.
    len: AtomicUsize,
    /// Lock-free identity of the current root allocation, 0 when empty.
    root_tag: AtomicUsize,
    /// Set once the ring is torn down; views degrade to no-ops.
    destroyed: AtomicBool,
    /// Cross-ring reference tracking; can only ever be switched off.
    track_refs: AtomicBool,
}

impl<T> RingCore<T> {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, RingState<T>> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Publishes the lock-free mirrors from the locked state.
    pub(crate) fn publish(&self, state: &RingState<T>) {
        self.len.store(state.len, AtomicOrdering::Release);
        let tag = state
            .root
            .as_ref()
            .map(|root| Arc::as_ptr(root) as usize)
            .unwrap_or(0);
        self.root_tag.store(tag, AtomicOrdering::Release);
    }

    pub(crate) fn len_hint(&self) -> usize {
        self.len.load(AtomicOrdering::Acquire)
    }

    pub(crate) fn root_tag(&self) -> usize {
        self.root_tag.load(AtomicOrdering::Acquire)
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(AtomicOrdering::Acquire)
    }

    pub(crate) fn is_tracking(&self) -> bool {
        self.track_refs.load(AtomicOrdering::Acquire)
    }
}

impl<T> Drop for RingCore<T> {
    fn drop(&mut self) {
        // Sever the strong forward cycle so all items are released. Copy
        // registrations in other rings are withdrawn best-effort.
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.cursor = None;
        let Some(first) = state.root.take() else { return };
        item::remove_from_copies(&first);
        let mut next = first.lock().next.take();
        while let Some(node) = next {
            if Arc::ptr_eq(&node, &first) {
                break;
            }
            item::remove_from_copies(&node);
            next = node.lock().next.take();
        }
    }
}

/// A typed circular container. Cloning the handle shares the storage.
pub struct Ring<T> {
    pub(crate) core: Arc<RingCore<T>>,
}

impl<T> Clone for Ring<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Send + Sync + 'static> Ring<T> {
    /// Creates a standalone ring. Rings created through a factory take part
    /// in cross-ring reference tracking; standalone rings track only what
    /// is explicitly introduced via [`Ring::extend_from`].
    pub fn new(config: &RingConfig) -> Self {
        Self::build(config, None)
    }

    pub(crate) fn build(config: &RingConfig, owner: Option<Weak<FactoryCore>>) -> Self {
        Self {
            core: Arc::new(RingCore {
                state: Mutex::new(RingState {
                    root: None,
                    cursor: None,
                    len: 0,
                    max_id: 0,
                    id_map: HashMap::new(),
                    name_map: HashMap::new(),
                    id_map_used: config.use_id_map,
                    name_map_used: config.use_name_map,
                    needs_renumber: false,
                    name: config.name.to_string(),
                    owner,
                }),
                len: AtomicUsize::new(0),
                root_tag: AtomicUsize::new(0),
                destroyed: AtomicBool::new(false),
                track_refs: AtomicBool::new(config.track_refs),
            }),
        }
    }

    // ---------------------------------------------------------------------
    // STATUS
    // ---------------------------------------------------------------------

    /// Element count. Reads the atomic mirror and never blocks.
    #[inline]
    pub fn len(&self) -> usize {
        self.core.len_hint()
    }

    /// Returns `true` if the ring holds no items. Never blocks.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The ring's display name.
    pub fn name(&self) -> String {
        self.core.lock_state().name.clone()
    }

    /// Renames the ring. The registry entry of a factory-owned ring keeps
    /// its own name.
    pub fn set_name(&self, name: &str) {
        self.core.lock_state().name = name.to_string();
    }

    /// Current id watermark.
    pub fn max_id(&self) -> u32 {
        self.core.lock_state().max_id
    }

    /// Whether the id map is active.
    pub fn is_id_map_used(&self) -> bool {
        self.core.lock_state().id_map_used
    }

    /// Whether the name map is active.
    pub fn is_name_map_used(&self) -> bool {
        self.core.lock_state().name_map_used
    }

    /// Whether this ring participates in cross-ring reference tracking.
    pub fn is_tracking(&self) -> bool {
        self.core.is_tracking()
    }

    /// Switches cross-ring reference tracking off, irreversibly. Payload
    /// deletion then no longer consults copy sets; a payload shared with
    /// another ring is simply released late instead of being kept alive
    /// deliberately.
    pub fn disable_tracking(&self) {
        self.core.track_refs.store(false, AtomicOrdering::Release);
    }

    // ---------------------------------------------------------------------
    // INSERTION
    // ---------------------------------------------------------------------

    /// Appends a payload. Keys are uniquified when the maps require it; the
    /// final position is returned.
    pub fn add(&self, payload: Arc<T>, id: u32, name: &str) -> Result<i32> {
        self.insert(payload, -1, id, name)
    }

    /// Appends a plain value.
    pub fn add_value(&self, value: T, id: u32, name: &str) -> Result<i32> {
        self.add(Arc::new(value), id, name)
    }

    /// Inserts a payload at a position. A non-negative `nr` pushes the
    /// current occupant of that position forward; a negative `nr` places
    /// the new item directly after the item at the (wrapped) negative
    /// position, so `0` prepends and `-1` appends.
    pub fn insert(&self, payload: Arc<T>, nr: i32, id: u32, name: &str) -> Result<i32> {
        self.insert_with(payload, id, name, None, false, move |_| nr)
            .map(|(final_nr, _)| final_nr)
    }

    /// Inserts a plain value at a position.
    pub fn insert_value(&self, value: T, nr: i32, id: u32, name: &str) -> Result<i32> {
        self.insert(Arc::new(value), nr, id, name)
    }

    /// Inserts a payload before the first item that compares greater
    /// (ascending) or lesser (descending). Requires a total order on `T`.
    pub fn insert_sorted(&self, payload: Arc<T>, id: u32, name: &str, asc: bool) -> Result<i32>
    where
        T: Ord,
    {
        let probe = SortProbe {
            payload: payload.clone(),
            id,
            name_folded: fold_name(name),
        };
        self.insert_with(payload, id, name, None, false, move |state| {
            state.seek_ordered(asc, &|node| cmp_by_data(node, &probe))
        })
        .map(|(final_nr, _)| final_nr)
    }

    /// Inserts a plain value at its sorted position.
    pub fn insert_sorted_value(&self, value: T, id: u32, name: &str, asc: bool) -> Result<i32>
    where
        T: Ord,
    {
        self.insert_sorted(Arc::new(value), id, name, asc)
    }

    /// Appends a payload as the new last item.
    pub fn push(&self, payload: Arc<T>, id: u32, name: &str) -> Result<()> {
        self.insert(payload, -1, id, name).map(|_| ())
    }

    /// Appends a plain value as the new last item.
    pub fn push_value(&self, value: T, id: u32, name: &str) -> Result<()> {
        self.push(Arc::new(value), id, name)
    }

    /// Prepends a payload as the new first item.
    pub fn unshift(&self, payload: Arc<T>, id: u32, name: &str) -> Result<()> {
        self.insert(payload, 0, id, name).map(|_| ())
    }

    /// Prepends a plain value as the new first item.
    pub fn unshift_value(&self, value: T, id: u32, name: &str) -> Result<()> {
        self.unshift(Arc::new(value), id, name)
    }

    /// Shared insertion path. Registers the item with the owning factory
    /// before it becomes reachable, resolves the position under the lock,
    /// attaches and reports the final position together with the node.
    pub(crate) fn insert_with(
        &self,
        payload: Arc<T>,
        id: u32,
        name: &str,
        cursor_hint: Option<Option<Node<T>>>,
        restore_cursor: bool,
        resolve_nr: impl FnOnce(&mut RingState<T>) -> i32,
    ) -> Result<(i32, Node<T>)> {
        let node = ItemCore::new(payload, 0, id, name.to_string());
        self.register_with_owner(&node);

        let mut state = self.core.lock_state();
        let outer_cursor = state.cursor.clone();
        if let Some(hint) = cursor_hint {
            state.cursor = hint;
        }
        let a_nr = resolve_nr(&mut state);
        let attached = state.attach_new(&node, a_nr);
        if restore_cursor {
            state.cursor = outer_cursor;
        }
        self.core.publish(&state);
        match attached {
            Ok(final_nr) => Ok((final_nr, node)),
            Err(error) => Err(error),
        }
    }

    /// Announces a new item to the owning factory so its copy set is
    /// complete before any other thread can observe the item. Failures in
    /// the cascade are logged and forgotten; they never corrupt the ring.
    fn register_with_owner(&self, node: &Node<T>) {
        if !self.core.is_tracking() {
            return;
        }
        let (owner, had_owner) = {
            let state = self.core.lock_state();
            (
                state.owner.as_ref().and_then(Weak::upgrade),
                state.owner.is_some(),
            )
        };
        match owner {
            Some(owner) => factory::register_node(&owner, node),
            None if had_owner => {
                tracing::debug!("owning factory is gone; copy registration skipped");
            }
            None => {}
        }
    }

    // ---------------------------------------------------------------------
    // REMOVAL
    // ---------------------------------------------------------------------

    /// Detaches the last item and hands its payload back, or `None` on an
    /// empty ring.
    pub fn pop(&self) -> Option<Arc<T>> {
        let mut state = self.core.lock_state();
        let tail = state.seek_nr(-1)?;
        let payload = state.detach(&tail);
        self.core.publish(&state);
        Some(payload)
    }

    /// Detaches the first item and hands its payload back, or `None` on an
    /// empty ring.
    pub fn shift(&self) -> Option<Arc<T>> {
        let mut state = self.core.lock_state();
        if state.len == 0 {
            return None;
        }
        let head = state.seek_nr(0)?;
        let payload = state.detach(&head);
        self.core.publish(&state);
        Some(payload)
    }

    /// Detaches the item at the given (wrapped) position and hands its
    /// payload back, or `None` on an empty ring.
    pub fn remove(&self, nr: i32) -> Option<Arc<T>> {
        let mut state = self.core.lock_state();
        if state.len == 0 {
            return None;
        }
        let folded = normalize_nr(state.len, nr);
        let node = state.seek_nr(folded)?;
        let payload = state.detach(&node);
        self.core.publish(&state);
        Some(payload)
    }

    /// Deletes every item with the given id. Without an active id map
    /// several items may share an id and all of them go.
    pub fn del_item_by_id(&self, id: u32) {
        let mut state = self.core.lock_state();
        while let Some(node) = state.seek_id(id) {
            state.detach(&node);
        }
        self.core.publish(&state);
    }

    /// Deletes every item with the given name.
    pub fn del_item_by_name(&self, name: &str) {
        let mut state = self.core.lock_state();
        while let Some(node) = state.seek_name(name) {
            state.detach(&node);
        }
        self.core.publish(&state);
    }

    /// Deletes the item at the given (wrapped) position. Does nothing on an
    /// empty ring.
    pub fn del_item_by_nr(&self, nr: i32) {
        let mut state = self.core.lock_state();
        if state.len == 0 {
            return;
        }
        let folded = normalize_nr(state.len, nr);
        if let Some(node) = state.seek_nr(folded) {
            state.detach(&node);
        }
        self.core.publish(&state);
    }

    /// Deletes every item holding the given payload address and returns how
    /// many were deleted. The payload itself survives as long as copies in
    /// other rings (or caller handles) reference it.
    pub fn erase(&self, payload: &Arc<T>) -> usize {
        let mut state = self.core.lock_state();
        let mut deleted = 0;
        while let Some(node) = state.seek_payload(payload) {
            state.detach(&node);
            deleted += 1;
        }
        self.core.publish(&state);
        deleted
    }

    /// Deletes every item whose payload equals the given value.
    pub fn remove_value(&self, value: &T) -> usize
    where
        T: PartialEq,
    {
        let mut state = self.core.lock_state();
        let mut deleted = 0;
        while let Some(node) = state.seek_where(|n| *n.lock().payload == *value) {
            state.detach(&node);
            deleted += 1;
        }
        self.core.publish(&state);
        deleted
    }

    /// Removes all items. The bulk run goes tail to head with both maps
    /// disabled, then resets the id watermark.
    pub fn clear(&self) {
        let mut state = self.core.lock_state();
        state.clear_items();
        self.core.publish(&state);
    }

    /// Marks the ring destroyed and clears it. The state lock acquisition
    /// drains every operation still in flight; views observe the flag and
    /// become no-ops.
    pub(crate) fn destroy(&self) {
        self.core.destroyed.store(true, AtomicOrdering::Release);
        let mut state = self.core.lock_state();
        state.clear_items();
        self.core.publish(&state);
    }

    // ---------------------------------------------------------------------
    // LOOKUPS
    // ---------------------------------------------------------------------

    /// The payload at the given (wrapped) position.
    pub fn get(&self, nr: i32) -> Result<Arc<T>> {
        let mut state = self.core.lock_state();
        if state.len == 0 {
            return Err(RingError::NrOutOfRange);
        }
        let folded = normalize_nr(state.len, nr);
        let node = state.seek_nr(folded).ok_or(RingError::NrOutOfRange)?;
        Ok(node.payload())
    }

    /// The payload with the given id.
    pub fn get_by_id(&self, id: u32) -> Result<Arc<T>> {
        let mut state = self.core.lock_state();
        let node = state.seek_id(id).ok_or(RingError::IdNotFound { id })?;
        Ok(node.payload())
    }

    /// The payload with the given name.
    pub fn get_by_name(&self, name: &str) -> Result<Arc<T>> {
        let mut state = self.core.lock_state();
        let node = state.seek_name(name).ok_or_else(|| RingError::NameNotFound {
            name: name.to_string(),
        })?;
        Ok(node.payload())
    }

    /// The item at the given (wrapped) position, or `None` on an empty
    /// ring.
    pub fn get_item(&self, nr: i32) -> Option<Item<T>> {
        let mut state = self.core.lock_state();
        if state.len == 0 {
            return None;
        }
        let folded = normalize_nr(state.len, nr);
        state.seek_nr(folded).map(|node| Item { node })
    }

    /// The item with the given id, if any.
    pub fn get_item_by_id(&self, id: u32) -> Option<Item<T>> {
        self.core.lock_state().seek_id(id).map(|node| Item { node })
    }

    /// The item with the given name, if any.
    pub fn get_item_by_name(&self, name: &str) -> Option<Item<T>> {
        self.core
            .lock_state()
            .seek_name(name)
            .map(|node| Item { node })
    }

    /// The item holding the given payload address, if any.
    pub fn find_item(&self, payload: &Arc<T>) -> Option<Item<T>> {
        self.core
            .lock_state()
            .seek_payload(payload)
            .map(|node| Item { node })
    }

    /// The id of the item at the given (wrapped) position.
    pub fn id_of(&self, nr: i32) -> Result<u32> {
        let mut state = self.core.lock_state();
        if state.len == 0 {
            return Err(RingError::NrOutOfRange);
        }
        let folded = normalize_nr(state.len, nr);
        let node = state.seek_nr(folded).ok_or(RingError::NrOutOfRange)?;
        Ok(node.id())
    }

    /// The name of the item at the given (wrapped) position.
    pub fn name_of(&self, nr: i32) -> Result<String> {
        let mut state = self.core.lock_state();
        if state.len == 0 {
            return Err(RingError::NrOutOfRange);
        }
        let folded = normalize_nr(state.len, nr);
        let node = state.seek_nr(folded).ok_or(RingError::NrOutOfRange)?;
        Ok(node.name())
    }

    /// The position of the item with the given id.
    pub fn nr_of_id(&self, id: u32) -> Result<i32> {
        let mut state = self.core.lock_state();
        let node = state.seek_id(id).ok_or(RingError::IdNotFound { id })?;
        state.ensure_numbered();
        Ok(node.nr())
    }

    /// The position of the item with the given name.
    pub fn nr_of_name(&self, name: &str) -> Result<i32> {
        let mut state = self.core.lock_state();
        let node = state.seek_name(name).ok_or_else(|| RingError::NameNotFound {
            name: name.to_string(),
        })?;
        state.ensure_numbered();
        Ok(node.nr())
    }

    /// The id of the item with the given name.
    pub fn id_of_name(&self, name: &str) -> Result<u32> {
        let mut state = self.core.lock_state();
        let node = state.seek_name(name).ok_or_else(|| RingError::NameNotFound {
            name: name.to_string(),
        })?;
        Ok(node.id())
    }

    /// The name of the item with the given id.
    pub fn name_of_id(&self, id: u32) -> Result<String> {
        let mut state = self.core.lock_state();
        let node = state.seek_id(id).ok_or(RingError::IdNotFound { id })?;
        Ok(node.name())
    }

    /// The id of the item holding the given payload address.
    pub fn data_id(&self, payload: &Arc<T>) -> Result<u32> {
        let mut state = self.core.lock_state();
        let node = state.seek_payload(payload).ok_or(RingError::DataNotFound)?;
        Ok(node.id())
    }

    /// The name of the item holding the given payload address.
    pub fn data_name(&self, payload: &Arc<T>) -> Result<String> {
        let mut state = self.core.lock_state();
        let node = state.seek_payload(payload).ok_or(RingError::DataNotFound)?;
        Ok(node.name())
    }

    /// The position of the item holding the given payload address.
    pub fn data_nr(&self, payload: &Arc<T>) -> Result<i32> {
        let mut state = self.core.lock_state();
        let node = state.seek_payload(payload).ok_or(RingError::DataNotFound)?;
        state.ensure_numbered();
        Ok(node.nr())
    }

    /// The reference count of the payload held at the given position.
    pub fn ref_count(&self, nr: i32) -> Result<i32> {
        let mut state = self.core.lock_state();
        if state.len == 0 {
            return Err(RingError::NrOutOfRange);
        }
        let folded = normalize_nr(state.len, nr);
        let node = state.seek_nr(folded).ok_or(RingError::NrOutOfRange)?;
        Ok(node.ref_count())
    }

    /// The reference count of the given payload address.
    pub fn data_ref_count(&self, payload: &Arc<T>) -> Result<i32> {
        let mut state = self.core.lock_state();
        let node = state.seek_payload(payload).ok_or(RingError::DataNotFound)?;
        Ok(node.ref_count())
    }

    /// Whether an item with the given id exists.
    pub fn exists_id(&self, id: u32) -> bool {
        self.core.lock_state().seek_id(id).is_some()
    }

    /// Whether an item with the given name exists.
    pub fn exists_name(&self, name: &str) -> bool {
        self.core.lock_state().seek_name(name).is_some()
    }

    /// Whether an item with the given, unwrapped position exists.
    pub fn exists_nr(&self, nr: i32) -> bool {
        nr >= 0 && (nr as usize) < self.len()
    }

    /// Whether the given payload address is stored here.
    pub fn is_in(&self, payload: &Arc<T>) -> bool {
        self.core.lock_state().seek_payload(payload).is_some()
    }

    /// Whether a payload equal to the given value is stored here. Walks the
    /// whole chain comparing values.
    pub fn is_value_in(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.core
            .lock_state()
            .seek_where(|node| *node.lock().payload == *value)
            .is_some()
    }

    /// Snapshot of all payloads in ring order.
    pub fn payloads(&self) -> Vec<Arc<T>> {
        self.core
            .lock_state()
            .nodes()
            .iter()
            .map(|node| node.payload())
            .collect()
    }

    /// Snapshot of all items in ring order.
    pub fn items(&self) -> Vec<Item<T>> {
        self.core
            .lock_state()
            .nodes()
            .into_iter()
            .map(|node| Item { node })
            .collect()
    }

    // ---------------------------------------------------------------------
    // KEYS
    // ---------------------------------------------------------------------

    /// Sets the id of the item at the given position, uniquifying when the
    /// id map is active. Returns the id that was finally chosen.
    pub fn set_item_id(&self, nr: i32, id: u32) -> Result<u32> {
        let mut state = self.core.lock_state();
        if state.len == 0 {
            return Err(RingError::NrOutOfRange);
        }
        let folded = normalize_nr(state.len, nr);
        let node = state.seek_nr(folded).ok_or(RingError::NrOutOfRange)?;
        let old_id = node.id();
        if id == old_id {
            return Ok(old_id);
        }
        if state.id_map_used {
            let final_id = state.unique_id(id);
            state.id_map.remove(&old_id);
            node.lock().id = final_id;
            if state.id_map.contains_key(&final_id) {
                return Err(RingError::NoIdMapAvailable);
            }
            state.id_map.insert(final_id, node.clone());
            Ok(final_id)
        } else {
            if id > state.max_id {
                state.max_id = id;
            }
            node.lock().id = id;
            Ok(id)
        }
    }

    /// Sets the name of the item at the given position, uniquifying when
    /// the name map is active. Returns the name that was finally chosen.
    pub fn set_item_name(&self, nr: i32, name: &str) -> Result<String> {
        let mut state = self.core.lock_state();
        if state.len == 0 {
            return Err(RingError::NrOutOfRange);
        }
        let folded = normalize_nr(state.len, nr);
        let node = state.seek_nr(folded).ok_or(RingError::NrOutOfRange)?;
        let old_name = node.name();
        if name == old_name {
            return Ok(old_name);
        }
        if state.name_map_used {
            let final_name = state.unique_name(name);
            state.name_map.remove(&old_name);
            node.lock().name = final_name.clone();
            if state.name_map.contains_key(&final_name) {
                return Err(RingError::NoNameMapAvailable);
            }
            state.name_map.insert(final_name.clone(), node.clone());
            Ok(final_name)
        } else {
            node.lock().name = name.to_string();
            Ok(name.to_string())
        }
    }

    /// Switches the id map on or off. Enabling fills the map from the
    /// chain, rewriting ids where needed to make them unique; disabling
    /// clears the map. Re-enabling on a populated ring may therefore
    /// renumber ids silently.
    pub fn use_id_map(&self, on: bool) -> Result<()> {
        let mut state = self.core.lock_state();
        if on == state.id_map_used {
            return Ok(());
        }
        state.id_map_used = on;
        if on {
            for node in state.nodes() {
                let unique = state.unique_id(node.id());
                node.lock().id = unique;
                if state.id_map.contains_key(&unique) {
                    return Err(RingError::NoIdMapAvailable);
                }
                state.id_map.insert(unique, node);
            }
        } else {
            state.id_map.clear();
        }
        Ok(())
    }

    /// Switches the name map on or off, with the same fill/clear behavior
    /// as [`Ring::use_id_map`].
    pub fn use_name_map(&self, on: bool) -> Result<()> {
        let mut state = self.core.lock_state();
        if on == state.name_map_used {
            return Ok(());
        }
        state.name_map_used = on;
        if on {
            for node in state.nodes() {
                let unique = state.unique_name(&node.name());
                node.lock().name = unique.clone();
                if state.name_map.contains_key(&unique) {
                    return Err(RingError::NoNameMapAvailable);
                }
                state.name_map.insert(unique, node);
            }
        } else {
            state.name_map.clear();
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // REORDERING
    // ---------------------------------------------------------------------

    /// Moves the item at `old_nr` so it ends up at `new_nr`. A non-negative
    /// `new_nr` makes the moved item occupy that position, pushing the
    /// occupant forward; a negative `new_nr` places it directly after the
    /// item at the wrapped negative position. Returns the moved item's
    /// final position.
    pub fn move_item(&self, old_nr: i32, new_nr: i32) -> Result<i32> {
        let mut state = self.core.lock_state();
        let result = Self::move_locked(&mut state, old_nr, new_nr);
        self.core.publish(&state);
        result
    }

    pub(crate) fn move_locked(state: &mut RingState<T>, old_nr: i32, new_nr: i32) -> Result<i32> {
        if state.len == 0 {
            return Err(RingError::NrOutOfRange);
        }
        state.ensure_numbered();
        let x_old = normalize_nr(state.len, old_nr);
        let x_new = normalize_nr(state.len, new_nr);
        if x_old == x_new {
            return Ok(x_old);
        }
        if new_nr < 0 {
            // Place after the item at the wrapped position, resolved on the
            // numbering as it is now.
            let anchor = state.seek_nr(x_new).ok_or(RingError::NrOutOfRange)?;
            let source = state.seek_nr(x_old).ok_or(RingError::NrOutOfRange)?;
            state.relocate(&source, &anchor, true)?;
            state.ensure_numbered();
            Ok(source.nr())
        } else {
            // Occupy the target position: resolve the occupant on the
            // numbering that remains once the source is out.
            let source = state.seek_nr(x_old).ok_or(RingError::NrOutOfRange)?;
            let was_root = state.is_root(&source);
            let survivor = item::unlink(&source);
            if was_root {
                state.root = survivor;
            }
            state.len -= 1;
            state.needs_renumber = true;
            state.cursor = state.root.clone();
            let anchor = if (x_new as usize) < state.len {
                state.seek_nr(x_new)
            } else {
                None
            };
            match anchor {
                Some(anchor) => {
                    let prev = anchor.prev().ok_or(RingError::StrayItem)?;
                    item::splice_between(&source, &prev, &anchor)?;
                    if state.is_root(&anchor) {
                        state.root = Some(source.clone());
                    }
                }
                None => {
                    // Beyond the shortened ring: the source becomes the tail.
                    let root = state.root.clone().ok_or(RingError::NrOutOfRange)?;
                    let tail = root.prev().ok_or(RingError::StrayItem)?;
                    item::splice_between(&source, &tail, &root)?;
                }
            }
            state.len += 1;
            state.needs_renumber = true;
            state.cursor = Some(source.clone());
            state.ensure_numbered();
            Ok(source.nr())
        }
    }

    /// Sorts by payload value until a pass moves nothing.
    pub fn sort(&self, asc: bool) -> Result<()>
    where
        T: Ord,
    {
        while self.sort_once(asc)? > 0 {}
        Ok(())
    }

    /// Sorts by id until a pass moves nothing.
    pub fn sort_by_id(&self, asc: bool) -> Result<()> {
        while self.sort_once_by_id(asc)? > 0 {}
        Ok(())
    }

    /// Sorts by name (case-insensitive) until a pass moves nothing.
    pub fn sort_by_name(&self, asc: bool) -> Result<()> {
        while self.sort_once_by_name(asc)? > 0 {}
        Ok(())
    }

    /// One sorting pass by payload value; returns how many items moved.
    /// Iterating until this returns 0 yields a fully sorted ring.
    pub fn sort_once(&self, asc: bool) -> Result<i32>
    where
        T: Ord,
    {
        let mut state = self.core.lock_state();
        let moved = state.sort_pass(asc, &cmp_by_data)?;
        self.core.publish(&state);
        Ok(moved)
    }

    /// One sorting pass by id; returns how many items moved.
    pub fn sort_once_by_id(&self, asc: bool) -> Result<i32> {
        let mut state = self.core.lock_state();
        let moved = state.sort_pass(asc, &cmp_by_id)?;
        self.core.publish(&state);
        Ok(moved)
    }

    /// One sorting pass by name; returns how many items moved.
    pub fn sort_once_by_name(&self, asc: bool) -> Result<i32> {
        let mut state = self.core.lock_state();
        let moved = state.sort_pass(asc, &cmp_by_name)?;
        self.core.publish(&state);
        Ok(moved)
    }

    // ---------------------------------------------------------------------
    // BULK
    // ---------------------------------------------------------------------

    /// Moves every item of `source` to this ring's tail, re-uniquifying
    /// ids and names as the maps require. The source ends up empty and is
    /// torn down when `autodestruct` is set. Returns the new element count.
    pub fn merge_with(&self, source: &Ring<T>, autodestruct: bool) -> Result<i32> {
        if Arc::ptr_eq(&self.core, &source.core) {
            return Ok(self.len() as i32);
        }
        while let Some((payload, id, name)) = source.take_first() {
            self.insert(payload, -1, id, &name)?;
        }
        if autodestruct {
            source.destroy();
        }
        Ok(self.len() as i32)
    }

    /// Copies every item of `source` onto this ring's tail. The payloads
    /// are shared, and both items are introduced to each other's copy sets
    /// even without a factory.
    pub fn extend_from(&self, source: &Ring<T>) -> Result<()> {
        if Arc::ptr_eq(&self.core, &source.core) {
            return Ok(());
        }
        for source_item in source.items() {
            let (payload, id, name) = {
                let state = source_item.node.lock();
                (state.payload.clone(), state.id, state.name.clone())
            };
            let (_, node) = self.insert_with(payload, id, &name, None, false, |_| -1)?;
            item::add_to_copies(&source_item.node, &node, true);
        }
        Ok(())
    }

    /// Removes every item whose payload is also stored in `source`.
    /// Subtracting a ring from itself clears it.
    pub fn subtract(&self, source: &Ring<T>) -> usize {
        if Arc::ptr_eq(&self.core, &source.core) {
            let len = self.len();
            self.clear();
            return len;
        }
        let mut removed = 0;
        for payload in source.payloads() {
            removed += self.erase(&payload);
        }
        removed
    }

    /// Detaches the first item, handing back payload and keys. Used by the
    /// merge path.
    pub(crate) fn take_first(&self) -> Option<(Arc<T>, u32, String)> {
        let mut state = self.core.lock_state();
        if state.len == 0 {
            return None;
        }
        let head = state.seek_nr(0)?;
        let (id, name) = {
            let item_state = head.lock();
            (item_state.id, item_state.name.clone())
        };
        let payload = state.detach(&head);
        self.core.publish(&state);
        Some((payload, id, name))
    }

    /// Adopts a factory as this ring's owner for registration purposes.
    pub(crate) fn set_owner(&self, owner: Weak<FactoryCore>) {
        self.core.lock_state().owner = Some(owner);
    }

    /// Runs an operation under the ring lock with the view's cursor swapped
    /// in for the ring's own, preserving the ring's single-threaded cursor
    /// contract. The view cursor is updated to wherever the operation left
    /// it; the ring's own cursor is restored afterwards.
    pub(crate) fn with_view_cursor<R>(
        &self,
        view_cursor: &mut Option<Node<T>>,
        op: impl FnOnce(&mut RingState<T>) -> R,
    ) -> R {
        let mut state = self.core.lock_state();
        let saved = state.cursor.clone();
        state.cursor = view_cursor.clone();
        let result = op(&mut state);
        *view_cursor = state.cursor.clone();
        state.cursor = saved;
        self.core.publish(&state);
        result
    }
}

// -----------------------------------------------------------------------------
// Serialization
// -----------------------------------------------------------------------------

impl<T: Send + Sync + 'static + Display> Ring<T> {
    /// Writes the ring in the line-oriented wire format: one header line,
    /// then one line per item. Payload bytes come from `T`'s `Display`.
    pub fn save<W: Write>(&self, out: &mut W) -> Result<()> {
        let state = self.core.lock_state();
        writeln!(
            out,
            "R;{};{};{};{};{}",
            state.max_id,
            u8::from(state.id_map_used),
            u8::from(state.name_map_used),
            state.name.len() + 1,
            state.name
        )?;
        if state.root.is_some() {
            writeln!(out, "D;")?;
            for node in state.nodes() {
                let (id, name, payload) = {
                    let item_state = node.lock();
                    (
                        item_state.id,
                        item_state.name.clone(),
                        item_state.payload.clone(),
                    )
                };
                writeln!(out, "C;{};{};{};I;{};", id, name.len() + 1, name, payload)?;
            }
        }
        Ok(())
    }
}

impl<T: Send + Sync + 'static + FromStr> Ring<T> {
    /// Loads one serialized ring from the input, replacing this ring's
    /// contents. With `search` set, bytes are skipped until the next ring
    /// header; otherwise the header must come next.
    ///
    /// Existing items are only cleared once a header has actually been
    /// found, so a failed load leaves the ring untouched.
    pub fn load<R: BufRead>(&self, input: &mut R, search: bool) -> Result<()> {
        if search {
            if !serial::forward_to(input, serial::RING_START)? {
                return Err(RingError::LoadFailed {
                    reason: "no container found in stream",
                });
            }
        } else {
            serial::expect_marker(input, serial::RING_START, "no container found in stream")?;
        }

        let max_id: u32 = serial::read_number(input, "maximum known id")?;
        let id_map_used = serial::read_flag(input, "id map flag")?;
        let name_map_used = serial::read_flag(input, "name map flag")?;
        let name_len: usize = serial::read_number(input, "container name length")?;
        if name_len == 0 || name_len > (1 << 20) {
            return Err(RingError::AllocFailed);
        }
        let mut raw = vec![0u8; name_len - 1];
        input
            .read_exact(&mut raw)
            .map_err(|_| RingError::LoadFailed {
                reason: "container name",
            })?;
        let ring_name = String::from_utf8(raw).map_err(|_| RingError::LoadFailed {
            reason: "container name",
        })?;
        serial::skip_line_break(input)?;

        self.clear();
        {
            let mut state = self.core.lock_state();
            state.max_id = max_id;
            state.id_map_used = id_map_used;
            state.name_map_used = name_map_used;
            state.name = ring_name;
        }

        // Optional data block, then items until something else begins.
        if serial::peek_marker(input)? == Some(serial::RING_DATA) {
            serial::expect_marker(input, serial::RING_DATA, "data block")?;
            while serial::peek_marker(input)? == Some(serial::ITEM_START) {
                serial::expect_marker(input, serial::ITEM_START, "item start")?;
                let id: u32 = serial::read_number(input, "item id")?;
                let item_name_len: usize = serial::read_number(input, "item name length")?;
                let item_name =
                    serial::read_name(input, item_name_len, serial::SEP, "item name")?;
                serial::expect_marker(input, serial::ITEM_DATA, "item data marker")?;
                let payload_text = serial::read_field(input, "item data")?;
                let value = T::from_str(&payload_text).map_err(|_| RingError::LoadFailed {
                    reason: "item data",
                })?;
                self.insert(Arc::new(value), -1, id, &item_name)?;
                serial::skip_line_break(input)?;
            }
        }
        Ok(())
    }
}

impl<T: Send + Sync + 'static> std::fmt::Debug for Ring<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ring")
            .field("name", &self.name())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
