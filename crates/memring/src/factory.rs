//! The factory: a type-aware registry of rings.
//!
//! The factory owns its rings and coordinates cross-ring payload sharing:
//! whenever a tracked ring inserts a payload, the factory looks for that
//! payload address in every other ring of the same type and introduces the
//! items to each other's copy sets, so deleting one of them later knows the
//! payload is still referenced elsewhere.
//!
//! Registry entries are addressed like ring items: every registered ring
//! has a unique id and a unique name next to its position, and all three
//! can be queried and (for id and name) rewritten.
//!
//! Typed access goes through a run-time-checked downcast of the type-erased
//! entries; an entry of a different payload type simply does not match.
//! Only that dynamic check decides — there is no static fast path.

use crate::config::RingConfig;
use crate::error::{Result, RingError};
use crate::item::{self, Item, Node};
use crate::ring::{normalize_nr, Ring};
use std::any::Any;
use std::fmt::Display;
use std::io::{BufRead, Write};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// Bounds a payload type must satisfy to be managed by a factory: shareable
/// across threads plus a textual codec for the serialized form.
pub trait MemData: Send + Sync + Display + FromStr + 'static {}

impl<T: Send + Sync + Display + FromStr + 'static> MemData for T {}

// -----------------------------------------------------------------------------
// Type erasure
// -----------------------------------------------------------------------------

/// The type-independent face of a registered ring.
trait ErasedRing: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn core_addr(&self) -> usize;
    fn item_count(&self) -> usize;
    fn display_name(&self) -> String;
    fn save_to(&self, out: &mut dyn Write) -> Result<()>;
    fn tear_down(&self);
}

impl<T: MemData> ErasedRing for Ring<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn core_addr(&self) -> usize {
        Arc::as_ptr(&self.core) as usize
    }

    fn item_count(&self) -> usize {
        self.len()
    }

    fn display_name(&self) -> String {
        self.name()
    }

    fn save_to(&self, mut out: &mut dyn Write) -> Result<()> {
        self.save(&mut out)
    }

    fn tear_down(&self) {
        self.destroy();
    }
}

// -----------------------------------------------------------------------------
// Factory core
// -----------------------------------------------------------------------------

struct FactoryEntry {
    id: u32,
    name: String,
    ring: Box<dyn ErasedRing>,
}

struct FactoryState {
    entries: Vec<FactoryEntry>,
    max_id: u32,
}

impl FactoryState {
    /// Mints an entry id unique across the registry; same ratchet rules as
    /// the per-ring id uniquifier, with the registry map always on.
    fn unique_entry_id(&mut self, requested: u32) -> u32 {
        let mut result = if requested == 0 { 1 } else { requested };
        self.max_id += 1;
        if self.entries.iter().any(|entry| entry.id == result) {
            result = self.max_id;
        } else if result > self.max_id {
            self.max_id = result;
        }
        result
    }

    /// Mints an entry name unique across the registry.
    fn unique_entry_name(&self, requested: &str) -> String {
        let base = if requested.is_empty() {
            format!("data_{:010}", self.max_id)
        } else {
            requested.to_string()
        };
        let taken = |name: &str| self.entries.iter().any(|entry| entry.name == name);
        if !taken(&base) {
            return base;
        }
        let mut counter = 0u32;
        loop {
            counter += 1;
            let candidate = format!("{base}_{counter:08}");
            if !taken(&candidate) {
                return candidate;
            }
        }
    }

    fn position_of_addr(&self, addr: usize) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.ring.core_addr() == addr)
    }
}

/// Shared backing storage of a factory.
pub(crate) struct FactoryCore {
    state: Mutex<FactoryState>,
    default_config: RingConfig,
}

impl FactoryCore {
    fn lock_state(&self) -> MutexGuard<'_, FactoryState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Introduces a freshly created item to the copy sets of every item that
/// already carries the same payload address, across all rings of the same
/// type. Called by tracked rings before the new item becomes linked.
pub(crate) fn register_node<T: Send + Sync + 'static>(core: &Arc<FactoryCore>, node: &Node<T>) {
    let payload = node.payload();
    let state = core.lock_state();
    for entry in &state.entries {
        if let Some(ring) = entry.ring.as_any().downcast_ref::<Ring<T>>() {
            if let Some(existing) = ring.find_item(&payload) {
                // The cascade reaches every other copy from here.
                item::add_to_copies(&existing.node, node, true);
                return;
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Public handle
// -----------------------------------------------------------------------------

/// A registry of rings keyed by payload type.
///
/// Cloning the handle shares the registry. All rings created through a
/// factory live until they are erased or the last factory handle drops.
pub struct Factory {
    core: Arc<FactoryCore>,
}

impl Clone for Factory {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl Default for Factory {
    fn default() -> Self {
        Self::new(RingConfig::default())
    }
}

impl Factory {
    /// Creates a factory whose rings get the given configuration.
    pub fn new(default_config: RingConfig) -> Self {
        Self {
            core: Arc::new(FactoryCore {
                state: Mutex::new(FactoryState {
                    entries: Vec::new(),
                    max_id: 0,
                }),
                default_config,
            }),
        }
    }

    // ---------------------------------------------------------------------
    // REGISTRY STATUS & ADDRESSING
    // ---------------------------------------------------------------------

    /// Number of registered rings.
    pub fn len(&self) -> usize {
        self.core.lock_state().entries.len()
    }

    /// Whether no ring is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tears down and drops every registered ring.
    pub fn clear(&self) {
        let entries = {
            let mut state = self.core.lock_state();
            state.max_id = 0;
            std::mem::take(&mut state.entries)
        };
        tracing::debug!(count = entries.len(), "clearing factory registry");
        for entry in &entries {
            entry.ring.tear_down();
        }
    }

    /// Whether a registry entry with the given id exists.
    pub fn exists_id(&self, id: u32) -> bool {
        self.core
            .lock_state()
            .entries
            .iter()
            .any(|entry| entry.id == id)
    }

    /// Whether a registry entry with the given name exists.
    pub fn exists_name(&self, name: &str) -> bool {
        self.core
            .lock_state()
            .entries
            .iter()
            .any(|entry| entry.name == name)
    }

    /// Whether a registry entry with the given, unwrapped position exists.
    pub fn exists_nr(&self, nr: i32) -> bool {
        nr >= 0 && (nr as usize) < self.len()
    }

    /// The id of the registry entry at the given (wrapped) position.
    pub fn ring_id_by_nr(&self, nr: i32) -> Result<u32> {
        let state = self.core.lock_state();
        if state.entries.is_empty() {
            return Err(RingError::NrOutOfRange);
        }
        let folded = normalize_nr(state.entries.len(), nr) as usize;
        Ok(state.entries[folded].id)
    }

    /// The id of the registry entry with the given name.
    pub fn ring_id_by_name(&self, name: &str) -> Result<u32> {
        let state = self.core.lock_state();
        state
            .entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.id)
            .ok_or_else(|| RingError::NameNotFound {
                name: name.to_string(),
            })
    }

    /// The name of the registry entry at the given (wrapped) position.
    pub fn ring_name_by_nr(&self, nr: i32) -> Result<String> {
        let state = self.core.lock_state();
        if state.entries.is_empty() {
            return Err(RingError::NrOutOfRange);
        }
        let folded = normalize_nr(state.entries.len(), nr) as usize;
        Ok(state.entries[folded].name.clone())
    }

    /// The name of the registry entry with the given id.
    pub fn ring_name_by_id(&self, id: u32) -> Result<String> {
        let state = self.core.lock_state();
        state
            .entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.name.clone())
            .ok_or(RingError::IdNotFound { id })
    }

    /// The position of the registry entry with the given id.
    pub fn ring_nr_by_id(&self, id: u32) -> Result<i32> {
        let state = self.core.lock_state();
        state
            .entries
            .iter()
            .position(|entry| entry.id == id)
            .map(|pos| pos as i32)
            .ok_or(RingError::IdNotFound { id })
    }

    /// The position of the registry entry with the given name.
    pub fn ring_nr_by_name(&self, name: &str) -> Result<i32> {
        let state = self.core.lock_state();
        state
            .entries
            .iter()
            .position(|entry| entry.name == name)
            .map(|pos| pos as i32)
            .ok_or_else(|| RingError::NameNotFound {
                name: name.to_string(),
            })
    }

    /// Rewrites the id of the registry entry at the given position,
    /// uniquified across the registry. Returns the id finally chosen.
    pub fn set_ring_id(&self, nr: i32, id: u32) -> Result<u32> {
        let mut state = self.core.lock_state();
        if state.entries.is_empty() {
            return Err(RingError::NrOutOfRange);
        }
        let folded = normalize_nr(state.entries.len(), nr) as usize;
        if state.entries[folded].id == id {
            return Ok(id);
        }
        let final_id = state.unique_entry_id(id);
        state.entries[folded].id = final_id;
        Ok(final_id)
    }

    /// Rewrites the name of the registry entry at the given position,
    /// uniquified across the registry. Returns the name finally chosen.
    pub fn set_ring_name(&self, nr: i32, name: &str) -> Result<String> {
        let mut state = self.core.lock_state();
        if state.entries.is_empty() {
            return Err(RingError::NrOutOfRange);
        }
        let folded = normalize_nr(state.entries.len(), nr) as usize;
        if state.entries[folded].name == name {
            return Ok(name.to_string());
        }
        let final_name = state.unique_entry_name(name);
        state.entries[folded].name = final_name.clone();
        Ok(final_name)
    }

    /// The registry id of a specific ring.
    pub fn id_of_ring<T: MemData>(&self, ring: &Ring<T>) -> Result<u32> {
        let state = self.core.lock_state();
        let addr = Arc::as_ptr(&ring.core) as usize;
        state
            .position_of_addr(addr)
            .map(|pos| state.entries[pos].id)
            .ok_or(RingError::DataNotFound)
    }

    /// The registry name of a specific ring.
    pub fn name_of_ring<T: MemData>(&self, ring: &Ring<T>) -> Result<String> {
        let state = self.core.lock_state();
        let addr = Arc::as_ptr(&ring.core) as usize;
        state
            .position_of_addr(addr)
            .map(|pos| state.entries[pos].name.clone())
            .ok_or(RingError::DataNotFound)
    }

    /// The registry position of a specific ring.
    pub fn nr_of_ring<T: MemData>(&self, ring: &Ring<T>) -> Result<i32> {
        let state = self.core.lock_state();
        let addr = Arc::as_ptr(&ring.core) as usize;
        state
            .position_of_addr(addr)
            .map(|pos| pos as i32)
            .ok_or(RingError::DataNotFound)
    }

    // ---------------------------------------------------------------------
    // TYPED DISPATCH
    // ---------------------------------------------------------------------

    /// Creates a new ring of `T` holding `payload` as its first item and
    /// registers it. The registry assigns the ring's name.
    pub fn create<T: MemData>(&self, payload: Arc<T>, id: u32, name: &str) -> Result<Ring<T>> {
        let ring = self.create_empty::<T>()?;
        ring.insert(payload, 0, id, name)?;
        Ok(ring)
    }

    /// Creates a new ring of `T` from a plain value.
    pub fn create_value<T: MemData>(&self, value: T, id: u32, name: &str) -> Result<Ring<T>> {
        self.create(Arc::new(value), id, name)
    }

    /// Creates and registers a new, empty ring of `T`.
    pub fn create_empty<T: MemData>(&self) -> Result<Ring<T>> {
        let ring = Ring::build(&self.core.default_config, Some(Arc::downgrade(&self.core)));
        let mut state = self.core.lock_state();
        let entry_id = state.unique_entry_id(0);
        let entry_name = state.unique_entry_name(&ring.name());
        // The ring clones the name the registry assigned, so both agree.
        ring.set_name(&entry_name);
        state.entries.push(FactoryEntry {
            id: entry_id,
            name: entry_name,
            ring: Box::new(ring.clone()),
        });
        Ok(ring)
    }

    /// Adds a payload to the first ring of `T`, creating one when none
    /// exists yet. Returns the ring the payload went into.
    pub fn add<T: MemData>(&self, payload: Arc<T>, id: u32, name: &str) -> Result<Ring<T>> {
        match self.find_first::<T>() {
            Some(ring) => {
                ring.insert(payload, -1, id, name)?;
                Ok(ring)
            }
            None => self.create(payload, id, name),
        }
    }

    /// Adds a plain value to the first ring of `T`.
    pub fn add_value<T: MemData>(&self, value: T, id: u32, name: &str) -> Result<Ring<T>> {
        self.add(Arc::new(value), id, name)
    }

    /// The first ring of `T` that stores the given payload address, or a
    /// freshly created ring holding it when none does.
    pub fn get<T: MemData>(&self, payload: &Arc<T>) -> Result<Ring<T>> {
        match self.find(payload) {
            Some(ring) => Ok(ring),
            None => self.create(payload.clone(), 0, ""),
        }
    }

    /// The first ring of `T` that stores a payload equal to the given
    /// value, or a freshly created ring holding it when none does.
    pub fn get_value<T: MemData + PartialEq>(&self, value: T) -> Result<Ring<T>> {
        match self.find_value(&value) {
            Some(ring) => Ok(ring),
            None => self.create(Arc::new(value), 0, ""),
        }
    }

    /// The first ring of `T` that stores the given payload address, if any.
    pub fn find<T: MemData>(&self, payload: &Arc<T>) -> Option<Ring<T>> {
        let state = self.core.lock_state();
        for entry in &state.entries {
            if let Some(ring) = entry.ring.as_any().downcast_ref::<Ring<T>>() {
                if ring.is_in(payload) {
                    return Some(ring.clone());
                }
            }
        }
        None
    }

    /// The first ring of `T` that stores a payload equal to the given
    /// value, if any.
    pub fn find_value<T: MemData + PartialEq>(&self, value: &T) -> Option<Ring<T>> {
        let state = self.core.lock_state();
        for entry in &state.entries {
            if let Some(ring) = entry.ring.as_any().downcast_ref::<Ring<T>>() {
                if ring.is_value_in(value) {
                    return Some(ring.clone());
                }
            }
        }
        None
    }

    /// The first ring of `T`, regardless of contents, if any.
    pub fn find_first<T: MemData>(&self) -> Option<Ring<T>> {
        let state = self.core.lock_state();
        for entry in &state.entries {
            if let Some(ring) = entry.ring.as_any().downcast_ref::<Ring<T>>() {
                return Some(ring.clone());
            }
        }
        None
    }

    /// The first empty ring of `T`, if any.
    pub fn find_empty<T: MemData>(&self) -> Option<Ring<T>> {
        let state = self.core.lock_state();
        for entry in &state.entries {
            if entry.ring.item_count() == 0 {
                if let Some(ring) = entry.ring.as_any().downcast_ref::<Ring<T>>() {
                    return Some(ring.clone());
                }
            }
        }
        None
    }

    /// Removes and tears down a registered ring. Returns how many entries
    /// were erased; an unregistered ring is left untouched.
    pub fn erase<T: MemData>(&self, ring: &Ring<T>) -> usize {
        let erased = {
            let mut state = self.core.lock_state();
            let addr = Arc::as_ptr(&ring.core) as usize;
            let before = state.entries.len();
            state.entries.retain(|entry| entry.ring.core_addr() != addr);
            before - state.entries.len()
        };
        if erased > 0 {
            ring.destroy();
        }
        erased
    }

    /// Removes and tears down every ring holding the given payload
    /// address. Returns how many rings were erased.
    pub fn erase_by_data<T: MemData>(&self, payload: &Arc<T>) -> usize {
        let mut erased = 0;
        while let Some(ring) = self.find(payload) {
            let count = self.erase(&ring);
            if count == 0 {
                break;
            }
            erased += count;
        }
        erased
    }

    /// Merges all items of `src` into `dest`; with `autodestruct` the
    /// emptied source ring is also erased from the registry. Returns the
    /// destination's new element count.
    pub fn merge<T: MemData>(
        &self,
        dest: &Ring<T>,
        src: &Ring<T>,
        autodestruct: bool,
    ) -> Result<i32> {
        let total = dest.merge_with(src, false)?;
        if autodestruct {
            self.erase(src);
        }
        Ok(total)
    }

    /// Takes over a caller-constructed ring. Its items are introduced to
    /// the copy sets of every matching payload already registered; unless
    /// `items_only` is set the ring itself is registered too and starts
    /// reporting future insertions to this factory.
    pub fn register_ring<T: MemData>(&self, ring: &Ring<T>, items_only: bool) {
        {
            let state = self.core.lock_state();
            let addr = Arc::as_ptr(&ring.core) as usize;
            if state.position_of_addr(addr).is_some() {
                return;
            }
        }
        for item in ring.items() {
            register_node(&self.core, &item.node);
        }
        if !items_only {
            ring.set_owner(Arc::downgrade(&self.core));
            let mut state = self.core.lock_state();
            let entry_id = state.unique_entry_id(0);
            let entry_name = state.unique_entry_name(&ring.name());
            state.entries.push(FactoryEntry {
                id: entry_id,
                name: entry_name,
                ring: Box::new(ring.clone()),
            });
        }
    }

    /// Introduces a single outside item to the copy sets of every
    /// registered item carrying the same payload address.
    pub fn register_item<T: MemData>(&self, item: &Item<T>) {
        register_node(&self.core, &item.node);
    }

    /// The reference count of the given payload in the first ring that
    /// stores it, or 0 when no ring does.
    pub fn ref_count<T: MemData>(&self, payload: &Arc<T>) -> i32 {
        self.find(payload)
            .and_then(|ring| ring.data_ref_count(payload).ok())
            .unwrap_or(0)
    }

    // ---------------------------------------------------------------------
    // SERIALIZATION
    // ---------------------------------------------------------------------

    /// Writes every registered ring back-to-back in insertion order.
    pub fn save<W: Write>(&self, out: &mut W) -> Result<()> {
        let state = self.core.lock_state();
        for entry in &state.entries {
            entry.ring.save_to(out)?;
        }
        Ok(())
    }

    /// Loads the next serialized ring of `T` from the input into the first
    /// empty ring of that type, creating one when none exists. Returns the
    /// ring that was filled.
    pub fn load<T: MemData, R: BufRead>(&self, input: &mut R, search: bool) -> Result<Ring<T>> {
        let ring = match self.find_empty::<T>() {
            Some(ring) => ring,
            None => self.create_empty::<T>()?,
        };
        ring.load(input, search)?;
        Ok(ring)
    }
}

// -----------------------------------------------------------------------------
// Global instance
// -----------------------------------------------------------------------------

static GLOBAL_FACTORY: OnceLock<Factory> = OnceLock::new();

/// The process-wide factory, created with the default configuration on
/// first use. Call [`init_global`] earlier to pick a different policy.
/// Rings it owns live until process exit.
pub fn global() -> &'static Factory {
    GLOBAL_FACTORY.get_or_init(Factory::default)
}

/// Installs the process-wide factory with an explicit configuration.
/// Returns `false` when the global factory already existed, in which case
/// the configuration is left as it was.
pub fn init_global(config: RingConfig) -> bool {
    let mut installed = false;
    GLOBAL_FACTORY.get_or_init(|| {
        installed = true;
        Factory::new(config)
    });
    installed
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory")
            .field("rings", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_find_by_type() {
        let factory = Factory::new(RingConfig::default());
        let ints = factory.create_value(42, 1, "answer").unwrap();
        let words = factory.create_value("hello".to_string(), 1, "greeting").unwrap();

        assert_eq!(factory.len(), 2);
        // dispatch narrows by payload type
        assert!(factory.find_first::<i32>().is_some());
        assert!(factory.find_first::<String>().is_some());
        assert!(factory.find_first::<u64>().is_none());

        let payload = ints.get(0).unwrap();
        let found = factory.find(&payload).unwrap();
        assert!(Arc::ptr_eq(&found.core, &ints.core));
        drop(words);
    }

    #[test]
    fn test_add_reuses_first_ring_of_type() {
        let factory = Factory::new(RingConfig::default());
        let first = factory.add_value(1, 0, "").unwrap();
        let second = factory.add_value(2, 0, "").unwrap();
        assert!(Arc::ptr_eq(&first.core, &second.core));
        assert_eq!(first.len(), 2);
        assert_eq!(factory.len(), 1);
    }

    #[test]
    fn test_registry_names_are_unique_and_cloned() {
        let factory = Factory::new(RingConfig::default());
        let a = factory.create_value(1, 0, "").unwrap();
        let b = factory.create_value(2, 0, "").unwrap();

        // both rings carry the names the registry assigned
        assert_eq!(a.name(), factory.ring_name_by_nr(0).unwrap());
        assert_eq!(b.name(), factory.ring_name_by_nr(1).unwrap());
        assert_ne!(a.name(), b.name());
    }

    #[test]
    fn test_registry_addressing() {
        let factory = Factory::new(RingConfig::default());
        let ring = factory.create_value(1, 0, "").unwrap();

        let id = factory.ring_id_by_nr(0).unwrap();
        assert!(factory.exists_id(id));
        assert_eq!(factory.ring_nr_by_id(id).unwrap(), 0);
        assert_eq!(factory.id_of_ring(&ring).unwrap(), id);
        assert_eq!(factory.nr_of_ring(&ring).unwrap(), 0);

        let name = factory.set_ring_name(0, "numbers").unwrap();
        assert_eq!(name, "numbers");
        assert_eq!(factory.ring_nr_by_name("numbers").unwrap(), 0);

        let new_id = factory.set_ring_id(0, 500).unwrap();
        assert_eq!(new_id, 500);
        assert_eq!(factory.ring_name_by_id(500).unwrap(), "numbers");
    }

    #[test]
    fn test_cross_ring_ref_counting() {
        let factory = Factory::new(RingConfig::default());
        let payload = Arc::new(42);
        let r1 = factory.create(payload.clone(), 1, "x").unwrap();
        let r2 = factory.create(payload.clone(), 2, "y").unwrap();

        assert_eq!(factory.ref_count(&payload), 2);

        r1.erase(&payload);
        assert_eq!(factory.ref_count(&payload), 1);
        assert!(r2.is_in(&payload));

        r2.erase(&payload);
        assert_eq!(factory.ref_count(&payload), 0);
        assert!(factory.find(&payload).is_none());
    }

    #[test]
    fn test_erase_and_erase_by_data() {
        let factory = Factory::new(RingConfig::default());
        let payload = Arc::new(9);
        let ring = factory.create(payload.clone(), 0, "").unwrap();
        let other = factory.create_value(10, 0, "").unwrap();

        assert_eq!(factory.erase_by_data(&payload), 1);
        assert_eq!(factory.len(), 1);
        assert!(ring.is_empty());

        assert_eq!(factory.erase(&other), 1);
        assert!(factory.is_empty());
        // erasing again finds nothing
        assert_eq!(factory.erase(&other), 0);
    }

    #[test]
    fn test_register_ring_connects_copies() {
        let factory = Factory::new(RingConfig::default());
        let payload = Arc::new(5);
        factory.create(payload.clone(), 0, "").unwrap();

        // a ring built outside the factory, holding the same payload
        let outside: Ring<i32> = Ring::new(&RingConfig::default());
        outside.add(payload.clone(), 0, "").unwrap();
        assert_eq!(outside.data_ref_count(&payload).unwrap(), 1);

        factory.register_ring(&outside, false);
        assert_eq!(outside.data_ref_count(&payload).unwrap(), 2);
        assert_eq!(factory.len(), 2);

        // registering twice changes nothing
        factory.register_ring(&outside, false);
        assert_eq!(factory.len(), 2);
    }

    #[test]
    fn test_factory_merge() {
        let factory = Factory::new(RingConfig::default());
        let dest = factory.create_value(1, 0, "").unwrap();
        let src = factory.create_value(2, 0, "").unwrap();
        src.add_value(3, 0, "").unwrap();

        let total = factory.merge(&dest, &src, true).unwrap();
        assert_eq!(total, 3);
        assert_eq!(factory.len(), 1);
        assert!(src.is_empty());
    }

    #[test]
    fn test_factory_save_load_round_trip() {
        let factory = Factory::new(RingConfig::default());
        let ring = factory.create_value("alpha".to_string(), 1, "n1").unwrap();
        ring.add_value("beta".to_string(), 2, "n2").unwrap();
        factory.create_value(7i32, 1, "seven").unwrap();

        let mut buffer = Vec::new();
        factory.save(&mut buffer).unwrap();

        let restored = Factory::new(RingConfig::default());
        let mut input = buffer.as_slice();
        let words = restored.load::<String, _>(&mut input, true).unwrap();
        let numbers = restored.load::<i32, _>(&mut input, true).unwrap();

        let text: Vec<String> = words.payloads().iter().map(|p| (**p).clone()).collect();
        assert_eq!(text, vec!["alpha", "beta"]);
        assert_eq!(*numbers.get(0).unwrap(), 7);
    }

    #[test]
    fn test_global_factory() {
        // The global may already be initialized by another test; either
        // way the handle works and stays the same object.
        let first = global();
        let second = global();
        assert!(Arc::ptr_eq(&first.core, &second.core));
        assert!(!init_global(RingConfig::default()) || Arc::ptr_eq(&global().core, &first.core));
    }

    #[test]
    fn test_clear_tears_rings_down() {
        let factory = Factory::new(RingConfig::default());
        let ring = factory.create_value(1, 0, "").unwrap();
        factory.clear();
        assert!(factory.is_empty());
        assert!(ring.is_empty());
        // a destroyed ring's views are no-ops
        let view = ring.view();
        assert_eq!(view.add_value(2, 0, "").unwrap(), -1);
    }
}
