//! memring - Typed, Thread-Safe Memory-Ring Containers
//!
//! A memory ring is a circular sequence of items, each carrying a shared
//! payload, a position, an integer id and a text name. Rings can keep an
//! id map and a name map next to the chain, enforcing uniqueness of those
//! keys on every mutation, and a [`Factory`] tracks every item that
//! references the same payload across independent rings so that payload
//! lifetime is coordinated.
//!
//! # Key pieces
//!
//! - [`Ring`] - the container: positional and sorted insertion, wrapped
//!   negative indexing, move/merge/sort, dual key maps, serialization
//! - [`RingView`] - a per-thread cursor onto a shared ring that stays
//!   valid across concurrent mutations and supports interruptible sorting
//! - [`Factory`] - a registry of rings keyed by payload type, with
//!   cross-ring reference tracking and a process-wide instance
//!
//! # Example
//!
//! ```
//! use memring_rs::{Factory, RingConfig};
//! use std::sync::Arc;
//!
//! let factory = Factory::new(RingConfig::default());
//!
//! // The same payload address stored in two rings is tracked as one.
//! let payload = Arc::new(42);
//! let first = factory.create(payload.clone(), 1, "x").unwrap();
//! let second = factory.create(payload.clone(), 2, "y").unwrap();
//! assert_eq!(factory.ref_count(&payload), 2);
//!
//! // Removing one reference keeps the payload reachable via the other.
//! first.erase(&payload);
//! assert_eq!(factory.ref_count(&payload), 1);
//! assert!(second.is_in(&payload));
//! ```

mod config;
mod error;
mod factory;
mod invariants;
mod item;
mod ring;
mod serial;
mod view;

pub use config::{RingConfig, BULK_CONFIG, FULLY_MAPPED_CONFIG};
pub use error::{Result, RingError};
pub use factory::{global, init_global, Factory, MemData};
pub use item::Item;
pub use ring::Ring;
pub use view::{RingView, SortInterrupter};
