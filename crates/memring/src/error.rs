//! Error types for memory-ring operations.

use thiserror::Error;

/// Errors surfaced by rings, views and the factory.
///
/// Every failure is reported synchronously to the immediate caller; the
/// library never retries on its own. Insertion paths that partially
/// succeeded roll their state back before one of these is returned, so no
/// half-updated ring is ever observable from another thread.
#[derive(Debug, Error)]
pub enum RingError {
    /// Allocation or registration of a new ring failed.
    #[error("cannot create a new container")]
    CantCreateContainer,

    /// A new item (or its payload) could not be created.
    #[error("cannot create a new item")]
    CantCreateItem,

    /// An insertion into the id map failed, typically because a duplicate
    /// key slipped past the uniquifier while the map was being toggled.
    #[error("no id map available")]
    NoIdMapAvailable,

    /// As [`RingError::NoIdMapAvailable`], for the name map.
    #[error("no name map available")]
    NoNameMapAvailable,

    /// A by-id lookup found no matching item.
    #[error("id {id} not found")]
    IdNotFound {
        /// The id that was searched for.
        id: u32,
    },

    /// A by-name lookup found no matching item.
    #[error("name {name:?} not found")]
    NameNotFound {
        /// The name that was searched for.
        name: String,
    },

    /// A by-payload lookup found no matching item.
    #[error("data not found")]
    DataNotFound,

    /// A by-position operation was attempted on an empty ring.
    #[error("nr out of range: the container is empty")]
    NrOutOfRange,

    /// A move or insert discovered that its declared neighbors are no
    /// longer adjacent. This indicates a relink raced without the proper
    /// external lock; the operation was aborted without partial relinking.
    #[error("stray item: declared neighbors are no longer adjacent")]
    StrayItem,

    /// A load-path buffer could not be sized (e.g. an absurd length field).
    #[error("allocation failed while loading")]
    AllocFailed,

    /// Serialized input was malformed or truncated.
    #[error("load failed: {reason}")]
    LoadFailed {
        /// Which part of the stream broke.
        reason: &'static str,
    },

    /// An underlying I/O operation failed during save or load.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl RingError {
    /// Returns `true` for the "nothing matched" family of errors.
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::IdNotFound { .. } | Self::NameNotFound { .. } | Self::DataNotFound
        )
    }

    /// Returns `true` if the error indicates corrupt or truncated input.
    #[inline]
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            Self::LoadFailed { .. } | Self::AllocFailed | Self::Io(_)
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RingError>;
