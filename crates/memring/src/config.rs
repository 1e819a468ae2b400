/// Configuration for a ring.
///
/// The factory keeps one of these as its default policy and applies it to
/// every ring it creates; standalone rings take one directly.
#[derive(Debug, Clone, Copy)]
pub struct RingConfig {
    /// Maintain an id → item map and keep ids unique.
    pub use_id_map: bool,
    /// Maintain a name → item map and keep names unique.
    pub use_name_map: bool,
    /// Track cross-ring payload references through the owning factory.
    ///
    /// Tracking can later be switched off per ring with
    /// [`Ring::disable_tracking`](crate::Ring::disable_tracking), but never
    /// back on.
    pub track_refs: bool,
    /// Display name of the ring. The factory may rewrite it to keep its
    /// registry names unique.
    pub name: &'static str,
}

impl RingConfig {
    /// Creates a configuration with explicit map settings.
    pub const fn new(use_id_map: bool, use_name_map: bool) -> Self {
        Self {
            use_id_map,
            use_name_map,
            track_refs: true,
            name: "Container",
        }
    }

    /// Returns a copy with reference tracking disabled from the start.
    ///
    /// Inserting into such a ring skips the factory-wide payload search
    /// entirely, which is dramatically faster for bulk loads. Payloads are
    /// then released unconditionally when their item goes away.
    pub const fn without_tracking(mut self) -> Self {
        self.track_refs = false;
        self
    }

    /// Returns a copy with the given display name.
    pub const fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self::new(true, true)
    }
}

/// Both key maps active, tracking on. The factory default.
pub const FULLY_MAPPED_CONFIG: RingConfig = RingConfig::new(true, true);

/// No key maps, no tracking. The fastest configuration for bulk insertion
/// of payloads that are stored exactly once.
pub const BULK_CONFIG: RingConfig = RingConfig::new(false, false).without_tracking();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_fully_mapped() {
        let c = RingConfig::default();
        assert!(c.use_id_map);
        assert!(c.use_name_map);
        assert!(c.track_refs);
    }

    #[test]
    fn test_bulk_preset() {
        assert!(!BULK_CONFIG.use_id_map);
        assert!(!BULK_CONFIG.use_name_map);
        assert!(!BULK_CONFIG.track_refs);
    }
}
