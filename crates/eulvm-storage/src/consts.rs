/// Default bounded size of the LRU cache tier.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Default number of workers in one speculative execution window.
pub const DEFAULT_WINDOW_SIZE: usize = 16;

/// Overridable storage/concurrency parameters, with a [`Default`]
/// matching the values above. Mirrors the interpreter crate's analogous
/// `VmConfig` — the CLI and tests tune these without recompiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StorageConfig {
    /// Bounded size of the LRU cache tier.
    pub cache_capacity: usize,
    /// Number of workers in one speculative execution window.
    pub window_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }
}
