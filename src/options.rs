//! Runtime configuration.

/// Configuration of a [`Context`][crate::context::Context].
///
/// ```
/// use symdd::options::DdOptions;
///
/// let options = DdOptions::default()
///     .with_leak_check(true)
///     .with_storage_bits(14);
/// assert_eq!(options.binary_backend, "bdd");
/// ```
#[derive(Debug, Clone)]
pub struct DdOptions {
    /// Track every handed-out handle and fail `close` if any is still alive.
    pub leak_check: bool,
    /// Extended (costly) consistency and usage checks.
    pub debug: bool,
    /// Identifier of the engine serving boolean diagrams.
    pub binary_backend: String,
    /// Identifier of the engine serving value diagrams.
    pub multi_backend: String,
    /// Use the fused and-exist primitive when a backend has one.
    pub and_exist: bool,
    /// Node table capacity is `2^storage_bits` per backend.
    pub storage_bits: usize,
    /// Operation cache size hint, `2^cache_bits` entries.
    pub cache_bits: usize,
    /// Initial reorder permission.
    pub allow_reorder: bool,
}

impl Default for DdOptions {
    fn default() -> Self {
        Self {
            leak_check: false,
            debug: false,
            binary_backend: "bdd".to_string(),
            multi_backend: "mtbdd".to_string(),
            and_exist: true,
            storage_bits: 18,
            cache_bits: 16,
            allow_reorder: false,
        }
    }
}

impl DdOptions {
    pub fn with_leak_check(mut self, leak_check: bool) -> Self {
        self.leak_check = leak_check;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_binary_backend(mut self, identifier: impl Into<String>) -> Self {
        self.binary_backend = identifier.into();
        self
    }

    pub fn with_multi_backend(mut self, identifier: impl Into<String>) -> Self {
        self.multi_backend = identifier.into();
        self
    }

    pub fn with_and_exist(mut self, and_exist: bool) -> Self {
        self.and_exist = and_exist;
        self
    }

    pub fn with_storage_bits(mut self, bits: usize) -> Self {
        self.storage_bits = bits;
        self
    }

    pub fn with_cache_bits(mut self, bits: usize) -> Self {
        self.cache_bits = bits;
        self
    }

    pub fn with_allow_reorder(mut self, allow: bool) -> Self {
        self.allow_reorder = allow;
        self
    }
}
