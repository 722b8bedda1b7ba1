/// Default cap on `in`/`!in` possibility-list expansion. Lists longer than
/// this stay compound instead of being distributed, bounding the DNF
/// blow-up.
pub const DEFAULT_IN_THRESHOLD: usize = 14;

/// Immutable simplification configuration, threaded explicitly through
/// every phase. Per-node [`NodeOptions`](super::rule::NodeOptions)
/// overlays win where set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimplifyOptions {
    /// `in`/`!in` lists up to this length may expand into `=`/`!=`
    /// operands.
    pub in_normalization_threshold: usize,
    /// Expand `!= v` into `OR(> v, < v)`.
    pub not_equal_normalization: bool,
    /// Expand `!in S` into `AND(!= s, ...)`. Off by default; `!in` is
    /// AND-shaped and expanding it rarely pays off.
    pub not_in_normalization: bool,
    /// Keep the `OR(AND(..))` shell even when the result is a single
    /// branch or a lone atomic, so per-case consumers always see an OR of
    /// ANDs.
    pub force_logical_core: bool,
}

impl Default for SimplifyOptions {
    fn default() -> Self {
        Self {
            in_normalization_threshold: DEFAULT_IN_THRESHOLD,
            not_equal_normalization: false,
            not_in_normalization: false,
            force_logical_core: false,
        }
    }
}

impl SimplifyOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn in_threshold(mut self, threshold: usize) -> Self {
        self.in_normalization_threshold = threshold;
        self
    }

    #[must_use]
    pub fn normalize_not_equal(mut self, on: bool) -> Self {
        self.not_equal_normalization = on;
        self
    }

    #[must_use]
    pub fn normalize_not_in(mut self, on: bool) -> Self {
        self.not_in_normalization = on;
        self
    }

    #[must_use]
    pub fn logical_core(mut self, on: bool) -> Self {
        self.force_logical_core = on;
        self
    }
}
