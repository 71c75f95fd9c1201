//! Build configuration.

/// Options shared by the NPDA builder and the determinizer.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) minimal_npda: bool,
    pub(crate) max_lookahead: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub const fn new() -> Self {
        Self {
            minimal_npda: true,
            max_lookahead: 4,
        }
    }

    /// Build the minimal NPDA, in which error recovery does not count the
    /// rule-entry frame when popping the runtime stack.
    pub fn minimal_npda(&mut self, enabled: bool) -> &mut Self {
        self.minimal_npda = enabled;
        self
    }

    /// Set the longest lookahead sequence the determinizer may consult
    /// before giving up on a conflict.
    ///
    /// Values below 1 are raised to 1.
    pub fn max_lookahead(&mut self, k: usize) -> &mut Self {
        self.max_lookahead = k.max(1);
        self
    }

    pub fn is_minimal_npda(&self) -> bool {
        self.minimal_npda
    }

    pub fn lookahead_limit(&self) -> usize {
        self.max_lookahead
    }
}
