//! Engine configuration.
//!
//! Options can be built in code with the `with_*` builders or loaded from
//! JSON; unknown fields are rejected and missing fields take the defaults.

use serde::{Deserialize, Serialize};

use crate::errors::VmError;

/// Default maximum number of live frames.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 1000;
/// Default cap on the argument count of a single call.
pub const DEFAULT_MAX_ARGUMENTS: usize = 500 * 1000;
/// Function entries before a compiled tier is consulted.
pub const DEFAULT_JIT_WARMUP_THRESHOLD: u32 = 500;
/// Loop back-edges before on-stack replacement is consulted.
pub const DEFAULT_JIT_OSR_THRESHOLD: u32 = 10_000;

/// Embedding options of one engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineOptions {
    /// Run top-level scripts as strict code regardless of their flags
    pub strict_mode: bool,
    /// Never hand frames to a compiled tier
    pub disable_jit: bool,
    /// Log sloppy-mode strict violations
    pub extra_warnings: bool,
    /// Turn sloppy-mode strict violations into TypeErrors
    pub werror: bool,
    /// Maximum number of live frames before "too much recursion"
    pub max_recursion_depth: usize,
    /// Maximum argument count of a single call
    pub max_arguments: usize,
    /// Allocations between garbage collections
    pub gc_threshold: usize,
    /// Wall-clock limit for one top-level execution, in milliseconds
    pub time_limit_ms: Option<u64>,
    /// Function entries before a compiled tier is consulted
    pub jit_warmup_threshold: u32,
    /// Loop back-edges before on-stack replacement is consulted
    pub jit_osr_threshold: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            strict_mode: false,
            disable_jit: false,
            extra_warnings: false,
            werror: false,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            max_arguments: DEFAULT_MAX_ARGUMENTS,
            gc_threshold: memory_manager::DEFAULT_GC_THRESHOLD,
            time_limit_ms: None,
            jit_warmup_threshold: DEFAULT_JIT_WARMUP_THRESHOLD,
            jit_osr_threshold: DEFAULT_JIT_OSR_THRESHOLD,
        }
    }
}

impl EngineOptions {
    /// Options with engine defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from JSON
    ///
    /// # Arguments
    ///
    /// * `json` - An object whose fields override the defaults
    ///
    /// # Returns
    ///
    /// * `Ok(EngineOptions)` - The parsed options
    /// * `Err(VmError::Options)` - If the text is not a valid options object
    pub fn from_json(json: &str) -> Result<Self, VmError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the options as JSON
    pub fn to_json(&self) -> Result<String, VmError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Builder: strict top-level code
    pub fn with_strict_mode(mut self, on: bool) -> Self {
        self.strict_mode = on;
        self
    }

    /// Builder: disable compiled tiers
    pub fn with_disable_jit(mut self, on: bool) -> Self {
        self.disable_jit = on;
        self
    }

    /// Builder: log strict violations
    pub fn with_extra_warnings(mut self, on: bool) -> Self {
        self.extra_warnings = on;
        self
    }

    /// Builder: strict violations become TypeErrors
    pub fn with_werror(mut self, on: bool) -> Self {
        self.werror = on;
        self
    }

    /// Builder: frame limit
    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    /// Builder: argument count limit
    pub fn with_max_arguments(mut self, count: usize) -> Self {
        self.max_arguments = count;
        self
    }

    /// Builder: allocations between collections
    pub fn with_gc_threshold(mut self, threshold: usize) -> Self {
        self.gc_threshold = threshold;
        self
    }

    /// Builder: execution time limit
    pub fn with_time_limit_ms(mut self, limit: Option<u64>) -> Self {
        self.time_limit_ms = limit;
        self
    }

    /// Builder: function-entry tier-up threshold
    pub fn with_jit_warmup_threshold(mut self, threshold: u32) -> Self {
        self.jit_warmup_threshold = threshold;
        self
    }

    /// Builder: loop back-edge tier-up threshold
    pub fn with_jit_osr_threshold(mut self, threshold: u32) -> Self {
        self.jit_osr_threshold = threshold;
        self
    }

    /// Set strict top-level code
    pub fn set_strict_mode(&mut self, on: bool) {
        self.strict_mode = on;
    }

    /// Set the frame limit
    pub fn set_max_recursion_depth(&mut self, depth: usize) {
        self.max_recursion_depth = depth;
    }

    /// Set the execution time limit
    pub fn set_time_limit_ms(&mut self, limit: Option<u64>) {
        self.time_limit_ms = limit;
    }

    /// Flip `extra_warnings`, returning the new value
    pub fn toggle_extra_warnings(&mut self) -> bool {
        self.extra_warnings = !self.extra_warnings;
        self.extra_warnings
    }

    /// Flip `werror`, returning the new value
    pub fn toggle_werror(&mut self) -> bool {
        self.werror = !self.werror;
        self.werror
    }

    /// Flip `disable_jit`, returning the new value
    pub fn toggle_disable_jit(&mut self) -> bool {
        self.disable_jit = !self.disable_jit;
        self.disable_jit
    }
}
