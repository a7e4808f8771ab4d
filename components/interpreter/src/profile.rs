//! Warm-up counters for compiled-tier entry decisions
//!
//! The interpreter counts function entries and loop back-edges per script.
//! A compiled tier is only consulted once a counter crosses its threshold,
//! so cold code never pays for the entry predicate.

use std::collections::HashMap;

use bytecode_system::ScriptId;

use crate::options::{DEFAULT_JIT_OSR_THRESHOLD, DEFAULT_JIT_WARMUP_THRESHOLD};

/// Counters of one script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptCounters {
    /// Function entries
    pub entries: u32,
    /// Loop back-edges
    pub backedges: u32,
}

/// Warm-up state of every script seen by the interpreter.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileData {
    counters: HashMap<ScriptId, ScriptCounters>,
    warmup_threshold: u32,
    osr_threshold: u32,
}

impl ProfileData {
    /// Create empty profile data with the default thresholds
    pub fn new() -> Self {
        Self::with_thresholds(DEFAULT_JIT_WARMUP_THRESHOLD, DEFAULT_JIT_OSR_THRESHOLD)
    }

    /// Create empty profile data with explicit thresholds
    pub fn with_thresholds(warmup_threshold: u32, osr_threshold: u32) -> Self {
        Self {
            counters: HashMap::new(),
            warmup_threshold,
            osr_threshold,
        }
    }

    /// Record one function entry; true once the script is warm
    pub fn record_entry(&mut self, script: ScriptId) -> bool {
        let counters = self.counters.entry(script).or_default();
        counters.entries = counters.entries.saturating_add(1);
        counters.entries >= self.warmup_threshold
    }

    /// Record one loop back-edge; true once the loop is hot enough for OSR
    pub fn record_backedge(&mut self, script: ScriptId) -> bool {
        let counters = self.counters.entry(script).or_default();
        counters.backedges = counters.backedges.saturating_add(1);
        counters.backedges >= self.osr_threshold
    }

    /// Counters of a script
    pub fn counters(&self, script: ScriptId) -> ScriptCounters {
        self.counters.get(&script).copied().unwrap_or_default()
    }

    /// Forget a script's counters, e.g. after a tier bailed out
    pub fn reset(&mut self, script: ScriptId) {
        self.counters.remove(&script);
    }
}

impl Default for ProfileData {
    fn default() -> Self {
        Self::new()
    }
}
