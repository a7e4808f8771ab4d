//! Compiled-tier bridge
//!
//! The interpreter does not compile anything itself. An embedder may install
//! a [`CompiledTier`]; the loop consults it at function entry and at loop
//! heads once the per-script warm-up counters in [`ProfileData`] say the
//! code is hot. Both directions share the [`ResumePoint`] contract: the
//! tier either finished the frame, threw, or hands control back to the
//! interpreter at a pc.
//!
//! [`ProfileData`]: crate::profile::ProfileData

use bytecode_system::Script;
use core_types::{Abrupt, Value};

use crate::vm::VM;

/// Where a compiled tier is asked to take over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierEntry {
    /// At the first instruction of a freshly pushed frame
    FunctionEntry,
    /// At the loop header at this pc (on-stack replacement)
    LoopHead(usize),
}

/// How a compiled tier hands control back.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumePoint {
    /// The frame completed normally with this value
    Returned(Value),
    /// The frame completed abruptly
    Threw(Abrupt),
    /// Continue interpreting the frame at this pc
    ReenterAt(usize),
}

/// A compiled execution tier.
///
/// `enter` sees the VM with the frame being handed over on top of
/// `VM::frames`; it may read and write that frame's slots and operand
/// stack but must leave the frame in place.
pub trait CompiledTier {
    /// Whether `script` can be run compiled from `entry`
    fn can_enter(&self, script: &Script, entry: TierEntry) -> bool;

    /// Run the top frame from `entry`
    fn enter(&mut self, vm: &mut VM, entry: TierEntry) -> ResumePoint;
}

impl VM {
    /// Install a compiled tier.
    pub fn set_compiled_tier(&mut self, tier: Box<dyn CompiledTier>) {
        self.tier = Some(tier);
    }

    /// Remove and return the compiled tier.
    pub fn clear_compiled_tier(&mut self) -> Option<Box<dyn CompiledTier>> {
        self.tier.take()
    }

    /// Count the entry and hand the top frame to the compiled tier if it is
    /// warm and the tier accepts it.
    pub(crate) fn try_tier_up(&mut self, entry: TierEntry) -> Option<ResumePoint> {
        if self.options.disable_jit || self.tier.is_none() {
            return None;
        }
        let script = self.current_frame().script.clone();
        let warm = match entry {
            TierEntry::FunctionEntry => self.profile.record_entry(script.id),
            TierEntry::LoopHead(_) => self.profile.record_backedge(script.id),
        };
        if !warm {
            return None;
        }
        let mut tier = self.tier.take()?;
        let point = if tier.can_enter(&script, entry) {
            log::trace!("entering compiled tier for {} at {:?}", script.name, entry);
            let depth = self.frames.len();
            let point = tier.enter(self, entry);
            if self.frames.len() != depth {
                crate::fatal!("compiled tier left {} frames, expected {}", self.frames.len(), depth);
            }
            log::trace!("compiled tier for {} resumed with {:?}", script.name, point);
            Some(point)
        } else {
            None
        };
        self.tier = Some(tier);
        point
    }
}
