//! Cooperative interrupts and execution-time metering
//!
//! Another thread can only ask for an interrupt; the interpreter notices at
//! loop back-edges, `finally` entry, `throw` and calls, which are the only
//! points where stopping leaves no operation half done.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use core_types::{Abrupt, JsResult};
use parking_lot::Mutex;

use crate::vm::VM;

/// Checks between two reads of the clock.
const DEADLINE_CHECK_INTERVAL: u32 = 64;

/// Host callback run on an interrupt request; `false` terminates.
pub type InterruptCallback = Box<dyn FnMut(&mut VM) -> bool>;

#[derive(Debug, Default)]
struct InterruptState {
    interrupt: AtomicBool,
    terminate: AtomicBool,
    deadline: Mutex<Option<Instant>>,
}

/// Thread-safe handle for interrupting a running VM.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    state: Arc<InterruptState>,
}

impl InterruptHandle {
    /// Create a handle with nothing pending
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the VM to run its interrupt callback at the next check.
    pub fn request_interrupt(&self) {
        self.state.interrupt.store(true, Ordering::Release);
    }

    /// Ask the VM to terminate the running activation at the next check.
    pub fn request_termination(&self) {
        self.state.terminate.store(true, Ordering::Release);
    }

    /// Whether any request is pending
    pub fn is_pending(&self) -> bool {
        self.state.interrupt.load(Ordering::Acquire) || self.state.terminate.load(Ordering::Acquire)
    }

    /// Replace the wall-clock deadline of the running execution.
    pub fn set_deadline(&self, deadline: Option<Instant>) {
        *self.state.deadline.lock() = deadline;
    }

    /// Current deadline
    pub fn deadline(&self) -> Option<Instant> {
        *self.state.deadline.lock()
    }

    fn take_interrupt(&self) -> bool {
        self.state.interrupt.swap(false, Ordering::AcqRel)
    }

    fn take_termination(&self) -> bool {
        self.state.terminate.swap(false, Ordering::AcqRel)
    }
}

impl VM {
    /// Handle another thread can use to interrupt this VM.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Install the callback consulted on `request_interrupt`. Without one,
    /// an interrupt request just continues.
    pub fn set_interrupt_callback(&mut self, callback: InterruptCallback) {
        self.interrupt_callback = Some(callback);
    }

    /// Arm the time limit for an outermost execution.
    pub(crate) fn arm_deadline(&mut self) {
        let deadline = self
            .options
            .time_limit_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        self.interrupt.set_deadline(deadline);
        self.interrupt_checks = 0;
    }

    pub(crate) fn disarm_deadline(&mut self) {
        self.interrupt.set_deadline(None);
    }

    /// The interrupt check.
    pub(crate) fn check_interrupt(&mut self) -> JsResult<()> {
        if self.interrupt.take_termination() {
            log::debug!("termination requested");
            return Err(Abrupt::Terminated);
        }
        if self.interrupt.take_interrupt() {
            if let Some(mut callback) = self.interrupt_callback.take() {
                let keep_going = callback(self);
                self.interrupt_callback = Some(callback);
                if !keep_going {
                    log::debug!("interrupt callback terminated execution");
                    return Err(Abrupt::Terminated);
                }
            }
        }
        self.interrupt_checks = self.interrupt_checks.wrapping_add(1);
        if self.interrupt_checks % DEADLINE_CHECK_INTERVAL == 0 {
            if let Some(deadline) = self.interrupt.deadline() {
                if Instant::now() >= deadline {
                    log::warn!(
                        "execution exceeded its time limit of {} ms",
                        self.options.time_limit_ms.unwrap_or(0)
                    );
                    return Err(Abrupt::Terminated);
                }
            }
        }
        Ok(())
    }
}
