//! Deterministic fault injection for the simulated host
//!
//! Faults are consumed in plan order; nothing here is random.
//!
//! ## Example
//!
//! ```
//! use sim_host::fault_injection::{FaultPlan, HostFault};
//! use core_types::Errno;
//! use host_api::HostOp;
//!
//! let plan = FaultPlan::new()
//!     .with_fault(HostFault::FailNext { op: HostOp::Mount, code: Errno::EIO, count: 1 })
//!     .with_fault(HostFault::ExhaustProcessSlots);
//! assert_eq!(plan.faults().len(), 2);
//! ```

use core_types::Errno;
use host_api::{HostError, HostOp};

/// A fault the host should exhibit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostFault {
    /// Fail the next `count` calls of `op` with `code` before touching state
    FailNext { op: HostOp, code: Errno, count: usize },
    /// Report no free process slots to every spawn
    ExhaustProcessSlots,
    /// Fail the redirect at `index` of the next spawn with `code`
    FailRedirect { index: usize, code: Errno },
}

/// A plan describing all faults to inject
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    faults: Vec<HostFault>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self { faults: Vec::new() }
    }

    pub fn with_fault(mut self, fault: HostFault) -> Self {
        self.faults.push(fault);
        self
    }

    pub fn faults(&self) -> &[HostFault] {
        &self.faults
    }

    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }
}

/// Live fault state built from a plan
#[derive(Debug, Clone, Default)]
pub struct FaultInjector {
    fail_next: Vec<(HostOp, Errno, usize)>,
    slots_exhausted: bool,
    redirect_failure: Option<(usize, Errno)>,
}

impl FaultInjector {
    pub fn new(plan: FaultPlan) -> Self {
        let mut injector = Self::default();
        for fault in plan.faults {
            match fault {
                HostFault::FailNext { op, code, count } => {
                    injector.fail_next.push((op, code, count));
                }
                HostFault::ExhaustProcessSlots => injector.slots_exhausted = true,
                HostFault::FailRedirect { index, code } => {
                    injector.redirect_failure = Some((index, code));
                }
            }
        }
        injector
    }

    /// Consumes one pending failure for `op`, if any.
    pub fn take_failure(&mut self, op: HostOp) -> Option<HostError> {
        let entry = self
            .fail_next
            .iter_mut()
            .find(|(fault_op, _, count)| *fault_op == op && *count > 0)?;
        entry.2 -= 1;
        let code = entry.1;
        self.fail_next.retain(|(_, _, count)| *count > 0);
        Some(HostError::from_code(code, format!("injected {op} failure")))
    }

    pub fn process_slots_exhausted(&self) -> bool {
        self.slots_exhausted
    }

    /// Returns the injected failure for the redirect at `index` of the spawn
    /// in progress. The fault is spent once the spawn ends.
    pub fn redirect_failure(&self, index: usize) -> Option<HostError> {
        match self.redirect_failure {
            Some((at, code)) if at == index => Some(HostError::from_code(
                code,
                format!("injected failure at redirect {index}"),
            )),
            _ => None,
        }
    }

    pub(crate) fn finish_spawn(&mut self) {
        self.redirect_failure = None;
    }
}
