//! Host call audit trail
//!
//! Every boundary call the simulated host serves is recorded here in order,
//! so tests can assert on what reached the host and how it ended.
//!
//! ## Example
//!
//! ```
//! use sim_host::audit::{HostAuditLog, HostEvent};
//! use host_api::HostOp;
//!
//! let mut log = HostAuditLog::new();
//! log.record_event(HostEvent::Invoked { op: HostOp::Getpid });
//! log.record_event(HostEvent::Completed { op: HostOp::Getpid });
//! assert_eq!(log.len(), 2);
//! ```

use core_types::Errno;
use host_api::HostOp;

/// What happened to a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// The call reached the host
    Invoked { op: HostOp },
    /// The call succeeded
    Completed { op: HostOp },
    /// The call failed with `code`
    Rejected { op: HostOp, code: Errno },
}

impl HostEvent {
    pub fn op(&self) -> HostOp {
        match *self {
            HostEvent::Invoked { op }
            | HostEvent::Completed { op }
            | HostEvent::Rejected { op, .. } => op,
        }
    }
}

/// A recorded event with its position in the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAuditEvent {
    pub seq: u64,
    pub event: HostEvent,
}

/// Chronological record of host calls
#[derive(Debug, Default)]
pub struct HostAuditLog {
    events: Vec<HostAuditEvent>,
    next_seq: u64,
}

impl HostAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&mut self, event: HostEvent) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push(HostAuditEvent { seq, event });
    }

    pub fn get_events(&self) -> &[HostAuditEvent] {
        &self.events
    }

    /// Counts events matching a predicate
    pub fn count_events<F>(&self, predicate: F) -> usize
    where
        F: Fn(&HostEvent) -> bool,
    {
        self.events.iter().filter(|e| predicate(&e.event)).count()
    }

    /// Returns true if any event matches the predicate
    pub fn has_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&HostEvent) -> bool,
    {
        self.events.iter().any(|e| predicate(&e.event))
    }

    /// Events concerning one kind of call, oldest first
    pub fn events_for_op(&self, op: HostOp) -> Vec<HostEvent> {
        self.events
            .iter()
            .filter(|e| e.event.op() == op)
            .map(|e| e.event)
            .collect()
    }

    /// Clears all events (sequence numbers keep counting)
    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
