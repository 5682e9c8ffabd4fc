//! Simulated host configuration

use core_types::Winsize;
use host_api::AbiLimits;
use serde::{Deserialize, Serialize};

/// Knobs for a [`SimulatedHost`](crate::SimulatedHost).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimHostConfig {
    /// Limits the host enforces on its side of the boundary
    pub limits: AbiLimits,
    /// Running processes allowed at once, the caller included
    pub max_processes: usize,
    /// Whether the event-source extension is offered
    pub event_source: bool,
    /// Filesystem types `mount` accepts
    pub supported_filesystems: Vec<String>,
    /// Initial size of the caller's terminal
    pub terminal_size: Winsize,
}

impl SimHostConfig {
    pub fn with_event_source(mut self, enabled: bool) -> Self {
        self.event_source = enabled;
        self
    }

    pub fn with_max_processes(mut self, max_processes: usize) -> Self {
        self.max_processes = max_processes;
        self
    }

    pub fn with_limits(mut self, limits: AbiLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn supports_filesystem(&self, fs_type: &[u8]) -> bool {
        self.supported_filesystems
            .iter()
            .any(|fs| fs.as_bytes() == fs_type)
    }
}

impl Default for SimHostConfig {
    fn default() -> Self {
        Self {
            limits: AbiLimits::default(),
            max_processes: 64,
            event_source: false,
            supported_filesystems: vec!["tmpfs".into(), "devfs".into(), "procfs".into()],
            terminal_size: Winsize::new(24, 80),
        }
    }
}
