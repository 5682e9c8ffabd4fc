//! Terminal event-source extension
//!
//! Not every host exposes event sources. Support is discovered at runtime
//! through [`HostApi::capabilities`]; without it both calls here fail with
//! `ENOTSUP` and the event-source call itself is never sent.

use crate::{HostApi, HostError};
use core_types::{EventMask, RawFd};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Optional extensions a host reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HostCapabilities {
    /// `event_source_fd` and `attach_sigint` are available
    pub event_source: bool,
}

fn require_event_source<H: HostApi + ?Sized>(host: &mut H) -> Result<(), HostError> {
    if !host.capabilities()?.event_source {
        return Err(HostError::unsupported("host has no event sources"));
    }
    Ok(())
}

/// Opens a descriptor that becomes readable while an event in `mask` is
/// pending. Reading it yields the pending [`EventMask`] as 4 bytes.
pub fn event_source_fd<H: HostApi + ?Sized>(
    host: &mut H,
    mask: EventMask,
) -> Result<RawFd, HostError> {
    if mask.is_empty() {
        return Err(HostError::InvalidArgument("empty event mask".to_string()));
    }
    require_event_source(host)?;
    debug!(mask = mask.bits(), "event_source_fd");
    host.event_source_fd(mask)
}

/// Delivers interrupts to the event source at `fd` instead of the default
/// signal action.
pub fn attach_sigint<H: HostApi + ?Sized>(host: &mut H, fd: RawFd) -> Result<(), HostError> {
    host.limits().check_fd(fd)?;
    require_event_source(host)?;
    debug!(fd, "attach_sigint");
    host.attach_sigint(fd)
}
