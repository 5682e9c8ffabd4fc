//! # Host API
//!
//! This crate defines the interface between a sandboxed process and the host
//! runtime that performs OS-like services on its behalf.
//!
//! ## Philosophy
//!
//! The host implements the semantics; this layer only shapes requests:
//! - Command numbers are packed and unpacked in one place ([`ioctl`])
//! - Redirects are a sum type; each variant carries exactly its data
//! - Requests borrow their byte strings and own no host resources
//! - Malformed requests are rejected before they cross the boundary
//!
//! ## Design Goals
//!
//! 1. **Testability**: [`HostApi`] can be implemented in-process, and every
//!    call can be pushed through a serialized wire ([`calls`])
//! 2. **Explicitness**: Limits are values ([`AbiLimits`]), optional host
//!    features are queried ([`HostCapabilities`])
//! 3. **No hidden policy**: One call, one synchronous reply. No retries, no
//!    buffering, no timeouts
//!
//! ## Non-Goals
//!
//! This is NOT:
//! - A general IPC framework
//! - The host runtime itself
//! - A place for flow control or retry policy

pub mod calls;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod fcntl;
pub mod fs_admin;
pub mod host;
pub mod ioctl;
pub mod process;
pub mod redirect;
pub mod spawn;

#[cfg(test)]
mod testing;

pub use calls::{
    CallCodecError, HostCallClient, HostCallCodec, HostCallError, HostCallPayload,
    HostCallRequest, HostCallResponse, HostCallResult, HostCallServer, HostOp, HostReplyPayload,
    HostTransport, LoopbackTransport,
};
pub use config::AbiLimits;
pub use device::TcsetattrAction;
pub use error::HostError;
pub use events::HostCapabilities;
pub use fcntl::FcntlCommand;
pub use fs_admin::{MountFlags, MountRequest, MountSpec};
pub use host::HostApi;
pub use ioctl::{Direction, IoctlCommand};
pub use redirect::{Redirect, RedirectKind, RedirectOp, RedirectSpec};
pub use spawn::{EnvVar, SpawnOutcome, SpawnRequest, SpawnRequestBuilder, SpawnSpec, WorkDir};
