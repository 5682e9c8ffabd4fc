//! Host calls carried as typed messages.
//!
//! Every [`HostApi`] method has a request variant and a reply variant.
//! Requests are wrapped in a [`MessageEnvelope`], moved by a
//! [`HostTransport`], and answered by a [`HostCallServer`] that dispatches to
//! a real [`HostApi`] implementation. [`HostCallClient`] is the other end: it
//! implements [`HostApi`] by doing one round trip per call.

use crate::fs_admin::MountSpec;
use crate::spawn::SpawnSpec;
use crate::{
    AbiLimits, FcntlCommand, HostApi, HostCapabilities, HostError, MountRequest, SpawnOutcome,
    SpawnRequest,
};
use core_types::{DeviceId, Errno, EventMask, Pid, RawFd, Signal};
use ipc::{MessageEnvelope, MessageId, MessagePayload, SchemaVersion};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

const HOST_CALL_REQUEST_ACTION: &str = "host.call.request";
const HOST_CALL_RESPONSE_ACTION: &str = "host.call.response";
const HOST_CALL_SCHEMA_VERSION: SchemaVersion = SchemaVersion::new(1, 0);

/// Names of the boundary calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostOp {
    Capabilities,
    Chdir,
    Getcwd,
    Isatty,
    SetEnv,
    Getpid,
    CleanInodes,
    Spawn,
    Kill,
    Ioctl,
    Fcntl,
    Mount,
    Umount,
    Mknod,
    EventSourceFd,
    AttachSigint,
}

impl fmt::Display for HostOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Host call request wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostCallRequest {
    pub request_id: MessageId,
    pub payload: HostCallPayload,
}

/// Typed request payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostCallPayload {
    Capabilities,
    Chdir { path: Vec<u8> },
    Getcwd { buf_len: usize },
    Isatty { fd: RawFd },
    SetEnv { name: Vec<u8>, value: Option<Vec<u8>> },
    Getpid,
    CleanInodes,
    Spawn { request: SpawnSpec },
    Kill { pid: Pid, signal: Signal },
    Ioctl { fd: RawFd, command: u32, payload: Vec<u8> },
    Fcntl { fd: RawFd, command: FcntlCommand },
    Mount { request: MountSpec },
    Umount { path: Vec<u8> },
    Mknod { path: Vec<u8>, device: DeviceId },
    EventSourceFd { mask: EventMask },
    AttachSigint { fd: RawFd },
}

impl HostCallPayload {
    pub fn op(&self) -> HostOp {
        match self {
            HostCallPayload::Capabilities => HostOp::Capabilities,
            HostCallPayload::Chdir { .. } => HostOp::Chdir,
            HostCallPayload::Getcwd { .. } => HostOp::Getcwd,
            HostCallPayload::Isatty { .. } => HostOp::Isatty,
            HostCallPayload::SetEnv { .. } => HostOp::SetEnv,
            HostCallPayload::Getpid => HostOp::Getpid,
            HostCallPayload::CleanInodes => HostOp::CleanInodes,
            HostCallPayload::Spawn { .. } => HostOp::Spawn,
            HostCallPayload::Kill { .. } => HostOp::Kill,
            HostCallPayload::Ioctl { .. } => HostOp::Ioctl,
            HostCallPayload::Fcntl { .. } => HostOp::Fcntl,
            HostCallPayload::Mount { .. } => HostOp::Mount,
            HostCallPayload::Umount { .. } => HostOp::Umount,
            HostCallPayload::Mknod { .. } => HostOp::Mknod,
            HostCallPayload::EventSourceFd { .. } => HostOp::EventSourceFd,
            HostCallPayload::AttachSigint { .. } => HostOp::AttachSigint,
        }
    }
}

/// Host call response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostCallResponse {
    pub request_id: MessageId,
    pub payload: HostReplyPayload,
}

/// Typed reply payloads, one per request variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostReplyPayload {
    Capabilities(HostCallResult<HostCapabilities>),
    Chdir(HostCallResult<()>),
    Getcwd(HostCallResult<Vec<u8>>),
    Isatty(HostCallResult<bool>),
    SetEnv(HostCallResult<()>),
    Getpid(HostCallResult<Pid>),
    CleanInodes(HostCallResult<()>),
    Spawn(HostCallResult<SpawnOutcome>),
    Kill(HostCallResult<()>),
    Ioctl(HostCallResult<Vec<u8>>),
    Fcntl(HostCallResult<i32>),
    Mount(HostCallResult<()>),
    Umount(HostCallResult<()>),
    Mknod(HostCallResult<()>),
    EventSourceFd(HostCallResult<RawFd>),
    AttachSigint(HostCallResult<()>),
}

/// Result type used in host call replies.
pub type HostCallResult<T> = Result<T, HostCallError>;

/// Wire form of a failed call: the exact errno plus a description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCallError {
    pub code: Errno,
    pub message: String,
    /// `(fd, max_fd)` when the host refused a descriptor outside its range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fd_range: Option<(RawFd, RawFd)>,
}

impl From<HostError> for HostCallError {
    fn from(error: HostError) -> Self {
        let fd_range = match error {
            HostError::InvalidDescriptor { fd, max_fd } => Some((fd, max_fd)),
            _ => None,
        };
        Self {
            code: error.code(),
            message: error.to_string(),
            fd_range,
        }
    }
}

impl From<HostCallError> for HostError {
    fn from(error: HostCallError) -> Self {
        match error.fd_range {
            Some((fd, max_fd)) => HostError::InvalidDescriptor { fd, max_fd },
            None => HostError::from_code(error.code, error.message),
        }
    }
}

/// Errors when encoding or decoding host call messages.
#[derive(Debug, Error)]
pub enum CallCodecError {
    #[error("Unexpected host call action: {0}")]
    UnexpectedAction(String),

    #[error("Schema mismatch: expected {expected}, got {actual}")]
    SchemaMismatch {
        expected: SchemaVersion,
        actual: SchemaVersion,
    },

    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

impl From<CallCodecError> for HostError {
    fn from(error: CallCodecError) -> Self {
        HostError::Transport(error.to_string())
    }
}

/// Encoder/decoder for host call messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCallCodec;

impl HostCallCodec {
    pub fn new() -> Self {
        Self
    }

    /// Encodes a request into a MessageEnvelope.
    pub fn encode_request(
        &self,
        request: &HostCallRequest,
    ) -> Result<MessageEnvelope, CallCodecError> {
        let payload = MessagePayload::new(request)?;
        Ok(MessageEnvelope::new(
            HOST_CALL_REQUEST_ACTION,
            HOST_CALL_SCHEMA_VERSION,
            payload,
        ))
    }

    /// Encodes a response into a MessageEnvelope answering `correlation_id`.
    pub fn encode_response(
        &self,
        response: &HostCallResponse,
        correlation_id: MessageId,
    ) -> Result<MessageEnvelope, CallCodecError> {
        let payload = MessagePayload::new(response)?;
        Ok(MessageEnvelope::new(
            HOST_CALL_RESPONSE_ACTION,
            HOST_CALL_SCHEMA_VERSION,
            payload,
        )
        .with_correlation(correlation_id))
    }

    pub fn decode_request(
        &self,
        message: &MessageEnvelope,
    ) -> Result<HostCallRequest, CallCodecError> {
        Self::check(message, HOST_CALL_REQUEST_ACTION)?;
        Ok(message.payload.deserialize::<HostCallRequest>()?)
    }

    pub fn decode_response(
        &self,
        message: &MessageEnvelope,
    ) -> Result<HostCallResponse, CallCodecError> {
        Self::check(message, HOST_CALL_RESPONSE_ACTION)?;
        Ok(message.payload.deserialize::<HostCallResponse>()?)
    }

    fn check(message: &MessageEnvelope, action: &str) -> Result<(), CallCodecError> {
        if message.action != action {
            return Err(CallCodecError::UnexpectedAction(message.action.clone()));
        }
        if !message
            .schema_version
            .is_compatible_with(&HOST_CALL_SCHEMA_VERSION)
        {
            return Err(CallCodecError::SchemaMismatch {
                expected: HOST_CALL_SCHEMA_VERSION,
                actual: message.schema_version,
            });
        }
        Ok(())
    }
}

/// Transport abstraction for host call messages.
///
/// One `send` is always followed by one `receive` for its reply.
pub trait HostTransport {
    fn send(&mut self, message: MessageEnvelope) -> Result<(), HostError>;
    fn receive(&mut self) -> Result<MessageEnvelope, HostError>;
}

/// Host call server that executes requests using a HostApi implementation.
pub struct HostCallServer<H: HostApi> {
    host: H,
    codec: HostCallCodec,
}

impl<H: HostApi> HostCallServer<H> {
    pub fn new(host: H, codec: HostCallCodec) -> Self {
        Self { host, codec }
    }

    /// Decodes a request, runs it, and encodes the reply.
    ///
    /// A failing call is not an error here: it becomes an error reply.
    /// Only undecodable messages fail.
    pub fn handle_message(
        &mut self,
        message: MessageEnvelope,
    ) -> Result<MessageEnvelope, HostError> {
        let request = self.codec.decode_request(&message)?;
        let payload = self.dispatch(request.payload);
        let response = HostCallResponse {
            request_id: request.request_id,
            payload,
        };
        Ok(self.codec.encode_response(&response, message.id)?)
    }

    /// Same as [`Self::handle_message`], on framed bytes.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Result<Vec<u8>, HostError> {
        let message = MessageEnvelope::from_frame(frame)
            .map_err(|err| HostError::Transport(err.to_string()))?;
        self.handle_message(message)?
            .to_frame()
            .map_err(|err| HostError::Transport(err.to_string()))
    }

    fn dispatch(&mut self, payload: HostCallPayload) -> HostReplyPayload {
        let host = &mut self.host;
        match payload {
            HostCallPayload::Capabilities => {
                HostReplyPayload::Capabilities(host.capabilities().map_err(HostCallError::from))
            }
            HostCallPayload::Chdir { path } => {
                HostReplyPayload::Chdir(host.chdir(&path).map_err(HostCallError::from))
            }
            HostCallPayload::Getcwd { buf_len } => {
                HostReplyPayload::Getcwd(host.getcwd(buf_len).map_err(HostCallError::from))
            }
            HostCallPayload::Isatty { fd } => {
                HostReplyPayload::Isatty(host.isatty(fd).map_err(HostCallError::from))
            }
            HostCallPayload::SetEnv { name, value } => HostReplyPayload::SetEnv(
                host.set_env(&name, value.as_deref())
                    .map_err(HostCallError::from),
            ),
            HostCallPayload::Getpid => {
                HostReplyPayload::Getpid(host.getpid().map_err(HostCallError::from))
            }
            HostCallPayload::CleanInodes => {
                HostReplyPayload::CleanInodes(host.clean_inodes().map_err(HostCallError::from))
            }
            HostCallPayload::Spawn { request } => HostReplyPayload::Spawn(
                host.spawn(&request.as_request())
                    .map_err(HostCallError::from),
            ),
            HostCallPayload::Kill { pid, signal } => {
                HostReplyPayload::Kill(host.kill(pid, signal).map_err(HostCallError::from))
            }
            HostCallPayload::Ioctl {
                fd,
                command,
                payload,
            } => HostReplyPayload::Ioctl(
                host.ioctl(fd, command, &payload)
                    .map_err(HostCallError::from),
            ),
            HostCallPayload::Fcntl { fd, command } => {
                HostReplyPayload::Fcntl(host.fcntl(fd, command).map_err(HostCallError::from))
            }
            HostCallPayload::Mount { request } => HostReplyPayload::Mount(
                host.mount(&request.as_request())
                    .map_err(HostCallError::from),
            ),
            HostCallPayload::Umount { path } => {
                HostReplyPayload::Umount(host.umount(&path).map_err(HostCallError::from))
            }
            HostCallPayload::Mknod { path, device } => {
                HostReplyPayload::Mknod(host.mknod(&path, device).map_err(HostCallError::from))
            }
            HostCallPayload::EventSourceFd { mask } => HostReplyPayload::EventSourceFd(
                host.event_source_fd(mask).map_err(HostCallError::from),
            ),
            HostCallPayload::AttachSigint { fd } => HostReplyPayload::AttachSigint(
                host.attach_sigint(fd).map_err(HostCallError::from),
            ),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }
}

/// Host call client implementing HostApi over a HostTransport.
pub struct HostCallClient<T: HostTransport> {
    transport: T,
    codec: HostCallCodec,
    limits: AbiLimits,
}

impl<T: HostTransport> HostCallClient<T> {
    pub fn new(transport: T, codec: HostCallCodec) -> Self {
        Self {
            transport,
            codec,
            limits: AbiLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: AbiLimits) -> Self {
        self.limits = limits;
        self
    }

    fn round_trip(&mut self, payload: HostCallPayload) -> Result<HostCallResponse, HostError> {
        let op = payload.op();
        let request = HostCallRequest {
            request_id: MessageId::new(),
            payload,
        };
        debug!(%op, request_id = %request.request_id, "host call");

        let message = self.codec.encode_request(&request)?;
        let message_id = message.id;
        self.transport.send(message)?;
        let response_message = self.transport.receive()?;
        if response_message.correlation_id != Some(message_id) {
            return Err(HostError::Transport(
                "Host call reply correlation mismatch".to_string(),
            ));
        }
        let response = self.codec.decode_response(&response_message)?;

        if response.request_id != request.request_id {
            return Err(HostError::Transport(
                "Host call response request_id mismatch".to_string(),
            ));
        }

        Ok(response)
    }

    fn extract<TPayload>(
        op: HostOp,
        response: HostCallResponse,
        f: fn(HostReplyPayload) -> Option<HostCallResult<TPayload>>,
    ) -> Result<TPayload, HostError> {
        let result = f(response.payload).ok_or_else(|| {
            HostError::Transport("Host call response payload mismatch".to_string())
        })?;
        result.map_err(|err| {
            warn!(%op, code = %err.code, reason = %err.message, "host rejected call");
            HostError::from(err)
        })
    }

    fn call<TPayload>(
        &mut self,
        payload: HostCallPayload,
        f: fn(HostReplyPayload) -> Option<HostCallResult<TPayload>>,
    ) -> Result<TPayload, HostError> {
        let op = payload.op();
        let response = self.round_trip(payload)?;
        Self::extract(op, response, f)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

impl<T: HostTransport> HostApi for HostCallClient<T> {
    fn limits(&self) -> AbiLimits {
        self.limits
    }

    fn capabilities(&mut self) -> Result<HostCapabilities, HostError> {
        self.call(HostCallPayload::Capabilities, |payload| match payload {
            HostReplyPayload::Capabilities(result) => Some(result),
            _ => None,
        })
    }

    fn chdir(&mut self, path: &[u8]) -> Result<(), HostError> {
        let payload = HostCallPayload::Chdir {
            path: path.to_vec(),
        };
        self.call(payload, |payload| match payload {
            HostReplyPayload::Chdir(result) => Some(result),
            _ => None,
        })
    }

    fn getcwd(&mut self, buf_len: usize) -> Result<Vec<u8>, HostError> {
        self.call(HostCallPayload::Getcwd { buf_len }, |payload| match payload {
            HostReplyPayload::Getcwd(result) => Some(result),
            _ => None,
        })
    }

    fn isatty(&mut self, fd: RawFd) -> Result<bool, HostError> {
        self.call(HostCallPayload::Isatty { fd }, |payload| match payload {
            HostReplyPayload::Isatty(result) => Some(result),
            _ => None,
        })
    }

    fn set_env(&mut self, name: &[u8], value: Option<&[u8]>) -> Result<(), HostError> {
        let payload = HostCallPayload::SetEnv {
            name: name.to_vec(),
            value: value.map(<[u8]>::to_vec),
        };
        self.call(payload, |payload| match payload {
            HostReplyPayload::SetEnv(result) => Some(result),
            _ => None,
        })
    }

    fn getpid(&mut self) -> Result<Pid, HostError> {
        self.call(HostCallPayload::Getpid, |payload| match payload {
            HostReplyPayload::Getpid(result) => Some(result),
            _ => None,
        })
    }

    fn clean_inodes(&mut self) -> Result<(), HostError> {
        self.call(HostCallPayload::CleanInodes, |payload| match payload {
            HostReplyPayload::CleanInodes(result) => Some(result),
            _ => None,
        })
    }

    fn spawn(&mut self, request: &SpawnRequest<'_>) -> Result<SpawnOutcome, HostError> {
        let payload = HostCallPayload::Spawn {
            request: request.to_spec(),
        };
        self.call(payload, |payload| match payload {
            HostReplyPayload::Spawn(result) => Some(result),
            _ => None,
        })
    }

    fn kill(&mut self, pid: Pid, signal: Signal) -> Result<(), HostError> {
        self.call(HostCallPayload::Kill { pid, signal }, |payload| match payload {
            HostReplyPayload::Kill(result) => Some(result),
            _ => None,
        })
    }

    fn ioctl(&mut self, fd: RawFd, command: u32, payload: &[u8]) -> Result<Vec<u8>, HostError> {
        let payload = HostCallPayload::Ioctl {
            fd,
            command,
            payload: payload.to_vec(),
        };
        self.call(payload, |payload| match payload {
            HostReplyPayload::Ioctl(result) => Some(result),
            _ => None,
        })
    }

    fn fcntl(&mut self, fd: RawFd, command: FcntlCommand) -> Result<i32, HostError> {
        self.call(HostCallPayload::Fcntl { fd, command }, |payload| match payload {
            HostReplyPayload::Fcntl(result) => Some(result),
            _ => None,
        })
    }

    fn mount(&mut self, request: &MountRequest<'_>) -> Result<(), HostError> {
        let payload = HostCallPayload::Mount {
            request: request.to_spec(),
        };
        self.call(payload, |payload| match payload {
            HostReplyPayload::Mount(result) => Some(result),
            _ => None,
        })
    }

    fn umount(&mut self, path: &[u8]) -> Result<(), HostError> {
        let payload = HostCallPayload::Umount {
            path: path.to_vec(),
        };
        self.call(payload, |payload| match payload {
            HostReplyPayload::Umount(result) => Some(result),
            _ => None,
        })
    }

    fn mknod(&mut self, path: &[u8], device: DeviceId) -> Result<(), HostError> {
        let payload = HostCallPayload::Mknod {
            path: path.to_vec(),
            device,
        };
        self.call(payload, |payload| match payload {
            HostReplyPayload::Mknod(result) => Some(result),
            _ => None,
        })
    }

    fn event_source_fd(&mut self, mask: EventMask) -> Result<RawFd, HostError> {
        self.call(HostCallPayload::EventSourceFd { mask }, |payload| match payload {
            HostReplyPayload::EventSourceFd(result) => Some(result),
            _ => None,
        })
    }

    fn attach_sigint(&mut self, fd: RawFd) -> Result<(), HostError> {
        self.call(HostCallPayload::AttachSigint { fd }, |payload| match payload {
            HostReplyPayload::AttachSigint(result) => Some(result),
            _ => None,
        })
    }
}

/// In-process transport that pushes every envelope through its byte frame
/// before handing it to a server.
pub struct LoopbackTransport<H: HostApi> {
    server: HostCallServer<H>,
    pending: Option<Vec<u8>>,
}

impl<H: HostApi> LoopbackTransport<H> {
    pub fn new(server: HostCallServer<H>) -> Self {
        Self {
            server,
            pending: None,
        }
    }

    pub fn server(&self) -> &HostCallServer<H> {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut HostCallServer<H> {
        &mut self.server
    }
}

impl<H: HostApi> HostTransport for LoopbackTransport<H> {
    fn send(&mut self, message: MessageEnvelope) -> Result<(), HostError> {
        let frame = message
            .to_frame()
            .map_err(|err| HostError::Transport(err.to_string()))?;
        let reply = self.server.handle_frame(&frame)?;
        self.pending = Some(reply);
        Ok(())
    }

    fn receive(&mut self) -> Result<MessageEnvelope, HostError> {
        let frame = self
            .pending
            .take()
            .ok_or_else(|| HostError::Transport("No host call reply pending".to_string()))?;
        MessageEnvelope::from_frame(&frame).map_err(|err| HostError::Transport(err.to_string()))
    }
}
