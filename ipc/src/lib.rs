//! # Boundary Messages
//!
//! This crate defines the envelope that carries an encoded host call across
//! the process/host boundary.
//!
//! ## Philosophy
//!
//! - **One request, one reply**: Every envelope is either a request or the
//!   reply correlated to exactly one request
//! - **Typed, not stringly-typed**: Payloads are serialized typed values
//! - **Versionable**: Every envelope carries a schema version
//! - **Bytes at the edge**: An envelope can be flattened into a frame and
//!   rebuilt from one, which is all a transport has to move
//!
//! The transport itself is not defined here.

pub mod message;

pub use message::{
    FrameError, MessageEnvelope, MessageId, MessagePayload, SchemaVersion,
};
