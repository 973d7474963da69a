//! # P2P Protocol Layer
//!
//! Typed command payloads and the per-peer protocol state machine.
//!
//! ## Components
//! - **Message**: HANDSHAKE, TIMED_SYNC and PING bodies as typed structs
//! - **Handshake**: peer validation and the session handlers
//! - **Dispatcher**: routes packets by command code, gated on validation
//!
//! ## Peer States
//! ```text
//! Unvalidated --HANDSHAKE ok--> Validated
//! Unvalidated --anything else--> closed (protocol violation)
//! Validated   --HANDSHAKE-----> closed (replay)
//! ```

pub mod dispatcher;
pub mod handshake;
pub mod message;
