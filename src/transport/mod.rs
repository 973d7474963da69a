//! # Transport Layer
//!
//! TCP plumbing for the P2P network.
//!
//! ## Components
//! - **Peer**: one connection, its reader and writer tasks and protocol state
//! - **Registry**: the shared list of live peers
//! - **Server**: listener, worker pool, dialing, broadcast and disconnect polling

pub mod peer;
pub mod registry;
pub mod server;
