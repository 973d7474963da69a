//! # levin-p2p
//!
//! Levin wire protocol and P2P node core for CryptoNote-family networks.
//!
//! ## Layers
//! - [`core`]: portable storage codec, varints, Levin packet framing, stream codec
//! - [`protocol`]: typed HANDSHAKE / TIMED_SYNC / PING messages, dispatcher, handlers
//! - [`transport`]: peer connections, peer registry, TCP server
//! - [`node`]: a running node tying the layers to a chain state
//! - [`config`], [`error`], [`utils`]: configuration, error types, logging and metrics
//!
//! ## Quick Start
//! ```no_run
//! use levin_p2p::config::NodeConfig;
//! use levin_p2p::node::{Node, StaticChain};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> levin_p2p::error::Result<()> {
//! let config = NodeConfig::from_file("node.toml")?;
//! levin_p2p::utils::logging::init(&config.logging)?;
//!
//! let chain = Arc::new(StaticChain::from_config(&config.chain));
//! let node = Node::new(config, chain)?;
//! let addr = node.start().await?;
//! println!("listening on {addr}");
//! # node.stop().await;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod core;
pub mod error;
pub mod node;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use crate::core::packet::Packet;
pub use crate::core::storage::{Section, Value};
pub use crate::error::{ProtocolError, Result};
pub use crate::node::Node;
