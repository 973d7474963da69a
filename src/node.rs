//! # P2P Node
//!
//! Owns one [`P2pServer`], the command [`Dispatcher`] and the timed sync
//! driver, and wires them to a [`ChainState`] supplied by the embedder.
//!
//! ```no_run
//! use levin_p2p::config::NodeConfig;
//! use levin_p2p::node::{Node, StaticChain};
//! use std::sync::Arc;
//!
//! # async fn run() -> levin_p2p::error::Result<()> {
//! let config = NodeConfig::default();
//! let chain = Arc::new(StaticChain::from_config(&config.chain));
//! let node = Node::new(config, chain)?;
//! node.start().await?;
//! node.add_peer("203.0.113.7:18080".parse().unwrap())?;
//! // ...
//! node.stop().await;
//! # Ok(())
//! # }
//! ```

use crate::config::{ChainConfig, NodeConfig};
use crate::core::packet::{command, Packet};
use crate::error::Result;
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::handshake::{self, LocalNode};
use crate::protocol::message::PeerlistEntry;
use crate::transport::peer::{Direction, PeerConnection, PeerEvents};
use crate::transport::registry::PeerRegistry;
use crate::transport::server::P2pServer;
use crate::utils::metrics::{Metrics, MetricsSnapshot};
use crate::utils::shutdown;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Read access to the local blockchain, as much as the P2P layer needs
pub trait ChainState: Send + Sync {
    fn height(&self) -> u64;
    fn top_hash(&self) -> [u8; 32];
}

/// Fixed chain position, settable from outside
#[derive(Debug)]
pub struct StaticChain {
    height: AtomicU64,
    top_hash: Mutex<[u8; 32]>,
}

impl StaticChain {
    pub fn new(height: u64, top_hash: [u8; 32]) -> Self {
        Self {
            height: AtomicU64::new(height),
            top_hash: Mutex::new(top_hash),
        }
    }

    pub fn from_config(config: &ChainConfig) -> Self {
        Self::new(config.height, config.top_hash)
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::Relaxed);
    }

    pub fn set_top_hash(&self, top_hash: [u8; 32]) {
        *self.top_hash.lock().unwrap_or_else(PoisonError::into_inner) = top_hash;
    }
}

impl ChainState for StaticChain {
    fn height(&self) -> u64 {
        self.height.load(Ordering::Relaxed)
    }

    fn top_hash(&self) -> [u8; 32] {
        *self.top_hash.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct NodeEvents {
    local: Arc<LocalNode>,
    dispatcher: Dispatcher,
    metrics: Arc<Metrics>,
}

impl PeerEvents for NodeEvents {
    fn peer_connected(&self, peer: &Arc<PeerConnection>) {
        if peer.state().direction() != Direction::Outgoing {
            return;
        }
        self.metrics.handshake_attempt();
        if let Err(e) = peer.send(&self.local.handshake_request()) {
            warn!(peer = %peer.addr(), error = %e, "Failed to send handshake");
            peer.close();
        }
    }

    fn packet_received(&self, peer: &Arc<PeerConnection>, packet: Packet) -> Result<()> {
        let code = packet.command();
        debug!(
            peer = %peer.addr(),
            command = command::name(code),
            response = packet.header.is_response(),
            "Packet received"
        );
        let reply = self
            .dispatcher
            .dispatch(peer.state(), &packet)
            .map_err(|e| {
                warn!(
                    peer = %peer.addr(),
                    command = command::name(code),
                    error = %e,
                    "Dropping peer"
                );
                e
            })?;
        match reply {
            Some(response) => peer.send(&response),
            None => Ok(()),
        }
    }

    fn peer_disconnected(&self, peer: &Arc<PeerConnection>) {
        let remote = peer.state().remote().map(|r| r.peer_id);
        debug!(peer = %peer.addr(), peer_id = ?remote, "Peer gone");
    }
}

struct SyncDriver {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// A P2P node instance
pub struct Node {
    config: NodeConfig,
    local: Arc<LocalNode>,
    registry: Arc<PeerRegistry>,
    server: P2pServer,
    metrics: Arc<Metrics>,
    sync_driver: Mutex<Option<SyncDriver>>,
}

impl Node {
    /// Build a node with a random node id
    pub fn new(config: NodeConfig, chain: Arc<dyn ChainState>) -> Result<Self> {
        let peer_id = handshake::random_peer_id()?;
        Self::with_peer_id(config, chain, peer_id)
    }

    /// Build a node with a fixed node id
    pub fn with_peer_id(config: NodeConfig, chain: Arc<dyn ChainState>, peer_id: u64) -> Result<Self> {
        config.validate_strict()?;

        let metrics = Arc::new(Metrics::new());
        let registry = Arc::new(PeerRegistry::new());
        let local = Arc::new(LocalNode::new(
            peer_id,
            config.network.clone(),
            config.p2p.port,
            chain,
        ));

        let dispatcher = Dispatcher::new();
        handshake::register_handlers(&dispatcher, local.clone(), registry.clone(), metrics.clone())?;

        let events = Arc::new(NodeEvents {
            local: local.clone(),
            dispatcher,
            metrics: metrics.clone(),
        });
        let server = P2pServer::new(config.p2p.clone(), registry.clone(), events, metrics.clone());

        Ok(Self {
            config,
            local,
            registry,
            server,
            metrics,
            sync_driver: Mutex::new(None),
        })
    }

    /// Start listening and begin periodic timed syncs. Returns the bound address.
    #[instrument(skip(self), fields(peer_id = self.local.peer_id()))]
    pub async fn start(&self) -> Result<SocketAddr> {
        let addr = self.server.start().await?;
        self.local.set_port(addr.port());

        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(timed_sync_loop(
            self.local.clone(),
            self.registry.clone(),
            self.config.p2p.timed_sync_interval,
            rx,
        ));
        let previous = self
            .sync_driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(SyncDriver { shutdown, task });
        if let Some(previous) = previous {
            previous.shutdown.send_replace(true);
        }

        info!(address = %addr, "Node started");
        Ok(addr)
    }

    /// Stop the sync driver and the server, then dispose every peer
    #[instrument(skip(self), fields(peer_id = self.local.peer_id()))]
    pub async fn stop(&self) {
        let driver = self
            .sync_driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(driver) = driver {
            driver.shutdown.send_replace(true);
            if let Err(e) = driver.task.await {
                warn!(error = %e, "Timed sync driver ended abnormally");
            }
        }
        self.server.stop().await;
        self.metrics.log_metrics();
    }

    pub fn add_peer(&self, addr: SocketAddr) -> Result<()> {
        self.server.add_peer(addr)
    }

    pub fn force_add_peer(&self, addr: SocketAddr) -> Result<()> {
        self.server.force_add_peer(addr)
    }

    /// Queue `packet` on every registered peer
    pub fn broadcast(&self, packet: &Packet) -> Result<usize> {
        Ok(self.server.broadcast(packet.to_bytes()?))
    }

    pub fn peer_id(&self) -> u64 {
        self.local.peer_id()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr()
    }

    pub fn peers(&self) -> Vec<Arc<PeerConnection>> {
        self.server.peers()
    }

    pub fn peer_count(&self) -> usize {
        self.server.peer_count()
    }

    /// Validated peers in the form shared with other nodes
    pub fn peer_list(&self) -> Vec<PeerlistEntry> {
        self.registry.peerlist(None)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

async fn timed_sync_loop(
    local: Arc<LocalNode>,
    registry: Arc<PeerRegistry>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown::signalled(&mut shutdown) => break,
            _ = ticker.tick() => {
                let bytes = match local.timed_sync_request().to_bytes() {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(error = %e, "Failed to frame timed sync request");
                        continue;
                    }
                };
                let peers = registry.validated();
                debug!(peers = peers.len(), "Timed sync round");
                for peer in peers {
                    if let Err(e) = peer.send_raw(bytes.clone()) {
                        debug!(peer = %peer.addr(), error = %e, "Skipping timed sync");
                    }
                }
            }
        }
    }
    debug!("Timed sync driver stopped");
}
