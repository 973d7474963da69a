//! Peer connections.
//!
//! A [`PeerConnection`] owns one TCP socket and two tasks: a reader that
//! reassembles Levin packets through [`LevinCodec`] and hands them to the
//! node, and a writer that drains an unbounded outbound queue. Sending never
//! blocks the caller; a slow socket only ever backs up its own queue.
//!
//! The queue has no length cap. A peer that stops reading keeps accumulating
//! broadcast and timed sync traffic in memory until it is disconnected, and
//! there is no idle or handshake timeout that would disconnect it.
//!
//! Any read error, write error, malformed packet or rejected packet marks the
//! connection closed and stops both tasks. The server's disconnect poller
//! later removes the peer from the registry and disposes it.

use crate::core::codec::LevinCodec;
use crate::core::packet::{command, Packet, HEADER_LEN};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::message::{CoreSyncData, PeerlistEntry};
use crate::utils::metrics::Metrics;
use crate::utils::shutdown;
use crate::utils::time::unix_timestamp_or_zero;
use bytes::Bytes;
use futures::StreamExt;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, instrument, warn};

/// Which side opened the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// What a peer told us about itself during handshake and timed sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteNode {
    pub peer_id: u64,
    /// Port the peer listens on
    pub port: u32,
    pub sync: CoreSyncData,
}

/// Protocol-level state of one peer
#[derive(Debug)]
pub struct PeerState {
    id: u64,
    addr: SocketAddr,
    direction: Direction,
    validated: AtomicBool,
    remote: Mutex<Option<RemoteNode>>,
    last_seen: AtomicU64,
}

impl PeerState {
    pub fn new(id: u64, addr: SocketAddr, direction: Direction) -> Self {
        Self {
            id,
            addr,
            direction,
            validated: AtomicBool::new(false),
            remote: Mutex::new(None),
            last_seen: AtomicU64::new(unix_timestamp_or_zero()),
        }
    }

    /// Server-assigned connection identifier
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_validated(&self) -> bool {
        self.validated.load(Ordering::Acquire)
    }

    /// Move from unvalidated to validated. Happens once per connection.
    pub fn mark_validated(&self, remote: RemoteNode) -> Result<()> {
        let mut slot = self.remote.lock().unwrap_or_else(PoisonError::into_inner);
        if self.validated.load(Ordering::Acquire) {
            return Err(ProtocolError::violation(constants::ERR_HANDSHAKE_REPLAY));
        }
        *slot = Some(remote);
        self.validated.store(true, Ordering::Release);
        Ok(())
    }

    pub fn remote(&self) -> Option<RemoteNode> {
        *self.remote.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the chain position announced in a timed sync
    pub fn update_sync(&self, sync: CoreSyncData) {
        if let Some(remote) = self
            .remote
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            remote.sync = sync;
        }
    }

    pub fn touch(&self) {
        self.last_seen
            .store(unix_timestamp_or_zero(), Ordering::Relaxed);
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen.load(Ordering::Relaxed)
    }

    /// Entry for shared peer lists; only validated IPv4 peers qualify
    pub fn peerlist_entry(&self) -> Option<PeerlistEntry> {
        if !self.is_validated() {
            return None;
        }
        let remote = self.remote()?;
        let IpAddr::V4(ip) = self.addr.ip() else {
            return None;
        };
        Some(PeerlistEntry {
            ip: u32::from_le_bytes(ip.octets()),
            port: remote.port,
            id: remote.peer_id,
            last_seen: i64::try_from(self.last_seen()).unwrap_or(i64::MAX),
        })
    }
}

/// Callbacks raised by the server and by peer reader tasks
pub trait PeerEvents: Send + Sync + 'static {
    /// A connection was accepted or dialed and registered
    fn peer_connected(&self, peer: &Arc<PeerConnection>);

    /// A complete packet arrived. An error closes the connection.
    fn packet_received(&self, peer: &Arc<PeerConnection>, packet: Packet) -> Result<()>;

    /// A connection was removed from the registry
    fn peer_disconnected(&self, peer: &Arc<PeerConnection>);
}

/// One live TCP connection to a peer
pub struct PeerConnection {
    state: PeerState,
    outbound: mpsc::UnboundedSender<Bytes>,
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerConnection")
            .field("state", &self.state)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl PeerConnection {
    /// Wrap a connected socket and start its reader and writer tasks
    pub fn spawn(
        stream: TcpStream,
        state: PeerState,
        max_payload: usize,
        events: Arc<dyn PeerEvents>,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        let (outbound, queue) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        let (read_half, write_half) = stream.into_split();

        let peer = Arc::new(Self {
            state,
            outbound,
            shutdown,
            closed: AtomicBool::new(false),
            tasks: tokio::sync::Mutex::new(Vec::with_capacity(2)),
        });

        let reader = tokio::spawn(read_loop(
            peer.clone(),
            read_half,
            max_payload,
            events,
            metrics.clone(),
        ));
        let writer = tokio::spawn(write_loop(peer.clone(), write_half, queue, metrics));

        // Uncontended: nothing else has seen the Arc yet
        if let Ok(mut tasks) = peer.tasks.try_lock() {
            tasks.push(reader);
            tasks.push(writer);
        }

        peer
    }

    pub fn state(&self) -> &PeerState {
        &self.state
    }

    pub fn id(&self) -> u64 {
        self.state.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.state.addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Frame `packet` and queue it for the writer
    pub fn send(&self, packet: &Packet) -> Result<()> {
        debug!(
            peer = %self.state.addr,
            command = command::name(packet.command()),
            response = packet.header.is_response(),
            "Queueing packet"
        );
        self.send_raw(packet.to_bytes()?)
    }

    /// Queue already framed bytes for the writer
    pub fn send_raw(&self, bytes: Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }
        self.outbound
            .send(bytes)
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// Flag the connection closed and tell both tasks to stop
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.shutdown.send_replace(true);
        }
    }

    /// Stop both tasks, wait for them and release the socket.
    ///
    /// Safe to call more than once and from several places; later callers
    /// wait until the first one has finished.
    #[instrument(skip(self), fields(peer = %self.state.addr))]
    pub async fn dispose(&self) {
        self.close();
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "Peer task ended abnormally");
            }
        }
    }
}

async fn read_loop(
    peer: Arc<PeerConnection>,
    read_half: OwnedReadHalf,
    max_payload: usize,
    events: Arc<dyn PeerEvents>,
    metrics: Arc<Metrics>,
) {
    let addr = peer.addr();
    let mut shutdown = peer.shutdown.subscribe();
    let mut frames = FramedRead::new(read_half, LevinCodec::new(max_payload));

    loop {
        tokio::select! {
            _ = shutdown::signalled(&mut shutdown) => break,
            next = frames.next() => match next {
                Some(Ok(packet)) => {
                    peer.state.touch();
                    metrics.message_received(HEADER_LEN as u64 + packet.header.payload_size);
                    if let Err(e) = events.packet_received(&peer, packet) {
                        if !matches!(e, ProtocolError::ConnectionClosed) {
                            metrics.protocol_error();
                        }
                        break;
                    }
                }
                Some(Err(e)) => {
                    match e {
                        ProtocolError::Io(_) => metrics.connection_error(),
                        _ => metrics.protocol_error(),
                    }
                    warn!(peer = %addr, error = %e, "Dropping peer after bad input");
                    break;
                }
                None => {
                    info!(peer = %addr, "Connection closed by peer");
                    break;
                }
            }
        }
    }

    peer.close();
}

async fn write_loop(
    peer: Arc<PeerConnection>,
    mut write_half: OwnedWriteHalf,
    mut queue: mpsc::UnboundedReceiver<Bytes>,
    metrics: Arc<Metrics>,
) {
    let addr = peer.addr();
    let mut shutdown = peer.shutdown.subscribe();

    loop {
        let bytes = tokio::select! {
            _ = shutdown::signalled(&mut shutdown) => break,
            next = queue.recv() => match next {
                Some(bytes) => bytes,
                None => break,
            },
        };

        tokio::select! {
            _ = shutdown::signalled(&mut shutdown) => break,
            written = write_half.write_all(&bytes) => {
                if let Err(e) = written {
                    metrics.connection_error();
                    warn!(peer = %addr, error = %e, "Write failed");
                    break;
                }
                metrics.message_sent(bytes.len() as u64);
            }
        }
    }

    let _ = write_half.shutdown().await;
    peer.close();
}
