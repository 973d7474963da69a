//! Registry of live peer connections

use crate::protocol::message::PeerlistEntry;
use crate::transport::peer::PeerConnection;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Outcome of offering a new connection to the registry
#[derive(Debug)]
pub enum Admission {
    /// Registered. `evicted` holds the peer dropped to make room, if any.
    Added {
        peer: Arc<PeerConnection>,
        evicted: Option<Arc<PeerConnection>>,
    },
    /// The registry is full
    Refused,
}

/// Shared list of registered peers.
///
/// Every operation takes the lock once, so a capacity check and the insert
/// that follows it cannot interleave with another worker.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: Mutex<Vec<Arc<PeerConnection>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<PeerConnection>>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the connection built by `make` if there is room.
    ///
    /// With `evict` set a full registry drops its oldest peer instead of
    /// refusing. `make` only runs when the connection is admitted.
    pub fn admit<F>(&self, max_connections: usize, evict: bool, make: F) -> Admission
    where
        F: FnOnce() -> Arc<PeerConnection>,
    {
        let mut peers = self.lock();
        let mut evicted = None;
        if peers.len() >= max_connections {
            if !evict || peers.is_empty() {
                return Admission::Refused;
            }
            evicted = Some(peers.remove(0));
        }
        let peer = make();
        peers.push(peer.clone());
        Admission::Added { peer, evicted }
    }

    /// Unregister and return every peer whose connection has closed
    pub fn take_closed(&self) -> Vec<Arc<PeerConnection>> {
        let mut peers = self.lock();
        let (closed, open): (Vec<_>, Vec<_>) = peers.drain(..).partition(|p| p.is_closed());
        *peers = open;
        closed
    }

    /// Unregister and return everything
    pub fn drain(&self) -> Vec<Arc<PeerConnection>> {
        std::mem::take(&mut *self.lock())
    }

    pub fn snapshot(&self) -> Vec<Arc<PeerConnection>> {
        self.lock().clone()
    }

    /// Peers that completed a handshake and are still open
    pub fn validated(&self) -> Vec<Arc<PeerConnection>> {
        self.lock()
            .iter()
            .filter(|p| p.state().is_validated() && !p.is_closed())
            .cloned()
            .collect()
    }

    /// Peer list to share, leaving out the connection it is sent to
    pub fn peerlist(&self, exclude: Option<u64>) -> Vec<PeerlistEntry> {
        self.lock()
            .iter()
            .filter(|p| Some(p.id()) != exclude)
            .filter_map(|p| p.state().peerlist_entry())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
