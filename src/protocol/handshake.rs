//! P2P session handlers: handshake, timed sync and ping.
//!
//! A connection starts unvalidated. The HANDSHAKE exchange checks that the
//! remote node is on our network, is not ourselves, speaks a recent enough
//! protocol version and has not already shaken hands; only then is the peer
//! marked validated and allowed to send anything else. Timed syncs keep the
//! recorded chain position of each peer current.
//!
//! Handlers operate on [`PeerState`] only, so they run the same whether the
//! packet came off a socket or out of a test.

use crate::config::NetworkSettings;
use crate::core::packet::{command, Packet};
use crate::core::storage::Section;
use crate::error::{constants, ProtocolError, Result};
use crate::node::ChainState;
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::message::{
    BasicNodeData, CoreSyncData, HandshakeRequest, HandshakeResponse, KvMessage, PeerlistEntry,
    PingResponse, TimedSyncRequest, TimedSyncResponse, PING_OK_STATUS,
};
use crate::transport::peer::{Direction, PeerState, RemoteNode};
use crate::transport::registry::PeerRegistry;
use crate::utils::metrics::Metrics;
use crate::utils::time::unix_timestamp_or_zero;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Draw a node id from the OS random source
pub fn random_peer_id() -> Result<u64> {
    getrandom::u64().map_err(|e| {
        ProtocolError::Custom(format!("{}: {e}", constants::ERR_RANDOM_SOURCE))
    })
}

/// What this node announces about itself
pub struct LocalNode {
    peer_id: u64,
    network: NetworkSettings,
    port: AtomicU32,
    chain: Arc<dyn ChainState>,
}

impl LocalNode {
    pub fn new(peer_id: u64, network: NetworkSettings, port: u16, chain: Arc<dyn ChainState>) -> Self {
        Self {
            peer_id,
            network,
            port: AtomicU32::new(port.into()),
            chain,
        }
    }

    pub fn peer_id(&self) -> u64 {
        self.peer_id
    }

    pub fn network(&self) -> &NetworkSettings {
        &self.network
    }

    /// Port announced in `my_port`; updated once the listener is bound
    pub fn port(&self) -> u32 {
        self.port.load(Ordering::Relaxed)
    }

    pub fn set_port(&self, port: u16) {
        self.port.store(port.into(), Ordering::Relaxed);
    }

    pub fn node_data(&self) -> BasicNodeData {
        BasicNodeData {
            network_id: self.network.network_id,
            version: self.network.protocol_version,
            peer_id: self.peer_id,
            local_time: unix_timestamp_or_zero(),
            my_port: self.port(),
        }
    }

    pub fn sync_data(&self) -> CoreSyncData {
        CoreSyncData {
            current_height: self.chain.height(),
            top_id: self.chain.top_hash(),
        }
    }

    /// HANDSHAKE request sent on every outgoing connection
    pub fn handshake_request(&self) -> Packet {
        let body = HandshakeRequest {
            node_data: self.node_data(),
            payload_data: self.sync_data(),
        };
        Packet::request(command::HANDSHAKE, true, body.to_section())
    }

    /// TIMED_SYNC request sent to validated peers on every sync tick
    pub fn timed_sync_request(&self) -> Packet {
        let body = TimedSyncRequest {
            payload_data: self.sync_data(),
        };
        Packet::request(command::TIMED_SYNC, true, body.to_section())
    }

    fn check_remote(&self, remote: &BasicNodeData) -> Result<()> {
        if remote.network_id != self.network.network_id {
            return Err(ProtocolError::violation(constants::ERR_NETWORK_MISMATCH));
        }
        if remote.peer_id == self.peer_id {
            return Err(ProtocolError::violation(constants::ERR_SELF_CONNECTION));
        }
        if remote.version < self.network.min_protocol_version {
            return Err(ProtocolError::violation(format!(
                "{}: {} < {}",
                constants::ERR_STALE_VERSION,
                remote.version,
                self.network.min_protocol_version
            )));
        }
        Ok(())
    }
}

fn accept_remote(
    local: &LocalNode,
    peer: &PeerState,
    node: &BasicNodeData,
    sync: CoreSyncData,
) -> Result<()> {
    local.check_remote(node)?;
    peer.mark_validated(RemoteNode {
        peer_id: node.peer_id,
        port: node.my_port,
        sync,
    })?;
    info!(
        peer = %peer.addr(),
        peer_id = node.peer_id,
        height = sync.current_height,
        "Handshake complete"
    );
    Ok(())
}

/// Validate an incoming HANDSHAKE request and build our answer
pub fn handle_handshake_request(
    local: &LocalNode,
    peer: &PeerState,
    request: &HandshakeRequest,
    peerlist: Vec<PeerlistEntry>,
) -> Result<HandshakeResponse> {
    accept_remote(local, peer, &request.node_data, request.payload_data)?;
    Ok(HandshakeResponse {
        node_data: local.node_data(),
        payload_data: local.sync_data(),
        local_peerlist: peerlist,
    })
}

/// Validate the answer to a HANDSHAKE request we sent
pub fn handle_handshake_response(
    local: &LocalNode,
    peer: &PeerState,
    response: &HandshakeResponse,
) -> Result<()> {
    if peer.direction() == Direction::Incoming {
        return Err(ProtocolError::violation(
            "Handshake response on a connection we did not open",
        ));
    }
    accept_remote(local, peer, &response.node_data, response.payload_data)?;
    debug!(
        peer = %peer.addr(),
        peers_shared = response.local_peerlist.len(),
        "Received peer list"
    );
    Ok(())
}

/// Record the peer's chain position and answer with ours
pub fn handle_timed_sync_request(
    local: &LocalNode,
    peer: &PeerState,
    request: &TimedSyncRequest,
    peerlist: Vec<PeerlistEntry>,
) -> TimedSyncResponse {
    peer.update_sync(request.payload_data);
    TimedSyncResponse {
        local_time: unix_timestamp_or_zero(),
        payload_data: local.sync_data(),
        local_peerlist: peerlist,
    }
}

pub fn handle_timed_sync_response(peer: &PeerState, response: &TimedSyncResponse) {
    peer.update_sync(response.payload_data);
    debug!(
        peer = %peer.addr(),
        height = response.payload_data.current_height,
        remote_time = response.local_time,
        "Timed sync"
    );
}

pub fn handle_ping(local: &LocalNode) -> PingResponse {
    PingResponse {
        status: PING_OK_STATUS.to_string(),
        peer_id: local.peer_id,
    }
}

/// Install the HANDSHAKE, TIMED_SYNC and PING handlers on `dispatcher`
pub fn register_handlers(
    dispatcher: &Dispatcher,
    local: Arc<LocalNode>,
    registry: Arc<PeerRegistry>,
    metrics: Arc<Metrics>,
) -> Result<()> {
    {
        let local = local.clone();
        let registry = registry.clone();
        dispatcher.register(command::HANDSHAKE, move |peer, packet| {
            on_handshake(&local, &registry, &metrics, peer, packet)
        })?;
    }

    {
        let local = local.clone();
        dispatcher.register(command::TIMED_SYNC, move |peer, packet| {
            if packet.header.is_response() {
                let response = TimedSyncResponse::from_section(&packet.body)?;
                handle_timed_sync_response(peer, &response);
                return Ok(None);
            }
            let request = TimedSyncRequest::from_section(&packet.body)?;
            let response =
                handle_timed_sync_request(&local, peer, &request, registry.peerlist(Some(peer.id())));
            Ok(Some(response.to_section()))
        })?;
    }

    dispatcher.register(command::PING, move |peer, packet| {
        if packet.header.is_response() {
            let response = PingResponse::from_section(&packet.body)?;
            info!(
                peer = %peer.addr(),
                status = %response.status,
                peer_id = response.peer_id,
                "Ping response"
            );
            return Ok(None);
        }
        Ok(Some(handle_ping(&local).to_section()))
    })
}

fn on_handshake(
    local: &LocalNode,
    registry: &PeerRegistry,
    metrics: &Metrics,
    peer: &PeerState,
    packet: &Packet,
) -> Result<Option<Section>> {
    let result = if packet.header.is_response() {
        HandshakeResponse::from_section(&packet.body)
            .and_then(|response| handle_handshake_response(local, peer, &response))
            .map(|()| None)
    } else {
        metrics.handshake_attempt();
        HandshakeRequest::from_section(&packet.body)
            .and_then(|request| {
                handle_handshake_request(local, peer, &request, registry.peerlist(Some(peer.id())))
            })
            .map(|response| Some(response.to_section()))
    };

    match &result {
        Ok(_) => metrics.handshake_success(),
        Err(e) => {
            metrics.handshake_failed();
            warn!(peer = %peer.addr(), error = %e, "Handshake rejected");
        }
    }
    result
}
