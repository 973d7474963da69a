//! Typed P2P command payloads.
//!
//! Each message converts to and from a portable-storage [`Section`] through
//! the [`KvMessage`] trait; field names are the ones used on the wire.

use crate::core::storage::{Array, Section, TypeTag, Value};
use crate::error::{ProtocolError, Result};
use std::net::{Ipv4Addr, SocketAddr};

/// Conversion between a typed message and its storage section
pub trait KvMessage: Sized {
    fn to_section(&self) -> Section;
    fn from_section(section: &Section) -> Result<Self>;
}

/// Identity of a node as announced in a handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicNodeData {
    pub network_id: [u8; 16],
    pub version: u32,
    pub peer_id: u64,
    pub local_time: u64,
    pub my_port: u32,
}

impl KvMessage for BasicNodeData {
    fn to_section(&self) -> Section {
        Section::new()
            .with("network_id", self.network_id.to_vec())
            .with("version", self.version)
            .with("peer_id", self.peer_id)
            .with("local_time", self.local_time)
            .with("my_port", self.my_port)
    }

    fn from_section(s: &Section) -> Result<Self> {
        Ok(Self {
            network_id: s.get_bytes("network_id")?,
            version: s.get_u32("version")?,
            peer_id: s.get_u64("peer_id")?,
            local_time: s.get_u64("local_time")?,
            my_port: s.get_u32("my_port")?,
        })
    }
}

/// Chain position announced by a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreSyncData {
    pub current_height: u64,
    pub top_id: [u8; 32],
}

impl KvMessage for CoreSyncData {
    fn to_section(&self) -> Section {
        Section::new()
            .with("current_height", self.current_height)
            .with("top_id", self.top_id.to_vec())
    }

    fn from_section(s: &Section) -> Result<Self> {
        Ok(Self {
            current_height: s.get_u64("current_height")?,
            top_id: s.get_bytes("top_id")?,
        })
    }
}

/// One entry of a shared peer list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerlistEntry {
    /// IPv4 address, octets in little-endian order
    pub ip: u32,
    pub port: u32,
    pub id: u64,
    pub last_seen: i64,
}

impl PeerlistEntry {
    pub fn new(ip: Ipv4Addr, port: u16, id: u64, last_seen: i64) -> Self {
        Self {
            ip: u32::from_le_bytes(ip.octets()),
            port: port.into(),
            id,
            last_seen,
        }
    }

    /// Address the peer listens on, if the announced port is valid
    pub fn addr(&self) -> Option<SocketAddr> {
        let port = u16::try_from(self.port).ok()?;
        Some(SocketAddr::from((Ipv4Addr::from(self.ip.to_le_bytes()), port)))
    }
}

impl KvMessage for PeerlistEntry {
    fn to_section(&self) -> Section {
        Section::new()
            .with("ip", self.ip)
            .with("port", self.port)
            .with("id", self.id)
            .with("last_seen", self.last_seen)
    }

    fn from_section(s: &Section) -> Result<Self> {
        Ok(Self {
            ip: s.get_u32("ip")?,
            port: s.get_u32("port")?,
            id: s.get_u64("id")?,
            last_seen: s.get_i64("last_seen")?,
        })
    }
}

fn peerlist_to_value(list: &[PeerlistEntry]) -> Value {
    Array::of_objects(list.iter().map(KvMessage::to_section).collect()).into()
}

fn peerlist_from_section(s: &Section) -> Result<Vec<PeerlistEntry>> {
    let array = s.get_array("local_peerlist")?;
    if array.element_type() != TypeTag::Object {
        return Err(ProtocolError::format("local_peerlist must hold objects"));
    }
    array
        .items()
        .iter()
        .filter_map(Value::as_object)
        .map(PeerlistEntry::from_section)
        .collect()
}

/// HANDSHAKE request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub node_data: BasicNodeData,
    pub payload_data: CoreSyncData,
}

impl KvMessage for HandshakeRequest {
    fn to_section(&self) -> Section {
        Section::new()
            .with("node_data", self.node_data.to_section())
            .with("payload_data", self.payload_data.to_section())
    }

    fn from_section(s: &Section) -> Result<Self> {
        Ok(Self {
            node_data: BasicNodeData::from_section(s.get_object("node_data")?)?,
            payload_data: CoreSyncData::from_section(s.get_object("payload_data")?)?,
        })
    }
}

/// HANDSHAKE response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    pub node_data: BasicNodeData,
    pub payload_data: CoreSyncData,
    pub local_peerlist: Vec<PeerlistEntry>,
}

impl KvMessage for HandshakeResponse {
    fn to_section(&self) -> Section {
        Section::new()
            .with("node_data", self.node_data.to_section())
            .with("payload_data", self.payload_data.to_section())
            .with("local_peerlist", peerlist_to_value(&self.local_peerlist))
    }

    fn from_section(s: &Section) -> Result<Self> {
        Ok(Self {
            node_data: BasicNodeData::from_section(s.get_object("node_data")?)?,
            payload_data: CoreSyncData::from_section(s.get_object("payload_data")?)?,
            local_peerlist: peerlist_from_section(s)?,
        })
    }
}

/// TIMED_SYNC request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedSyncRequest {
    pub payload_data: CoreSyncData,
}

impl KvMessage for TimedSyncRequest {
    fn to_section(&self) -> Section {
        Section::new().with("payload_data", self.payload_data.to_section())
    }

    fn from_section(s: &Section) -> Result<Self> {
        Ok(Self {
            payload_data: CoreSyncData::from_section(s.get_object("payload_data")?)?,
        })
    }
}

/// TIMED_SYNC response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedSyncResponse {
    pub local_time: u64,
    pub payload_data: CoreSyncData,
    pub local_peerlist: Vec<PeerlistEntry>,
}

impl KvMessage for TimedSyncResponse {
    fn to_section(&self) -> Section {
        Section::new()
            .with("local_time", self.local_time)
            .with("payload_data", self.payload_data.to_section())
            .with("local_peerlist", peerlist_to_value(&self.local_peerlist))
    }

    fn from_section(s: &Section) -> Result<Self> {
        Ok(Self {
            local_time: s.get_u64("local_time")?,
            payload_data: CoreSyncData::from_section(s.get_object("payload_data")?)?,
            local_peerlist: peerlist_from_section(s)?,
        })
    }
}

/// Status string of a successful ping
pub const PING_OK_STATUS: &str = "OK";

/// PING response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingResponse {
    pub status: String,
    pub peer_id: u64,
}

impl KvMessage for PingResponse {
    fn to_section(&self) -> Section {
        Section::new()
            .with("status", self.status.as_str())
            .with("peer_id", self.peer_id)
    }

    fn from_section(s: &Section) -> Result<Self> {
        Ok(Self {
            status: s.get_str("status")?.to_owned(),
            peer_id: s.get_u64("peer_id")?,
        })
    }
}
