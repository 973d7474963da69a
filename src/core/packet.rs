//! Levin packet header and framing functions.
//!
//! ```text
//! [Signature(8)] [Size(8)] [HaveToReturn(1)] [Command(4)] [ReturnCode(4)] [Flags(4)] [Version(4)]
//! ```
//!
//! All integers are little-endian. The body that follows is a portable
//! storage section including its 9-byte storage header.

use crate::core::storage::{self, Section};
use crate::error::{ProtocolError, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Packet signature shared by every CryptoNote-family network
pub const LEVIN_SIGNATURE: u64 = 0x0101_0101_0101_2101;

/// Fixed header length
pub const HEADER_LEN: usize = 33;

/// Levin framing version
pub const LEVIN_PROTOCOL_VERSION: u32 = 1;

/// Flag bit for requests
pub const FLAG_REQUEST: u32 = 0x0000_0001;
/// Flag bit for responses
pub const FLAG_RESPONSE: u32 = 0x0000_0002;

/// Return code carried by successful responses
pub const RETURN_OK: i32 = 1;

/// P2P command codes
pub mod command {
    const P2P_COMMANDS_POOL_BASE: u32 = 1000;

    pub const HANDSHAKE: u32 = P2P_COMMANDS_POOL_BASE + 1;
    pub const TIMED_SYNC: u32 = P2P_COMMANDS_POOL_BASE + 2;
    pub const PING: u32 = P2P_COMMANDS_POOL_BASE + 3;

    /// Human readable command name for logs
    pub fn name(code: u32) -> &'static str {
        match code {
            HANDSHAKE => "HANDSHAKE",
            TIMED_SYNC => "TIMED_SYNC",
            PING => "PING",
            _ => "UNKNOWN",
        }
    }
}

/// Parsed 33-byte packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevinHeader {
    pub payload_size: u64,
    pub response_required: bool,
    pub command: u32,
    pub return_code: i32,
    pub flags: u32,
    pub protocol_version: u32,
}

impl LevinHeader {
    pub fn is_request(&self) -> bool {
        self.flags & FLAG_REQUEST != 0
    }

    pub fn is_response(&self) -> bool {
        self.flags & FLAG_RESPONSE != 0
    }

    /// Append the wire form of this header to `dst`
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_LEN);
        dst.put_u64_le(LEVIN_SIGNATURE);
        dst.put_u64_le(self.payload_size);
        dst.put_u8(u8::from(self.response_required));
        dst.put_u32_le(self.command);
        dst.put_i32_le(self.return_code);
        dst.put_u32_le(self.flags);
        dst.put_u32_le(self.protocol_version);
    }

    /// Parse and validate a header from exactly [`HEADER_LEN`] bytes.
    ///
    /// The signature is checked before anything else is interpreted.
    pub fn parse(raw: &[u8; HEADER_LEN], max_payload: u64) -> Result<Self> {
        let le_u64 = |at: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&raw[at..at + 8]);
            u64::from_le_bytes(b)
        };
        let le_u32 = |at: usize| {
            let mut b = [0u8; 4];
            b.copy_from_slice(&raw[at..at + 4]);
            u32::from_le_bytes(b)
        };

        let signature = le_u64(0);
        if signature != LEVIN_SIGNATURE {
            return Err(ProtocolError::InvalidSignature(signature));
        }

        let payload_size = le_u64(8);
        if payload_size > max_payload {
            return Err(ProtocolError::OversizedPacket {
                size: payload_size,
                max: max_payload,
            });
        }

        Ok(Self {
            payload_size,
            response_required: raw[16] != 0,
            command: le_u32(17),
            return_code: le_u32(21) as i32,
            flags: le_u32(25),
            protocol_version: le_u32(29),
        })
    }
}

/// A complete Levin packet: header plus decoded body
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: LevinHeader,
    pub body: Section,
}

impl Packet {
    /// Request packet for `command`
    pub fn request(command: u32, response_required: bool, body: Section) -> Self {
        Self::new(command, FLAG_REQUEST, response_required, RETURN_OK, body)
    }

    /// Response packet answering `command`
    pub fn response(command: u32, body: Section) -> Self {
        Self::new(command, FLAG_RESPONSE, false, RETURN_OK, body)
    }

    fn new(command: u32, flags: u32, response_required: bool, return_code: i32, body: Section) -> Self {
        Self {
            header: LevinHeader {
                // filled in when framed
                payload_size: 0,
                response_required,
                command,
                return_code,
                flags,
                protocol_version: LEVIN_PROTOCOL_VERSION,
            },
            body,
        }
    }

    pub fn command(&self) -> u32 {
        self.header.command
    }

    /// Serialize header and body into one buffer
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut dst = BytesMut::new();
        self.write_to(&mut dst)?;
        Ok(dst.freeze())
    }

    /// Append the framed packet to `dst`, with the header size taken from the encoded body
    pub fn write_to(&self, dst: &mut BytesMut) -> Result<()> {
        let body = storage::encode(&self.body, true)?;
        let header = LevinHeader {
            payload_size: body.len() as u64,
            ..self.header
        };
        dst.reserve(HEADER_LEN + body.len());
        header.write_to(dst);
        dst.put_slice(&body);
        Ok(())
    }
}

/// Frame a body into a ready-to-send byte buffer
pub fn frame(command: u32, flags: u32, response_required: bool, body: &Section) -> Result<Bytes> {
    let encoded = storage::encode(body, true)?;
    let header = LevinHeader {
        payload_size: encoded.len() as u64,
        response_required,
        command,
        return_code: RETURN_OK,
        flags,
        protocol_version: LEVIN_PROTOCOL_VERSION,
    };
    let mut dst = BytesMut::with_capacity(HEADER_LEN + encoded.len());
    header.write_to(&mut dst);
    dst.put_slice(&encoded);
    Ok(dst.freeze())
}

/// Parse a header once enough bytes are buffered; `None` means keep reading
pub fn try_parse_header(buf: &[u8], max_payload: u64) -> Result<Option<LevinHeader>> {
    let Some(raw) = buf.get(..HEADER_LEN) else {
        return Ok(None);
    };
    let mut fixed = [0u8; HEADER_LEN];
    fixed.copy_from_slice(raw);
    LevinHeader::parse(&fixed, max_payload).map(Some)
}

/// Decode a body once `header.payload_size` bytes are buffered.
///
/// Returns the section and the number of bytes consumed from `buf`.
pub fn try_parse_body(buf: &[u8], header: &LevinHeader) -> Result<Option<(Section, usize)>> {
    // payload_size was bounded by the configured maximum when the header was parsed
    let size = header.payload_size as usize;
    let Some(payload) = buf.get(..size) else {
        return Ok(None);
    };
    let (section, rest) = storage::decode(payload, true)?;
    if !rest.is_empty() {
        return Err(ProtocolError::Format(format!(
            "{} trailing bytes after packet body",
            rest.len()
        )));
    }
    Ok(Some((section, size)))
}

/// Decode one complete packet from the front of `buf`, if present
pub fn parse_packet(buf: &[u8], max_payload: u64) -> Result<Option<(Packet, usize)>> {
    let Some(header) = try_parse_header(buf, max_payload)? else {
        return Ok(None);
    };
    Ok(try_parse_body(&buf[HEADER_LEN..], &header)?
        .map(|(body, used)| (Packet { header, body }, HEADER_LEN + used)))
}
