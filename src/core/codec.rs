//! Streaming Levin codec for `tokio_util::codec` framing.
//!
//! The decoder keeps the per-connection read state: it waits for a full
//! header, validates it, then waits for the announced body before handing a
//! complete [`Packet`] upward. Partial input leaves the buffer untouched.

use crate::core::packet::{self, LevinHeader, Packet, HEADER_LEN};
use crate::error::{ProtocolError, Result};
use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

/// Where the decoder is within the current packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    ExpectingHeader,
    ExpectingBody(LevinHeader),
}

/// Levin packet codec
#[derive(Debug)]
pub struct LevinCodec {
    state: ReadState,
    max_payload: u64,
}

impl LevinCodec {
    pub fn new(max_payload: usize) -> Self {
        Self {
            state: ReadState::ExpectingHeader,
            max_payload: max_payload as u64,
        }
    }

    pub fn state(&self) -> ReadState {
        self.state
    }
}

impl Decoder for LevinCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        loop {
            match self.state {
                ReadState::ExpectingHeader => {
                    let Some(header) = packet::try_parse_header(src, self.max_payload)? else {
                        src.reserve(HEADER_LEN - src.len());
                        return Ok(None);
                    };
                    src.advance(HEADER_LEN);
                    trace!(
                        command = header.command,
                        size = header.payload_size,
                        "Levin header parsed"
                    );
                    self.state = ReadState::ExpectingBody(header);
                }
                ReadState::ExpectingBody(header) => {
                    let Some((body, used)) = packet::try_parse_body(src, &header)? else {
                        let wanted = header.payload_size as usize;
                        src.reserve(wanted.saturating_sub(src.len()));
                        return Ok(None);
                    };
                    src.advance(used);
                    self.state = ReadState::ExpectingHeader;
                    return Ok(Some(Packet { header, body }));
                }
            }
        }
    }
}

impl Encoder<Packet> for LevinCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<()> {
        item.write_to(dst)
    }
}
