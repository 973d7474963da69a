use crate::core::packet::{command, Packet};
use crate::core::storage::Section;
use crate::error::{constants, ProtocolError, Result};
use crate::transport::peer::PeerState;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

type HandlerFn = dyn Fn(&PeerState, &Packet) -> Result<Option<Section>> + Send + Sync + 'static;

/// Command dispatcher keyed by Levin command code.
///
/// Only HANDSHAKE is accepted before the peer is validated; any other
/// command from an unvalidated peer, known or not, is a protocol violation.
/// Unknown commands from validated peers are dropped.
pub struct Dispatcher {
    handlers: Arc<RwLock<HashMap<u32, Box<HandlerFn>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Install `handler` for `command`. A handler returning a section answers
    /// requests that asked for a response.
    pub fn register<F>(&self, command: u32, handler: F) -> Result<()>
    where
        F: Fn(&PeerState, &Packet) -> Result<Option<Section>> + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().map_err(|_| {
            ProtocolError::Custom("Failed to acquire write lock on dispatcher".to_string())
        })?;

        handlers.insert(command, Box::new(handler));
        Ok(())
    }

    /// Route `packet` to its handler and build the response packet, if any
    pub fn dispatch(&self, peer: &PeerState, packet: &Packet) -> Result<Option<Packet>> {
        let code = packet.command();

        if code != command::HANDSHAKE && !peer.is_validated() {
            return Err(ProtocolError::violation(format!(
                "{}: {}",
                constants::ERR_NOT_VALIDATED,
                command::name(code)
            )));
        }

        let handlers = self.handlers.read().map_err(|_| {
            ProtocolError::Custom("Failed to acquire read lock on dispatcher".to_string())
        })?;

        let Some(handler) = handlers.get(&code) else {
            debug!(peer = %peer.addr(), command = code, "Ignoring unknown command");
            return Ok(None);
        };

        let reply = handler(peer, packet)?;
        let header = &packet.header;
        match reply {
            Some(body) if header.is_request() && header.response_required => {
                Ok(Some(Packet::response(code, body)))
            }
            _ => Ok(None),
        }
    }
}
