//! # Core Protocol Components
//!
//! Low-level wire handling: portable storage serialization, Levin packet
//! framing and the streaming codec used on sockets.
//!
//! ## Components
//! - **Varint**: 2-bit size-class integers used for counts and lengths
//! - **Storage**: self-describing key-value sections (packet bodies)
//! - **Packet**: 33-byte Levin header plus body
//! - **Codec**: Tokio codec for framing over byte streams
//!
//! ## Wire Format
//! ```text
//! [Signature(8)] [Size(8)] [HaveToReturn(1)] [Command(4)] [ReturnCode(4)] [Flags(4)] [Version(4)] [Body(N)]
//! ```
//!
//! ## Security
//! - Payload size bounded by configuration before any allocation
//! - Signature checked before the rest of the header is trusted
//! - Every length field bounds-checked against the remaining buffer

pub mod codec;
pub mod packet;
pub mod storage;
pub mod varint;
