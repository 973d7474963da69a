#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Edge-case tests for the wire codecs
//! Boundary conditions, malformed input and resource limits

use bytes::{BufMut, BytesMut};
use levin_p2p::core::codec::{LevinCodec, ReadState};
use levin_p2p::core::packet::{self, command, LevinHeader, Packet, HEADER_LEN};
use levin_p2p::core::storage::{self, Array, Section, TypeTag, Value, MAX_DEPTH};
use levin_p2p::error::ProtocolError;
use tokio_util::codec::Decoder;

const STORAGE_HEADER: [u8; 9] = [0x01, 0x11, 0x01, 0x01, 0x01, 0x01, 0x02, 0x01, 0x01];

fn with_header(body: &[u8]) -> Vec<u8> {
    let mut out = STORAGE_HEADER.to_vec();
    out.extend_from_slice(body);
    out
}

// ============================================================================
// PORTABLE STORAGE
// ============================================================================

#[test]
fn test_known_layout() {
    let section = Section::new().with("a", 5u8).with("s", "hi");
    let bytes = storage::encode(&section, true).unwrap();
    assert_eq!(
        bytes,
        with_header(&[
            0x08, // 2 entries
            0x01, b'a', 0x08, 0x05, // "a": uint8 5
            0x01, b's', 0x0A, 0x08, b'h', b'i', // "s": string "hi"
        ])
    );
}

#[test]
fn test_blob_layout() {
    let section = Section::new().with("b", vec![0xAAu8, 0xBB]);
    let bytes = storage::encode(&section, false).unwrap();
    assert_eq!(bytes, vec![0x04, 0x01, b'b', 0x0D, 0x08, 0x08, 0xAA, 0xBB]);

    let (decoded, _) = storage::decode(&bytes, false).unwrap();
    assert_eq!(decoded.get_blob("b").unwrap(), &[0xAA, 0xBB]);
}

#[test]
fn test_empty_section() {
    let bytes = storage::encode(&Section::new(), true).unwrap();
    assert_eq!(bytes, with_header(&[0x00]));
    let (decoded, rest) = storage::decode(&bytes, true).unwrap();
    assert!(decoded.is_empty());
    assert!(rest.is_empty());
}

#[test]
fn test_insert_replaces_in_place() {
    let mut section = Section::new().with("x", 1u32).with("y", 2u32);
    section.insert("x", 9u32);
    let names: Vec<_> = section.iter().map(|(n, _)| n).collect();
    assert_eq!(names, ["x", "y"]);
    assert_eq!(section.get_u32("x").unwrap(), 9);
}

#[test]
fn test_duplicate_name_rejected() {
    let bytes = with_header(&[
        0x08, // 2 entries
        0x01, b'a', 0x08, 0x01, // "a": uint8 1
        0x01, b'a', 0x08, 0x02, // "a": uint8 2
    ]);
    assert!(matches!(
        storage::decode(&bytes, true),
        Err(ProtocolError::Format(_))
    ));

    // Same name at different levels is fine
    let nested = Section::new()
        .with("a", 1u8)
        .with("o", Section::new().with("a", 2u8));
    let bytes = storage::encode(&nested, true).unwrap();
    assert_eq!(storage::decode(&bytes, true).unwrap().0, nested);
}

#[test]
fn test_reserved_tag_rejected() {
    let bytes = with_header(&[0x04, 0x01, b'z', 0x0E, 0x00]);
    assert!(matches!(
        storage::decode(&bytes, true),
        Err(ProtocolError::Format(_))
    ));
}

#[test]
fn test_unknown_tags_rejected() {
    for tag in [0x00u8, 0x0F, 0xFF] {
        let bytes = with_header(&[0x04, 0x01, b'z', tag, 0x00]);
        assert!(matches!(
            storage::decode(&bytes, true),
            Err(ProtocolError::UnknownType(t)) if t == tag
        ));
    }
}

#[test]
fn test_bad_storage_signature() {
    let mut bytes = storage::encode(&Section::new(), true).unwrap();
    bytes[0] ^= 0xFF;
    assert!(matches!(
        storage::decode(&bytes, true),
        Err(ProtocolError::Format(_))
    ));
}

#[test]
fn test_bad_storage_version() {
    let mut bytes = storage::encode(&Section::new(), true).unwrap();
    bytes[8] = 2;
    assert!(matches!(
        storage::decode(&bytes, true),
        Err(ProtocolError::Format(_))
    ));
}

#[test]
fn test_invalid_bool_rejected() {
    let bytes = with_header(&[0x04, 0x01, b'f', 0x0B, 0x02]);
    assert!(matches!(
        storage::decode(&bytes, true),
        Err(ProtocolError::Format(_))
    ));
}

#[test]
fn test_invalid_utf8_rejected() {
    let bytes = with_header(&[0x04, 0x01, b's', 0x0A, 0x04, 0xFF]);
    assert!(storage::decode(&bytes, true).is_err());
}

#[test]
fn test_huge_array_count_is_bounds_error() {
    // uint64 array claiming 2^30 - 1 elements with nothing after it
    let bytes = with_header(&[0x04, 0x01, b'a', 0x0D, 0x05, 0xFE, 0xFF, 0xFF, 0xFF]);
    assert!(matches!(
        storage::decode(&bytes, true),
        Err(ProtocolError::Bounds { .. })
    ));
}

#[test]
fn test_huge_string_length_is_bounds_error() {
    let bytes = with_header(&[0x04, 0x01, b's', 0x0A, 0xFE, 0xFF, 0xFF, 0xFF]);
    assert!(matches!(
        storage::decode(&bytes, true),
        Err(ProtocolError::Bounds { .. })
    ));
}

#[test]
fn test_every_truncation_fails() {
    let section = Section::new()
        .with("n", 7u64)
        .with("o", Section::new().with("inner", "value"))
        .with("b", vec![1u8, 2, 3]);
    let bytes = storage::encode(&section, true).unwrap();
    for cut in 0..bytes.len() {
        assert!(
            storage::decode(&bytes[..cut], true).is_err(),
            "prefix of {cut} bytes decoded"
        );
    }
}

#[test]
fn test_nesting_limit() {
    let mut deep = Section::new().with("leaf", 1u8);
    for _ in 0..=MAX_DEPTH {
        deep = Section::new().with("o", deep);
    }
    let bytes = storage::encode(&deep, true).unwrap();
    assert!(matches!(
        storage::decode(&bytes, true),
        Err(ProtocolError::Format(_))
    ));

    let mut ok = Section::new().with("leaf", 1u8);
    for _ in 0..MAX_DEPTH {
        ok = Section::new().with("o", ok);
    }
    let bytes = storage::encode(&ok, true).unwrap();
    assert!(storage::decode(&bytes, true).is_ok());
}

#[test]
fn test_long_name_rejected_on_encode() {
    let section = Section::new().with("n".repeat(256), 1u8);
    assert!(matches!(
        storage::encode(&section, true),
        Err(ProtocolError::Format(_))
    ));

    let section = Section::new().with("n".repeat(255), 1u8);
    assert!(storage::encode(&section, true).is_ok());
}

#[test]
fn test_array_must_be_homogeneous() {
    let mixed = Array::new(TypeTag::U32, vec![Value::U32(1), Value::U64(2)]);
    assert!(matches!(mixed, Err(ProtocolError::Format(_))));
    assert!(Array::new(TypeTag::U8, vec![Value::U8(1)]).is_err());
    assert!(Array::new(TypeTag::Reserved, Vec::new()).is_err());
}

#[test]
fn test_typed_getter_mismatch() {
    let section = Section::new().with("v", "text");
    assert!(matches!(section.get_u64("v"), Err(ProtocolError::Format(_))));
    assert!(matches!(section.get_u64("missing"), Err(ProtocolError::Format(_))));
}

// ============================================================================
// LEVIN FRAMING
// ============================================================================

#[test]
fn test_header_layout() {
    let bytes = Packet::request(command::PING, true, Section::new())
        .to_bytes()
        .unwrap();
    assert_eq!(&bytes[..8], &packet::LEVIN_SIGNATURE.to_le_bytes());
    assert_eq!(&bytes[8..16], &10u64.to_le_bytes());
    assert_eq!(bytes[16], 1);
    assert_eq!(&bytes[17..21], &1003u32.to_le_bytes());
    assert_eq!(&bytes[21..25], &1i32.to_le_bytes());
    assert_eq!(&bytes[25..29], &packet::FLAG_REQUEST.to_le_bytes());
    assert_eq!(&bytes[29..33], &1u32.to_le_bytes());
    assert_eq!(bytes.len(), HEADER_LEN + 10);
}

#[test]
fn test_frame_matches_packet_bytes() {
    let body = Section::new().with("k", 3u32);
    let framed = packet::frame(command::TIMED_SYNC, packet::FLAG_RESPONSE, false, &body).unwrap();
    let via_packet = Packet::response(command::TIMED_SYNC, body).to_bytes().unwrap();
    assert_eq!(framed, via_packet);
}

#[test]
fn test_header_short_buffer() {
    let bytes = Packet::request(command::PING, true, Section::new())
        .to_bytes()
        .unwrap();
    assert!(packet::try_parse_header(&bytes[..HEADER_LEN - 1], 1024)
        .unwrap()
        .is_none());
    assert!(packet::parse_packet(&bytes[..bytes.len() - 1], 1024)
        .unwrap()
        .is_none());
}

#[test]
fn test_oversized_packet_rejected() {
    let mut raw = BytesMut::new();
    LevinHeader {
        payload_size: 4096,
        response_required: false,
        command: command::HANDSHAKE,
        return_code: 1,
        flags: packet::FLAG_REQUEST,
        protocol_version: 1,
    }
    .write_to(&mut raw);
    assert!(matches!(
        packet::try_parse_header(&raw, 1024),
        Err(ProtocolError::OversizedPacket { size: 4096, max: 1024 })
    ));
}

#[test]
fn test_trailing_bytes_in_body_rejected() {
    let mut body = storage::encode(&Section::new(), true).unwrap();
    body.push(0x00);

    let mut raw = BytesMut::new();
    LevinHeader {
        payload_size: body.len() as u64,
        response_required: false,
        command: command::PING,
        return_code: 1,
        flags: packet::FLAG_REQUEST,
        protocol_version: 1,
    }
    .write_to(&mut raw);
    raw.put_slice(&body);

    assert!(matches!(
        packet::parse_packet(&raw, 1024),
        Err(ProtocolError::Format(_))
    ));
}

#[test]
fn test_codec_bad_signature_is_fatal() {
    let mut codec = LevinCodec::new(1024);
    let mut buf = BytesMut::from(&[0u8; HEADER_LEN][..]);
    assert!(matches!(
        codec.decode(&mut buf),
        Err(ProtocolError::InvalidSignature(0))
    ));
}

#[test]
fn test_codec_waits_for_body() {
    let bytes = Packet::request(command::PING, true, Section::new().with("x", 1u64))
        .to_bytes()
        .unwrap();
    let mut codec = LevinCodec::new(1024);
    let mut buf = BytesMut::from(&bytes[..HEADER_LEN + 2]);

    assert!(codec.decode(&mut buf).unwrap().is_none());
    assert!(matches!(codec.state(), ReadState::ExpectingBody(_)));

    buf.extend_from_slice(&bytes[HEADER_LEN + 2..]);
    let packet = codec.decode(&mut buf).unwrap().unwrap();
    assert_eq!(packet.body.get_u64("x").unwrap(), 1);
    assert!(matches!(codec.state(), ReadState::ExpectingHeader));
}
