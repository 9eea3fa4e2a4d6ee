//! Packet framing module
//!
//! Defines the wire frame for game packets:
//! `[ciphered opcode byte][length field: 0, 1 or 2 bytes][payload]`.
//!
//! The length field is selected by the packet's declared size class: fixed
//! packets carry no length on the wire, variable-byte packets a 1-byte
//! length, variable-short packets a 2-byte length. The opcode byte is
//! obfuscated with the connection's ISAAC generator; exactly one word is
//! drawn per header in each direction.

use bytes::{BufMut, Bytes, BytesMut};

use crate::crypto::isaac::Isaac;
use crate::error::{ProtocolError, Result};
use crate::net::buffer::MAX_PACKET_SIZE;

/// Opcode of the actor synchronization packet (server -> client)
pub const SYNC_OPCODE: u8 = 81;

/// Incoming packet sizes, indexed by opcode.
/// `>= 0` = fixed, `-1` = variable byte, `-2` = variable short,
/// `-3` = unknown (treated as cipher desynchronization).
pub const INCOMING_PACKET_SIZES: [i16; 256] = {
    let mut sizes = [-3i16; 256];

    sizes[0] = 0; // Keep-alive/ping
    sizes[4] = -1; // Chat message
    sizes[14] = 8; // Walk to position
    sizes[77] = 0; // Map region loaded
    sizes[86] = 4; // Mouse click
    sizes[121] = -1; // Mouse movement
    sizes[210] = 0; // Close interface

    sizes
};

/// Packet size class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketSize {
    /// Fixed size packet; no length field on the wire
    Fixed(usize),
    /// Variable size with a 1-byte length prefix
    VariableByte,
    /// Variable size with a 2-byte length prefix
    VariableShort,
}

impl PacketSize {
    /// Check if this is a variable length packet
    pub fn is_variable(&self) -> bool {
        matches!(self, PacketSize::VariableByte | PacketSize::VariableShort)
    }
}

/// A decoded or to-be-encoded game packet
#[derive(Debug, Clone)]
pub struct GamePacket {
    /// Raw (un-ciphered) opcode
    pub opcode: u8,
    /// Declared size class
    pub size: PacketSize,
    /// Payload bytes
    pub payload: Bytes,
}

impl GamePacket {
    /// Create a new packet
    pub fn new(opcode: u8, size: PacketSize, payload: Bytes) -> Self {
        Self {
            opcode,
            size,
            payload,
        }
    }
}

/// Encode a packet into a wire frame, obfuscating the opcode with the
/// connection's outgoing generator. Draws exactly one cipher word.
pub fn encode_frame(packet: &GamePacket, cipher: &mut Isaac) -> Result<Bytes> {
    let len = packet.payload.len();

    match packet.size {
        PacketSize::Fixed(declared) => {
            if len != declared {
                return Err(ProtocolError::LengthMismatch {
                    declared,
                    actual: len,
                }
                .into());
            }
        }
        PacketSize::VariableByte => {
            if len > u8::MAX as usize {
                return Err(ProtocolError::FrameTooLarge {
                    size: len,
                    max: u8::MAX as usize,
                }
                .into());
            }
        }
        PacketSize::VariableShort => {
            if len > MAX_PACKET_SIZE {
                return Err(ProtocolError::FrameTooLarge {
                    size: len,
                    max: MAX_PACKET_SIZE,
                }
                .into());
            }
        }
    }

    let mut frame = BytesMut::with_capacity(len + 3);
    frame.put_u8(packet.opcode.wrapping_add(cipher.next_byte()));
    match packet.size {
        PacketSize::Fixed(_) => {}
        PacketSize::VariableByte => frame.put_u8(len as u8),
        PacketSize::VariableShort => frame.put_u16(len as u16),
    }
    frame.extend_from_slice(&packet.payload);

    Ok(frame.freeze())
}

/// Internal decoder state, tracked across partial reads so the cipher word
/// for a header is drawn exactly once.
#[derive(Debug, Clone, Copy)]
enum DecodeState {
    Opcode,
    Length { opcode: u8, size: PacketSize },
    Payload { opcode: u8, size: PacketSize, length: usize },
}

/// Incremental frame decoder for one connection's incoming stream.
///
/// `decode` consumes from the stream buffer and returns `Ok(None)` when more
/// bytes are needed; the transport enforces the bounded wait and drops the
/// connection on timeout. Any `Err` is fatal for the connection.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
}

impl FrameDecoder {
    /// Create a decoder in its initial state
    pub fn new() -> Self {
        Self {
            state: DecodeState::Opcode,
        }
    }

    /// Attempt to decode one frame from `src`.
    pub fn decode(&mut self, src: &mut BytesMut, cipher: &mut Isaac) -> Result<Option<GamePacket>> {
        loop {
            match self.state {
                DecodeState::Opcode => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let wire = src.split_to(1)[0];
                    let opcode = wire.wrapping_sub(cipher.next_byte());

                    self.state = match INCOMING_PACKET_SIZES[opcode as usize] {
                        -3 => return Err(ProtocolError::CipherDesynchronized(opcode).into()),
                        -2 => DecodeState::Length {
                            opcode,
                            size: PacketSize::VariableShort,
                        },
                        -1 => DecodeState::Length {
                            opcode,
                            size: PacketSize::VariableByte,
                        },
                        fixed => DecodeState::Payload {
                            opcode,
                            size: PacketSize::Fixed(fixed as usize),
                            length: fixed as usize,
                        },
                    };
                }
                DecodeState::Length { opcode, size } => {
                    let needed = match size {
                        PacketSize::VariableByte => 1,
                        PacketSize::VariableShort => 2,
                        PacketSize::Fixed(_) => unreachable!("fixed packets carry no length"),
                    };
                    if src.len() < needed {
                        return Ok(None);
                    }
                    let length = match size {
                        PacketSize::VariableByte => src.split_to(1)[0] as usize,
                        PacketSize::VariableShort => {
                            let bytes = src.split_to(2);
                            ((bytes[0] as usize) << 8) | bytes[1] as usize
                        }
                        PacketSize::Fixed(_) => unreachable!(),
                    };
                    self.state = DecodeState::Payload {
                        opcode,
                        size,
                        length,
                    };
                }
                DecodeState::Payload {
                    opcode,
                    size,
                    length,
                } => {
                    if length > MAX_PACKET_SIZE {
                        return Err(ProtocolError::FrameTooLarge {
                            size: length,
                            max: MAX_PACKET_SIZE,
                        }
                        .into());
                    }
                    if src.len() < length {
                        return Ok(None);
                    }
                    // Exactly the declared length is consumed; anything past
                    // it belongs to the next frame.
                    let payload = src.split_to(length).freeze();
                    self.state = DecodeState::Opcode;
                    return Ok(Some(GamePacket::new(opcode, size, payload)));
                }
            }
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::isaac::IsaacPair;

    const KEY: [u32; 4] = [11, 22, 33, 44];

    fn pairs() -> (IsaacPair, IsaacPair) {
        (IsaacPair::new(KEY), IsaacPair::for_client(KEY))
    }

    #[test]
    fn test_fixed_frame_round_trip() {
        let (mut server, mut client) = pairs();

        let packet = GamePacket::new(
            86,
            PacketSize::Fixed(4),
            Bytes::from_static(&[1, 2, 3, 4]),
        );
        let frame = encode_frame(&packet, &mut client.encode).unwrap();
        assert_eq!(frame.len(), 5);

        let mut src = BytesMut::from(&frame[..]);
        let mut decoder = FrameDecoder::new();
        let decoded = decoder
            .decode(&mut src, &mut server.decode)
            .unwrap()
            .unwrap();

        assert_eq!(decoded.opcode, 86);
        assert_eq!(&decoded.payload[..], &[1, 2, 3, 4]);
        assert!(src.is_empty());
    }

    #[test]
    fn test_variable_byte_frame_round_trip() {
        let (mut server, mut client) = pairs();

        let packet = GamePacket::new(4, PacketSize::VariableByte, Bytes::from_static(b"hello"));
        let frame = encode_frame(&packet, &mut client.encode).unwrap();
        assert_eq!(frame.len(), 2 + 5);

        let mut src = BytesMut::from(&frame[..]);
        let mut decoder = FrameDecoder::new();
        let decoded = decoder
            .decode(&mut src, &mut server.decode)
            .unwrap()
            .unwrap();

        assert_eq!(decoded.opcode, 4);
        assert_eq!(decoded.size, PacketSize::VariableByte);
        assert_eq!(&decoded.payload[..], b"hello");
    }

    #[test]
    fn test_partial_frame_needs_more() {
        let (mut server, mut client) = pairs();

        let packet = GamePacket::new(14, PacketSize::Fixed(8), Bytes::from_static(&[0; 8]));
        let frame = encode_frame(&packet, &mut client.encode).unwrap();

        let mut decoder = FrameDecoder::new();

        // Feed one byte at a time; the cipher word must only be drawn once.
        let mut src = BytesMut::new();
        let mut decoded = None;
        for &b in frame.iter() {
            src.put_u8(b);
            if let Some(packet) = decoder.decode(&mut src, &mut server.decode).unwrap() {
                decoded = Some(packet);
            }
        }

        let decoded = decoded.expect("frame should decode once complete");
        assert_eq!(decoded.opcode, 14);
        assert_eq!(decoded.payload.len(), 8);
    }

    #[test]
    fn test_unknown_opcode_is_desync() {
        let (mut server, mut client) = pairs();

        // Opcode 200 is not in the size table.
        let mut src = BytesMut::new();
        src.put_u8(200u8.wrapping_add(client.encode.next_byte()));

        let mut decoder = FrameDecoder::new();
        let err = decoder.decode(&mut src, &mut server.decode).unwrap_err();
        assert!(matches!(
            err,
            crate::error::TickforgeError::Protocol(ProtocolError::CipherDesynchronized(200))
        ));
    }

    #[test]
    fn test_skipped_header_desynchronizes() {
        let (mut server, mut client) = pairs();

        // First frame is dropped before the server sees it; the server's
        // decode generator is now one word behind, so the next valid opcode
        // de-obfuscates to garbage.
        let lost = GamePacket::new(0, PacketSize::Fixed(0), Bytes::new());
        let _ = encode_frame(&lost, &mut client.encode).unwrap();

        let next = GamePacket::new(0, PacketSize::Fixed(0), Bytes::new());
        let frame = encode_frame(&next, &mut client.encode).unwrap();

        let mut src = BytesMut::from(&frame[..]);
        let mut decoder = FrameDecoder::new();
        let result = decoder.decode(&mut src, &mut server.decode);
        // Either an unknown opcode (desync detected) or a wrong-but-known
        // opcode; with this key the table lookup fails.
        if let Ok(Some(packet)) = result {
            assert_ne!(packet.opcode, 0);
        }
    }

    #[test]
    fn test_fixed_length_mismatch_rejected() {
        let (_, mut client) = pairs();
        let packet = GamePacket::new(86, PacketSize::Fixed(4), Bytes::from_static(&[1, 2]));
        assert!(encode_frame(&packet, &mut client.encode).is_err());
    }

    #[test]
    fn test_oversize_variable_byte_rejected() {
        let (_, mut client) = pairs();
        let packet = GamePacket::new(
            4,
            PacketSize::VariableByte,
            Bytes::from(vec![0u8; 300]),
        );
        assert!(encode_frame(&packet, &mut client.encode).is_err());
    }

    #[test]
    fn test_back_to_back_frames() {
        let (mut server, mut client) = pairs();

        let a = GamePacket::new(0, PacketSize::Fixed(0), Bytes::new());
        let b = GamePacket::new(4, PacketSize::VariableByte, Bytes::from_static(b"hi"));

        let mut src = BytesMut::new();
        src.extend_from_slice(&encode_frame(&a, &mut client.encode).unwrap());
        src.extend_from_slice(&encode_frame(&b, &mut client.encode).unwrap());

        let mut decoder = FrameDecoder::new();
        let first = decoder
            .decode(&mut src, &mut server.decode)
            .unwrap()
            .unwrap();
        let second = decoder
            .decode(&mut src, &mut server.decode)
            .unwrap()
            .unwrap();

        assert_eq!(first.opcode, 0);
        assert_eq!(second.opcode, 4);
        assert_eq!(&second.payload[..], b"hi");
    }
}
