//! Synchronization packet encoder
//!
//! Turns a built `SynchronizationMessage` into the opcode-81 wire packet.
//! The packet has two sections: a bit-packed segment section describing
//! movement and list membership, then a byte-aligned block section carrying
//! the block data for every segment that flagged one, in segment order.

use bitflags::bitflags;

use crate::error::Result;
use crate::game::actor::Appearance;
use crate::game::position::Position;
use crate::game::sync::block::{BlockKind, SynchronizationBlock, SynchronizationBlockSet};
use crate::game::sync::segment::{SegmentKind, SynchronizationSegment};
use crate::game::sync::task::SynchronizationMessage;
use crate::net::buffer::PacketBuffer;
use crate::net::packet::{GamePacket, PacketSize, SYNC_OPCODE};

/// Index value terminating the add section (all 11 bits set except the top)
pub const ADD_TERMINATOR: u32 = 2047;

bitflags! {
    /// Wire mask announcing which blocks follow a segment. The bit values
    /// are fixed by the client.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockMask: u32 {
        const TURN_TO_POSITION = 0x2;
        const FORCE_CHAT = 0x4;
        const ANIMATION = 0x8;
        const APPEARANCE = 0x10;
        /// Set when the mask itself needs a second byte
        const EXTENDED = 0x40;
        const CHAT = 0x80;
        const GRAPHIC = 0x100;
    }
}

/// Encode a synchronization message into its wire packet.
pub fn encode_message(message: &SynchronizationMessage) -> Result<GamePacket> {
    let mut buffer = PacketBuffer::with_capacity(2048);
    let mut blocks = PacketBuffer::with_capacity(4096);

    buffer.start_bit_access();
    write_own_segment(&mut buffer, &mut blocks, message)?;
    buffer.write_bits(8, message.prior_local_count as u32);
    for segment in &message.segments {
        write_actor_segment(&mut buffer, &mut blocks, segment, &message.position)?;
    }
    buffer.write_bits(11, ADD_TERMINATOR);
    buffer.end_bit_access();

    buffer.write_bytes(blocks.as_bytes());

    Ok(GamePacket::new(
        SYNC_OPCODE,
        PacketSize::VariableShort,
        buffer.into_inner().freeze(),
    ))
}

/// Write the observer's own segment.
fn write_own_segment(
    bits: &mut PacketBuffer,
    blocks: &mut PacketBuffer,
    message: &SynchronizationMessage,
) -> Result<()> {
    let segment = &message.own_segment;
    let has_blocks = segment.requires_block_update();

    match segment {
        SynchronizationSegment::Teleport {
            block_set,
            destination,
        } => {
            bits.write_bits(1, 1);
            bits.write_bits(2, 3);
            bits.write_bits(2, destination.plane as u32);
            bits.write_bits(1, u32::from(message.region_changed));
            bits.write_bits(1, u32::from(has_blocks));
            bits.write_bits(7, destination.local_x(&message.last_known_region) as u32);
            bits.write_bits(7, destination.local_y(&message.last_known_region) as u32);
            if has_blocks {
                write_blocks(blocks, block_set)?;
            }
        }
        SynchronizationSegment::Movement {
            block_set,
            directions,
        } => {
            if directions.is_empty() && !has_blocks {
                bits.write_bits(1, 0);
                return Ok(());
            }
            bits.write_bits(1, 1);
            write_movement_bits(bits, directions, has_blocks)?;
            if has_blocks {
                write_blocks(blocks, block_set)?;
            }
        }
        // Add and remove never describe the observer themselves.
        SynchronizationSegment::AddActor { .. } | SynchronizationSegment::Remove => {
            bits.write_bits(1, 0);
        }
    }
    Ok(())
}

/// Write a segment for an actor in the observer's local list.
fn write_actor_segment(
    bits: &mut PacketBuffer,
    blocks: &mut PacketBuffer,
    segment: &SynchronizationSegment,
    observer_position: &Position,
) -> Result<()> {
    let has_blocks = segment.requires_block_update();

    match segment {
        SynchronizationSegment::Remove => {
            bits.write_bits(1, 1);
            bits.write_bits(2, 3);
        }
        SynchronizationSegment::Movement {
            block_set,
            directions,
        } => {
            if directions.is_empty() && !has_blocks {
                bits.write_bits(1, 0);
                return Ok(());
            }
            bits.write_bits(1, 1);
            write_movement_bits(bits, directions, has_blocks)?;
            if has_blocks {
                write_blocks(blocks, block_set)?;
            }
        }
        SynchronizationSegment::AddActor {
            block_set,
            index,
            position,
        } => {
            let dx = position.x as i32 - observer_position.x as i32;
            let dy = position.y as i32 - observer_position.y as i32;

            bits.write_bits(11, *index as u32);
            bits.write_bits(1, u32::from(has_blocks));
            bits.write_bits(1, 1); // discard the client's walking queue
            bits.write_bits(5, (dy & 0x1F) as u32);
            bits.write_bits(5, (dx & 0x1F) as u32);
            if has_blocks {
                write_blocks(blocks, block_set)?;
            }
        }
        // Teleports of other actors are expressed as remove + add.
        SynchronizationSegment::Teleport { .. } => {
            bits.write_bits(1, 1);
            bits.write_bits(2, 3);
        }
    }
    Ok(())
}

/// Write the movement class, steps and block flag shared by walk/run/stand.
fn write_movement_bits(
    bits: &mut PacketBuffer,
    directions: &[crate::game::position::Direction],
    has_blocks: bool,
) -> Result<()> {
    match directions.len() {
        0 => {
            bits.write_bits(2, 0);
        }
        1 => {
            bits.write_bits(2, 1);
            bits.write_bits(3, directions[0].to_client_code()? as u32);
            bits.write_bits(1, u32::from(has_blocks));
        }
        _ => {
            bits.write_bits(2, 2);
            bits.write_bits(3, directions[0].to_client_code()? as u32);
            bits.write_bits(3, directions[1].to_client_code()? as u32);
            bits.write_bits(1, u32::from(has_blocks));
        }
    }
    Ok(())
}

/// Block mask for a set
fn block_mask(set: &SynchronizationBlockSet) -> BlockMask {
    let mut mask = BlockMask::empty();
    for block in set.iter() {
        mask |= match block.kind() {
            BlockKind::Graphic => BlockMask::GRAPHIC,
            BlockKind::Animation => BlockMask::ANIMATION,
            BlockKind::ForceChat => BlockMask::FORCE_CHAT,
            BlockKind::Chat => BlockMask::CHAT,
            BlockKind::Appearance => BlockMask::APPEARANCE,
            BlockKind::TurnToPosition => BlockMask::TURN_TO_POSITION,
        };
    }
    mask
}

/// Write one segment's block entry: the mask, then the flagged blocks in
/// the fixed order the client reads them.
fn write_blocks(buffer: &mut PacketBuffer, set: &SynchronizationBlockSet) -> Result<()> {
    let mut mask = block_mask(set);
    if mask.bits() >= 0x100 {
        mask |= BlockMask::EXTENDED;
        buffer.write_u8((mask.bits() & 0xFF) as u8);
        buffer.write_u8((mask.bits() >> 8) as u8);
    } else {
        buffer.write_u8(mask.bits() as u8);
    }

    if let Some(SynchronizationBlock::Graphic { id, height, delay }) = set.get(BlockKind::Graphic) {
        buffer.write_u16_le(*id);
        buffer.write_u32(((*height as u32) << 16) | *delay as u32);
    }

    if let Some(SynchronizationBlock::Animation { id, delay }) = set.get(BlockKind::Animation) {
        buffer.write_u16_le(*id);
        buffer.write_u8(*delay);
    }

    if let Some(SynchronizationBlock::ForceChat { text }) = set.get(BlockKind::ForceChat) {
        buffer.write_string(text);
    }

    if let Some(SynchronizationBlock::Chat {
        effects,
        privileges,
        message,
    }) = set.get(BlockKind::Chat)
    {
        buffer.write_u16_le(*effects);
        buffer.write_u8(*privileges);
        buffer.write_u8(message.len() as u8);
        buffer.write_bytes_reversed(message);
    }

    if let Some(SynchronizationBlock::Appearance {
        name,
        appearance,
        combat_level,
    }) = set.get(BlockKind::Appearance)
    {
        write_appearance(buffer, name, appearance, *combat_level);
    }

    if let Some(SynchronizationBlock::TurnToPosition { x, y }) = set.get(BlockKind::TurnToPosition)
    {
        buffer.write_u16_le(*x * 2 + 1);
        buffer.write_u16_le(*y * 2 + 1);
    }

    Ok(())
}

/// Write the appearance block: a length-prefixed sub-buffer emitted in
/// reverse byte order.
fn write_appearance(buffer: &mut PacketBuffer, name: &str, appearance: &Appearance, combat: u8) {
    let mut sub = PacketBuffer::with_capacity(128);

    sub.write_u8(appearance.gender);
    sub.write_i8(-1); // skull icon, none
    sub.write_i8(-1); // prayer icon, none

    write_appearance_slots(&mut sub, appearance);

    sub.write_u8(appearance.hair_color);
    sub.write_u8(appearance.torso_color);
    sub.write_u8(appearance.legs_color);
    sub.write_u8(appearance.feet_color);
    sub.write_u8(appearance.skin_color);

    // Model animation IDs: stand, stand-turn, walk, turn 180, turn 90 CW,
    // turn 90 CCW, run.
    for id in [808u16, 823, 819, 820, 821, 822, 824] {
        sub.write_u16(id);
    }

    sub.write_u64(string_to_long(name) as u64);
    sub.write_u8(combat);
    sub.write_u16(0); // skill total, unused here
    sub.write_u8(0); // visible

    buffer.write_u8(sub.len() as u8);
    buffer.write_bytes_reversed(sub.as_bytes());
}

/// Body part slots: 0 = empty, 256 + id = body part model.
fn write_appearance_slots(buffer: &mut PacketBuffer, appearance: &Appearance) {
    buffer.write_u16(256 + appearance.head);
    buffer.write_u8(0); // cape
    buffer.write_u8(0); // amulet
    buffer.write_u8(0); // weapon
    buffer.write_u16(256 + appearance.torso);
    buffer.write_u8(0); // shield
    buffer.write_u16(256 + appearance.arms);
    buffer.write_u16(256 + appearance.legs);
    buffer.write_u16(256 + appearance.head); // hair
    buffer.write_u16(256 + appearance.hands);
    buffer.write_u16(256 + appearance.feet);
    if appearance.gender == 0 {
        buffer.write_u16(256 + appearance.beard);
    } else {
        buffer.write_u8(0);
    }
}

/// Hash a display name into the base-37 packed form the client compares
/// friends list entries with.
pub fn string_to_long(s: &str) -> i64 {
    let mut result: i64 = 0;
    for c in s.chars().take(12) {
        result *= 37;
        if c.is_ascii_uppercase() {
            result += (c as i64) - 64;
        } else if c.is_ascii_lowercase() {
            result += (c as i64) - 96;
        } else if c.is_ascii_digit() {
            result += (c as i64) - 21;
        }
    }
    while result % 37 == 0 && result != 0 {
        result /= 37;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::position::Direction;

    fn message(
        own_segment: SynchronizationSegment,
        prior_local_count: usize,
        segments: Vec<SynchronizationSegment>,
    ) -> SynchronizationMessage {
        SynchronizationMessage {
            last_known_region: Position::new(3222, 3222, 0),
            position: Position::new(3222, 3222, 0),
            region_changed: false,
            own_segment,
            prior_local_count,
            segments,
        }
    }

    fn reader(packet: &GamePacket) -> PacketBuffer {
        PacketBuffer::from_bytes(&packet.payload)
    }

    #[test]
    fn test_idle_observer_is_two_fields() {
        let msg = message(
            SynchronizationSegment::movement(SynchronizationBlockSet::new(), vec![]).unwrap(),
            0,
            vec![],
        );
        let packet = encode_message(&msg).unwrap();
        assert_eq!(packet.opcode, SYNC_OPCODE);
        assert_eq!(packet.size, PacketSize::VariableShort);

        let mut buf = reader(&packet);
        buf.start_bit_access();
        assert_eq!(buf.read_bits(1), 0); // no own update
        assert_eq!(buf.read_bits(8), 0); // empty local list
        assert_eq!(buf.read_bits(11), ADD_TERMINATOR);
    }

    #[test]
    fn test_walk_segment_bits() {
        let msg = message(
            SynchronizationSegment::movement(
                SynchronizationBlockSet::new(),
                vec![Direction::East],
            )
            .unwrap(),
            0,
            vec![],
        );
        let packet = encode_message(&msg).unwrap();

        let mut buf = reader(&packet);
        buf.start_bit_access();
        assert_eq!(buf.read_bits(1), 1);
        assert_eq!(buf.read_bits(2), 1); // walk
        assert_eq!(buf.read_bits(3), 4); // east
        assert_eq!(buf.read_bits(1), 0); // no blocks
        assert_eq!(buf.read_bits(8), 0);
        assert_eq!(buf.read_bits(11), ADD_TERMINATOR);
    }

    #[test]
    fn test_run_segment_bits() {
        let msg = message(
            SynchronizationSegment::movement(
                SynchronizationBlockSet::new(),
                vec![Direction::North, Direction::NorthEast],
            )
            .unwrap(),
            0,
            vec![],
        );
        let packet = encode_message(&msg).unwrap();

        let mut buf = reader(&packet);
        buf.start_bit_access();
        assert_eq!(buf.read_bits(1), 1);
        assert_eq!(buf.read_bits(2), 2); // run
        assert_eq!(buf.read_bits(3), 1); // north
        assert_eq!(buf.read_bits(3), 2); // north-east
        assert_eq!(buf.read_bits(1), 0);
    }

    #[test]
    fn test_teleport_segment_bits() {
        let destination = Position::new(3222, 3222, 2);
        let mut msg = message(
            SynchronizationSegment::Teleport {
                block_set: SynchronizationBlockSet::new(),
                destination,
            },
            0,
            vec![],
        );
        msg.region_changed = true;
        let packet = encode_message(&msg).unwrap();

        let mut buf = reader(&packet);
        buf.start_bit_access();
        assert_eq!(buf.read_bits(1), 1);
        assert_eq!(buf.read_bits(2), 3); // teleport
        assert_eq!(buf.read_bits(2), 2); // plane
        assert_eq!(buf.read_bits(1), 1); // region changed
        assert_eq!(buf.read_bits(1), 0); // no blocks
        assert_eq!(buf.read_bits(7), 54); // local x within the viewport
        assert_eq!(buf.read_bits(7), 54); // local y
    }

    #[test]
    fn test_add_segment_bits_and_delta_window() {
        let mut set = SynchronizationBlockSet::new();
        set.add(SynchronizationBlock::Appearance {
            name: "newcomer".to_string(),
            appearance: Appearance::default_male(),
            combat_level: 3,
        });
        let msg = message(
            SynchronizationSegment::movement(SynchronizationBlockSet::new(), vec![]).unwrap(),
            0,
            vec![SynchronizationSegment::AddActor {
                block_set: set,
                index: 42,
                position: Position::new(3220, 3225, 0), // dx = -2, dy = 3
            }],
        );
        let packet = encode_message(&msg).unwrap();

        let mut buf = reader(&packet);
        buf.start_bit_access();
        assert_eq!(buf.read_bits(1), 0); // own: no update
        assert_eq!(buf.read_bits(8), 0);
        assert_eq!(buf.read_bits(11), 42);
        assert_eq!(buf.read_bits(1), 1); // carries blocks
        assert_eq!(buf.read_bits(1), 1); // discard walking queue
        assert_eq!(buf.read_bits(5), 3); // dy
        assert_eq!(buf.read_bits(5), (-2i32 & 0x1F) as u32); // dx, 5-bit window
        assert_eq!(buf.read_bits(11), ADD_TERMINATOR);
        buf.end_bit_access();

        // Block section starts with the appearance mask.
        assert_eq!(buf.read_u8(), 0x10);
    }

    #[test]
    fn test_remove_segment_bits() {
        let msg = message(
            SynchronizationSegment::movement(SynchronizationBlockSet::new(), vec![]).unwrap(),
            1,
            vec![SynchronizationSegment::Remove],
        );
        let packet = encode_message(&msg).unwrap();

        let mut buf = reader(&packet);
        buf.start_bit_access();
        assert_eq!(buf.read_bits(1), 0);
        assert_eq!(buf.read_bits(8), 1); // one prior local actor
        assert_eq!(buf.read_bits(1), 1);
        assert_eq!(buf.read_bits(2), 3); // remove
        assert_eq!(buf.read_bits(11), ADD_TERMINATOR);
    }

    #[test]
    fn test_small_mask_is_one_byte() {
        let mut set = SynchronizationBlockSet::new();
        set.add(SynchronizationBlock::Animation { id: 875, delay: 0 });

        let mut buf = PacketBuffer::new();
        write_blocks(&mut buf, &set).unwrap();

        assert_eq!(buf.as_bytes()[0], 0x8);
        let bytes = buf.as_bytes();
        // Animation payload: little-endian id then delay.
        assert_eq!(&bytes[1..4], &[875u16.to_le_bytes()[0], 875u16.to_le_bytes()[1], 0]);
    }

    #[test]
    fn test_extended_mask_is_two_bytes() {
        let mut set = SynchronizationBlockSet::new();
        set.add(SynchronizationBlock::Graphic {
            id: 92,
            height: 100,
            delay: 0,
        });

        let mut buf = PacketBuffer::new();
        write_blocks(&mut buf, &set).unwrap();

        let bytes = buf.as_bytes();
        let mask = (bytes[0] as u32) | ((bytes[1] as u32) << 8);
        assert_eq!(mask, (BlockMask::GRAPHIC | BlockMask::EXTENDED).bits());

        // Graphic payload follows: little-endian id, then packed settings.
        let mut rest = PacketBuffer::from_bytes(&bytes[2..]);
        assert_eq!(rest.read_u16_le(), 92);
        assert_eq!(rest.read_u32(), 100u32 << 16);
    }

    #[test]
    fn test_chat_block_reversed_message() {
        let mut set = SynchronizationBlockSet::new();
        set.add(SynchronizationBlock::Chat {
            effects: 0,
            privileges: 1,
            message: b"abc".to_vec(),
        });

        let mut buf = PacketBuffer::new();
        write_blocks(&mut buf, &set).unwrap();

        let bytes = buf.as_bytes();
        assert_eq!(bytes[0], 0x80);
        let mut rest = PacketBuffer::from_bytes(&bytes[1..]);
        assert_eq!(rest.read_u16_le(), 0);
        assert_eq!(rest.read_u8(), 1);
        assert_eq!(rest.read_u8(), 3);
        assert_eq!(rest.read_bytes(3), b"cba");
    }

    #[test]
    fn test_block_write_order_is_fixed() {
        // Insertion order differs from wire order; the client still reads
        // graphic before chat.
        let mut set = SynchronizationBlockSet::new();
        set.add(SynchronizationBlock::Chat {
            effects: 0,
            privileges: 0,
            message: b"x".to_vec(),
        });
        set.add(SynchronizationBlock::Graphic {
            id: 1,
            height: 0,
            delay: 0,
        });

        let mut buf = PacketBuffer::new();
        write_blocks(&mut buf, &set).unwrap();

        let bytes = buf.as_bytes();
        let mask = (bytes[0] as u32) | ((bytes[1] as u32) << 8);
        assert_eq!(
            mask,
            (BlockMask::GRAPHIC | BlockMask::CHAT | BlockMask::EXTENDED).bits()
        );

        let mut rest = PacketBuffer::from_bytes(&bytes[2..]);
        // Graphic first.
        assert_eq!(rest.read_u16_le(), 1);
        assert_eq!(rest.read_u32(), 0);
        // Then chat.
        assert_eq!(rest.read_u16_le(), 0);
        assert_eq!(rest.read_u8(), 0);
        assert_eq!(rest.read_u8(), 1);
    }

    #[test]
    fn test_appearance_block_length_prefix() {
        let mut buf = PacketBuffer::new();
        write_appearance(&mut buf, "alice", &Appearance::default_male(), 3);

        let bytes = buf.as_bytes();
        let declared = bytes[0] as usize;
        assert_eq!(bytes.len(), declared + 1);

        // The sub-buffer is reversed, so its first byte (gender) comes last.
        assert_eq!(bytes[declared], 0);
    }

    #[test]
    fn test_string_to_long_matches_known_values() {
        assert_eq!(string_to_long(""), 0);
        assert_eq!(string_to_long("a"), 1);
        assert_eq!(string_to_long("A"), 1);
        assert_eq!(string_to_long("ab"), 37 + 2);
        // Trailing ignored characters are stripped by the base-37 reduction.
        assert_eq!(string_to_long("a "), string_to_long("a"));
        assert_ne!(string_to_long("alice"), string_to_long("bob"));
    }
}
