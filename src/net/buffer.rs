//! Packet buffer implementation
//!
//! Provides a byte buffer with protocol-specific read/write operations:
//! - Integers of 1-4 byte widths in big, little, and the two middle-endian
//!   byte orders
//! - Wire-level value transforms (add-128, 128-minus, negate) on the low byte
//! - Smart encoding for variable-length integers (1 or 2 bytes)
//! - Bit access mode for non-byte-aligned fields
//! - String encoding

use bytes::{BufMut, BytesMut};

/// Maximum packet size (64KB)
pub const MAX_PACKET_SIZE: usize = 65535;

/// Byte emission order for multi-byte integer fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Most significant byte first
    Big,
    /// Least significant byte first
    Little,
    /// Middle-endian variant 1: bytes 1, 0, 3, 2 (4-byte widths only)
    Middle,
    /// Middle-endian variant 2: bytes 2, 3, 0, 1 (4-byte widths only)
    InverseMiddle,
}

/// Wire-level transform applied to the low byte of an encoded value.
///
/// Decode must invert the exact transform used to encode, or the value is
/// silently corrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// No transform
    None,
    /// Low byte + 128 (mod 256)
    Add,
    /// 128 - low byte (mod 256); self-inverse
    Subtract,
    /// Negated low byte; self-inverse
    Negate,
}

impl Transform {
    /// Apply this transform for encoding.
    #[inline]
    fn apply(self, byte: u8) -> u8 {
        match self {
            Transform::None => byte,
            Transform::Add => byte.wrapping_add(128),
            Transform::Subtract => 128u8.wrapping_sub(byte),
            Transform::Negate => (byte as i8).wrapping_neg() as u8,
        }
    }

    /// Invert this transform for decoding.
    #[inline]
    fn invert(self, byte: u8) -> u8 {
        match self {
            Transform::None => byte,
            Transform::Add => byte.wrapping_sub(128),
            Transform::Subtract => 128u8.wrapping_sub(byte),
            Transform::Negate => (byte as i8).wrapping_neg() as u8,
        }
    }
}

/// Byte significance sequence for an order/width pair, in emission order.
fn emission_order(order: ByteOrder, width: usize) -> Vec<usize> {
    match order {
        ByteOrder::Big => (0..width).rev().collect(),
        ByteOrder::Little => (0..width).collect(),
        ByteOrder::Middle => vec![1, 0, 3, 2],
        ByteOrder::InverseMiddle => vec![2, 3, 0, 1],
    }
}

/// Packet buffer for reading and writing game protocol data
#[derive(Debug, Clone, Default)]
pub struct PacketBuffer {
    /// Internal byte buffer
    data: BytesMut,
    /// Current read position
    read_pos: usize,
    /// Bit access position (in bits)
    bit_pos: usize,
    /// Whether currently in bit access mode
    in_bit_mode: bool,
}

impl PacketBuffer {
    /// Create a new empty packet buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a packet buffer with a specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Create a packet buffer from existing bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: BytesMut::from(bytes),
            ..Self::default()
        }
    }

    /// Get the total length of the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the number of bytes remaining to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.read_pos)
    }

    /// Check if there are bytes remaining to read
    #[inline]
    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Get a reference to the underlying bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Get the underlying BytesMut
    #[inline]
    pub fn into_inner(self) -> BytesMut {
        self.data
    }

    /// Clear the buffer and reset positions
    pub fn clear(&mut self) {
        self.data.clear();
        self.read_pos = 0;
        self.bit_pos = 0;
        self.in_bit_mode = false;
    }

    /// Reset read position to start
    pub fn reset(&mut self) {
        self.read_pos = 0;
        self.bit_pos = 0;
        self.in_bit_mode = false;
    }

    // ============ Generic Integer Access ============

    /// Write an integer of `width` bytes (1-4) in the given byte order,
    /// applying `transform` to the low byte.
    pub fn write_int(&mut self, value: u32, width: usize, order: ByteOrder, transform: Transform) {
        assert!((1..=4).contains(&width), "width {width} out of range");
        assert!(
            matches!(order, ByteOrder::Big | ByteOrder::Little) || width == 4,
            "middle-endian orders require a 4 byte width"
        );
        for sig in emission_order(order, width) {
            let byte = (value >> (8 * sig)) as u8;
            let byte = if sig == 0 { transform.apply(byte) } else { byte };
            self.data.put_u8(byte);
        }
    }

    /// Read an unsigned integer of `width` bytes (1-4) in the given byte
    /// order, inverting `transform` on the low byte.
    pub fn read_unsigned(&mut self, width: usize, order: ByteOrder, transform: Transform) -> u32 {
        assert!((1..=4).contains(&width), "width {width} out of range");
        assert!(
            matches!(order, ByteOrder::Big | ByteOrder::Little) || width == 4,
            "middle-endian orders require a 4 byte width"
        );
        let mut value = 0u32;
        for sig in emission_order(order, width) {
            let byte = self.read_u8();
            let byte = if sig == 0 { transform.invert(byte) } else { byte };
            value |= (byte as u32) << (8 * sig);
        }
        value
    }

    // ============ Reading Methods ============

    /// Read an unsigned byte
    pub fn read_u8(&mut self) -> u8 {
        if self.read_pos >= self.data.len() {
            return 0;
        }
        let value = self.data[self.read_pos];
        self.read_pos += 1;
        value
    }

    /// Read a signed byte
    pub fn read_i8(&mut self) -> i8 {
        self.read_u8() as i8
    }

    /// Read an unsigned big-endian short (2 bytes)
    pub fn read_u16(&mut self) -> u16 {
        let b1 = self.read_u8() as u16;
        let b2 = self.read_u8() as u16;
        (b1 << 8) | b2
    }

    /// Read an unsigned little-endian short (2 bytes)
    pub fn read_u16_le(&mut self) -> u16 {
        let b1 = self.read_u8() as u16;
        let b2 = self.read_u8() as u16;
        (b2 << 8) | b1
    }

    /// Read an unsigned big-endian int (4 bytes)
    pub fn read_u32(&mut self) -> u32 {
        let b1 = self.read_u8() as u32;
        let b2 = self.read_u8() as u32;
        let b3 = self.read_u8() as u32;
        let b4 = self.read_u8() as u32;
        (b1 << 24) | (b2 << 16) | (b3 << 8) | b4
    }

    /// Read an unsigned big-endian long (8 bytes)
    pub fn read_u64(&mut self) -> u64 {
        let high = self.read_u32() as u64;
        let low = self.read_u32() as u64;
        (high << 32) | low
    }

    /// Read a smart value: 1 byte if the leading byte is < 128, else
    /// 2 bytes minus 32768.
    pub fn read_smart(&mut self) -> u16 {
        let peek = self.peek_u8();
        if peek < 128 {
            self.read_u8() as u16
        } else {
            self.read_u16().wrapping_sub(32768)
        }
    }

    /// Peek at the next unsigned byte without advancing position
    pub fn peek_u8(&self) -> u8 {
        if self.read_pos >= self.data.len() {
            return 0;
        }
        self.data[self.read_pos]
    }

    /// Read a null-terminated string
    pub fn read_string(&mut self) -> String {
        let mut bytes = Vec::new();
        loop {
            let b = self.read_u8();
            if b == 0 {
                break;
            }
            bytes.push(b);
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Read a specific number of bytes
    pub fn read_bytes(&mut self, length: usize) -> Vec<u8> {
        let end = (self.read_pos + length).min(self.data.len());
        let bytes = self.data[self.read_pos..end].to_vec();
        self.read_pos = end;
        bytes
    }

    // ============ Writing Methods ============

    /// Write an unsigned byte
    pub fn write_u8(&mut self, value: u8) {
        self.data.put_u8(value);
    }

    /// Write a signed byte
    pub fn write_i8(&mut self, value: i8) {
        self.data.put_i8(value);
    }

    /// Write an unsigned big-endian short (2 bytes)
    pub fn write_u16(&mut self, value: u16) {
        self.data.put_u16(value);
    }

    /// Write an unsigned little-endian short (2 bytes)
    pub fn write_u16_le(&mut self, value: u16) {
        self.data.put_u16_le(value);
    }

    /// Write an unsigned big-endian int (4 bytes)
    pub fn write_u32(&mut self, value: u32) {
        self.data.put_u32(value);
    }

    /// Write an unsigned big-endian long (8 bytes)
    pub fn write_u64(&mut self, value: u64) {
        self.data.put_u64(value);
    }

    /// Write a smart value (1 or 2 bytes depending on magnitude)
    pub fn write_smart(&mut self, value: u16) {
        if value < 128 {
            self.write_u8(value as u8);
        } else {
            self.write_u16(value.wrapping_add(32768));
        }
    }

    /// Write a null-terminated string
    pub fn write_string(&mut self, value: &str) {
        self.data.extend_from_slice(value.as_bytes());
        self.write_u8(0);
    }

    /// Write raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Write bytes in reverse order
    pub fn write_bytes_reversed(&mut self, bytes: &[u8]) {
        for &b in bytes.iter().rev() {
            self.write_u8(b);
        }
    }

    // ============ Bit Access ============

    /// Enter bit access mode.
    ///
    /// For writing, the bit cursor starts at the current end of the buffer;
    /// for reading, at the current read position.
    pub fn start_bit_access(&mut self) {
        if self.read_pos < self.data.len() {
            self.bit_pos = self.read_pos * 8;
        } else {
            self.bit_pos = self.data.len() * 8;
        }
        self.in_bit_mode = true;
    }

    /// Exit bit access mode, padding the buffer to the next byte boundary.
    /// Whole-byte fields must not be written while in bit mode.
    pub fn end_bit_access(&mut self) {
        let byte_pos = (self.bit_pos + 7) / 8;
        while self.data.len() < byte_pos {
            self.data.put_u8(0);
        }
        self.read_pos = byte_pos.min(self.data.len());
        self.in_bit_mode = false;
    }

    /// Read `count` bits from the buffer
    pub fn read_bits(&mut self, count: usize) -> u32 {
        assert!(self.in_bit_mode, "not in bit access mode");

        let mut byte_pos = self.bit_pos / 8;
        let mut bit_offset = 8 - (self.bit_pos % 8);
        let mut value = 0u32;
        let mut remaining = count;

        self.bit_pos += count;

        while remaining > bit_offset {
            value |= ((self.data.get(byte_pos).copied().unwrap_or(0) as u32)
                & ((1 << bit_offset) - 1))
                << (remaining - bit_offset);
            remaining -= bit_offset;
            byte_pos += 1;
            bit_offset = 8;
        }

        if remaining == bit_offset {
            value |=
                (self.data.get(byte_pos).copied().unwrap_or(0) as u32) & ((1 << bit_offset) - 1);
        } else {
            value |= ((self.data.get(byte_pos).copied().unwrap_or(0) as u32)
                >> (bit_offset - remaining))
                & ((1 << remaining) - 1);
        }

        value
    }

    /// Write `count` bits with the given value
    pub fn write_bits(&mut self, count: usize, value: u32) {
        assert!(self.in_bit_mode, "not in bit access mode");

        let mut byte_pos = self.bit_pos / 8;
        let mut bit_offset = 8 - (self.bit_pos % 8);
        let mut remaining = count;
        let val = value;

        self.bit_pos += count;

        // Extend exactly to the last byte the new bits touch, so byte
        // writes after end_bit_access land flush against the bit section.
        let required = (self.bit_pos + 7) / 8;
        while self.data.len() < required {
            self.data.put_u8(0);
        }

        while remaining > bit_offset {
            let mask = (1 << bit_offset) - 1;
            self.data[byte_pos] &= !(mask as u8);
            self.data[byte_pos] |= ((val >> (remaining - bit_offset)) & mask) as u8;
            remaining -= bit_offset;
            byte_pos += 1;
            bit_offset = 8;
        }

        if remaining == bit_offset {
            let mask = (1 << bit_offset) - 1;
            self.data[byte_pos] &= !(mask as u8);
            self.data[byte_pos] |= (val & mask) as u8;
        } else {
            let mask = ((1 << remaining) - 1) << (bit_offset - remaining);
            self.data[byte_pos] &= !(mask as u8);
            self.data[byte_pos] |=
                ((val & ((1 << remaining) - 1)) << (bit_offset - remaining)) as u8;
        }
    }

    /// Get the number of bits needed to represent a value
    pub fn bits_needed(value: u32) -> usize {
        if value == 0 {
            return 1;
        }
        32 - value.leading_zeros() as usize
    }
}

impl From<Vec<u8>> for PacketBuffer {
    fn from(vec: Vec<u8>) -> Self {
        Self::from_bytes(&vec)
    }
}

impl From<&[u8]> for PacketBuffer {
    fn from(slice: &[u8]) -> Self {
        Self::from_bytes(slice)
    }
}

impl AsRef<[u8]> for PacketBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
