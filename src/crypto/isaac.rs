//! ISAAC cipher implementation
//!
//! ISAAC is a cryptographically secure pseudorandom number generator used to
//! obfuscate packet opcodes. Each connection owns two independent generators,
//! one per direction, seeded from a 4-word key exchanged at session
//! establishment. Both sides must draw exactly one word per packet header;
//! a missed or duplicated draw desynchronizes the pair permanently.
//!
//! Reference: http://www.burtleburtle.net/bob/rand/isaacafa.html

use std::fmt;

/// Size of the ISAAC state array (must be a power of 2)
const SIZE: usize = 256;

/// Mask for array indexing (SIZE - 1)
const MASK: usize = SIZE - 1;

/// Golden ratio constant used in initialization
const GOLDEN_RATIO: u32 = 0x9e3779b9;

/// Number of words in a session key
pub const KEY_WORDS: usize = 4;

/// ISAAC generator state
#[derive(Clone)]
pub struct Isaac {
    /// Results buffer, drained one word per call
    results: [u32; SIZE],
    /// Internal shuffled state table
    state: [u32; SIZE],
    /// Accumulator
    acc: u32,
    /// Previous result
    last: u32,
    /// Cycle counter
    counter: u32,
    /// Remaining words in the results buffer
    remaining: usize,
}

impl Isaac {
    /// Create a new generator seeded from a 4-word session key.
    pub fn new(key: [u32; KEY_WORDS]) -> Self {
        let mut isaac = Self {
            results: [0u32; SIZE],
            state: [0u32; SIZE],
            acc: 0,
            last: 0,
            counter: 0,
            remaining: 0,
        };
        isaac.results[..KEY_WORDS].copy_from_slice(&key);
        isaac.init();
        isaac
    }

    /// Diffuse the seed into the state table.
    fn init(&mut self) {
        let mut m = [GOLDEN_RATIO; 8];
        for _ in 0..4 {
            mix(&mut m);
        }

        // Two passes: first over the seeded results, then over the state
        // itself, so every word of the key affects every word of the table.
        for source in 0..2 {
            for i in (0..SIZE).step_by(8) {
                for j in 0..8 {
                    let word = if source == 0 {
                        self.results[i + j]
                    } else {
                        self.state[i + j]
                    };
                    m[j] = m[j].wrapping_add(word);
                }
                mix(&mut m);
                self.state[i..i + 8].copy_from_slice(&m);
            }
        }

        self.shuffle();
        self.remaining = SIZE;
    }

    /// Generate 256 new result words, reshuffling the state table.
    fn shuffle(&mut self) {
        self.counter = self.counter.wrapping_add(1);
        self.last = self.last.wrapping_add(self.counter);

        for i in 0..SIZE {
            let x = self.state[i];

            self.acc = match i & 3 {
                0 => self.acc ^ (self.acc << 13),
                1 => self.acc ^ (self.acc >> 6),
                2 => self.acc ^ (self.acc << 2),
                _ => self.acc ^ (self.acc >> 16),
            };
            self.acc = self.state[(i + SIZE / 2) & MASK].wrapping_add(self.acc);

            let y = self.state[((x >> 2) as usize) & MASK]
                .wrapping_add(self.acc)
                .wrapping_add(self.last);
            self.state[i] = y;

            self.last = self.state[((y >> 10) as usize) & MASK].wrapping_add(x);
            self.results[i] = self.last;
        }
    }

    /// Get the next pseudorandom word, advancing the generator.
    #[inline]
    pub fn next(&mut self) -> u32 {
        if self.remaining == 0 {
            self.shuffle();
            self.remaining = SIZE;
        }
        self.remaining -= 1;
        self.results[self.remaining]
    }

    /// Get the low 8 bits of the next word. One call per packet header.
    #[inline]
    pub fn next_byte(&mut self) -> u8 {
        (self.next() & 0xFF) as u8
    }
}

impl fmt::Debug for Isaac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Isaac")
            .field("remaining", &self.remaining)
            .field("counter", &self.counter)
            .finish()
    }
}

/// Mix step for ISAAC initialization
#[inline]
fn mix(m: &mut [u32; 8]) {
    m[0] ^= m[1] << 11;
    m[3] = m[3].wrapping_add(m[0]);
    m[1] = m[1].wrapping_add(m[2]);

    m[1] ^= m[2] >> 2;
    m[4] = m[4].wrapping_add(m[1]);
    m[2] = m[2].wrapping_add(m[3]);

    m[2] ^= m[3] << 8;
    m[5] = m[5].wrapping_add(m[2]);
    m[3] = m[3].wrapping_add(m[4]);

    m[3] ^= m[4] >> 16;
    m[6] = m[6].wrapping_add(m[3]);
    m[4] = m[4].wrapping_add(m[5]);

    m[4] ^= m[5] << 10;
    m[7] = m[7].wrapping_add(m[4]);
    m[5] = m[5].wrapping_add(m[6]);

    m[5] ^= m[6] >> 4;
    m[0] = m[0].wrapping_add(m[5]);
    m[6] = m[6].wrapping_add(m[7]);

    m[6] ^= m[7] << 8;
    m[1] = m[1].wrapping_add(m[6]);
    m[7] = m[7].wrapping_add(m[0]);

    m[7] ^= m[0] >> 9;
    m[2] = m[2].wrapping_add(m[7]);
    m[0] = m[0].wrapping_add(m[1]);
}

/// Paired ISAAC generators for one connection.
///
/// The server's decode generator uses the raw key (to cancel what the client
/// encoded with) and its encode generator uses each key word offset by 50;
/// the client builds the mirror-image pair.
#[derive(Clone)]
pub struct IsaacPair {
    /// Generator for obfuscating outgoing opcodes
    pub encode: Isaac,
    /// Generator for de-obfuscating incoming opcodes
    pub decode: Isaac,
}

impl IsaacPair {
    /// Create the server-side pair from the session key.
    pub fn new(key: [u32; KEY_WORDS]) -> Self {
        Self {
            decode: Isaac::new(key),
            encode: Isaac::new(offset_key(key)),
        }
    }

    /// Create the client-side pair (mirror of the server's).
    pub fn for_client(key: [u32; KEY_WORDS]) -> Self {
        Self {
            encode: Isaac::new(key),
            decode: Isaac::new(offset_key(key)),
        }
    }

    /// Obfuscate an outgoing opcode byte.
    #[inline]
    pub fn encode_opcode(&mut self, opcode: u8) -> u8 {
        opcode.wrapping_add(self.encode.next_byte())
    }

    /// De-obfuscate an incoming opcode byte.
    #[inline]
    pub fn decode_opcode(&mut self, received: u8) -> u8 {
        received.wrapping_sub(self.decode.next_byte())
    }
}

impl fmt::Debug for IsaacPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsaacPair")
            .field("encode", &self.encode)
            .field("decode", &self.decode)
            .finish()
    }
}

fn offset_key(key: [u32; KEY_WORDS]) -> [u32; KEY_WORDS] {
    let mut out = key;
    for word in &mut out {
        *word = word.wrapping_add(50);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_from_same_key() {
        let mut a = Isaac::new([1, 2, 3, 4]);
        let mut b = Isaac::new([1, 2, 3, 4]);

        for _ in 0..1000 {
            assert_eq!(a.next(), b.next());
        }
    }

    #[test]
    fn test_different_keys_diverge() {
        let mut a = Isaac::new([1, 2, 3, 4]);
        let mut b = Isaac::new([5, 6, 7, 8]);

        let mut all_match = true;
        for _ in 0..100 {
            if a.next() != b.next() {
                all_match = false;
                break;
            }
        }
        assert!(!all_match);
    }

    #[test]
    fn test_regenerates_after_exhaustion() {
        let mut isaac = Isaac::new([1, 2, 3, 4]);

        let first_cycle: Vec<u32> = (0..SIZE).map(|_| isaac.next()).collect();
        let second_cycle: Vec<u32> = (0..SIZE).map(|_| isaac.next()).collect();

        assert_ne!(first_cycle, second_cycle);
    }

    #[test]
    fn test_lockstep_pair_cancels() {
        let key = [12345u32, 67890, 11111, 22222];
        let mut server = IsaacPair::new(key);
        let mut client = IsaacPair::for_client(key);

        // Server encodes, client decodes, for 10,000 consecutive headers.
        for i in 0u32..10_000 {
            let opcode = (i % 256) as u8;
            let wire = server.encode_opcode(opcode);
            assert_eq!(client.decode_opcode(wire), opcode, "header {i}");
        }
    }

    #[test]
    fn test_lockstep_pair_cancels_client_to_server() {
        let key = [0xDEADBEEFu32, 0xCAFEBABE, 0x12345678, 0x87654321];
        let mut server = IsaacPair::new(key);
        let mut client = IsaacPair::for_client(key);

        for opcode in 0u8..=255 {
            let wire = client.encode_opcode(opcode);
            assert_eq!(server.decode_opcode(wire), opcode);
        }
    }

    #[test]
    fn test_missed_draw_desynchronizes() {
        let key = [9u32, 8, 7, 6];
        let mut server = IsaacPair::new(key);
        let mut client = IsaacPair::for_client(key);

        // Client misses one packet's draw; nothing lines up afterwards.
        server.encode.next();
        let mut mismatched = 0;
        for opcode in 0u8..100 {
            let wire = server.encode_opcode(opcode);
            if client.decode_opcode(wire) != opcode {
                mismatched += 1;
            }
        }
        assert!(mismatched > 90);
    }
}
