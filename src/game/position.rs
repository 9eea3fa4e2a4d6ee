//! World positions and movement directions
//!
//! Positions are absolute tile coordinates with a plane (0-3). The viewport
//! a client renders is anchored to the "last known region", the 13x13-region
//! area centred on the region the client most recently loaded; coordinates
//! inside the synchronization packet are relative to that anchor.

use std::fmt;

use crate::error::{Result, SyncError};

/// Highest valid plane
pub const MAX_PLANE: u8 = 3;

/// An absolute tile position in the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: u16,
    pub y: u16,
    pub plane: u8,
}

impl Position {
    /// Create a position. The plane must already be known valid.
    pub fn new(x: u16, y: u16, plane: u8) -> Self {
        debug_assert!(plane <= MAX_PLANE);
        Self { x, y, plane }
    }

    /// Create a position from untrusted input, rejecting invalid planes.
    pub fn checked(x: u16, y: u16, plane: u8) -> Result<Self> {
        if plane > MAX_PLANE {
            return Err(SyncError::InvalidPlane(plane).into());
        }
        Ok(Self { x, y, plane })
    }

    /// Chebyshev distance to `other`, ignoring planes.
    pub fn longest_delta(&self, other: &Position) -> u16 {
        let dx = (self.x as i32 - other.x as i32).unsigned_abs() as u16;
        let dy = (self.y as i32 - other.y as i32).unsigned_abs() as u16;
        dx.max(dy)
    }

    /// Whether `other` is on the same plane and within `distance` tiles
    /// (Chebyshev).
    pub fn within_distance(&self, other: &Position, distance: u16) -> bool {
        self.plane == other.plane && self.longest_delta(other) <= distance
    }

    /// X coordinate relative to the viewport anchored at `base`.
    ///
    /// Computed in `i32`: near the world origin the anchor tile is negative,
    /// and a position just outside the viewport would otherwise underflow.
    /// The result is clamped to the 7-bit range the wire format carries.
    pub fn local_x(&self, base: &Position) -> u16 {
        let origin = 8 * ((base.x as i32 >> 3) - 6);
        (self.x as i32 - origin).clamp(0, 0x7F) as u16
    }

    /// Y coordinate relative to the viewport anchored at `base`.
    pub fn local_y(&self, base: &Position) -> u16 {
        let origin = 8 * ((base.y as i32 >> 3) - 6);
        (self.y as i32 - origin).clamp(0, 0x7F) as u16
    }

    /// Identifier of the 64x64 map region containing this position
    pub fn region_id(&self) -> u32 {
        (((self.x >> 6) as u32) << 8) | (self.y >> 6) as u32
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.plane)
    }
}

/// A compass direction of movement.
///
/// The client decodes movement steps from a 3-bit code; `None` means the
/// actor did not move that step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    NorthWest,
    North,
    NorthEast,
    West,
    East,
    SouthWest,
    South,
    SouthEast,
    None,
}

impl Direction {
    /// The 3-bit wire code for this direction.
    ///
    /// Returns `Err` for `None`; a standing actor never emits a step.
    pub fn to_client_code(self) -> Result<u8> {
        match self {
            Direction::NorthWest => Ok(0),
            Direction::North => Ok(1),
            Direction::NorthEast => Ok(2),
            Direction::West => Ok(3),
            Direction::East => Ok(4),
            Direction::SouthWest => Ok(5),
            Direction::South => Ok(6),
            Direction::SouthEast => Ok(7),
            Direction::None => Err(crate::error::TickforgeError::Internal(
                "Direction::None has no wire code".to_string(),
            )),
        }
    }

    /// Direction of a single step between adjacent tiles.
    pub fn from_deltas(dx: i32, dy: i32) -> Direction {
        match (dx.signum(), dy.signum()) {
            (-1, 1) => Direction::NorthWest,
            (0, 1) => Direction::North,
            (1, 1) => Direction::NorthEast,
            (-1, 0) => Direction::West,
            (1, 0) => Direction::East,
            (-1, -1) => Direction::SouthWest,
            (0, -1) => Direction::South,
            (1, -1) => Direction::SouthEast,
            _ => Direction::None,
        }
    }

    /// Tile offset of one step in this direction
    pub fn deltas(self) -> (i32, i32) {
        match self {
            Direction::NorthWest => (-1, 1),
            Direction::North => (0, 1),
            Direction::NorthEast => (1, 1),
            Direction::West => (-1, 0),
            Direction::East => (1, 0),
            Direction::SouthWest => (-1, -1),
            Direction::South => (0, -1),
            Direction::SouthEast => (1, -1),
            Direction::None => (0, 0),
        }
    }
}
