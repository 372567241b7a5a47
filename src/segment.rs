//! Bus frame payload codec.
//!
//! A [`BusFrame`] carries an 11-bit identifier and an 8-byte payload. The
//! payload is split into two 4-byte [`Segment`]s: segment one is the low
//! word (bytes 0..4) and segment two is the high word (bytes 4..8). Each
//! interpretation of a segment is an explicit accessor; nothing converts
//! implicitly. All multi-byte values are little-endian.

use serde::{Deserialize, Serialize};
use static_assertions::assert_eq_size;

pub const SEGMENT_SIZE: usize = 4;
pub const FRAME_DATA_SIZE: usize = SEGMENT_SIZE * 2;

/// One 4-byte half of a frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Segment([u8; SEGMENT_SIZE]);

assert_eq_size!(Segment, [u8; SEGMENT_SIZE]);

impl Segment {
    pub const fn from_bytes(bytes: [u8; SEGMENT_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_f32(value: f32) -> Self {
        Self(value.to_le_bytes())
    }

    pub fn from_i32(value: i32) -> Self {
        Self(value.to_le_bytes())
    }

    pub const fn bytes(self) -> [u8; SEGMENT_SIZE] {
        self.0
    }

    /// The whole segment as an IEEE-754 single.
    pub fn as_f32(self) -> f32 {
        f32::from_le_bytes(self.0)
    }

    /// The whole segment as a two's-complement 32-bit integer.
    pub fn as_i32(self) -> i32 {
        i32::from_le_bytes(self.0)
    }

    /// The low word (bytes 0 and 1) as a signed 16-bit integer.
    pub fn as_i16(self) -> i16 {
        i16::from_le_bytes([self.0[0], self.0[1]])
    }

    /// A single byte of the segment, `None` past the end.
    pub fn byte(self, index: usize) -> Option<u8> {
        self.0.get(index).copied()
    }
}

/// A raw bus frame as exchanged with the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusFrame {
    pub id: u16,
    pub data: [u8; FRAME_DATA_SIZE],
}

impl BusFrame {
    pub const fn new(id: u16, data: [u8; FRAME_DATA_SIZE]) -> Self {
        Self { id, data }
    }

    pub fn from_segments(id: u16, one: Segment, two: Segment) -> Self {
        let mut data = [0u8; FRAME_DATA_SIZE];
        data[..SEGMENT_SIZE].copy_from_slice(&one.bytes());
        data[SEGMENT_SIZE..].copy_from_slice(&two.bytes());
        Self { id, data }
    }

    pub fn segment_one(&self) -> Segment {
        let mut bytes = [0u8; SEGMENT_SIZE];
        bytes.copy_from_slice(&self.data[..SEGMENT_SIZE]);
        Segment(bytes)
    }

    pub fn segment_two(&self) -> Segment {
        let mut bytes = [0u8; SEGMENT_SIZE];
        bytes.copy_from_slice(&self.data[SEGMENT_SIZE..]);
        Segment(bytes)
    }

    /// A byte addressed by its offset in the full 8-byte payload.
    pub fn byte(&self, offset: usize) -> Option<u8> {
        self.data.get(offset).copied()
    }
}
