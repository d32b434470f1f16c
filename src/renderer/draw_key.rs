use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

const TRANSPARENCY_BITS: u32 = 4;
const PROGRAM_BITS: u32 = 12;
const MATERIAL_BITS: u32 = 24;
const DEPTH_BITS: u32 = 24;

const PROGRAM_SHIFT: u32 = TRANSPARENCY_BITS;
const MATERIAL_SHIFT: u32 = PROGRAM_SHIFT + PROGRAM_BITS;
const DEPTH_SHIFT: u32 = MATERIAL_SHIFT + MATERIAL_BITS;

const TRANSPARENCY_MASK: u64 = (1 << TRANSPARENCY_BITS) - 1;

/// Exclusive upper bound for program ids.
pub const PROGRAM_ID_LIMIT: u32 = 1 << PROGRAM_BITS;
/// Exclusive upper bound for material ids.
pub const MATERIAL_ID_LIMIT: u32 = 1 << MATERIAL_BITS;
/// Exclusive upper bound for depth ids.
pub const DEPTH_ID_LIMIT: u32 = 1 << DEPTH_BITS;

/// 64-bit packed sort key attached to every queued draw.
///
/// | bits    | field              |
/// |---------|--------------------|
/// | 0..4    | transparency nibble |
/// | 4..16   | program id         |
/// | 16..40  | material id        |
/// | 40..64  | depth id           |
///
/// Opaque keys sort before transparent ones. Opaque keys order by program,
/// material, then depth (front to back); transparent keys order by depth
/// descending (back to front), then program, then material.
///
/// Serializes as the bare `u64`, which is the replay format for draw lists.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DrawKey(u64);

impl DrawKey {
    /// # Panics
    ///
    /// If `program_id`, `material_id` or `depth_id` do not fit their fields.
    pub fn new(transparent: bool, program_id: u32, material_id: u32, depth_id: u32) -> Self {
        assert!(
            program_id < PROGRAM_ID_LIMIT,
            "program id {program_id} exceeds the {PROGRAM_BITS}-bit draw key field"
        );
        assert!(
            material_id < MATERIAL_ID_LIMIT,
            "material id {material_id} exceeds the {MATERIAL_BITS}-bit draw key field"
        );
        assert!(
            depth_id < DEPTH_ID_LIMIT,
            "depth id {depth_id} exceeds the {DEPTH_BITS}-bit draw key field"
        );
        Self::pack(transparent, program_id, material_id, depth_id)
    }

    pub fn checked(
        transparent: bool,
        program_id: u32,
        material_id: u32,
        depth_id: u32,
    ) -> Option<Self> {
        (program_id < PROGRAM_ID_LIMIT
            && material_id < MATERIAL_ID_LIMIT
            && depth_id < DEPTH_ID_LIMIT)
            .then(|| Self::pack(transparent, program_id, material_id, depth_id))
    }

    fn pack(transparent: bool, program_id: u32, material_id: u32, depth_id: u32) -> Self {
        Self(
            u64::from(transparent)
                | u64::from(program_id) << PROGRAM_SHIFT
                | u64::from(material_id) << MATERIAL_SHIFT
                | u64::from(depth_id) << DEPTH_SHIFT,
        )
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    fn transparency(self) -> u64 {
        self.0 & TRANSPARENCY_MASK
    }

    pub fn is_transparent(self) -> bool {
        self.transparency() != 0
    }

    pub fn program_id(self) -> u32 {
        ((self.0 >> PROGRAM_SHIFT) & u64::from(PROGRAM_ID_LIMIT - 1)) as u32
    }

    pub fn material_id(self) -> u32 {
        ((self.0 >> MATERIAL_SHIFT) & u64::from(MATERIAL_ID_LIMIT - 1)) as u32
    }

    pub fn depth_id(self) -> u32 {
        (self.0 >> DEPTH_SHIFT) as u32
    }
}

/// Maps a view distance onto the 24-bit depth field, clamped to `[near, far]`.
pub fn quantize_depth(distance: f32, near: f32, far: f32) -> u32 {
    let range = (far - near).max(f32::EPSILON);
    let t = ((distance - near) / range).clamp(0.0, 1.0);
    (t as f64 * f64::from(DEPTH_ID_LIMIT - 1)).round() as u32
}

impl Ord for DrawKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.transparency()
            .cmp(&other.transparency())
            .then_with(|| {
                if self.is_transparent() {
                    other
                        .depth_id()
                        .cmp(&self.depth_id())
                        .then(self.program_id().cmp(&other.program_id()))
                        .then(self.material_id().cmp(&other.material_id()))
                } else {
                    self.program_id()
                        .cmp(&other.program_id())
                        .then(self.material_id().cmp(&other.material_id()))
                        .then(self.depth_id().cmp(&other.depth_id()))
                }
            })
    }
}

impl PartialOrd for DrawKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for DrawKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawKey")
            .field("transparent", &self.is_transparent())
            .field("program", &self.program_id())
            .field("material", &self.material_id())
            .field("depth", &self.depth_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "program id 4096")]
    fn program_overflow_panics() {
        DrawKey::new(false, PROGRAM_ID_LIMIT, 0, 0);
    }

    #[test]
    #[should_panic(expected = "material id 16777216")]
    fn material_overflow_panics() {
        DrawKey::new(true, 0, MATERIAL_ID_LIMIT, 0);
    }

    #[test]
    fn checked_rejects_out_of_range_fields() {
        assert!(DrawKey::checked(false, 4095, 0, 0).is_some());
        assert!(DrawKey::checked(false, 4096, 0, 0).is_none());
        assert!(DrawKey::checked(false, 0, 0, DEPTH_ID_LIMIT).is_none());
    }

    #[test]
    fn field_layout_matches_bit_positions() {
        let key = DrawKey::new(true, 0xABC, 0x12_3456, 0xFE_DCBA);
        assert_eq!(key.bits(), 0xFEDCBA_123456_ABC_1);
    }

    #[test]
    fn quantized_depth_is_monotonic_and_clamped() {
        assert_eq!(quantize_depth(-5.0, 0.1, 100.0), 0);
        assert_eq!(quantize_depth(500.0, 0.1, 100.0), DEPTH_ID_LIMIT - 1);
        let a = quantize_depth(1.0, 0.1, 100.0);
        let b = quantize_depth(1.1, 0.1, 100.0);
        assert!(a < b);
    }
}
