//! Lossy quantization for transform fields.
//!
//! Rotations always travel as a 32-bit "smallest three" quaternion.
//! Vectors use a per-axis scheme: axes within [`MAX_COMPRESSION_VALUE`]
//! are sent as a 16-bit magnitude at 0.01 resolution, the rest as raw
//! `f32`. These are the only lossy steps in the protocol.

use crate::error::Result;
use crate::protocol::{Quaternion, Vector3};
use crate::serialization::ensure_remaining;
use bytes::{Buf, BufMut};

/// Largest absolute axis value that fits the 16-bit quantized form.
pub const MAX_COMPRESSION_VALUE: f32 = 654.0;

/// Quantization step for compressed axes.
pub const COMPRESSION_RESOLUTION: f32 = 0.01;

const QUATERNION_COMPONENT_BITS: u32 = 10;
const QUATERNION_COMPONENT_MASK: u32 = (1 << QUATERNION_COMPONENT_BITS) - 1;
const QUATERNION_COMPONENT_MAX: f32 = QUATERNION_COMPONENT_MASK as f32;
const QUATERNION_SHIFTS: [u32; 3] = [20, 10, 0];

/// Per-axis sign/compression bits written ahead of a compressed vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompressedAxes(u8);

impl CompressedAxes {
    pub const NONE: CompressedAxes = CompressedAxes(0);
    pub const X_POSITIVE: CompressedAxes = CompressedAxes(1);
    pub const X_NEGATIVE: CompressedAxes = CompressedAxes(2);
    pub const Y_POSITIVE: CompressedAxes = CompressedAxes(4);
    pub const Y_NEGATIVE: CompressedAxes = CompressedAxes(8);
    pub const Z_POSITIVE: CompressedAxes = CompressedAxes(16);
    pub const Z_NEGATIVE: CompressedAxes = CompressedAxes(32);

    pub const fn from_bits(bits: u8) -> Self {
        CompressedAxes(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: CompressedAxes) -> bool {
        self.0 & other.0 == other.0
    }

    fn insert(&mut self, other: CompressedAxes) {
        self.0 |= other.0;
    }

    /// Sign of a compressed axis, or `None` if a raw float follows.
    fn sign(self, positive: CompressedAxes, negative: CompressedAxes) -> Option<f32> {
        if self.contains(negative) {
            Some(-1.0)
        } else if self.contains(positive) {
            Some(1.0)
        } else {
            None
        }
    }
}

const AXES: [(CompressedAxes, CompressedAxes); 3] = [
    (CompressedAxes::X_POSITIVE, CompressedAxes::X_NEGATIVE),
    (CompressedAxes::Y_POSITIVE, CompressedAxes::Y_NEGATIVE),
    (CompressedAxes::Z_POSITIVE, CompressedAxes::Z_NEGATIVE),
];

fn quantize_component(value: f32) -> u32 {
    let normalized = (value.clamp(-1.0, 1.0) + 1.0) * 0.5;
    (normalized * QUATERNION_COMPONENT_MAX).round() as u32 & QUATERNION_COMPONENT_MASK
}

fn dequantize_component(bits: u32) -> f32 {
    (bits & QUATERNION_COMPONENT_MASK) as f32 / QUATERNION_COMPONENT_MAX * 2.0 - 1.0
}

/// Packs a rotation into 32 bits: a 2-bit index of the largest component
/// followed by the other three at 10 bits each.
pub fn compress_quaternion(rotation: Quaternion) -> u32 {
    let components = rotation.normalized().to_array();

    let mut largest = 0;
    for i in 1..4 {
        if components[i].abs() > components[largest].abs() {
            largest = i;
        }
    }

    // q and -q describe the same rotation; keep the dropped component positive.
    let sign = if components[largest] < 0.0 { -1.0 } else { 1.0 };

    let mut packed = (largest as u32) << 30;
    let mut slot = 0;
    for (i, component) in components.iter().enumerate() {
        if i == largest {
            continue;
        }
        packed |= quantize_component(component * sign) << QUATERNION_SHIFTS[slot];
        slot += 1;
    }

    packed
}

pub fn decompress_quaternion(packed: u32) -> Quaternion {
    let largest = (packed >> 30) as usize;

    let mut components = [0.0f32; 4];
    let mut sum_squares = 0.0;
    let mut slot = 0;
    for (i, component) in components.iter_mut().enumerate() {
        if i == largest {
            continue;
        }
        let value = dequantize_component(packed >> QUATERNION_SHIFTS[slot]);
        sum_squares += value * value;
        *component = value;
        slot += 1;
    }

    components[largest] = (1.0 - sum_squares).max(0.0).sqrt();

    Quaternion::from_array(components).normalized()
}

/// Returns true if at least one axis would benefit from small-value compression.
pub fn can_compress_vector3(v: &Vector3) -> bool {
    let inside = |axis: f32| axis > -MAX_COMPRESSION_VALUE && axis < MAX_COMPRESSION_VALUE;
    inside(v.x) || inside(v.y) || inside(v.z)
}

pub fn write_compressed_vector3<B: BufMut>(buf: &mut B, v: Vector3) {
    let values = [v.x, v.y, v.z];

    let mut axes = CompressedAxes::NONE;
    for (value, (positive, negative)) in values.iter().zip(AXES) {
        if value.abs() <= MAX_COMPRESSION_VALUE {
            axes.insert(if *value >= 0.0 { positive } else { negative });
        }
    }

    buf.put_u8(axes.bits());

    for (value, (positive, negative)) in values.iter().zip(AXES) {
        if axes.sign(positive, negative).is_some() {
            buf.put_u16_le((value.abs() * 100.0).round() as u16);
        } else {
            buf.put_f32_le(*value);
        }
    }
}

pub fn read_compressed_vector3<B: Buf>(buf: &mut B) -> Result<Vector3> {
    ensure_remaining(buf, 1)?;
    let axes = CompressedAxes::from_bits(buf.get_u8());

    let mut values = [0.0f32; 3];
    for (value, (positive, negative)) in values.iter_mut().zip(AXES) {
        *value = match axes.sign(positive, negative) {
            Some(sign) => {
                ensure_remaining(buf, 2)?;
                (buf.get_u16_le() as f32 / 100.0) * sign
            }
            None => {
                ensure_remaining(buf, 4)?;
                buf.get_f32_le()
            }
        };
    }

    Ok(Vector3::new(values[0], values[1], values[2]))
}

/// Encoded size of a compressed vector.
pub fn compressed_vector3_len(v: &Vector3) -> usize {
    1 + [v.x, v.y, v.z]
        .iter()
        .map(|axis| if axis.abs() <= MAX_COMPRESSION_VALUE { 2 } else { 4 })
        .sum::<usize>()
}
