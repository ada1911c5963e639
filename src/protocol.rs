use serde::{Deserialize, Serialize};
use std::fmt;

pub type EntityId = u32;
pub type ComponentIndex = u8;
pub type SequenceId = u16;

/// Opaque handle for a remote connection, assigned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Channel {
    Reliable = 0,
    Unreliable = 1,
}

impl Channel {
    pub fn from_reliable(reliable: bool) -> Self {
        if reliable {
            Channel::Reliable
        } else {
            Channel::Unreliable
        }
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn is_reliable(self) -> bool {
        self == Channel::Reliable
    }
}

/// Where an outgoing record is headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Destination {
    /// Client to server.
    Server,
    /// Server to every connected client.
    All,
    /// Server to one observing client.
    Peer(PeerId),
}

/// Bitset describing which fields a record carries and how they are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SyncFlags(u8);

impl SyncFlags {
    pub const NONE: SyncFlags = SyncFlags(0);
    pub const POSITION: SyncFlags = SyncFlags(1);
    pub const ROTATION: SyncFlags = SyncFlags(2);
    pub const SCALE: SyncFlags = SyncFlags(4);
    /// Transform did not move. Carries no payload.
    pub const SETTLED: SyncFlags = SyncFlags(8);
    pub const PLATFORM: SyncFlags = SyncFlags(16);
    pub const COMPRESS_SMALL: SyncFlags = SyncFlags(32);
    pub const ID1: SyncFlags = SyncFlags(64);
    pub const ID2: SyncFlags = SyncFlags(128);

    pub const fn from_bits(bits: u8) -> Self {
        SyncFlags(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: SyncFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: SyncFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: SyncFlags) {
        self.0 &= !other.0;
    }

    pub fn set(&mut self, other: SyncFlags, enabled: bool) {
        if enabled {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }

    /// Flags for the narrowest entity id width that holds `entity_id` losslessly.
    pub fn id_width_for(entity_id: EntityId) -> SyncFlags {
        if entity_id <= u8::MAX as u32 {
            SyncFlags::ID1
        } else if entity_id <= u16::MAX as u32 {
            SyncFlags::ID2
        } else {
            SyncFlags::NONE
        }
    }

    /// Wire width of the entity id in bytes.
    pub fn id_width(self) -> usize {
        if self.contains(SyncFlags::ID1) {
            1
        } else if self.contains(SyncFlags::ID2) {
            2
        } else {
            4
        }
    }
}

impl std::ops::BitOr for SyncFlags {
    type Output = SyncFlags;

    fn bitor(self, rhs: SyncFlags) -> SyncFlags {
        SyncFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for SyncFlags {
    fn bitor_assign(&mut self, rhs: SyncFlags) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Vector3 = Vector3 { x: 1.0, y: 1.0, z: 1.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Rotation of `angle` radians around a unit `axis`.
    pub fn from_axis_angle(axis: Vector3, angle: f32) -> Self {
        let (sin, cos) = (angle * 0.5).sin_cos();
        Self::new(axis.x * sin, axis.y * sin, axis.z * sin, cos)
    }

    pub fn dot(&self, other: &Quaternion) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    pub fn length(&self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn normalized(&self) -> Quaternion {
        let len = self.length();
        if len <= f32::EPSILON {
            return Quaternion::IDENTITY;
        }
        Quaternion::new(self.x / len, self.y / len, self.z / len, self.w / len)
    }

    /// Angle in degrees between the rotations described by two quaternions.
    pub fn angle_to(&self, other: &Quaternion) -> f32 {
        let dot = self.normalized().dot(&other.normalized()).abs().min(1.0);
        (2.0 * dot.acos()).to_degrees()
    }

    pub(crate) fn to_array(self) -> [f32; 4] {
        [self.x, self.y, self.z, self.w]
    }

    pub(crate) fn from_array(c: [f32; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Quaternion::IDENTITY
    }
}

/// One entity's transform snapshot for one tick.
///
/// The flags and the optional fields are kept in step by the builder
/// methods; `set_flags` gives raw control for callers that need it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub(crate) flags: SyncFlags,
    pub entity_id: EntityId,
    pub component_index: ComponentIndex,
    pub position: Option<Vector3>,
    pub rotation: Option<Quaternion>,
    pub scale: Option<Vector3>,
    pub platform_id: Option<u32>,
}

impl SyncRecord {
    pub fn new(entity_id: EntityId, component_index: ComponentIndex) -> Self {
        Self {
            flags: SyncFlags::id_width_for(entity_id),
            entity_id,
            component_index,
            position: None,
            rotation: None,
            scale: None,
            platform_id: None,
        }
    }

    pub fn with_position(mut self, position: Vector3) -> Self {
        self.flags.insert(SyncFlags::POSITION);
        self.position = Some(position);
        self
    }

    pub fn with_rotation(mut self, rotation: Quaternion) -> Self {
        self.flags.insert(SyncFlags::ROTATION);
        self.rotation = Some(rotation);
        self
    }

    pub fn with_scale(mut self, scale: Vector3) -> Self {
        self.flags.insert(SyncFlags::SCALE);
        self.scale = Some(scale);
        self
    }

    pub fn with_platform(mut self, platform_id: u32) -> Self {
        self.flags.insert(SyncFlags::PLATFORM);
        self.platform_id = Some(platform_id);
        self
    }

    /// Quantize position and scale on the wire.
    pub fn compressed(mut self) -> Self {
        self.flags.insert(SyncFlags::COMPRESS_SMALL);
        self
    }

    pub fn settled(mut self) -> Self {
        self.flags.insert(SyncFlags::SETTLED);
        self
    }

    pub fn flags(&self) -> SyncFlags {
        self.flags
    }

    /// Raw flag control. A field flagged here but left `None` is sent as
    /// its default value.
    pub fn set_flags(&mut self, flags: SyncFlags) {
        self.flags = flags;
    }

    pub fn is_settled(&self) -> bool {
        self.flags.contains(SyncFlags::SETTLED)
    }
}

/// A bundle of records sharing one sequence id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sequence_id: SequenceId,
    pub records: Vec<SyncRecord>,
}

impl Message {
    pub fn new(sequence_id: SequenceId, records: Vec<SyncRecord>) -> Self {
        Self { sequence_id, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
