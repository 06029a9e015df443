use std::hash::{Hash, Hasher};

use lucent_geom::{Aabb, Vec3};

/// Number of steps per axis used when snapping unaligned normals onto the
/// surface of a unit cube. Coarser quantization merges near-identical normals
/// so they share one trigger list.
pub const QUANTIZATION_FACTOR: i32 = 4;

/// Extents are shrunk by this amount on the non-normal axes so epsilon
/// offsets applied by fluid meshing cannot manufacture false intersections.
pub const QUANTIZE_EPSILON: f32 = 1.0 / 256.0;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Facing {
    PosX = 0,
    PosY = 1,
    PosZ = 2,
    NegX = 3,
    NegY = 4,
    NegZ = 5,
    Unaligned = 6,
}

/// Count of aligned directions.
pub const DIRECTIONS: usize = 6;
/// Count of facing slots including the unaligned bucket.
pub const FACING_COUNT: usize = 7;

/// Aligned-facing bitmaps holding exactly one opposing pair.
pub const OPPOSING_X: u32 = (1 << Facing::PosX as u32) | (1 << Facing::NegX as u32);
pub const OPPOSING_Y: u32 = (1 << Facing::PosY as u32) | (1 << Facing::NegY as u32);
pub const OPPOSING_Z: u32 = (1 << Facing::PosZ as u32) | (1 << Facing::NegZ as u32);

impl Facing {
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Converts a facing index `[0..7)` back into a `Facing` value.
    #[inline]
    pub fn from_index(i: usize) -> Facing {
        match i {
            0 => Facing::PosX,
            1 => Facing::PosY,
            2 => Facing::PosZ,
            3 => Facing::NegX,
            4 => Facing::NegY,
            5 => Facing::NegZ,
            _ => Facing::Unaligned,
        }
    }

    #[inline]
    pub fn is_aligned(self) -> bool {
        self != Facing::Unaligned
    }

    /// +1 for positive directions, -1 for negative, 0 for unaligned.
    #[inline]
    pub fn sign(self) -> i32 {
        match self {
            Facing::PosX | Facing::PosY | Facing::PosZ => 1,
            Facing::NegX | Facing::NegY | Facing::NegZ => -1,
            Facing::Unaligned => 0,
        }
    }

    /// Axis index for aligned facings (x=0, y=1, z=2).
    #[inline]
    pub fn axis(self) -> usize {
        self.index() % 3
    }

    #[inline]
    pub fn opposite(self) -> Facing {
        match self {
            Facing::PosX => Facing::NegX,
            Facing::PosY => Facing::NegY,
            Facing::PosZ => Facing::NegZ,
            Facing::NegX => Facing::PosX,
            Facing::NegY => Facing::PosY,
            Facing::NegZ => Facing::PosZ,
            Facing::Unaligned => Facing::Unaligned,
        }
    }

    /// Returns the unit-normal vector for an aligned facing, zero for unaligned.
    #[inline]
    pub fn normal(self) -> Vec3 {
        match self {
            Facing::PosX => Vec3 {
                x: 1.0,
                y: 0.0,
                z: 0.0,
            },
            Facing::PosY => Vec3 {
                x: 0.0,
                y: 1.0,
                z: 0.0,
            },
            Facing::PosZ => Vec3 {
                x: 0.0,
                y: 0.0,
                z: 1.0,
            },
            Facing::NegX => Vec3 {
                x: -1.0,
                y: 0.0,
                z: 0.0,
            },
            Facing::NegY => Vec3 {
                x: 0.0,
                y: -1.0,
                z: 0.0,
            },
            Facing::NegZ => Vec3 {
                x: 0.0,
                y: 0.0,
                z: -1.0,
            },
            Facing::Unaligned => Vec3::ZERO,
        }
    }

    /// Classifies a unit normal as one of the aligned facings, or unaligned.
    pub fn from_normal(n: Vec3) -> Facing {
        const ONE_EPS: f32 = 1.0e-5;
        if (n.x - 1.0).abs() <= ONE_EPS {
            Facing::PosX
        } else if (n.x + 1.0).abs() <= ONE_EPS {
            Facing::NegX
        } else if (n.y - 1.0).abs() <= ONE_EPS {
            Facing::PosY
        } else if (n.y + 1.0).abs() <= ONE_EPS {
            Facing::NegY
        } else if (n.z - 1.0).abs() <= ONE_EPS {
            Facing::PosZ
        } else if (n.z + 1.0).abs() <= ONE_EPS {
            Facing::NegZ
        } else {
            Facing::Unaligned
        }
    }
}

/// A normal direction snapped to the quantization grid. Used as the key for
/// per-normal maps; exact opposites negate component-wise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QuantizedNormal {
    pub x: i8,
    pub y: i8,
    pub z: i8,
}

impl QuantizedNormal {
    /// Snaps a non-zero normal onto the quantization grid: the dominant
    /// component is scaled to `QUANTIZATION_FACTOR`, the others rounded.
    pub fn from_vec(n: Vec3) -> Self {
        let ax = n.x.abs();
        let ay = n.y.abs();
        let az = n.z.abs();
        let largest = ax.max(ay).max(az);
        debug_assert!(largest > 0.0, "cannot quantize a zero normal");
        let scale = QUANTIZATION_FACTOR as f32 / largest;
        Self {
            x: (n.x * scale).round() as i8,
            y: (n.y * scale).round() as i8,
            z: (n.z * scale).round() as i8,
        }
    }

    #[inline]
    pub fn from_facing(facing: Facing) -> Self {
        debug_assert!(facing.is_aligned());
        Self::from_vec(facing.normal())
    }

    #[inline]
    pub fn opposite(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }

    #[inline]
    pub fn is_opposite(self, other: Self) -> bool {
        self.opposite() == other
    }
}

/// A translucent face collected for sorting. Immutable once created.
///
/// `extents` holds per-axis bounds in the order posX, posY, posZ (maxima)
/// then negX, negY, negZ (minima), matching the aligned facing order.
#[derive(Clone, Debug)]
pub struct Quad {
    pub facing: Facing,
    pub extents: [f32; 6],
    pub normal: Vec3,
    pub quantized: QuantizedNormal,
    pub dot_product: f32,
    pub center: Vec3,
}

impl Quad {
    pub fn from_aligned(facing: Facing, extents: [f32; 6]) -> Self {
        debug_assert!(facing.is_aligned());
        let dot_product = facing.sign() as f32 * extents[facing.index()];
        let center = Vec3 {
            x: (extents[0] + extents[3]) * 0.5,
            y: (extents[1] + extents[4]) * 0.5,
            z: (extents[2] + extents[5]) * 0.5,
        };
        Self {
            facing,
            extents,
            normal: facing.normal(),
            quantized: QuantizedNormal::from_facing(facing),
            dot_product,
            center,
        }
    }

    pub fn from_unaligned(extents: [f32; 6], center: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalized();
        Self {
            facing: Facing::Unaligned,
            extents,
            normal,
            quantized: QuantizedNormal::from_vec(normal),
            dot_product: normal.dot(center),
            center,
        }
    }

    #[inline]
    pub fn aabb(&self) -> Aabb {
        Aabb {
            min: Vec3 {
                x: self.extents[3],
                y: self.extents[4],
                z: self.extents[5],
            },
            max: Vec3 {
                x: self.extents[0],
                y: self.extents[1],
                z: self.extents[2],
            },
        }
    }

    /// Signed extent of this quad's box along an arbitrary direction.
    pub fn dot_interval(&self, n: Vec3) -> (f32, f32) {
        let bb = self.aabb();
        let mut lo = 0.0f32;
        let mut hi = 0.0f32;
        for axis in 0..3 {
            let c = n.component(axis);
            let (a, b) = (bb.min.component(axis), bb.max.component(axis));
            if c >= 0.0 {
                lo += c * a;
                hi += c * b;
            } else {
                lo += c * b;
                hi += c * a;
            }
        }
        (lo, hi)
    }

    /// Order-independent content hash used for data reuse and BSP node reuse.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = std::hash::DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl Hash for Quad {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.facing.hash(state);
        for e in self.extents {
            e.to_bits().hash(state);
        }
        self.quantized.hash(state);
        self.dot_product.to_bits().hash(state);
        self.center.x.to_bits().hash(state);
        self.center.y.to_bits().hash(state);
        self.center.z.to_bits().hash(state);
    }
}
