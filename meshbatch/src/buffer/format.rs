//! Vertex layouts and packed attribute types
//!
//! Layouts are `const` data: every format is built at compile time and shared
//! by reference, so there is no lazily-initialized global state.
use nalgebra::Vector3;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Component type of an attribute
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompType {
    /// 32-bit float
    F32,
    /// 32-bit unsigned integer
    U32,
    /// 16-bit signed integer
    I16,
    /// 16-bit unsigned integer
    U16,
    /// 8-bit unsigned integer
    U8,
    /// Four components packed as 10-10-10-2 bits into one 32-bit word
    I10,
}

/// How the GPU converts stored components into shader inputs
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FetchMode {
    /// Floats are read as-is
    Float,
    /// Integers are normalized into `[0, 1]` or `[-1, 1]`
    IntToFloatUnit,
    /// Integers are converted to floats without normalization
    IntToFloat,
    /// Integers stay integers
    Int,
}

/// A single vertex attribute
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Attr {
    /// Attribute name
    pub name: &'static str,
    /// Component type
    pub comp: CompType,
    /// Number of components
    pub len: u32,
    /// Conversion mode
    pub fetch: FetchMode,
}

impl Attr {
    /// Builds an attribute
    pub const fn new(
        name: &'static str,
        comp: CompType,
        len: u32,
        fetch: FetchMode,
    ) -> Self {
        Self {
            name,
            comp,
            len,
            fetch,
        }
    }

    /// Size of this attribute in bytes
    pub const fn size(&self) -> usize {
        let comp = match self.comp {
            CompType::F32 | CompType::U32 => 4,
            CompType::I16 | CompType::U16 => 2,
            CompType::U8 => 1,
            CompType::I10 => return 4,
        };
        comp * self.len as usize
    }
}

/// Interleaved per-vertex layout
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VertFormat {
    /// Attributes, in memory order
    pub attrs: &'static [Attr],
}

impl VertFormat {
    /// Builds a format from its attributes
    pub const fn new(attrs: &'static [Attr]) -> Self {
        Self { attrs }
    }

    /// Size of one vertex in bytes
    pub const fn stride(&self) -> usize {
        let mut i = 0;
        let mut out = 0;
        while i < self.attrs.len() {
            out += self.attrs[i].size();
            i += 1;
        }
        out
    }

    /// Looks up an attribute by name
    pub fn attr(&self, name: &str) -> Option<&Attr> {
        self.attrs.iter().find(|a| a.name == name)
    }
}

/// Scale used when packing unit floats into 10-bit signed components
const SNORM10_MAX: f32 = 511.0;

/// Scale used when packing unit floats into 16-bit signed components
const SNORM16_MAX: f32 = 32767.0;

/// A normal packed into 10-10-10-2 bits, with a small signed flag in `w`
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
)]
#[repr(transparent)]
pub struct PackedNormal(u32);

impl PackedNormal {
    /// Packs a unit vector and a flag in `-2..=1`
    pub fn new(n: Vector3<f32>, w: i32) -> Self {
        debug_assert!((-2..=1).contains(&w));
        let pack = |f: f32| {
            let i = (f.clamp(-1.0, 1.0) * SNORM10_MAX).round() as i32;
            (i as u32) & 0x3FF
        };
        Self(
            pack(n.x)
                | (pack(n.y) << 10)
                | (pack(n.z) << 20)
                | (((w as u32) & 0x3) << 30),
        )
    }

    /// Unpacks the vector and flag
    pub fn unpack(self) -> (Vector3<f32>, i32) {
        // Sign-extend a field of `bits` bits found at `shift`
        let field = |shift: u32, bits: u32| {
            ((self.0 << (32 - shift - bits)) as i32) >> (32 - bits)
        };
        let v = Vector3::new(
            field(0, 10) as f32,
            field(10, 10) as f32,
            field(20, 10) as f32,
        ) / SNORM10_MAX;
        (v, field(30, 2))
    }
}

/// A normal stored as four 16-bit signed components, `w` holding a flag
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
)]
#[repr(C)]
pub struct ShortNormal(pub [i16; 4]);

impl ShortNormal {
    /// Packs a unit vector and a flag
    pub fn new(n: Vector3<f32>, w: i32) -> Self {
        let pack = |f: f32| (f.clamp(-1.0, 1.0) * SNORM16_MAX).round() as i16;
        Self([pack(n.x), pack(n.y), pack(n.z), w as i16])
    }

    /// Unpacks the vector and flag
    pub fn unpack(self) -> (Vector3<f32>, i32) {
        let [x, y, z, w] = self.0;
        (
            Vector3::new(x as f32, y as f32, z as f32) / SNORM16_MAX,
            w as i32,
        )
    }
}

/// Normal storage used by buffers with a selectable precision
pub trait GpuNormal: super::Vertex {
    /// Whether this is the high-precision variant
    const HQ: bool;
    /// Layout of a buffer holding only this normal
    const FORMAT: &'static VertFormat;
    /// Layout of a tangent buffer, with handedness in `w`
    const TAN_FORMAT: &'static VertFormat;
    /// Packs a normal and flag
    fn pack(n: Vector3<f32>, w: i32) -> Self;
}

impl GpuNormal for PackedNormal {
    const HQ: bool = false;
    const FORMAT: &'static VertFormat = &VertFormat::new(&[Attr::new(
        "nor",
        CompType::I10,
        4,
        FetchMode::IntToFloatUnit,
    )]);
    const TAN_FORMAT: &'static VertFormat = &VertFormat::new(&[Attr::new(
        "tan",
        CompType::I10,
        4,
        FetchMode::IntToFloatUnit,
    )]);
    fn pack(n: Vector3<f32>, w: i32) -> Self {
        Self::new(n, w)
    }
}

impl GpuNormal for ShortNormal {
    const HQ: bool = true;
    const FORMAT: &'static VertFormat = &VertFormat::new(&[Attr::new(
        "nor",
        CompType::I16,
        4,
        FetchMode::IntToFloatUnit,
    )]);
    const TAN_FORMAT: &'static VertFormat = &VertFormat::new(&[Attr::new(
        "tan",
        CompType::I16,
        4,
        FetchMode::IntToFloatUnit,
    )]);
    fn pack(n: Vector3<f32>, w: i32) -> Self {
        Self::new(n, w)
    }
}

static_assertions::const_assert_eq!(
    std::mem::size_of::<PackedNormal>(),
    PackedNormal::FORMAT.stride()
);
static_assertions::const_assert_eq!(
    std::mem::size_of::<ShortNormal>(),
    ShortNormal::FORMAT.stride()
);

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn packed_normal() {
        for (n, w) in [
            (Vector3::new(0.0, 0.0, 1.0), 0),
            (Vector3::new(-1.0, 0.0, 0.0), -1),
            (Vector3::new(0.6, -0.8, 0.0), 1),
            (Vector3::new(0.0, 0.0, -1.0), -2),
        ] {
            let (m, v) = PackedNormal::new(n, w).unpack();
            assert_relative_eq!(m, n, epsilon = 1.0 / SNORM10_MAX);
            assert_eq!(v, w);
        }
    }

    #[test]
    fn short_normal() {
        let n = Vector3::new(0.0, 0.6, -0.8);
        let (m, w) = ShortNormal::new(n, -1).unpack();
        assert_relative_eq!(m, n, epsilon = 1.0 / SNORM16_MAX);
        assert_eq!(w, -1);
    }

    #[test]
    fn stride() {
        const F: VertFormat = VertFormat::new(&[
            Attr::new("pos", CompType::F32, 3, FetchMode::Float),
            Attr::new("nor", CompType::I10, 4, FetchMode::IntToFloatUnit),
            Attr::new("flag", CompType::U8, 4, FetchMode::Int),
        ]);
        assert_eq!(F.stride(), 20);
        assert_eq!(F.attr("nor").map(|a| a.size()), Some(4));
        assert!(F.attr("uv").is_none());
    }
}
