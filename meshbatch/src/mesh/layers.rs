//! Custom per-element attribute layers
use bitflags::bitflags;
use enum_map::EnumMap;

/// Type tag of a custom layer
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, enum_map::Enum)]
pub enum LayerType {
    /// Per-loop texture coordinates and UV-editor selection state
    Uv,
    /// Per-loop linear RGBA color
    Color,
    /// Per-loop custom normal overrides
    CustomNormal,
    /// Per-vertex deform weight
    Weight,
    /// Per-edge subdivision crease, in `[0, 1]`
    Crease,
    /// Per-edge bevel weight, in `[0, 1]`
    BevelWeight,
}

/// Position of a layer within a [`CustomData`] table
///
/// Offsets are only meaningful for the table that produced them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LayerOffset(usize);

impl LayerOffset {
    /// Returns the raw slot index
    pub fn index(self) -> usize {
        self.0
    }
}

bitflags! {
    /// UV-editor state stored alongside each UV coordinate
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct UvFlags: u8 {
        /// Corner is selected in the UV editor
        const SELECT = 1 << 0;
        /// Edge leaving this corner is selected in the UV editor
        const EDGE_SELECT = 1 << 1;
        /// Corner is pinned
        const PIN = 1 << 2;
    }
}

/// A single UV coordinate with its editor flags
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct LoopUv {
    /// Texture coordinate
    pub uv: [f32; 2],
    /// UV-editor state
    pub flag: UvFlags,
}

impl LoopUv {
    /// Builds an unflagged coordinate
    pub fn new(u: f32, v: f32) -> Self {
        Self {
            uv: [u, v],
            flag: UvFlags::empty(),
        }
    }
}

/// Typed storage for one layer
#[derive(Clone, Debug)]
pub enum LayerData {
    /// UV coordinates
    Uv(Vec<LoopUv>),
    /// Linear RGBA colors
    Color(Vec<[f32; 4]>),
    /// Direction vectors; a zero vector means "no override"
    Normal(Vec<[f32; 3]>),
    /// Scalar values (weight, crease, bevel weight)
    Float(Vec<f32>),
}

impl LayerData {
    /// Number of elements in this layer
    pub fn len(&self) -> usize {
        match self {
            LayerData::Uv(v) => v.len(),
            LayerData::Color(v) => v.len(),
            LayerData::Normal(v) => v.len(),
            LayerData::Float(v) => v.len(),
        }
    }

    /// Checks whether the layer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks whether this storage can hold the given layer type
    fn matches(&self, ty: LayerType) -> bool {
        matches!(
            (self, ty),
            (LayerData::Uv(..), LayerType::Uv)
                | (LayerData::Color(..), LayerType::Color)
                | (LayerData::Normal(..), LayerType::CustomNormal)
                | (
                    LayerData::Float(..),
                    LayerType::Weight
                        | LayerType::Crease
                        | LayerType::BevelWeight
                )
        )
    }

    /// Appends a default element (used when editable elements are added)
    pub(crate) fn push_default(&mut self) {
        match self {
            LayerData::Uv(v) => v.push(LoopUv::default()),
            LayerData::Color(v) => v.push([1.0; 4]),
            LayerData::Normal(v) => v.push([0.0; 3]),
            LayerData::Float(v) => v.push(0.0),
        }
    }
}

/// A named, typed layer
#[derive(Clone, Debug)]
pub struct Layer {
    ty: LayerType,
    name: String,
    data: LayerData,
}

impl Layer {
    /// Returns the layer's type tag
    pub fn ty(&self) -> LayerType {
        self.ty
    }
    /// Returns the layer's name
    pub fn name(&self) -> &str {
        &self.name
    }
    /// Returns the layer's storage
    pub fn data(&self) -> &LayerData {
        &self.data
    }
}

/// Table of custom layers for one element domain
#[derive(Clone, Debug, Default)]
pub struct CustomData {
    layers: Vec<Layer>,
    active: EnumMap<LayerType, Option<usize>>,
}

impl CustomData {
    /// Adds a layer, returning its offset
    ///
    /// The first layer of each type becomes the active one.
    ///
    /// # Panics
    /// If `data` cannot store a layer of type `ty`
    pub fn add(
        &mut self,
        ty: LayerType,
        name: &str,
        data: LayerData,
    ) -> LayerOffset {
        assert!(data.matches(ty), "{ty:?} layer cannot hold this data");
        let i = self.layers.len();
        self.layers.push(Layer {
            ty,
            name: name.to_owned(),
            data,
        });
        self.active[ty].get_or_insert(i);
        LayerOffset(i)
    }

    /// Looks up the `n`th layer of the given type
    ///
    /// Returns `None` if there are fewer than `n + 1` such layers.
    pub fn offset(&self, ty: LayerType, n: usize) -> Option<LayerOffset> {
        self.layers
            .iter()
            .enumerate()
            .filter(|(_, l)| l.ty == ty)
            .nth(n)
            .map(|(i, _)| LayerOffset(i))
    }

    /// Returns the active layer of the given type
    pub fn active(&self, ty: LayerType) -> Option<LayerOffset> {
        self.active[ty].map(LayerOffset)
    }

    /// Marks a layer as the active one for its type
    pub fn set_active(&mut self, offset: LayerOffset) {
        let ty = self.layers[offset.0].ty;
        self.active[ty] = Some(offset.0);
    }

    /// Number of layers of the given type
    pub fn count(&self, ty: LayerType) -> usize {
        self.layers.iter().filter(|l| l.ty == ty).count()
    }

    /// Returns the layer at the given offset
    pub fn layer(&self, offset: LayerOffset) -> &Layer {
        &self.layers[offset.0]
    }

    /// Iterates over every layer
    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    /// Returns UV storage, or `None` if the offset holds another type
    pub fn uv(&self, offset: LayerOffset) -> Option<&[LoopUv]> {
        match &self.layers[offset.0].data {
            LayerData::Uv(v) => Some(v),
            _ => None,
        }
    }

    /// Returns mutable UV storage
    pub fn uv_mut(&mut self, offset: LayerOffset) -> Option<&mut [LoopUv]> {
        match &mut self.layers[offset.0].data {
            LayerData::Uv(v) => Some(v),
            _ => None,
        }
    }

    /// Returns color storage
    pub fn color(&self, offset: LayerOffset) -> Option<&[[f32; 4]]> {
        match &self.layers[offset.0].data {
            LayerData::Color(v) => Some(v),
            _ => None,
        }
    }

    /// Returns direction storage
    pub fn normal(&self, offset: LayerOffset) -> Option<&[[f32; 3]]> {
        match &self.layers[offset.0].data {
            LayerData::Normal(v) => Some(v),
            _ => None,
        }
    }

    /// Returns scalar storage
    pub fn float(&self, offset: LayerOffset) -> Option<&[f32]> {
        match &self.layers[offset.0].data {
            LayerData::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Returns mutable scalar storage
    pub fn float_mut(&mut self, offset: LayerOffset) -> Option<&mut [f32]> {
        match &mut self.layers[offset.0].data {
            LayerData::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Extends every layer by one default element
    pub(crate) fn push_default(&mut self) {
        for l in &mut self.layers {
            l.data.push_default();
        }
    }

    /// Builds a table with the same layers, filled by `f(layer)`
    pub(crate) fn remap<F: FnMut(&Layer) -> LayerData>(&self, mut f: F) -> Self {
        Self {
            layers: self
                .layers
                .iter()
                .map(|l| Layer {
                    ty: l.ty,
                    name: l.name.clone(),
                    data: f(l),
                })
                .collect(),
            active: self.active.clone(),
        }
    }
}
