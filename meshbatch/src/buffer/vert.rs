use std::any::Any;

use super::{VertFormat, Vertex};

/// Type-erased vertex storage
trait VertData: Send + Sync {
    fn len(&self) -> usize;
    fn bytes(&self) -> &[u8];
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Vertex> VertData for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }
    fn bytes(&self) -> &[u8] {
        zerocopy::IntoBytes::as_bytes(self.as_slice())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A vertex buffer: a formatted array of tightly packed vertices
pub struct VertBuf {
    format: &'static VertFormat,
    data: Box<dyn VertData>,
}

impl std::fmt::Debug for VertBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertBuf")
            .field("format", &self.format)
            .field("len", &self.len())
            .finish()
    }
}

impl VertBuf {
    /// Allocates a zero-filled buffer of `len` vertices
    ///
    /// # Panics
    /// If the size of `T` does not match the format's stride
    pub fn new<T: Vertex>(format: &'static VertFormat, len: usize) -> Self {
        Self::from_vec(format, vec![T::new_zeroed(); len])
    }

    /// Wraps existing vertex data
    ///
    /// # Panics
    /// If the size of `T` does not match the format's stride
    pub fn from_vec<T: Vertex>(format: &'static VertFormat, v: Vec<T>) -> Self {
        assert_eq!(
            std::mem::size_of::<T>(),
            format.stride(),
            "vertex type does not match its format"
        );
        Self {
            format,
            data: Box::new(v),
        }
    }

    /// Returns the vertex layout
    pub fn format(&self) -> &'static VertFormat {
        self.format
    }

    /// Number of vertices
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Checks whether the buffer holds no vertices
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the raw bytes, ready for upload
    pub fn as_bytes(&self) -> &[u8] {
        self.data.bytes()
    }

    /// Returns typed vertex data, or `None` if `T` is not the stored type
    pub fn data<T: Vertex>(&self) -> Option<&[T]> {
        self.data
            .as_any()
            .downcast_ref::<Vec<T>>()
            .map(|v| v.as_slice())
    }

    /// Returns mutable typed vertex data
    pub fn data_mut<T: Vertex>(&mut self) -> Option<&mut [T]> {
        self.data
            .as_any_mut()
            .downcast_mut::<Vec<T>>()
            .map(|v| v.as_mut_slice())
    }

    /// Like [`VertBuf::data_mut`], without requiring `T: Vertex`
    pub(crate) fn data_mut_any<T: 'static>(&mut self) -> Option<&mut [T]> {
        self.data
            .as_any_mut()
            .downcast_mut::<Vec<T>>()
            .map(|v| v.as_mut_slice())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::buffer::{Attr, CompType, FetchMode};

    const F: VertFormat = VertFormat::new(&[Attr::new(
        "v",
        CompType::U32,
        1,
        FetchMode::Int,
    )]);

    #[test]
    fn typed_access() {
        let mut b = VertBuf::new::<u32>(&F, 3);
        assert_eq!(b.len(), 3);
        assert_eq!(b.data::<u32>(), Some([0, 0, 0].as_slice()));
        assert!(b.data::<f32>().is_none());
        b.data_mut::<u32>().unwrap()[1] = 0x01020304;
        assert_eq!(b.as_bytes().len(), 12);
        assert_eq!(&b.as_bytes()[4..8], &0x01020304u32.to_ne_bytes());
    }

    #[test]
    #[should_panic]
    fn bad_stride() {
        VertBuf::new::<u16>(&F, 1);
    }
}
