use std::fmt;

use crate::DType;

/// A typed device buffer.
///
/// `M` is the backend's memory handle. Cloning a buffer clones the handle,
/// so clones alias the same device allocation (like `CudaBuffer` sharing its
/// slice through an `Arc`).
#[derive(Clone)]
pub struct UniversalBuffer<M> {
    dtype: DType,
    len: usize,
    memory: M,
}

impl<M> UniversalBuffer<M> {
    pub fn new(dtype: DType, len: usize, memory: M) -> Self {
        Self { dtype, len, memory }
    }

    /// Element type of the buffer.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size in bytes.
    pub fn nbytes(&self) -> usize {
        self.dtype.storage_bytes(self.len)
    }

    /// Backend memory handle.
    pub fn memory(&self) -> &M {
        &self.memory
    }
}

impl<M> fmt::Debug for UniversalBuffer<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniversalBuffer")
            .field("dtype", &self.dtype)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}
