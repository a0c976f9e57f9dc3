//! Kernel launch arguments.

use crate::buffer::UniversalBuffer;
use crate::DType;

/// How a kernel accesses a buffer argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

/// A by-value scalar argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    F32(f32),
    F64(f64),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
}

impl Scalar {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Scalar::F32(v) => v as f64,
            Scalar::F64(v) => v,
            Scalar::I32(v) => v as f64,
            Scalar::U32(v) => v as f64,
            Scalar::I64(v) => v as f64,
            Scalar::U64(v) => v as f64,
        }
    }

    /// Integer view; `None` for floats and negative values.
    pub fn as_usize(&self) -> Option<usize> {
        match *self {
            Scalar::I32(v) => usize::try_from(v).ok(),
            Scalar::U32(v) => Some(v as usize),
            Scalar::I64(v) => usize::try_from(v).ok(),
            Scalar::U64(v) => usize::try_from(v).ok(),
            Scalar::F32(_) | Scalar::F64(_) => None,
        }
    }
}

/// One positional kernel argument.
#[derive(Debug, Clone)]
pub enum KernelArg<M> {
    Buffer { buffer: UniversalBuffer<M>, access: AccessMode },
    Scalar(Scalar),
}

/// Ordered argument list for a launch.
#[derive(Debug, Clone)]
pub struct KernelArguments<M> {
    args: Vec<KernelArg<M>>,
}

impl<M> KernelArguments<M> {
    pub fn new() -> Self {
        Self { args: Vec::new() }
    }

    pub fn with_capacity(n: usize) -> Self {
        Self { args: Vec::with_capacity(n) }
    }

    /// Append a buffer argument.
    pub fn buffer(mut self, buffer: UniversalBuffer<M>, access: AccessMode) -> Self {
        self.args.push(KernelArg::Buffer { buffer, access });
        self
    }

    /// Append a scalar argument.
    pub fn scalar(mut self, value: Scalar) -> Self {
        self.args.push(KernelArg::Scalar(value));
        self
    }

    pub fn push(&mut self, arg: KernelArg<M>) {
        self.args.push(arg);
    }

    pub fn get(&self, index: usize) -> Option<&KernelArg<M>> {
        self.args.get(index)
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KernelArg<M>> {
        self.args.iter()
    }

    /// Element types of all buffer arguments, in order.
    pub fn buffer_dtypes(&self) -> Vec<DType> {
        self.args
            .iter()
            .filter_map(|arg| match arg {
                KernelArg::Buffer { buffer, .. } => Some(buffer.dtype()),
                KernelArg::Scalar(_) => None,
            })
            .collect()
    }
}

impl<M> Default for KernelArguments<M> {
    fn default() -> Self {
        Self::new()
    }
}
