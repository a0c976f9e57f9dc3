use std::fmt;

use serde::{Deserialize, Serialize};

/// Element types a device buffer can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit IEEE 754 single-precision float
    F32,
    /// 64-bit IEEE 754 double-precision float
    F64,
    /// 32-bit signed integer
    I32,
    /// 32-bit unsigned integer
    U32,
    /// 64-bit signed integer
    I64,
    /// 8-bit unsigned integer
    U8,
}

impl DType {
    /// Size in bytes of a single element.
    pub fn element_size(&self) -> usize {
        match self {
            DType::F32 | DType::I32 | DType::U32 => 4,
            DType::F64 | DType::I64 => 8,
            DType::U8 => 1,
        }
    }

    /// Number of bytes needed to store `n` elements of this dtype.
    pub fn storage_bytes(&self, n: usize) -> usize {
        self.element_size() * n
    }

    /// Whether this dtype is a floating-point type.
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::F64 => write!(f, "f64"),
            DType::I32 => write!(f, "i32"),
            DType::U32 => write!(f, "u32"),
            DType::I64 => write!(f, "i64"),
            DType::U8 => write!(f, "u8"),
        }
    }
}

// ============================================================================
// Typed host storage
// ============================================================================

/// A host vector tagged with its element type.
///
/// Used as the staging format for host transfers and as the backing store of
/// the host reference queue.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedVec {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
}

macro_rules! each_variant {
    ($value:expr, $v:ident => $body:expr) => {
        match $value {
            TypedVec::F32($v) => $body,
            TypedVec::F64($v) => $body,
            TypedVec::I32($v) => $body,
            TypedVec::U32($v) => $body,
            TypedVec::I64($v) => $body,
            TypedVec::U8($v) => $body,
        }
    };
}

impl TypedVec {
    /// Zero-initialized storage for `len` elements of `dtype`.
    ///
    /// Returns `None` if the allocation cannot be made.
    pub fn try_zeros(dtype: DType, len: usize) -> Option<Self> {
        Some(match dtype {
            DType::F32 => TypedVec::F32(try_zeroed(len)?),
            DType::F64 => TypedVec::F64(try_zeroed(len)?),
            DType::I32 => TypedVec::I32(try_zeroed(len)?),
            DType::U32 => TypedVec::U32(try_zeroed(len)?),
            DType::I64 => TypedVec::I64(try_zeroed(len)?),
            DType::U8 => TypedVec::U8(try_zeroed(len)?),
        })
    }

    pub fn dtype(&self) -> DType {
        match self {
            TypedVec::F32(_) => DType::F32,
            TypedVec::F64(_) => DType::F64,
            TypedVec::I32(_) => DType::I32,
            TypedVec::U32(_) => DType::U32,
            TypedVec::I64(_) => DType::I64,
            TypedVec::U8(_) => DType::U8,
        }
    }

    pub fn len(&self) -> usize {
        each_variant!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set every element to `value`, converted with `as` semantics
    /// (saturating for integer types).
    pub fn fill(&mut self, value: f64) {
        each_variant!(self, v => {
            let x = Element::from_f64(value);
            v.iter_mut().for_each(|slot| *slot = x);
        })
    }

    /// Copy `count` elements from `src[src_offset..]` into `self[dst_offset..]`.
    ///
    /// Returns `false` without touching `self` if the dtypes differ or either
    /// range is out of bounds.
    pub fn copy_from(&mut self, dst_offset: usize, src: &TypedVec, src_offset: usize, count: usize) -> bool {
        if self.dtype() != src.dtype()
            || !in_bounds(dst_offset, count, self.len())
            || !in_bounds(src_offset, count, src.len())
        {
            return false;
        }
        match (self, src) {
            (TypedVec::F32(d), TypedVec::F32(s)) => d[dst_offset..dst_offset + count].copy_from_slice(&s[src_offset..src_offset + count]),
            (TypedVec::F64(d), TypedVec::F64(s)) => d[dst_offset..dst_offset + count].copy_from_slice(&s[src_offset..src_offset + count]),
            (TypedVec::I32(d), TypedVec::I32(s)) => d[dst_offset..dst_offset + count].copy_from_slice(&s[src_offset..src_offset + count]),
            (TypedVec::U32(d), TypedVec::U32(s)) => d[dst_offset..dst_offset + count].copy_from_slice(&s[src_offset..src_offset + count]),
            (TypedVec::I64(d), TypedVec::I64(s)) => d[dst_offset..dst_offset + count].copy_from_slice(&s[src_offset..src_offset + count]),
            (TypedVec::U8(d), TypedVec::U8(s)) => d[dst_offset..dst_offset + count].copy_from_slice(&s[src_offset..src_offset + count]),
            _ => return false,
        }
        true
    }

    /// Owned copy of `count` elements starting at `offset`.
    pub fn slice(&self, offset: usize, count: usize) -> Option<TypedVec> {
        if !in_bounds(offset, count, self.len()) {
            return None;
        }
        Some(match self {
            TypedVec::F32(v) => TypedVec::F32(v[offset..offset + count].to_vec()),
            TypedVec::F64(v) => TypedVec::F64(v[offset..offset + count].to_vec()),
            TypedVec::I32(v) => TypedVec::I32(v[offset..offset + count].to_vec()),
            TypedVec::U32(v) => TypedVec::U32(v[offset..offset + count].to_vec()),
            TypedVec::I64(v) => TypedVec::I64(v[offset..offset + count].to_vec()),
            TypedVec::U8(v) => TypedVec::U8(v[offset..offset + count].to_vec()),
        })
    }

    /// Overlap-safe copy inside one vector.
    pub fn copy_within(&mut self, src_offset: usize, dst_offset: usize, count: usize) -> bool {
        let len = self.len();
        if !in_bounds(src_offset, count, len) || !in_bounds(dst_offset, count, len) {
            return false;
        }
        each_variant!(self, v => v.copy_within(src_offset..src_offset + count, dst_offset));
        true
    }

    /// Widen the whole vector to f64 (math staging).
    pub fn to_f64_vec(&self) -> Vec<f64> {
        each_variant!(self, v => v.iter().map(|x| x.to_f64()).collect())
    }

    /// Narrow `values` back into `self` starting at element 0.
    ///
    /// `values.len()` must equal `self.len()`.
    pub fn store_f64(&mut self, values: &[f64]) {
        debug_assert_eq!(values.len(), self.len());
        each_variant!(self, v => {
            for (slot, x) in v.iter_mut().zip(values) {
                *slot = Element::from_f64(*x);
            }
        })
    }
}

fn try_zeroed<T: Element>(len: usize) -> Option<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).ok()?;
    v.resize(len, T::from_f64(0.0));
    Some(v)
}

fn in_bounds(offset: usize, count: usize, len: usize) -> bool {
    offset.checked_add(count).map_or(false, |end| end <= len)
}

// ============================================================================
// Element trait
// ============================================================================

/// Rust scalar types that map onto a [`DType`].
pub trait Element: Copy + Send + Sync + PartialEq + fmt::Debug + 'static {
    const DTYPE: DType;

    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;

    /// Wrap an owned vector in its tagged form.
    fn into_typed(values: Vec<Self>) -> TypedVec;
    /// Borrow the elements if `data` holds this type.
    fn view(data: &TypedVec) -> Option<&[Self]>;
    /// Mutably borrow the elements if `data` holds this type.
    fn view_mut(data: &mut TypedVec) -> Option<&mut [Self]>;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const DTYPE: DType = DType::$variant;

            #[inline]
            fn from_f64(value: f64) -> Self {
                value as $ty
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            fn into_typed(values: Vec<Self>) -> TypedVec {
                TypedVec::$variant(values)
            }

            fn view(data: &TypedVec) -> Option<&[Self]> {
                match data {
                    TypedVec::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn view_mut(data: &mut TypedVec) -> Option<&mut [Self]> {
                match data {
                    TypedVec::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_element!(f32, F32);
impl_element!(f64, F64);
impl_element!(i32, I32);
impl_element!(u32, U32);
impl_element!(i64, I64);
impl_element!(u8, U8);
