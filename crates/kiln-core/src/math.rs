//! Operand layout descriptors for the BLAS/LAPACK-style primitives.
//!
//! All matrices are column-major; element `(i, j)` of an operand with leading
//! dimension `ld` and base offset `off` lives at `off + i + j * ld`.

/// Whether an operand is used as stored or transposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transpose {
    NoTrans,
    Trans,
}

/// Which triangle of a symmetric matrix is referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpLo {
    Upper,
    Lower,
}

/// `C = alpha * op(A) * op(B) + beta * C`, with `op(A)` m×k, `op(B)` k×n.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GemmDesc {
    pub transa: Transpose,
    pub transb: Transpose,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub alpha: f64,
    pub lda: usize,
    pub offset_a: usize,
    pub ldb: usize,
    pub offset_b: usize,
    pub beta: f64,
    pub ldc: usize,
    pub offset_c: usize,
}

impl GemmDesc {
    /// Packed (ld = rows) `C = A * B` with zero offsets.
    pub fn packed(m: usize, n: usize, k: usize) -> Self {
        Self {
            transa: Transpose::NoTrans,
            transb: Transpose::NoTrans,
            m,
            n,
            k,
            alpha: 1.0,
            lda: m.max(1),
            offset_a: 0,
            ldb: k.max(1),
            offset_b: 0,
            beta: 0.0,
            ldc: m.max(1),
            offset_c: 0,
        }
    }
}

/// `C = alpha * A * A^T + beta * C` (NoTrans, A n×k) or
/// `C = alpha * A^T * A + beta * C` (Trans, A k×n); only `uplo` of C is
/// written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyrkDesc {
    pub uplo: UpLo,
    pub trans: Transpose,
    pub n: usize,
    pub k: usize,
    pub alpha: f64,
    pub lda: usize,
    pub offset_a: usize,
    pub beta: f64,
    pub ldc: usize,
    pub offset_c: usize,
}

/// `y = a * x + y` over `n` strided elements.
///
/// Negative increments walk the vector backwards, as in reference BLAS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxpyDesc {
    pub n: usize,
    pub a: f64,
    pub incx: isize,
    pub incy: isize,
}

/// In-place Cholesky factorization of an n×n SPD matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PotrfDesc {
    pub uplo: UpLo,
    pub n: usize,
    pub lda: usize,
}

/// Solve `A X = B` for `ny` right-hand sides given the factor from potrf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PotrsDesc {
    pub uplo: UpLo,
    pub n: usize,
    pub ny: usize,
    pub lda: usize,
    pub ldb: usize,
}

/// Number of elements an operand with `rows`×`cols` logical shape spans,
/// including its offset. Zero-sized operands span nothing.
///
/// `None` if the span does not fit in `usize`.
pub fn operand_extent(offset: usize, rows: usize, cols: usize, ld: usize) -> Option<usize> {
    if rows == 0 || cols == 0 {
        return Some(0);
    }
    (cols - 1).checked_mul(ld)?.checked_add(rows)?.checked_add(offset)
}
