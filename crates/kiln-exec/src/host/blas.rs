//! Level 1-3 BLAS executors for the host queue.
//!
//! Operands are staged to f64, computed, and narrowed back into the output
//! buffer. Staging takes each read lock only for the copy, so aliased
//! operands never deadlock.

use rayon::prelude::*;

use kiln_core::{
    codes, math::operand_extent, AxpyDesc, GemmDesc, QueueFault, SyrkDesc, Transpose, UniversalBuffer,
    UpLo,
};

use super::memory::HostMemory;

pub(crate) type HostBuffer = UniversalBuffer<HostMemory>;

/// Minimum output columns before GEMM goes parallel.
const PAR_COL_THRESHOLD: usize = 16;

// ============================================================================
// Shared operand checks
// ============================================================================

pub(crate) fn require_float(op: &str, buffers: &[&HostBuffer]) -> Result<(), QueueFault> {
    let first = buffers[0].dtype();
    for buf in buffers {
        if !buf.dtype().is_float() {
            return Err(QueueFault::new(
                codes::UNSUPPORTED_TYPE,
                format!("{}: element type {} is not supported", op, buf.dtype()),
            ));
        }
        if buf.dtype() != first {
            return Err(QueueFault::new(
                codes::INVALID_ARG_VALUE,
                format!("{}: mixed element types {} and {}", op, first, buf.dtype()),
            ));
        }
    }
    Ok(())
}

pub(crate) fn require_ld(op: &str, name: &str, ld: usize, rows: usize) -> Result<(), QueueFault> {
    if ld < rows.max(1) {
        return Err(QueueFault::new(
            codes::INVALID_VALUE,
            format!("{}: {} = {} is smaller than {} rows", op, name, ld, rows),
        ));
    }
    Ok(())
}

/// Check that an operand spanning `extent` elements fits both the buffer and
/// its backing storage. `None` is a span that overflowed.
pub(crate) fn require_extent(op: &str, name: &str, buf: &HostBuffer, extent: Option<usize>) -> Result<(), QueueFault> {
    let held = buf.len().min(buf.memory().read().len());
    match extent {
        Some(extent) if extent <= held => Ok(()),
        Some(extent) => Err(QueueFault::new(
            codes::INVALID_BUFFER_SIZE,
            format!("{}: operand {} spans {} elements but holds {}", op, name, extent, held),
        )),
        None => Err(QueueFault::new(
            codes::INVALID_BUFFER_SIZE,
            format!("{}: operand {} span overflows the address space", op, name),
        )),
    }
}

/// Stored (rows, cols) of an operand whose logical shape is `rows`×`cols`.
fn stored_shape(trans: Transpose, rows: usize, cols: usize) -> (usize, usize) {
    match trans {
        Transpose::NoTrans => (rows, cols),
        Transpose::Trans => (cols, rows),
    }
}

/// Index of logical element `(i, j)` of `op(X)`.
#[inline]
fn at(trans: Transpose, offset: usize, ld: usize, i: usize, j: usize) -> usize {
    match trans {
        Transpose::NoTrans => offset + i + j * ld,
        Transpose::Trans => offset + j + i * ld,
    }
}

// ============================================================================
// GEMM
// ============================================================================

pub(crate) fn gemm(desc: &GemmDesc, a: &HostBuffer, b: &HostBuffer, c: &HostBuffer) -> Result<(), QueueFault> {
    require_float("gemm", &[a, b, c])?;
    let GemmDesc { transa, transb, m, n, k, alpha, lda, offset_a, ldb, offset_b, beta, ldc, offset_c } = *desc;

    let (a_rows, a_cols) = stored_shape(transa, m, k);
    let (b_rows, b_cols) = stored_shape(transb, k, n);
    require_ld("gemm", "lda", lda, a_rows)?;
    require_ld("gemm", "ldb", ldb, b_rows)?;
    require_ld("gemm", "ldc", ldc, m)?;
    require_extent("gemm", "A", a, operand_extent(offset_a, a_rows, a_cols, lda))?;
    require_extent("gemm", "B", b, operand_extent(offset_b, b_rows, b_cols, ldb))?;
    require_extent("gemm", "C", c, operand_extent(offset_c, m, n, ldc))?;

    if m == 0 || n == 0 {
        return Ok(());
    }

    let av = a.memory().read().to_f64_vec();
    let bv = b.memory().read().to_f64_vec();
    let mut cv = c.memory().read().to_f64_vec();

    let column = |j: usize, c_col: &mut [f64]| {
        for (i, slot) in c_col.iter_mut().take(m).enumerate() {
            let mut sum = 0.0;
            for p in 0..k {
                sum += av[at(transa, offset_a, lda, i, p)] * bv[at(transb, offset_b, ldb, p, j)];
            }
            *slot = if beta == 0.0 { alpha * sum } else { alpha * sum + beta * *slot };
        }
    };

    let c_cols = cv[offset_c..].chunks_mut(ldc).take(n);
    if n >= PAR_COL_THRESHOLD {
        c_cols.collect::<Vec<_>>().into_par_iter().enumerate().for_each(|(j, col)| column(j, col));
    } else {
        c_cols.enumerate().for_each(|(j, col)| column(j, col));
    }

    c.memory().write().store_f64(&cv);
    Ok(())
}

// ============================================================================
// SYRK
// ============================================================================

pub(crate) fn syrk(desc: &SyrkDesc, a: &HostBuffer, c: &HostBuffer) -> Result<(), QueueFault> {
    require_float("syrk", &[a, c])?;
    let SyrkDesc { uplo, trans, n, k, alpha, lda, offset_a, beta, ldc, offset_c } = *desc;

    // op(A) is n×k: A itself for NoTrans, A^T for Trans.
    let (a_rows, a_cols) = stored_shape(trans, n, k);
    require_ld("syrk", "lda", lda, a_rows)?;
    require_ld("syrk", "ldc", ldc, n)?;
    require_extent("syrk", "A", a, operand_extent(offset_a, a_rows, a_cols, lda))?;
    require_extent("syrk", "C", c, operand_extent(offset_c, n, n, ldc))?;

    if n == 0 {
        return Ok(());
    }

    let av = a.memory().read().to_f64_vec();
    let mut cv = c.memory().read().to_f64_vec();

    for j in 0..n {
        let rows = match uplo {
            UpLo::Upper => 0..j + 1,
            UpLo::Lower => j..n,
        };
        for i in rows {
            let mut sum = 0.0;
            for p in 0..k {
                sum += av[at(trans, offset_a, lda, i, p)] * av[at(trans, offset_a, lda, j, p)];
            }
            let slot = &mut cv[offset_c + i + j * ldc];
            *slot = if beta == 0.0 { alpha * sum } else { alpha * sum + beta * *slot };
        }
    }

    c.memory().write().store_f64(&cv);
    Ok(())
}

// ============================================================================
// AXPY
// ============================================================================

/// Span of a strided vector of `n` elements.
fn strided_extent(n: usize, inc: isize) -> Option<usize> {
    if n == 0 {
        return Some(0);
    }
    (n - 1).checked_mul(inc.unsigned_abs())?.checked_add(1)
}

/// Index of the `i`-th logical element; negative strides start at the end.
#[inline]
fn strided_index(n: usize, inc: isize, i: usize) -> usize {
    let step = inc.unsigned_abs();
    if inc >= 0 {
        i * step
    } else {
        (n - 1 - i) * step
    }
}

pub(crate) fn axpy(desc: &AxpyDesc, x: &HostBuffer, y: &HostBuffer) -> Result<(), QueueFault> {
    require_float("axpy", &[x, y])?;
    let AxpyDesc { n, a, incx, incy } = *desc;
    if incy == 0 {
        return Err(QueueFault::new(codes::INVALID_VALUE, "axpy: incy must be non-zero"));
    }
    require_extent("axpy", "x", x, strided_extent(n, incx))?;
    require_extent("axpy", "y", y, strided_extent(n, incy))?;

    if n == 0 || a == 0.0 {
        return Ok(());
    }

    let xv = x.memory().read().to_f64_vec();
    let mut yv = y.memory().read().to_f64_vec();
    for i in 0..n {
        yv[strided_index(n, incy, i)] += a * xv[strided_index(n, incx, i)];
    }
    y.memory().write().store_f64(&yv);
    Ok(())
}
