//! Cholesky factorization and solve for the host queue.
//!
//! Both triangles are handled by one lower-triangular routine: the upper
//! factor `U` is `L^T`, so `L(r, c)` of an upper-stored matrix lives at
//! `c + r * lda`.

use kiln_core::{codes, math::operand_extent, PotrfDesc, PotrsDesc, QueueFault, UpLo};

use super::blas::{require_extent, require_float, require_ld, HostBuffer};

/// Index of `L(r, c)` (`r >= c`) in the stored triangle.
#[inline]
fn lower_at(uplo: UpLo, ld: usize, r: usize, c: usize) -> usize {
    match uplo {
        UpLo::Lower => r + c * ld,
        UpLo::Upper => c + r * ld,
    }
}

pub(crate) fn potrf(desc: &PotrfDesc, a: &HostBuffer) -> Result<(), QueueFault> {
    require_float("potrf", &[a])?;
    let PotrfDesc { uplo, n, lda } = *desc;
    require_ld("potrf", "lda", lda, n)?;
    require_extent("potrf", "A", a, operand_extent(0, n, n, lda))?;

    if n == 0 {
        return Ok(());
    }

    let mut av = a.memory().read().to_f64_vec();
    let idx = |r: usize, c: usize| lower_at(uplo, lda, r, c);

    for j in 0..n {
        let mut d = av[idx(j, j)];
        for p in 0..j {
            d -= av[idx(j, p)] * av[idx(j, p)];
        }
        if d <= 0.0 || d.is_nan() {
            // The buffer is left as it was; nothing is stored on failure.
            return Err(QueueFault::new(
                codes::NOT_POSITIVE_DEFINITE,
                format!("potrf: leading minor of order {} is not positive definite", j + 1),
            ));
        }
        let ljj = d.sqrt();
        av[idx(j, j)] = ljj;

        for i in j + 1..n {
            let mut s = av[idx(i, j)];
            for p in 0..j {
                s -= av[idx(i, p)] * av[idx(j, p)];
            }
            av[idx(i, j)] = s / ljj;
        }
    }

    a.memory().write().store_f64(&av);
    Ok(())
}

pub(crate) fn potrs(desc: &PotrsDesc, a: &HostBuffer, b: &HostBuffer) -> Result<(), QueueFault> {
    require_float("potrs", &[a, b])?;
    let PotrsDesc { uplo, n, ny, lda, ldb } = *desc;
    require_ld("potrs", "lda", lda, n)?;
    require_ld("potrs", "ldb", ldb, n)?;
    require_extent("potrs", "A", a, operand_extent(0, n, n, lda))?;
    require_extent("potrs", "B", b, operand_extent(0, n, ny, ldb))?;

    if n == 0 || ny == 0 {
        return Ok(());
    }

    let av = a.memory().read().to_f64_vec();
    let mut bv = b.memory().read().to_f64_vec();
    let l = |r: usize, c: usize| av[lower_at(uplo, lda, r, c)];

    for col in bv.chunks_mut(ldb).take(ny) {
        // L y = b
        for i in 0..n {
            let mut s = col[i];
            for p in 0..i {
                s -= l(i, p) * col[p];
            }
            col[i] = s / l(i, i);
        }
        // L^T x = y
        for i in (0..n).rev() {
            let mut s = col[i];
            for p in i + 1..n {
                s -= l(p, i) * col[p];
            }
            col[i] = s / l(i, i);
        }
    }

    b.memory().write().store_f64(&bv);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::{HostMemory, MemoryLedger};
    use kiln_core::UniversalBuffer;
    use std::sync::Arc;

    fn buffer(values: &[f64]) -> HostBuffer {
        let ledger = Arc::new(MemoryLedger::new(None));
        let mem = HostMemory::allocate(&ledger, kiln_core::DType::F64, values.len()).unwrap();
        mem.with_mut::<f64, _>(|v| v.copy_from_slice(values)).unwrap();
        UniversalBuffer::new(kiln_core::DType::F64, values.len(), mem)
    }

    #[test]
    fn test_potrf_lower_and_upper() {
        // A = [4 2; 2 5] -> L = [2 0; 1 2].
        let lower = buffer(&[4.0, 2.0, 2.0, 5.0]);
        potrf(&PotrfDesc { uplo: UpLo::Lower, n: 2, lda: 2 }, &lower).unwrap();
        assert_eq!(lower.memory().to_vec::<f64>().unwrap(), vec![2.0, 1.0, 2.0, 2.0]);

        let upper = buffer(&[4.0, 2.0, 2.0, 5.0]);
        potrf(&PotrfDesc { uplo: UpLo::Upper, n: 2, lda: 2 }, &upper).unwrap();
        assert_eq!(upper.memory().to_vec::<f64>().unwrap(), vec![2.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn test_potrf_not_positive_definite_leaves_input() {
        let a = buffer(&[1.0, 2.0, 2.0, 1.0]);
        let fault = potrf(&PotrfDesc { uplo: UpLo::Lower, n: 2, lda: 2 }, &a).unwrap_err();
        assert_eq!(fault.code, codes::NOT_POSITIVE_DEFINITE);
        assert!(fault.message.contains("order 2"));
        assert_eq!(a.memory().to_vec::<f64>().unwrap(), vec![1.0, 2.0, 2.0, 1.0]);
    }

    #[test]
    fn test_huge_leading_dimension_is_a_fault() {
        let a = buffer(&[4.0, 2.0, 2.0, 5.0]);
        let fault = potrf(&PotrfDesc { uplo: UpLo::Upper, n: 2, lda: usize::MAX }, &a).unwrap_err();
        assert_eq!(fault.code, codes::INVALID_BUFFER_SIZE);
        assert_eq!(a.memory().to_vec::<f64>().unwrap(), vec![4.0, 2.0, 2.0, 5.0]);

        let b = buffer(&[1.0, 1.0, 1.0, 1.0]);
        let desc = PotrsDesc { uplo: UpLo::Lower, n: 2, ny: 2, lda: 2, ldb: usize::MAX };
        let fault = potrs(&desc, &a, &b).unwrap_err();
        assert_eq!(fault.code, codes::INVALID_BUFFER_SIZE);
        assert!(fault.message.contains("operand B"));
    }

    #[test]
    fn test_potrs_solves() {
        let a = buffer(&[4.0, 2.0, 2.0, 5.0]);
        potrf(&PotrfDesc { uplo: UpLo::Lower, n: 2, lda: 2 }, &a).unwrap();
        // A x = [6; 7] has x = [1; 1].
        let b = buffer(&[6.0, 7.0]);
        potrs(&PotrsDesc { uplo: UpLo::Lower, n: 2, ny: 1, lda: 2, ldb: 2 }, &a, &b).unwrap();
        let x = b.memory().to_vec::<f64>().unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 1.0).abs() < 1e-12);
    }
}
