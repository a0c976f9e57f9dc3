//! Host-resident buffer memory with byte accounting.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use kiln_core::{codes, DType, Element, QueueFault, TypedVec};

/// Running total of live allocation bytes, shared by a queue and every
/// allocation it hands out.
#[derive(Debug, Default)]
pub(crate) struct MemoryLedger {
    in_use: AtomicUsize,
    limit: Option<usize>,
}

impl MemoryLedger {
    pub(crate) fn new(limit: Option<usize>) -> Self {
        Self { in_use: AtomicUsize::new(0), limit }
    }

    pub(crate) fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }

    /// Reserve `bytes`, failing if the limit would be exceeded.
    fn reserve(&self, bytes: usize) -> Result<(), QueueFault> {
        let limit = self.limit.unwrap_or(usize::MAX);
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|&total| total <= limit)
            })
            .map(|_| ())
            .map_err(|used| {
                QueueFault::new(
                    codes::MEM_OBJECT_ALLOCATION_FAILURE,
                    format!("cannot allocate {} bytes: {} of {} bytes in use", bytes, used, limit),
                )
            })
    }

    fn release(&self, bytes: usize) {
        self.in_use.fetch_sub(bytes, Ordering::AcqRel);
    }
}

struct Allocation {
    data: RwLock<TypedVec>,
    bytes: usize,
    ledger: Arc<MemoryLedger>,
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.ledger.release(self.bytes);
    }
}

/// Handle to a host allocation. Clones alias the same storage.
#[derive(Clone)]
pub struct HostMemory {
    inner: Arc<Allocation>,
}

impl HostMemory {
    pub(crate) fn allocate(ledger: &Arc<MemoryLedger>, dtype: DType, len: usize) -> Result<Self, QueueFault> {
        let bytes = dtype
            .element_size()
            .checked_mul(len)
            .ok_or_else(|| QueueFault::new(codes::OUT_OF_HOST_MEMORY, format!("{} x {} overflows", len, dtype)))?;
        ledger.reserve(bytes)?;
        let data = match TypedVec::try_zeros(dtype, len) {
            Some(data) => data,
            None => {
                ledger.release(bytes);
                return Err(QueueFault::new(
                    codes::OUT_OF_HOST_MEMORY,
                    format!("host allocation of {} x {} failed", len, dtype),
                ));
            }
        };
        Ok(Self {
            inner: Arc::new(Allocation {
                data: RwLock::new(data),
                bytes,
                ledger: Arc::clone(ledger),
            }),
        })
    }

    pub fn read(&self) -> RwLockReadGuard<'_, TypedVec> {
        self.inner.data.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, TypedVec> {
        self.inner.data.write()
    }

    /// Whether two handles refer to the same allocation.
    pub fn same_allocation(&self, other: &HostMemory) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Copy the contents out as `T`, or `None` if the element type differs.
    pub fn to_vec<T: Element>(&self) -> Option<Vec<T>> {
        T::view(&self.read()).map(|v| v.to_vec())
    }

    /// Run `f` over the contents viewed as `T`.
    pub fn with_mut<T: Element, R>(&self, f: impl FnOnce(&mut [T]) -> R) -> Option<R> {
        let mut guard = self.write();
        T::view_mut(&mut guard).map(f)
    }
}

impl fmt::Debug for HostMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostMemory").field("bytes", &self.inner.bytes).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_tracks_live_allocations() {
        let ledger = Arc::new(MemoryLedger::new(Some(64)));
        let a = HostMemory::allocate(&ledger, DType::F64, 4).unwrap();
        assert_eq!(ledger.in_use(), 32);
        let alias = a.clone();
        drop(a);
        assert_eq!(ledger.in_use(), 32);
        drop(alias);
        assert_eq!(ledger.in_use(), 0);
    }

    #[test]
    fn test_limit_exceeded() {
        let ledger = Arc::new(MemoryLedger::new(Some(16)));
        let _held = HostMemory::allocate(&ledger, DType::F32, 3).unwrap();
        let fault = HostMemory::allocate(&ledger, DType::F32, 2).unwrap_err();
        assert_eq!(fault.code, codes::MEM_OBJECT_ALLOCATION_FAILURE);
        assert!(fault.message.contains("12 of 16"));
    }

    #[test]
    fn test_impossible_allocation_is_a_fault() {
        let ledger = Arc::new(MemoryLedger::new(None));
        let fault = HostMemory::allocate(&ledger, DType::U8, usize::MAX).unwrap_err();
        assert_eq!(fault.code, codes::OUT_OF_HOST_MEMORY);
        assert_eq!(ledger.in_use(), 0);

        let fault = HostMemory::allocate(&ledger, DType::F64, usize::MAX).unwrap_err();
        assert_eq!(fault.code, codes::OUT_OF_HOST_MEMORY);
    }

    #[test]
    fn test_typed_views() {
        let ledger = Arc::new(MemoryLedger::new(None));
        let mem = HostMemory::allocate(&ledger, DType::I32, 3).unwrap();
        mem.with_mut::<i32, _>(|v| v[1] = 5).unwrap();
        assert_eq!(mem.to_vec::<i32>(), Some(vec![0, 5, 0]));
        assert!(mem.to_vec::<f32>().is_none());
        assert!(mem.same_allocation(&mem.clone()));
    }
}
