//! Execution context: the single entry point algorithm code talks to.
//!
//! Owns the device queue, the kernel factory and the scheduler. Every
//! operation returns an explicit [`Result`]; backend faults raised during
//! allocation, transfers, fills, launches and math calls are mapped onto
//! [`ExecError::BackendFault`] here and never escape as queue faults.
//! Element-type agreement between operands is asserted: a mismatch is a bug
//! in the caller, not a runtime condition.

use std::fmt;
use std::sync::Arc;

use kiln_core::{
    AxpyDesc, DType, DeviceInfo, Element, ExecError, GemmDesc, KernelNdRange, KernelRange,
    LaunchRange, PotrfDesc, PotrsDesc, Result, SyrkDesc,
};

use crate::backend::{Arguments, Buffer, ComputeQueue};
use crate::config::ExecConfig;
use crate::factory::KernelFactory;
use crate::kernel::Kernel;
use crate::scheduler::KernelScheduler;

pub struct ExecutionContext<Q: ComputeQueue> {
    queue: Arc<Q>,
    info: DeviceInfo,
    factory: KernelFactory<Q>,
    scheduler: KernelScheduler<Q>,
}

impl<Q: ComputeQueue> ExecutionContext<Q> {
    /// Bind a context to `queue` with the default configuration.
    pub fn new(queue: Arc<Q>) -> Self {
        Self::assemble(queue, &ExecConfig::default())
    }

    /// Bind a context to `queue` with an explicit configuration.
    pub fn with_config(queue: Arc<Q>, config: ExecConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(queue, &config))
    }

    fn assemble(queue: Arc<Q>, config: &ExecConfig) -> Self {
        let info = queue.device_info();
        tracing::debug!(
            "execution context bound to {:?} device (max work-group {})",
            info.class,
            info.max_work_group_size
        );
        Self {
            factory: KernelFactory::new(Arc::clone(&queue), config),
            scheduler: KernelScheduler::new(Arc::clone(&queue), info),
            queue,
            info,
        }
    }

    // ------------------------------------------------------------------
    // Kernel launches
    // ------------------------------------------------------------------

    /// Launch `kernel` over a 1-D index space.
    pub fn run_range(&self, range: KernelRange, kernel: &Kernel<Q>, args: &Arguments<Q>) -> Result<()> {
        kernel.schedule(&self.scheduler, &LaunchRange::Range(range), args)
    }

    /// Launch `kernel` over an N-D index space with explicit work-groups.
    pub fn run_nd_range(&self, range: KernelNdRange, kernel: &Kernel<Q>, args: &Arguments<Q>) -> Result<()> {
        kernel.schedule(&self.scheduler, &LaunchRange::NdRange(range), args)
    }

    // ------------------------------------------------------------------
    // Math primitives
    // ------------------------------------------------------------------

    /// `C = alpha * op(A) * op(B) + beta * C`.
    pub fn gemm(&self, desc: &GemmDesc, a: &Buffer<Q>, b: &Buffer<Q>, c: &Buffer<Q>) -> Result<()> {
        assert_eq!(a.dtype(), b.dtype(), "gemm: A and B element types differ");
        assert_eq!(a.dtype(), c.dtype(), "gemm: A and C element types differ");
        Ok(self.queue.gemm(desc, a, b, c)?)
    }

    /// Symmetric rank-k update of one triangle of `C`.
    pub fn syrk(&self, desc: &SyrkDesc, a: &Buffer<Q>, c: &Buffer<Q>) -> Result<()> {
        assert_eq!(a.dtype(), c.dtype(), "syrk: A and C element types differ");
        Ok(self.queue.syrk(desc, a, c)?)
    }

    /// `y = a * x + y`.
    pub fn axpy(&self, desc: &AxpyDesc, x: &Buffer<Q>, y: &Buffer<Q>) -> Result<()> {
        assert_eq!(x.dtype(), y.dtype(), "axpy: x and y element types differ");
        Ok(self.queue.axpy(desc, x, y)?)
    }

    /// In-place Cholesky factorization.
    pub fn potrf(&self, desc: &PotrfDesc, a: &Buffer<Q>) -> Result<()> {
        Ok(self.queue.potrf(desc, a)?)
    }

    /// Solve with a factor produced by [`potrf`](Self::potrf); `b` is
    /// overwritten with the solution.
    pub fn potrs(&self, desc: &PotrsDesc, a: &Buffer<Q>, b: &Buffer<Q>) -> Result<()> {
        assert_eq!(a.dtype(), b.dtype(), "potrs: A and B element types differ");
        Ok(self.queue.potrs(desc, a, b)?)
    }

    // ------------------------------------------------------------------
    // Memory
    // ------------------------------------------------------------------

    /// Allocate `len` elements of `dtype`. `len == 0` yields an empty buffer.
    pub fn allocate(&self, dtype: DType, len: usize) -> Result<Buffer<Q>> {
        let memory = self.queue.allocate(dtype, len).map_err(|fault| {
            tracing::warn!("allocation of {} x {} failed: {}", len, dtype, fault);
            ExecError::from(fault)
        })?;
        Ok(Buffer::<Q>::new(dtype, len, memory))
    }

    /// Device-to-device copy of `count` elements.
    pub fn copy(
        &self,
        dst: &Buffer<Q>,
        dst_offset: usize,
        src: &Buffer<Q>,
        src_offset: usize,
        count: usize,
    ) -> Result<()> {
        assert_eq!(dst.dtype(), src.dtype(), "copy: source and destination element types differ");
        Ok(self.queue.copy(dst, dst_offset, src, src_offset, count)?)
    }

    /// Host-to-device copy of `count` elements of `src[src_offset..]`.
    pub fn copy_from_host<T: Element>(
        &self,
        dst: &Buffer<Q>,
        dst_offset: usize,
        src: &[T],
        src_offset: usize,
        count: usize,
    ) -> Result<()> {
        assert_eq!(dst.dtype(), T::DTYPE, "copy: host and destination element types differ");
        Ok(self.queue.copy_from_host(dst, dst_offset, src, src_offset, count)?)
    }

    /// Set every element of `dst` to `value`.
    pub fn fill(&self, dst: &Buffer<Q>, value: f64) -> Result<()> {
        Ok(self.queue.fill(dst, value)?)
    }

    /// Read `count` elements starting at `offset` back to the host.
    pub fn read_to_host<T: Element>(&self, src: &Buffer<Q>, offset: usize, count: usize) -> Result<Vec<T>> {
        assert_eq!(src.dtype(), T::DTYPE, "read: host and source element types differ");
        Ok(self.queue.read_to_host(src, offset, count)?)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn kernel_factory(&self) -> &KernelFactory<Q> {
        &self.factory
    }

    pub fn device_info(&self) -> DeviceInfo {
        self.info
    }

    pub fn queue(&self) -> &Arc<Q> {
        &self.queue
    }
}

impl<Q: ComputeQueue> fmt::Debug for ExecutionContext<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("info", &self.info)
            .field("factory", &self.factory)
            .finish_non_exhaustive()
    }
}
