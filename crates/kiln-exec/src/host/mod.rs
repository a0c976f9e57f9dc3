//! Host reference queue.
//!
//! A CPU implementation of every backend seam. Both compile/launch paths are
//! available and the capability probe is configurable, so either backend can
//! be selected. Kernel bodies are host closures registered on the builder and
//! bound to the entry points a program declares.

mod blas;
mod lapack;
pub mod memory;
pub mod source;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use kiln_core::{
    codes, AxpyDesc, DType, DeviceClass, DeviceInfo, Element, GemmDesc, KernelArg, KernelArguments,
    LaunchRange, PotrfDesc, PotrsDesc, QueueFault, Scalar, SyrkDesc, UniversalBuffer,
};

use crate::backend::{DeviceQueue, InteropRuntime, MathExecutor, NativeRuntime};

pub use memory::HostMemory;
pub use source::BuildOptions;

use memory::MemoryLedger;

/// Default work-group limit of the host device.
pub const DEFAULT_MAX_WORK_GROUP_SIZE: usize = 256;

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

/// Host implementation of a kernel entry point.
pub type HostKernelFn = Arc<dyn Fn(&HostLaunch<'_>) -> Result<(), QueueFault> + Send + Sync>;

/// What a host kernel body sees for one launch.
pub struct HostLaunch<'a> {
    pub kernel: &'a str,
    pub range: &'a LaunchRange,
    pub args: &'a KernelArguments<HostMemory>,
    pub options: &'a BuildOptions,
}

impl<'a> HostLaunch<'a> {
    /// Total work items.
    pub fn global_size(&self) -> usize {
        self.range.global_size()
    }

    /// Buffer argument at `index`.
    pub fn buffer(&self, index: usize) -> Result<&'a HostMemory, QueueFault> {
        match self.args.get(index) {
            Some(KernelArg::Buffer { buffer, .. }) => Ok(buffer.memory()),
            Some(KernelArg::Scalar(_)) => Err(QueueFault::new(
                codes::INVALID_ARG_VALUE,
                format!("{}: argument {} is a scalar, expected a buffer", self.kernel, index),
            )),
            None => Err(self.missing(index)),
        }
    }

    /// Scalar argument at `index`.
    pub fn scalar(&self, index: usize) -> Result<Scalar, QueueFault> {
        match self.args.get(index) {
            Some(KernelArg::Scalar(value)) => Ok(*value),
            Some(KernelArg::Buffer { .. }) => Err(QueueFault::new(
                codes::INVALID_ARG_VALUE,
                format!("{}: argument {} is a buffer, expected a scalar", self.kernel, index),
            )),
            None => Err(self.missing(index)),
        }
    }

    fn missing(&self, index: usize) -> QueueFault {
        QueueFault::new(
            codes::INVALID_ARG_INDEX,
            format!("{}: argument {} not set ({} given)", self.kernel, index, self.args.len()),
        )
    }
}

/// Counters exposed for instrumentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStats {
    pub native_compiles: usize,
    pub interop_compiles: usize,
    pub interop_contexts: usize,
    pub native_launches: usize,
    pub interop_launches: usize,
}

#[derive(Default)]
struct Counters {
    native_compiles: AtomicUsize,
    interop_compiles: AtomicUsize,
    interop_contexts: AtomicUsize,
    native_launches: AtomicUsize,
    interop_launches: AtomicUsize,
}

fn bump(counter: &AtomicUsize) -> usize {
    counter.fetch_add(1, Ordering::Relaxed) + 1
}

/// A program compiled by the host front end.
#[derive(Debug, Clone)]
pub struct HostProgram {
    pub name: String,
    pub entries: Vec<String>,
    pub options: BuildOptions,
}

/// A kernel bound to its host implementation.
#[derive(Clone)]
pub struct HostKernel {
    pub name: String,
    pub program: String,
    options: BuildOptions,
    body: HostKernelFn,
}

impl fmt::Debug for HostKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostKernel")
            .field("name", &self.name)
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

/// Interop bridge state: the queue's device re-exposed to the interop runtime.
#[derive(Debug)]
pub struct HostInteropContext {
    pub id: usize,
    queue_id: u64,
}

/// A program compiled through an interop context.
#[derive(Debug, Clone)]
pub struct HostInteropProgram {
    pub context_id: usize,
    pub program: HostProgram,
}

#[derive(Debug, Clone)]
pub struct HostInteropKernel {
    pub context_id: usize,
    pub kernel: HostKernel,
}

// ============================================================================
// Builder
// ============================================================================

pub struct HostQueueBuilder {
    class: DeviceClass,
    max_work_group_size: usize,
    native_supported: bool,
    interop_available: bool,
    memory_limit: Option<usize>,
    kernels: HashMap<String, HostKernelFn>,
}

impl Default for HostQueueBuilder {
    fn default() -> Self {
        Self {
            class: DeviceClass::Cpu,
            max_work_group_size: DEFAULT_MAX_WORK_GROUP_SIZE,
            native_supported: true,
            interop_available: true,
            memory_limit: None,
            kernels: HashMap::new(),
        }
    }
}

impl HostQueueBuilder {
    pub fn device_class(mut self, class: DeviceClass) -> Self {
        self.class = class;
        self
    }

    pub fn max_work_group_size(mut self, size: usize) -> Self {
        self.max_work_group_size = size;
        self
    }

    /// Result of the native capability probe.
    pub fn native_supported(mut self, supported: bool) -> Self {
        self.native_supported = supported;
        self
    }

    /// Whether an interop context can be created.
    pub fn interop_available(mut self, available: bool) -> Self {
        self.interop_available = available;
        self
    }

    /// Cap on live allocation bytes.
    pub fn memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Register the host body of entry point `name`.
    pub fn kernel<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&HostLaunch<'_>) -> Result<(), QueueFault> + Send + Sync + 'static,
    {
        self.kernels.insert(name.to_string(), Arc::new(body));
        self
    }

    pub fn build(self) -> HostQueue {
        HostQueue {
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            info: DeviceInfo {
                class: self.class,
                max_work_group_size: self.max_work_group_size,
            },
            native_supported: self.native_supported,
            interop_available: self.interop_available,
            ledger: Arc::new(MemoryLedger::new(self.memory_limit)),
            kernels: self.kernels,
            counters: Counters::default(),
        }
    }
}

// ============================================================================
// Queue
// ============================================================================

pub struct HostQueue {
    id: u64,
    info: DeviceInfo,
    native_supported: bool,
    interop_available: bool,
    ledger: Arc<MemoryLedger>,
    kernels: HashMap<String, HostKernelFn>,
    counters: Counters,
}

impl Default for HostQueue {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl HostQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> HostQueueBuilder {
        HostQueueBuilder::default()
    }

    pub fn stats(&self) -> HostStats {
        let c = &self.counters;
        HostStats {
            native_compiles: c.native_compiles.load(Ordering::Relaxed),
            interop_compiles: c.interop_compiles.load(Ordering::Relaxed),
            interop_contexts: c.interop_contexts.load(Ordering::Relaxed),
            native_launches: c.native_launches.load(Ordering::Relaxed),
            interop_launches: c.interop_launches.load(Ordering::Relaxed),
        }
    }

    /// Bytes held by live allocations.
    pub fn memory_in_use(&self) -> usize {
        self.ledger.in_use()
    }

    fn compile(&self, name: &str, source: &str, options: &str) -> Result<HostProgram, QueueFault> {
        let options = source::parse_options(options)?;
        let entries = source::scan_entries(source)?;
        Ok(HostProgram { name: name.to_string(), entries, options })
    }

    fn bind(&self, program: &HostProgram, kernel: &str) -> Result<HostKernel, QueueFault> {
        if !program.entries.iter().any(|e| e == kernel) {
            return Err(QueueFault::new(
                codes::INVALID_KERNEL_NAME,
                format!("no entry point '{}' in program '{}'", kernel, program.name),
            ));
        }
        let body = self.kernels.get(kernel).ok_or_else(|| {
            QueueFault::new(
                codes::INVALID_KERNEL_NAME,
                format!("entry point '{}' has no host implementation", kernel),
            )
        })?;
        Ok(HostKernel {
            name: kernel.to_string(),
            program: program.name.clone(),
            options: program.options.clone(),
            body: Arc::clone(body),
        })
    }

    fn launch(&self, kernel: &HostKernel, range: &LaunchRange, args: &KernelArguments<HostMemory>) -> Result<(), QueueFault> {
        let launch = HostLaunch {
            kernel: &kernel.name,
            range,
            args,
            options: &kernel.options,
        };
        (kernel.body)(&launch)
    }
}

impl fmt::Debug for HostQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostQueue")
            .field("id", &self.id)
            .field("info", &self.info)
            .field("native_supported", &self.native_supported)
            .field("kernels", &self.kernels.len())
            .finish_non_exhaustive()
    }
}

fn out_of_range(what: &str, offset: usize, count: usize, len: usize) -> QueueFault {
    QueueFault::new(
        codes::INVALID_BUFFER_SIZE,
        format!("{} range {}..{} exceeds length {}", what, offset, offset.saturating_add(count), len),
    )
}

fn in_bounds(offset: usize, count: usize, len: usize) -> bool {
    offset.checked_add(count).map_or(false, |end| end <= len)
}

fn type_mismatch(expected: DType, found: DType) -> QueueFault {
    QueueFault::new(
        codes::INVALID_ARG_VALUE,
        format!("element type mismatch: expected {}, found {}", expected, found),
    )
}

impl DeviceQueue for HostQueue {
    type Memory = HostMemory;

    fn device_info(&self) -> DeviceInfo {
        self.info
    }

    fn allocate(&self, dtype: DType, len: usize) -> Result<HostMemory, QueueFault> {
        HostMemory::allocate(&self.ledger, dtype, len)
    }

    fn copy(
        &self,
        dst: &UniversalBuffer<HostMemory>,
        dst_offset: usize,
        src: &UniversalBuffer<HostMemory>,
        src_offset: usize,
        count: usize,
    ) -> Result<(), QueueFault> {
        if dst.dtype() != src.dtype() {
            return Err(type_mismatch(dst.dtype(), src.dtype()));
        }
        if !in_bounds(src_offset, count, src.len()) {
            return Err(out_of_range("source", src_offset, count, src.len()));
        }
        if !in_bounds(dst_offset, count, dst.len()) {
            return Err(out_of_range("destination", dst_offset, count, dst.len()));
        }
        if count == 0 {
            return Ok(());
        }

        if dst.memory().same_allocation(src.memory()) {
            let mut data = dst.memory().write();
            if !data.copy_within(src_offset, dst_offset, count) {
                let held = data.len();
                let offset = src_offset.max(dst_offset);
                return Err(out_of_range("storage", offset, count, held));
            }
            return Ok(());
        }
        let staged = {
            let data = src.memory().read();
            data.slice(src_offset, count)
                .ok_or_else(|| out_of_range("source storage", src_offset, count, data.len()))?
        };
        let mut data = dst.memory().write();
        if !data.copy_from(dst_offset, &staged, 0, count) {
            return Err(out_of_range("destination storage", dst_offset, count, data.len()));
        }
        Ok(())
    }

    fn copy_from_host<T: Element>(
        &self,
        dst: &UniversalBuffer<HostMemory>,
        dst_offset: usize,
        src: &[T],
        src_offset: usize,
        count: usize,
    ) -> Result<(), QueueFault> {
        if dst.dtype() != T::DTYPE {
            return Err(type_mismatch(dst.dtype(), T::DTYPE));
        }
        if !in_bounds(src_offset, count, src.len()) {
            return Err(out_of_range("host source", src_offset, count, src.len()));
        }
        if !in_bounds(dst_offset, count, dst.len()) {
            return Err(out_of_range("destination", dst_offset, count, dst.len()));
        }
        dst.memory()
            .with_mut::<T, _>(|d| {
                let held = d.len();
                d.get_mut(dst_offset..dst_offset + count)
                    .map(|slot| slot.copy_from_slice(&src[src_offset..src_offset + count]))
                    .ok_or_else(|| out_of_range("destination storage", dst_offset, count, held))
            })
            .ok_or_else(|| type_mismatch(dst.dtype(), T::DTYPE))?
    }

    fn fill(&self, dst: &UniversalBuffer<HostMemory>, value: f64) -> Result<(), QueueFault> {
        dst.memory().write().fill(value);
        Ok(())
    }

    fn read_to_host<T: Element>(
        &self,
        src: &UniversalBuffer<HostMemory>,
        offset: usize,
        count: usize,
    ) -> Result<Vec<T>, QueueFault> {
        if src.dtype() != T::DTYPE {
            return Err(type_mismatch(src.dtype(), T::DTYPE));
        }
        if !in_bounds(offset, count, src.len()) {
            return Err(out_of_range("source", offset, count, src.len()));
        }
        let data = src.memory().read();
        let view = T::view(&data).ok_or_else(|| type_mismatch(src.dtype(), T::DTYPE))?;
        view.get(offset..offset + count)
            .map(<[T]>::to_vec)
            .ok_or_else(|| out_of_range("source storage", offset, count, view.len()))
    }
}

impl NativeRuntime for HostQueue {
    type NativeProgram = HostProgram;
    type NativeKernel = HostKernel;

    fn supports_native(&self) -> bool {
        self.native_supported
    }

    fn compile_native(&self, name: &str, source: &str, options: &str) -> Result<HostProgram, QueueFault> {
        let program = self.compile(name, source, options)?;
        bump(&self.counters.native_compiles);
        Ok(program)
    }

    fn native_kernel(&self, program: &HostProgram, kernel: &str) -> Result<HostKernel, QueueFault> {
        self.bind(program, kernel)
    }

    fn launch_native(
        &self,
        kernel: &HostKernel,
        range: &LaunchRange,
        args: &KernelArguments<HostMemory>,
    ) -> Result<(), QueueFault> {
        bump(&self.counters.native_launches);
        self.launch(kernel, range, args)
    }
}

impl InteropRuntime for HostQueue {
    type InteropContext = HostInteropContext;
    type InteropProgram = HostInteropProgram;
    type InteropKernel = HostInteropKernel;

    fn create_interop_context(&self) -> Result<HostInteropContext, QueueFault> {
        if !self.interop_available {
            return Err(QueueFault::new(
                codes::DEVICE_NOT_AVAILABLE,
                "interop runtime is not available on this device",
            ));
        }
        let id = bump(&self.counters.interop_contexts);
        Ok(HostInteropContext { id, queue_id: self.id })
    }

    fn compile_interop(
        &self,
        context: &HostInteropContext,
        name: &str,
        source: &str,
        options: &str,
    ) -> Result<HostInteropProgram, QueueFault> {
        if context.queue_id != self.id {
            return Err(QueueFault::new(
                codes::INVALID_DEVICE,
                format!("interop context {} belongs to another queue", context.id),
            ));
        }
        let program = self.compile(name, source, options)?;
        bump(&self.counters.interop_compiles);
        Ok(HostInteropProgram { context_id: context.id, program })
    }

    fn interop_kernel(&self, program: &HostInteropProgram, kernel: &str) -> Result<HostInteropKernel, QueueFault> {
        Ok(HostInteropKernel {
            context_id: program.context_id,
            kernel: self.bind(&program.program, kernel)?,
        })
    }

    fn launch_interop(
        &self,
        kernel: &HostInteropKernel,
        range: &LaunchRange,
        args: &KernelArguments<HostMemory>,
    ) -> Result<(), QueueFault> {
        bump(&self.counters.interop_launches);
        self.launch(&kernel.kernel, range, args)
    }
}

impl MathExecutor for HostQueue {
    fn gemm(
        &self,
        desc: &GemmDesc,
        a: &UniversalBuffer<HostMemory>,
        b: &UniversalBuffer<HostMemory>,
        c: &UniversalBuffer<HostMemory>,
    ) -> Result<(), QueueFault> {
        blas::gemm(desc, a, b, c)
    }

    fn syrk(&self, desc: &SyrkDesc, a: &UniversalBuffer<HostMemory>, c: &UniversalBuffer<HostMemory>) -> Result<(), QueueFault> {
        blas::syrk(desc, a, c)
    }

    fn axpy(&self, desc: &AxpyDesc, x: &UniversalBuffer<HostMemory>, y: &UniversalBuffer<HostMemory>) -> Result<(), QueueFault> {
        blas::axpy(desc, x, y)
    }

    fn potrf(&self, desc: &PotrfDesc, a: &UniversalBuffer<HostMemory>) -> Result<(), QueueFault> {
        lapack::potrf(desc, a)
    }

    fn potrs(&self, desc: &PotrsDesc, a: &UniversalBuffer<HostMemory>, b: &UniversalBuffer<HostMemory>) -> Result<(), QueueFault> {
        lapack::potrs(desc, a, b)
    }
}
