//! Device queue seams.
//!
//! A device queue is supplied by the backend. It owns memory, exposes two
//! mutually incompatible compile/launch paths (native and interop), and the
//! dense math executors. The execution layer only ever talks to a queue
//! through these traits.

use std::fmt;

use kiln_core::{
    AxpyDesc, DType, DeviceInfo, Element, GemmDesc, KernelArguments, LaunchRange, PotrfDesc,
    PotrsDesc, QueueFault, SyrkDesc, UniversalBuffer,
};

/// Which compile/launch path a program was built through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// The queue's own compute runtime.
    Native,
    /// The driver-interop runtime, reached by bridging native handles.
    Interop,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Native => write!(f, "native"),
            Backend::Interop => write!(f, "interop"),
        }
    }
}

/// Buffer type of a queue.
pub type Buffer<Q> = UniversalBuffer<<Q as DeviceQueue>::Memory>;

/// Argument list type of a queue.
pub type Arguments<Q> = KernelArguments<<Q as DeviceQueue>::Memory>;

/// Memory and capability surface of a device queue.
///
/// Operations are submitted to the queue and may complete asynchronously;
/// ordering between operations on the same buffer is whatever the queue
/// guarantees.
pub trait DeviceQueue: Send + Sync + 'static {
    /// Backend handle to a device allocation.
    type Memory: Clone + Send + Sync;

    fn device_info(&self) -> DeviceInfo;

    /// Allocate `len` elements of `dtype`. `len == 0` yields an empty buffer.
    fn allocate(&self, dtype: DType, len: usize) -> Result<Self::Memory, QueueFault>;

    /// Device-to-device copy of `count` elements.
    fn copy(
        &self,
        dst: &UniversalBuffer<Self::Memory>,
        dst_offset: usize,
        src: &UniversalBuffer<Self::Memory>,
        src_offset: usize,
        count: usize,
    ) -> Result<(), QueueFault>;

    /// Host-to-device copy of `count` elements.
    fn copy_from_host<T: Element>(
        &self,
        dst: &UniversalBuffer<Self::Memory>,
        dst_offset: usize,
        src: &[T],
        src_offset: usize,
        count: usize,
    ) -> Result<(), QueueFault>;

    /// Set every element of `dst` to `value` converted to its element type.
    fn fill(&self, dst: &UniversalBuffer<Self::Memory>, value: f64) -> Result<(), QueueFault>;

    /// Device-to-host copy of `count` elements starting at `offset`.
    fn read_to_host<T: Element>(
        &self,
        src: &UniversalBuffer<Self::Memory>,
        offset: usize,
        count: usize,
    ) -> Result<Vec<T>, QueueFault>;
}

/// The queue's native compile/launch path.
pub trait NativeRuntime: DeviceQueue {
    type NativeProgram: Send + Sync;
    type NativeKernel: Send + Sync;

    /// Capability probe: can programs be compiled natively on this device?
    fn supports_native(&self) -> bool;

    fn compile_native(&self, name: &str, source: &str, options: &str) -> Result<Self::NativeProgram, QueueFault>;

    fn native_kernel(&self, program: &Self::NativeProgram, kernel: &str) -> Result<Self::NativeKernel, QueueFault>;

    fn launch_native(
        &self,
        kernel: &Self::NativeKernel,
        range: &LaunchRange,
        args: &KernelArguments<Self::Memory>,
    ) -> Result<(), QueueFault>;
}

/// The driver-interop compile/launch path.
pub trait InteropRuntime: DeviceQueue {
    /// Bridging state that exposes the queue's device/context to the interop
    /// runtime.
    type InteropContext: Send + Sync;
    type InteropProgram: Send + Sync;
    type InteropKernel: Send + Sync;

    fn create_interop_context(&self) -> Result<Self::InteropContext, QueueFault>;

    fn compile_interop(
        &self,
        context: &Self::InteropContext,
        name: &str,
        source: &str,
        options: &str,
    ) -> Result<Self::InteropProgram, QueueFault>;

    fn interop_kernel(&self, program: &Self::InteropProgram, kernel: &str) -> Result<Self::InteropKernel, QueueFault>;

    fn launch_interop(
        &self,
        kernel: &Self::InteropKernel,
        range: &LaunchRange,
        args: &KernelArguments<Self::Memory>,
    ) -> Result<(), QueueFault>;
}

/// Dense BLAS/LAPACK executors bound to the queue.
pub trait MathExecutor: DeviceQueue {
    fn gemm(
        &self,
        desc: &GemmDesc,
        a: &UniversalBuffer<Self::Memory>,
        b: &UniversalBuffer<Self::Memory>,
        c: &UniversalBuffer<Self::Memory>,
    ) -> Result<(), QueueFault>;

    fn syrk(
        &self,
        desc: &SyrkDesc,
        a: &UniversalBuffer<Self::Memory>,
        c: &UniversalBuffer<Self::Memory>,
    ) -> Result<(), QueueFault>;

    fn axpy(
        &self,
        desc: &AxpyDesc,
        x: &UniversalBuffer<Self::Memory>,
        y: &UniversalBuffer<Self::Memory>,
    ) -> Result<(), QueueFault>;

    fn potrf(&self, desc: &PotrfDesc, a: &UniversalBuffer<Self::Memory>) -> Result<(), QueueFault>;

    fn potrs(
        &self,
        desc: &PotrsDesc,
        a: &UniversalBuffer<Self::Memory>,
        b: &UniversalBuffer<Self::Memory>,
    ) -> Result<(), QueueFault>;
}

/// Everything an execution context needs from a queue.
pub trait ComputeQueue: NativeRuntime + InteropRuntime + MathExecutor {}

impl<T> ComputeQueue for T where T: NativeRuntime + InteropRuntime + MathExecutor {}
