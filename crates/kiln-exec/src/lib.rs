//! # kiln-exec
//!
//! Program/kernel caching and dispatch over a single device queue.
//!
//! Provides:
//! - Fixed-capacity program and kernel caches
//! - A kernel factory that picks the native or interop backend per program
//! - Launch validation and submission through the program's backend
//! - An execution context wrapping launches, BLAS/LAPACK calls and memory ops
//! - A host reference queue implementing every backend seam

pub mod backend;
pub mod cache;
pub mod config;
pub mod program;
pub mod kernel;
pub mod scheduler;
pub mod factory;
pub mod context;
pub mod host;

pub use backend::{
    Arguments, Backend, Buffer, ComputeQueue, DeviceQueue, InteropRuntime, MathExecutor, NativeRuntime,
};
pub use cache::{ArtifactCache, KernelKey};
pub use config::ExecConfig;
pub use context::ExecutionContext;
pub use factory::KernelFactory;
pub use host::{HostQueue, HostStats};
pub use kernel::{Kernel, KernelArtifact, KernelHandle};
pub use program::{Program, ProgramArtifact, ProgramHandle};
pub use scheduler::KernelScheduler;
