//! Kernel artifacts: entry points extracted from a compiled program.

use std::fmt;
use std::sync::{Arc, Weak};

use kiln_core::{ExecError, ExecutionTarget, LaunchRange, Result};

use crate::backend::{Arguments, Backend, ComputeQueue};
use crate::program::{Program, ProgramArtifact, ProgramHandle};
use crate::scheduler::KernelScheduler;

/// Backend-native kernel handle. The variant always matches the variant of
/// the program it was extracted from.
pub enum KernelHandle<Q: ComputeQueue> {
    Native(Q::NativeKernel),
    Interop(Q::InteropKernel),
}

/// An entry point of a compiled program.
///
/// Owned by the factory's kernel cache and shared with callers through
/// [`Kernel`] handles.
pub struct KernelArtifact<Q: ComputeQueue> {
    name: String,
    program_name: String,
    program: Weak<ProgramArtifact<Q>>,
    target: ExecutionTarget,
    handle: KernelHandle<Q>,
}

/// Shared handle to a cached kernel.
pub type Kernel<Q> = Arc<KernelArtifact<Q>>;

impl<Q: ComputeQueue> KernelArtifact<Q> {
    /// Extract `kernel_name` from `program` through the backend the program
    /// was compiled with.
    pub(crate) fn extract(
        queue: &Q,
        program: &Program<Q>,
        kernel_name: &str,
        target: ExecutionTarget,
    ) -> Result<Self> {
        let not_found = |fault: kiln_core::QueueFault| ExecError::KernelNotFound {
            program: program.name().to_string(),
            kernel: kernel_name.to_string(),
            reason: fault.message,
        };

        let handle = match program.handle() {
            ProgramHandle::Native(p) => KernelHandle::Native(queue.native_kernel(p, kernel_name).map_err(not_found)?),
            ProgramHandle::Interop(p) => KernelHandle::Interop(queue.interop_kernel(p, kernel_name).map_err(not_found)?),
        };

        Ok(Self {
            name: kernel_name.to_string(),
            program_name: program.name().to_string(),
            program: Arc::downgrade(program),
            target,
            handle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program_name(&self) -> &str {
        &self.program_name
    }

    /// The owning program, while its cache entry is alive.
    pub fn program(&self) -> Option<Program<Q>> {
        self.program.upgrade()
    }

    /// Execution target the kernel's program was built for.
    pub fn target(&self) -> ExecutionTarget {
        self.target
    }

    pub fn backend(&self) -> Backend {
        match self.handle {
            KernelHandle::Native(_) => Backend::Native,
            KernelHandle::Interop(_) => Backend::Interop,
        }
    }

    pub fn handle(&self) -> &KernelHandle<Q> {
        &self.handle
    }

    /// Submit this kernel through the scheduler path of its own backend.
    pub fn schedule(
        &self,
        scheduler: &KernelScheduler<Q>,
        range: &LaunchRange,
        args: &Arguments<Q>,
    ) -> Result<()> {
        tracing::trace!(
            "launch {}::{} via {} over {:?}",
            self.program_name,
            self.name,
            self.backend(),
            range
        );
        let submitted = match &self.handle {
            KernelHandle::Native(k) => scheduler.schedule_native(k, range, args),
            KernelHandle::Interop(k) => scheduler.schedule_interop(k, range, args),
        };
        submitted.map_err(ExecError::from)
    }
}

impl<Q: ComputeQueue> fmt::Debug for KernelArtifact<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelArtifact")
            .field("program", &self.program_name)
            .field("name", &self.name)
            .field("backend", &self.backend())
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
