//! Kernel factory: compile-or-fetch for programs and kernels.
//!
//! On a program cache miss the factory probes the device, compiles through
//! the native backend when it is supported and through the interop backend
//! otherwise, and caches the result under the program name. Kernels are
//! extracted with the backend of their program and cached under
//! `(program, kernel)`.
//!
//! All cache mutation, compilation and the one-time interop context setup
//! happen under a single per-factory mutex, so concurrent callers never
//! compile the same key twice.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use kiln_core::{ExecError, ExecutionTarget, QueueFault, Result};

use crate::backend::{Backend, ComputeQueue};
use crate::cache::{ArtifactCache, KernelKey};
use crate::config::ExecConfig;
use crate::kernel::{Kernel, KernelArtifact};
use crate::program::{Program, ProgramArtifact, ProgramHandle};

/// Non-owning reference to the most recently built program.
struct CurrentProgram<Q: ComputeQueue> {
    program: Weak<ProgramArtifact<Q>>,
    target: ExecutionTarget,
}

struct FactoryState<Q: ComputeQueue> {
    programs: ArtifactCache<String, ProgramArtifact<Q>>,
    kernels: ArtifactCache<KernelKey, KernelArtifact<Q>>,
    current: Option<CurrentProgram<Q>>,
    interop: Option<Arc<Q::InteropContext>>,
}

/// Compiles and caches programs and kernels for one device queue.
pub struct KernelFactory<Q: ComputeQueue> {
    queue: Arc<Q>,
    interop_enabled: bool,
    state: Mutex<FactoryState<Q>>,
}

impl<Q: ComputeQueue> KernelFactory<Q> {
    pub fn new(queue: Arc<Q>, config: &ExecConfig) -> Self {
        Self {
            queue,
            interop_enabled: config.interop_enabled,
            state: Mutex::new(FactoryState {
                programs: ArtifactCache::new("program", config.program_cache_capacity),
                kernels: ArtifactCache::new("kernel", config.kernel_cache_capacity),
                current: None,
                interop: None,
            }),
        }
    }

    /// Build program `name` from `source`, or fetch it if already cached.
    ///
    /// A cached name is a no-op apart from making it the current program
    /// and recording `target`; the cached source is not compared against
    /// `source`. A failed build leaves the caches untouched.
    pub fn build(&self, target: ExecutionTarget, name: &str, source: &str, options: &str) -> Result<Program<Q>> {
        let mut state = self.state.lock();

        if state.programs.contains(name) {
            let program = state.programs.get(name)?;
            tracing::debug!("program '{}' cache hit ({})", name, program.backend());
            state.current = Some(CurrentProgram { program: Arc::downgrade(&program), target });
            return Ok(program);
        }

        if state.programs.len() >= state.programs.capacity() {
            return Err(ExecError::CapacityExceeded {
                table: "program",
                capacity: state.programs.capacity(),
            });
        }

        tracing::debug!("program '{}' cache miss, compiling for target {}", name, target);
        let handle = self.compile(&mut state, name, source, options)?;
        let program = Arc::new(ProgramArtifact::new(name, source, options, target, handle));
        let program = state.programs.insert(name.to_string(), program)?;
        state.current = Some(CurrentProgram { program: Arc::downgrade(&program), target });
        Ok(program)
    }

    /// Fetch or extract `kernel_name` from the current program.
    pub fn get_kernel(&self, kernel_name: &str) -> Result<Kernel<Q>> {
        let mut state = self.state.lock();
        let (program, target) = match &state.current {
            Some(current) => (
                current.program.upgrade().ok_or(ExecError::NoActiveProgram)?,
                current.target,
            ),
            None => return Err(ExecError::NoActiveProgram),
        };
        self.kernel_locked(&mut state, &program, kernel_name, target)
    }

    /// Fetch or extract `kernel_name` from an explicit program handle.
    ///
    /// The program must have been built by this factory. The kernel is
    /// stamped with the target recorded by the most recent `build`, the same
    /// target [`get_kernel`](Self::get_kernel) uses.
    pub fn kernel(&self, program: &Program<Q>, kernel_name: &str) -> Result<Kernel<Q>> {
        let mut state = self.state.lock();
        let cached = state.programs.get(program.name())?;
        if !Arc::ptr_eq(&cached, program) {
            return Err(ExecError::NotFound {
                key: program.name().to_string(),
            });
        }
        let target = state.current.as_ref().map_or(program.target(), |c| c.target);
        self.kernel_locked(&mut state, program, kernel_name, target)
    }

    /// Number of cached programs.
    pub fn program_count(&self) -> usize {
        self.state.lock().programs.len()
    }

    /// Number of cached kernels.
    pub fn kernel_count(&self) -> usize {
        self.state.lock().kernels.len()
    }

    pub fn contains_program(&self, name: &str) -> bool {
        self.state.lock().programs.contains(name)
    }

    /// The program the next [`get_kernel`](Self::get_kernel) call resolves
    /// against.
    pub fn current_program(&self) -> Option<Program<Q>> {
        self.state.lock().current.as_ref().and_then(|c| c.program.upgrade())
    }

    /// Whether the interop context has been created.
    pub fn has_interop_context(&self) -> bool {
        self.state.lock().interop.is_some()
    }

    pub fn queue(&self) -> &Arc<Q> {
        &self.queue
    }

    fn compile(
        &self,
        state: &mut FactoryState<Q>,
        name: &str,
        source: &str,
        options: &str,
    ) -> Result<ProgramHandle<Q>> {
        let backend = if !self.interop_enabled || self.queue.supports_native() {
            Backend::Native
        } else {
            Backend::Interop
        };

        match backend {
            Backend::Native => {
                let program = self
                    .queue
                    .compile_native(name, source, options)
                    .map_err(|fault| build_failure(name, backend, fault))?;
                Ok(ProgramHandle::Native(program))
            }
            Backend::Interop => {
                let context = self.interop_context(state)?;
                let program = self
                    .queue
                    .compile_interop(&context, name, source, options)
                    .map_err(|fault| build_failure(name, backend, fault))?;
                Ok(ProgramHandle::Interop(program))
            }
        }
    }

    fn interop_context(&self, state: &mut FactoryState<Q>) -> Result<Arc<Q::InteropContext>> {
        if let Some(context) = &state.interop {
            return Ok(Arc::clone(context));
        }
        let context = Arc::new(self.queue.create_interop_context()?);
        tracing::info!("native compilation unavailable on this device, created interop context");
        state.interop = Some(Arc::clone(&context));
        Ok(context)
    }

    fn kernel_locked(
        &self,
        state: &mut FactoryState<Q>,
        program: &Program<Q>,
        kernel_name: &str,
        target: ExecutionTarget,
    ) -> Result<Kernel<Q>> {
        let key = KernelKey::new(program.name(), kernel_name);
        if state.kernels.contains(&key) {
            tracing::debug!("kernel '{}' cache hit", key);
            return state.kernels.get(&key);
        }

        let artifact = KernelArtifact::extract(self.queue.as_ref(), program, kernel_name, target)?;
        tracing::debug!("kernel '{}' extracted via {}", key, artifact.backend());
        state.kernels.insert(key, Arc::new(artifact))
    }
}

fn build_failure(name: &str, backend: Backend, fault: QueueFault) -> ExecError {
    tracing::warn!("{} build of program '{}' failed: {}", backend, name, fault);
    ExecError::from_build_fault(name, fault)
}

impl<Q: ComputeQueue> fmt::Debug for KernelFactory<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("KernelFactory")
            .field("programs", &state.programs)
            .field("kernels", &state.kernels)
            .field("interop_enabled", &self.interop_enabled)
            .field("has_interop_context", &state.interop.is_some())
            .finish()
    }
}
