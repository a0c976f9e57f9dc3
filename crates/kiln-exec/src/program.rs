//! Compiled program artifacts.

use std::fmt;
use std::sync::Arc;

use kiln_core::ExecutionTarget;

use crate::backend::{Backend, ComputeQueue};

/// Backend-native program handle, tagged with the backend that produced it.
pub enum ProgramHandle<Q: ComputeQueue> {
    Native(Q::NativeProgram),
    Interop(Q::InteropProgram),
}

impl<Q: ComputeQueue> ProgramHandle<Q> {
    pub fn backend(&self) -> Backend {
        match self {
            ProgramHandle::Native(_) => Backend::Native,
            ProgramHandle::Interop(_) => Backend::Interop,
        }
    }
}

/// A compiled unit of device code, identified by name.
///
/// Immutable once created and owned by the factory's program cache; callers
/// receive shared [`Program`] handles.
pub struct ProgramArtifact<Q: ComputeQueue> {
    name: String,
    source: String,
    options: String,
    target: ExecutionTarget,
    handle: ProgramHandle<Q>,
}

/// Shared handle to a cached program.
pub type Program<Q> = Arc<ProgramArtifact<Q>>;

impl<Q: ComputeQueue> ProgramArtifact<Q> {
    pub(crate) fn new(
        name: &str,
        source: &str,
        options: &str,
        target: ExecutionTarget,
        handle: ProgramHandle<Q>,
    ) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            options: options.to_string(),
            target,
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source text the program was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Build options the program was compiled with.
    pub fn options(&self) -> &str {
        &self.options
    }

    /// Execution target requested by the first successful build.
    pub fn target(&self) -> ExecutionTarget {
        self.target
    }

    pub fn backend(&self) -> Backend {
        self.handle.backend()
    }

    pub fn handle(&self) -> &ProgramHandle<Q> {
        &self.handle
    }
}

impl<Q: ComputeQueue> fmt::Debug for ProgramArtifact<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramArtifact")
            .field("name", &self.name)
            .field("backend", &self.backend())
            .field("target", &self.target)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
