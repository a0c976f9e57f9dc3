//! Error taxonomy of the execution layer and the mapping from backend-native
//! fault codes onto it.

use std::fmt;

/// Backend-native fault codes.
///
/// The numbering follows the OpenCL status codes so that real device queues
/// can forward their native code unchanged; values below -1000 are
/// extensions used by the math executors.
pub mod codes {
    pub const DEVICE_NOT_AVAILABLE: i32 = -2;
    pub const MEM_OBJECT_ALLOCATION_FAILURE: i32 = -4;
    pub const OUT_OF_RESOURCES: i32 = -5;
    pub const OUT_OF_HOST_MEMORY: i32 = -6;
    pub const BUILD_PROGRAM_FAILURE: i32 = -11;
    pub const INVALID_VALUE: i32 = -30;
    pub const INVALID_DEVICE: i32 = -33;
    pub const INVALID_COMMAND_QUEUE: i32 = -36;
    pub const INVALID_BUILD_OPTIONS: i32 = -43;
    pub const INVALID_KERNEL_NAME: i32 = -46;
    pub const INVALID_ARG_INDEX: i32 = -49;
    pub const INVALID_ARG_VALUE: i32 = -50;
    pub const INVALID_KERNEL_ARGS: i32 = -52;
    pub const INVALID_WORK_DIMENSION: i32 = -53;
    pub const INVALID_WORK_GROUP_SIZE: i32 = -54;
    pub const INVALID_OPERATION: i32 = -59;
    pub const INVALID_BUFFER_SIZE: i32 = -61;
    pub const NOT_POSITIVE_DEFINITE: i32 = -1001;
    pub const UNSUPPORTED_TYPE: i32 = -1002;
}

/// Category of a backend fault after mapping its native code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    OutOfMemory,
    DeviceUnavailable,
    Compilation,
    NotFound,
    InvalidArgument,
    OutOfRange,
    Numerical,
    Unsupported,
    Runtime,
}

impl FaultKind {
    /// Map a backend-native fault code onto a fault category.
    pub fn from_code(code: i32) -> Self {
        use self::codes::*;
        match code {
            MEM_OBJECT_ALLOCATION_FAILURE | OUT_OF_RESOURCES | OUT_OF_HOST_MEMORY => FaultKind::OutOfMemory,
            DEVICE_NOT_AVAILABLE | INVALID_DEVICE | INVALID_COMMAND_QUEUE => FaultKind::DeviceUnavailable,
            BUILD_PROGRAM_FAILURE | INVALID_BUILD_OPTIONS => FaultKind::Compilation,
            INVALID_KERNEL_NAME => FaultKind::NotFound,
            INVALID_VALUE | INVALID_ARG_INDEX | INVALID_ARG_VALUE | INVALID_KERNEL_ARGS
            | INVALID_WORK_DIMENSION | INVALID_WORK_GROUP_SIZE => FaultKind::InvalidArgument,
            INVALID_BUFFER_SIZE => FaultKind::OutOfRange,
            NOT_POSITIVE_DEFINITE => FaultKind::Numerical,
            UNSUPPORTED_TYPE => FaultKind::Unsupported,
            _ => FaultKind::Runtime,
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::OutOfMemory => "out of memory",
            FaultKind::DeviceUnavailable => "device unavailable",
            FaultKind::Compilation => "compilation",
            FaultKind::NotFound => "not found",
            FaultKind::InvalidArgument => "invalid argument",
            FaultKind::OutOfRange => "out of range",
            FaultKind::Numerical => "numerical",
            FaultKind::Unsupported => "unsupported",
            FaultKind::Runtime => "runtime",
        };
        f.write_str(name)
    }
}

/// A fault raised by a device queue, carrying the backend-native code and
/// diagnostic text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("queue fault {code}: {message}")]
pub struct QueueFault {
    pub code: i32,
    pub message: String,
}

impl QueueFault {
    pub fn new<S: Into<String>>(code: i32, message: S) -> Self {
        Self { code, message: message.into() }
    }

    pub fn kind(&self) -> FaultKind {
        FaultKind::from_code(self.code)
    }
}

/// Errors reported by every public operation of the execution layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecError {
    #[error("no cache entry for key '{key}'")]
    NotFound { key: String },

    #[error("{table} cache is full (capacity {capacity})")]
    CapacityExceeded { table: &'static str, capacity: usize },

    #[error("failed to build program '{program}': {log}")]
    BuildError { program: String, log: String },

    #[error("no program has been built by this kernel factory")]
    NoActiveProgram,

    #[error("kernel '{kernel}' not found in program '{program}': {reason}")]
    KernelNotFound { program: String, kernel: String, reason: String },

    #[error("backend fault ({kind}, code {code}): {message}")]
    BackendFault { kind: FaultKind, code: i32, message: String },

    #[error("invalid execution config: {0}")]
    InvalidConfig(String),
}

impl ExecError {
    /// Convert a fault raised while compiling `program`.
    ///
    /// Compilation faults become [`ExecError::BuildError`] with the backend
    /// log; anything else goes through the regular fault mapping.
    pub fn from_build_fault(program: &str, fault: QueueFault) -> Self {
        match fault.kind() {
            FaultKind::Compilation => ExecError::BuildError {
                program: program.to_string(),
                log: fault.message,
            },
            _ => fault.into(),
        }
    }

    /// The fault category, if this is a backend fault.
    pub fn fault_kind(&self) -> Option<FaultKind> {
        match self {
            ExecError::BackendFault { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<QueueFault> for ExecError {
    fn from(fault: QueueFault) -> Self {
        ExecError::BackendFault {
            kind: fault.kind(),
            code: fault.code,
            message: fault.message,
        }
    }
}
