//! # kiln-core
//!
//! Device-agnostic vocabulary for the Kiln execution layer.
//!
//! Provides:
//! - Element types (`DType`, `Element`) and typed host storage (`TypedVec`)
//! - Typed device buffers over a backend memory handle
//! - Launch ranges and kernel arguments
//! - Device capability snapshots and execution targets
//! - BLAS/LAPACK operand descriptors
//! - The error taxonomy and backend fault-code mapping

pub mod dtype;
pub mod buffer;
pub mod range;
pub mod args;
pub mod device;
pub mod math;
pub mod error;

pub use dtype::{DType, Element, TypedVec};
pub use buffer::UniversalBuffer;
pub use range::{KernelNdRange, KernelRange, LaunchRange};
pub use args::{AccessMode, KernelArg, KernelArguments, Scalar};
pub use device::{DeviceClass, DeviceInfo, ExecutionTarget};
pub use math::{AxpyDesc, GemmDesc, PotrfDesc, PotrsDesc, SyrkDesc, Transpose, UpLo};
pub use error::{codes, ExecError, FaultKind, QueueFault};

pub type Result<T> = std::result::Result<T, ExecError>;
