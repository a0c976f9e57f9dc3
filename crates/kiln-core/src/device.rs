use std::fmt;

use serde::{Deserialize, Serialize};

/// Broad class of the device behind a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    /// General-purpose processor (CPU or host device).
    Cpu,
    /// Accelerator (GPU and friends).
    Accelerator,
}

/// Snapshot of queue/device capability, captured once per execution context.
///
/// Call sites use it to size work partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub class: DeviceClass,
    pub max_work_group_size: usize,
}

impl DeviceInfo {
    pub fn is_cpu(&self) -> bool {
        matches!(self.class, DeviceClass::Cpu)
    }
}

/// Device class a program was compiled/optimized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExecutionTarget {
    #[default]
    Unspecified,
    Cpu,
    Gpu,
}

impl fmt::Display for ExecutionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionTarget::Unspecified => write!(f, "unspecified"),
            ExecutionTarget::Cpu => write!(f, "cpu"),
            ExecutionTarget::Gpu => write!(f, "gpu"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_info() {
        let info = DeviceInfo { class: DeviceClass::Cpu, max_work_group_size: 256 };
        assert!(info.is_cpu());
        let gpu = DeviceInfo { class: DeviceClass::Accelerator, ..info };
        assert!(!gpu.is_cpu());
    }

    #[test]
    fn test_target_default() {
        assert_eq!(ExecutionTarget::default(), ExecutionTarget::Unspecified);
        assert_eq!(format!("{}", ExecutionTarget::Gpu), "gpu");
    }
}
