//! Launch submission for both backends.

use std::fmt;
use std::sync::Arc;

use kiln_core::{codes, DeviceInfo, LaunchRange, QueueFault};

use crate::backend::{Arguments, ComputeQueue};

/// Validates launch ranges against the device and submits them through the
/// backend the kernel was built for.
pub struct KernelScheduler<Q: ComputeQueue> {
    queue: Arc<Q>,
    info: DeviceInfo,
}

impl<Q: ComputeQueue> KernelScheduler<Q> {
    pub fn new(queue: Arc<Q>, info: DeviceInfo) -> Self {
        Self { queue, info }
    }

    pub fn schedule_native(
        &self,
        kernel: &Q::NativeKernel,
        range: &LaunchRange,
        args: &Arguments<Q>,
    ) -> Result<(), QueueFault> {
        validate_range(range, &self.info)?;
        self.queue.launch_native(kernel, range, args)
    }

    pub fn schedule_interop(
        &self,
        kernel: &Q::InteropKernel,
        range: &LaunchRange,
        args: &Arguments<Q>,
    ) -> Result<(), QueueFault> {
        validate_range(range, &self.info)?;
        self.queue.launch_interop(kernel, range, args)
    }
}

impl<Q: ComputeQueue> fmt::Debug for KernelScheduler<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelScheduler").field("info", &self.info).finish_non_exhaustive()
    }
}

/// Check a launch shape against the device limits.
pub fn validate_range(range: &LaunchRange, info: &DeviceInfo) -> Result<(), QueueFault> {
    let global = range.global();
    if global.iter().any(|&g| g == 0) {
        return Err(QueueFault::new(
            codes::INVALID_WORK_DIMENSION,
            format!("global range {:?} has an empty dimension", &global[..range.dims()]),
        ));
    }

    if let LaunchRange::NdRange(nd) = range {
        let local = nd.local();
        if local.iter().any(|&l| l == 0) {
            return Err(QueueFault::new(
                codes::INVALID_WORK_GROUP_SIZE,
                format!("local range {:?} has an empty dimension", &local[..nd.dims()]),
            ));
        }
        if let Some(d) = (0..3).find(|&d| global[d] % local[d] != 0) {
            return Err(QueueFault::new(
                codes::INVALID_WORK_GROUP_SIZE,
                format!(
                    "global size {} is not a multiple of local size {} in dimension {}",
                    global[d], local[d], d
                ),
            ));
        }
        if nd.local_size() > info.max_work_group_size {
            return Err(QueueFault::new(
                codes::INVALID_WORK_GROUP_SIZE,
                format!(
                    "work-group size {} exceeds device maximum {}",
                    nd.local_size(),
                    info.max_work_group_size
                ),
            ));
        }
    }
    Ok(())
}
