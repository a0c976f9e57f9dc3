//! Launch index spaces.

/// A 1-D launch over `global` work items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelRange {
    pub global: usize,
}

impl KernelRange {
    pub fn new(global: usize) -> Self {
        Self { global }
    }
}

/// An N-D launch (1 to 3 dimensions) with an explicit work-group shape.
///
/// Unused trailing dimensions are 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelNdRange {
    dims: usize,
    global: [usize; 3],
    local: [usize; 3],
}

impl KernelNdRange {
    /// 1-D range with a work-group size.
    pub fn d1(global: usize, local: usize) -> Self {
        Self { dims: 1, global: [global, 1, 1], local: [local, 1, 1] }
    }

    /// 2-D range.
    pub fn d2(global: [usize; 2], local: [usize; 2]) -> Self {
        Self {
            dims: 2,
            global: [global[0], global[1], 1],
            local: [local[0], local[1], 1],
        }
    }

    /// 3-D range.
    pub fn d3(global: [usize; 3], local: [usize; 3]) -> Self {
        Self { dims: 3, global, local }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn global(&self) -> [usize; 3] {
        self.global
    }

    pub fn local(&self) -> [usize; 3] {
        self.local
    }

    /// Work items per group.
    pub fn local_size(&self) -> usize {
        self.local.iter().product()
    }

    /// Work groups per dimension. Only meaningful once the range is valid.
    pub fn groups(&self) -> [usize; 3] {
        let mut groups = [1; 3];
        for d in 0..3 {
            if self.local[d] != 0 {
                groups[d] = self.global[d] / self.local[d];
            }
        }
        groups
    }
}

/// Either launch shape, as handed to a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchRange {
    Range(KernelRange),
    NdRange(KernelNdRange),
}

impl LaunchRange {
    /// Global work-item count per dimension.
    pub fn global(&self) -> [usize; 3] {
        match self {
            LaunchRange::Range(r) => [r.global, 1, 1],
            LaunchRange::NdRange(r) => r.global(),
        }
    }

    /// Total number of work items.
    pub fn global_size(&self) -> usize {
        self.global().iter().product()
    }

    pub fn dims(&self) -> usize {
        match self {
            LaunchRange::Range(_) => 1,
            LaunchRange::NdRange(r) => r.dims(),
        }
    }
}

impl From<KernelRange> for LaunchRange {
    fn from(range: KernelRange) -> Self {
        LaunchRange::Range(range)
    }
}

impl From<KernelNdRange> for LaunchRange {
    fn from(range: KernelNdRange) -> Self {
        LaunchRange::NdRange(range)
    }
}
