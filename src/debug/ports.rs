use std::collections::BTreeSet;

use crate::debug::pod::PodSpec;

/// Lowest port the allocator will hand out; the range below is reserved.
const FIRST_ALLOCATABLE: u32 = 1024;
const LAST_ALLOCATABLE: u32 = 65535;

/// Hands out collision-free container ports within one pod.
///
/// Seeded with every port already declared by the pod's containers; each
/// allocation is recorded so later calls on the same pod never return the
/// same value twice. Allocation is biased toward the caller's desired port,
/// scanning upward and wrapping past 65535 back to 1024.
#[derive(Debug)]
pub struct PortAllocator {
    taken: BTreeSet<u32>,
}

impl PortAllocator {
    pub fn new<I: IntoIterator<Item = u32>>(declared: I) -> Self {
        Self {
            taken: declared.into_iter().collect(),
        }
    }

    /// Seed from every `containerPort` declared in the pod spec.
    pub fn for_pod(spec: &PodSpec) -> Self {
        let declared = spec
            .containers
            .iter()
            .chain(spec.init_containers.iter().flatten())
            .flat_map(|c| c.ports.iter().flatten())
            .map(|p| p.container_port);
        Self::new(declared)
    }

    /// Return `desired` when free, otherwise the next free port upward,
    /// wrapping around to 1024 past the end of the range.
    pub fn allocate(&mut self, desired: u32) -> u32 {
        let start = desired.clamp(FIRST_ALLOCATABLE, LAST_ALLOCATABLE);
        let mut port = start;
        loop {
            if self.taken.insert(port) {
                return port;
            }
            port = if port >= LAST_ALLOCATABLE {
                FIRST_ALLOCATABLE
            } else {
                port + 1
            };
            if port == start {
                // Every port in the range is taken; callers only ever
                // allocate a handful per pod, so this is unreachable in
                // practice.
                return desired;
            }
        }
    }

    /// Mark a port as in use without allocating it, e.g. when reusing a
    /// port from an existing debug flag.
    pub fn reserve(&mut self, port: u32) {
        self.taken.insert(port);
    }
}
