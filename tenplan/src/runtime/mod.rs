//! Boundary with the physical memory backend.
//! The planner only ever asks for one buffer per graph, sized once all
//! tensor offsets are known, and binds tensors to `base + offset`.

use crate::error::BackendError;

mod dummy;

pub use dummy::{DummyConfig, DummyRuntime};

/// Opaque base address of a buffer returned by a runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferHandle(pub u64);

/// Storage bound to a tensor, a range inside the graph's arena buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blob {
    /// Arena buffer
    pub base: BufferHandle,
    /// Offset of the tensor within the arena
    pub offset: usize,
    /// Number of bytes reserved for the tensor
    pub bytes: usize,
}

impl Blob {
    /// `base + offset`
    #[must_use]
    pub const fn address(&self) -> u64 {
        self.base.0 + self.offset as u64
    }

    /// Byte range within the arena
    #[must_use]
    pub const fn range(&self) -> core::ops::Range<usize> {
        self.offset..self.offset + self.bytes
    }
}

/// Device memory provider.
pub trait Runtime: core::fmt::Debug {
    /// Returns handle to at least `bytes` contiguous bytes
    fn allocate(&mut self, bytes: usize) -> Result<BufferHandle, BackendError>;

    /// Called at most once per handle
    fn release(&mut self, buffer: BufferHandle) -> Result<(), BackendError>;

    fn free_bytes(&self) -> usize;

    /// Copy `src` into `dst` starting at `offset` bytes
    fn host_to_pool(
        &mut self,
        src: &[u8],
        dst: BufferHandle,
        offset: usize,
    ) -> Result<(), BackendError>;

    /// Copy `dst.len()` bytes from `src` starting at `offset` bytes
    fn pool_to_host(
        &mut self,
        src: BufferHandle,
        offset: usize,
        dst: &mut [u8],
    ) -> Result<(), BackendError>;
}
