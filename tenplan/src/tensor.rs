use std::sync::atomic::{AtomicU64, Ordering};

use crate::{
    dtype::DType,
    operator::OpId,
    runtime::Blob,
    shape::{numel, Dim},
    slab::SlabId,
};

static NEXT_FUID: AtomicU64 = AtomicU64::new(1);

/// Slot of a tensor in its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TensorId(u32);

impl SlabId for TensorId {}

impl From<usize> for TensorId {
    fn from(value: usize) -> Self {
        TensorId(u32::try_from(value).expect("more than u32::MAX tensors"))
    }
}

impl From<TensorId> for usize {
    fn from(value: TensorId) -> Self {
        value.0 as usize
    }
}

impl core::fmt::Display for TensorId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("t{}", self.0))
    }
}

/// Value in the graph. Pure metadata until the memory plan binds a blob to it.
#[derive(Debug, Clone)]
pub struct Tensor {
    fuid: u64,
    shape: Vec<Dim>,
    dtype: DType,
    // None for graph inputs
    pub(crate) source: Option<OpId>,
    // Unordered, no duplicates
    pub(crate) targets: Vec<OpId>,
    pub(crate) data: Option<Blob>,
}

impl Tensor {
    pub(crate) fn new(shape: Vec<Dim>, dtype: DType) -> Tensor {
        Tensor {
            fuid: NEXT_FUID.fetch_add(1, Ordering::Relaxed),
            shape,
            dtype,
            source: None,
            targets: Vec::new(),
            data: None,
        }
    }

    /// Process unique id, stable across rewrites
    #[must_use]
    pub const fn fuid(&self) -> u64 {
        self.fuid
    }

    #[must_use]
    pub fn shape(&self) -> &[Dim] {
        &self.shape
    }

    pub(crate) fn set_shape(&mut self, shape: Vec<Dim>) {
        self.shape = shape;
    }

    #[must_use]
    pub const fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    #[must_use]
    pub fn numel(&self) -> usize {
        numel(&self.shape)
    }

    #[must_use]
    pub fn bytes(&self) -> usize {
        self.numel() * self.dtype.byte_size()
    }

    /// Producing operator, None for graph inputs
    #[must_use]
    pub const fn source(&self) -> Option<OpId> {
        self.source
    }

    /// Consuming operators
    #[must_use]
    pub fn targets(&self) -> &[OpId] {
        &self.targets
    }

    /// Storage bound by the memory plan
    #[must_use]
    pub const fn data(&self) -> Option<Blob> {
        self.data
    }

    pub(crate) fn add_target(&mut self, op: OpId) {
        if !self.targets.contains(&op) {
            self.targets.push(op);
        }
    }

    pub(crate) fn remove_target(&mut self, op: OpId) {
        self.targets.retain(|&t| t != op);
    }
}

impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        self.fuid == other.fuid
    }
}

impl Eq for Tensor {}

impl core::fmt::Display for Tensor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("Tensor {}, shape {:?}, dtype {}", self.fuid, self.shape, self.dtype))?;
        if let Some(blob) = self.data {
            f.write_fmt(format_args!(", data {:#x}", blob.address()))?;
        }
        Ok(())
    }
}
