use std::sync::atomic::{AtomicU64, Ordering};

use crate::{ops::OpKind, slab::SlabId, tensor::TensorId};

static NEXT_GUID: AtomicU64 = AtomicU64::new(1);

/// Slot of an operator in its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpId(u32);

impl SlabId for OpId {}

impl From<usize> for OpId {
    fn from(value: usize) -> Self {
        OpId(u32::try_from(value).expect("more than u32::MAX operators"))
    }
}

impl From<OpId> for usize {
    fn from(value: OpId) -> Self {
        value.0 as usize
    }
}

impl core::fmt::Display for OpId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("op{}", self.0))
    }
}

/// Computation node. Edges to other operators are derived from shared tensors.
#[derive(Debug, Clone)]
pub struct Operator {
    guid: u64,
    pub(crate) kind: OpKind,
    pub(crate) inputs: Vec<TensorId>,
    pub(crate) outputs: Vec<TensorId>,
    // One entry per distinct producer of an input
    pub(crate) predecessors: Vec<OpId>,
    // One entry per distinct consumer of an output
    pub(crate) successors: Vec<OpId>,
}

impl Operator {
    pub(crate) fn new(kind: OpKind, inputs: Vec<TensorId>, outputs: Vec<TensorId>) -> Operator {
        Operator {
            guid: NEXT_GUID.fetch_add(1, Ordering::Relaxed),
            kind,
            inputs,
            outputs,
            predecessors: Vec::new(),
            successors: Vec::new(),
        }
    }

    #[must_use]
    pub const fn guid(&self) -> u64 {
        self.guid
    }

    #[must_use]
    pub const fn kind(&self) -> &OpKind {
        &self.kind
    }

    #[must_use]
    pub fn inputs(&self) -> &[TensorId] {
        &self.inputs
    }

    #[must_use]
    pub fn outputs(&self) -> &[TensorId] {
        &self.outputs
    }

    #[must_use]
    pub fn predecessors(&self) -> &[OpId] {
        &self.predecessors
    }

    #[must_use]
    pub fn successors(&self) -> &[OpId] {
        &self.successors
    }

    pub(crate) fn add_predecessor(&mut self, op: OpId) {
        if !self.predecessors.contains(&op) {
            self.predecessors.push(op);
        }
    }

    pub(crate) fn add_successor(&mut self, op: OpId) {
        if !self.successors.contains(&op) {
            self.successors.push(op);
        }
    }
}

impl PartialEq for Operator {
    fn eq(&self, other: &Self) -> bool {
        self.guid == other.guid
    }
}

impl Eq for Operator {}

impl core::fmt::Display for Operator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!(
            "OP {}, {}, input {:?}, output {:?}",
            self.guid, self.kind, self.inputs, self.outputs
        ))
    }
}
