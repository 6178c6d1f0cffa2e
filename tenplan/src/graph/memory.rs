//! Memory plan. Every tensor gets an offset in one arena, then the arena is
//! materialized and each tensor is bound to `base + offset`.

use std::collections::BTreeMap;

use super::Graph;
use crate::{error::PlanError, runtime::Blob, tensor::TensorId};

/// Steps of the execution order during which a tensor must stay allocated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveRange {
    pub tensor: TensorId,
    /// Step of the producing operator, 0 for graph inputs
    pub first: usize,
    /// Step of the last consumer, number of steps if the tensor is never
    /// released (graph inputs and outputs)
    pub last: usize,
}

impl Graph {
    /// Live range of every tensor, in tensor insertion order.
    /// Graph must be sorted.
    pub fn live_ranges(&self) -> Result<Vec<LiveRange>, PlanError> {
        let order = self.execution_order()?;
        let steps: BTreeMap<_, usize> = order.iter().enumerate().map(|(i, &op)| (op, i)).collect();
        let end = order.len();
        let mut ranges = Vec::with_capacity(self.tensor_order.len());
        for &t in &self.tensor_order {
            let tensor = &self.tensors[t];
            let range = match tensor.source() {
                Some(src) if !tensor.targets().is_empty() => LiveRange {
                    tensor: t,
                    first: steps[&src],
                    last: tensor.targets().iter().map(|op| steps[op]).max().unwrap_or(end),
                },
                Some(src) => LiveRange { tensor: t, first: steps[&src], last: end },
                None => LiveRange { tensor: t, first: 0, last: end },
            };
            ranges.push(range);
        }
        Ok(ranges)
    }

    /// Plans and binds storage of all tensors. Sorts the graph first.
    /// Can be called only once per graph, the arena can not be replanned.
    pub fn data_malloc(&mut self) -> Result<(), PlanError> {
        if self.allocator.is_materialized() {
            return Err(PlanError::PostBindAllocation);
        }
        if !self.topo_sort() {
            return Err(PlanError::CyclicGraph);
        }
        let over_allocation = self.config.over_allocation();
        let sizes: BTreeMap<TensorId, usize> = self
            .tensor_order
            .iter()
            .map(|&t| (t, self.tensors[t].bytes() * over_allocation))
            .collect();
        let mut offsets: BTreeMap<TensorId, usize> = BTreeMap::new();
        if self.config.reuse_memory {
            let ranges = self.live_ranges()?;
            // Graph inputs stay allocated for the whole run
            for range in ranges.iter().filter(|r| self.tensors[r.tensor].source().is_none()) {
                offsets.insert(range.tensor, self.allocator.alloc(sizes[&range.tensor])?);
            }
            let last: BTreeMap<TensorId, usize> = ranges.iter().map(|r| (r.tensor, r.last)).collect();
            for (step, op) in self.op_order.clone().into_iter().enumerate() {
                for &y in &self.ops[op].outputs {
                    offsets.insert(y, self.allocator.alloc(sizes[&y])?);
                }
                let mut freed = Vec::new();
                for &x in &self.ops[op].inputs {
                    if self.tensors[x].source().is_some() && last[&x] == step && !freed.contains(&x) {
                        self.allocator.free(offsets[&x], sizes[&x])?;
                        freed.push(x);
                    }
                }
            }
        } else {
            for &t in &self.tensor_order {
                offsets.insert(t, self.allocator.alloc(sizes[&t])?);
            }
        }
        let base = self.allocator.materialize()?;
        for (t, offset) in offsets {
            let bytes = self.allocator.aligned_size(sizes[&t]);
            self.tensors[t].data = Some(Blob { base, offset, bytes });
        }
        if self.debug.mem() {
            println!("{}", self.allocator.info());
            for &t in &self.tensor_order {
                println!("{}", self.tensors[t]);
            }
        }
        Ok(())
    }

    fn bound_blob(&self, t: TensorId, len: usize) -> Result<Blob, PlanError> {
        let tensor = self.try_tensor(t)?;
        let Some(blob) = tensor.data() else {
            return Err(PlanError::DataNotBound { fuid: tensor.fuid() });
        };
        if len > tensor.bytes() {
            return Err(PlanError::structural(format!(
                "copy of {len} bytes does not fit tensor {} of {} bytes",
                tensor.fuid(),
                tensor.bytes()
            )));
        }
        Ok(blob)
    }

    /// Copies `data` to the start of tensor's storage
    pub fn store(&mut self, t: TensorId, data: &[u8]) -> Result<(), PlanError> {
        let blob = self.bound_blob(t, data.len())?;
        self.allocator.runtime_mut().host_to_pool(data, blob.base, blob.offset)?;
        Ok(())
    }

    /// Copies start of tensor's storage into `data`
    pub fn load(&mut self, t: TensorId, data: &mut [u8]) -> Result<(), PlanError> {
        let blob = self.bound_blob(t, data.len())?;
        self.allocator.runtime_mut().pool_to_host(blob.base, blob.offset, data)?;
        Ok(())
    }
}
