//! Local rewrite passes over the graph.
//!
//! Passes never change what the graph computes. A pattern that does not
//! match simply does not fire. Nodes are removed only once nothing refers to them.

use crate::{error::PlanError, graph::Graph, operator::OpId, tensor::TensorId};

mod matmul;
mod transpose;

impl Graph {
    /// Applies all rewrite passes until none of them fires.
    /// Returns number of rewrites. The graph is left unsorted if anything changed.
    pub fn optimize(&mut self) -> Result<usize, PlanError> {
        if !self.topo_sort() {
            return Err(PlanError::CyclicGraph);
        }
        let mut total = 0;
        loop {
            let n = transpose::eliminate_inverse_transposes(self)? + matmul::fuse_transposes(self)?;
            if n == 0 {
                break;
            }
            total += n;
        }
        if self.debug.opt() {
            println!("Applied {total} rewrites, {} operators left", self.num_operators());
        }
        Ok(total)
    }

    /// Removes producer of `x` together with `x` once no operator reads `x`
    pub(crate) fn remove_if_unused(&mut self, op: OpId, x: TensorId) -> Result<bool, PlanError> {
        if !self.try_tensor(x)?.targets().is_empty() {
            return Ok(false);
        }
        // All outputs of the producer must be unused
        if self.try_op(op)?.outputs.iter().any(|&y| !self.tensors[y].targets().is_empty()) {
            return Ok(false);
        }
        let removed = self.remove_operator(op)?;
        for y in removed.outputs {
            self.remove_tensor(y)?;
        }
        Ok(true)
    }
}
