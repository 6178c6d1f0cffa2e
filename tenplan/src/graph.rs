//! Graph of tensors and operators.
//!
//! Tensors and operators live in two slabs and refer to each other by id.
//! Operators never declare edges, predecessor and successor lists are derived
//! from which tensors they produce and consume.

use std::collections::BTreeSet;

use crate::{
    allocator::Allocator,
    config::{DebugMask, PlanConfig},
    dtype::DType,
    error::PlanError,
    operator::{OpId, Operator},
    ops::OpKind,
    runtime::Runtime,
    shape::Dim,
    slab::Slab,
    tensor::{Tensor, TensorId},
};

mod memory;
mod topo;

pub use memory::LiveRange;

#[derive(Debug)]
pub struct Graph {
    pub(crate) tensors: Slab<TensorId, Tensor>,
    pub(crate) ops: Slab<OpId, Operator>,
    // Insertion order of tensors
    pub(crate) tensor_order: Vec<TensorId>,
    // Insertion order of operators, execution order once sorted
    pub(crate) op_order: Vec<OpId>,
    // True only right after successful sort and before any mutation
    pub(crate) sorted: bool,
    pub(crate) allocator: Allocator,
    pub(crate) config: PlanConfig,
    pub(crate) debug: DebugMask,
}

impl Graph {
    /// New empty graph with default config. The runtime provides the arena buffer.
    #[must_use]
    pub fn new(runtime: Box<dyn Runtime>) -> Graph {
        Graph::with_config(runtime, PlanConfig::default())
    }

    #[must_use]
    pub fn with_config(runtime: Box<dyn Runtime>, config: PlanConfig) -> Graph {
        let debug = config.debug_mask();
        let mut allocator = Allocator::new(runtime);
        allocator.set_limit(config.arena_limit);
        allocator.set_debug(debug);
        Graph {
            tensors: Slab::new(),
            ops: Slab::new(),
            tensor_order: Vec::new(),
            op_order: Vec::new(),
            sorted: false,
            allocator,
            config,
            debug,
        }
    }

    pub fn set_debug(&mut self, debug: DebugMask) {
        self.debug = debug;
        self.allocator.set_debug(debug);
    }

    #[must_use]
    pub const fn config(&self) -> &PlanConfig {
        &self.config
    }

    #[must_use]
    pub const fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    #[must_use]
    pub const fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Adds graph input
    pub fn add_tensor(&mut self, shape: impl Into<Vec<Dim>>, dtype: DType) -> TensorId {
        self.push_tensor(Tensor::new(shape.into(), dtype))
    }

    fn push_tensor(&mut self, tensor: Tensor) -> TensorId {
        let id = self.tensors.push(tensor);
        self.tensor_order.push(id);
        self.sorted = false;
        id
    }

    /// Creates operator of given kind and connects it to the graph.
    /// With `outputs` set to None, output tensors are created with inferred shapes.
    pub fn add_op(
        &mut self,
        kind: OpKind,
        inputs: &[TensorId],
        outputs: Option<Vec<TensorId>>,
    ) -> Result<OpId, PlanError> {
        for &x in inputs {
            if !self.tensors.contains_key(x) {
                return Err(PlanError::structural(format!("input {x} is not in graph")));
            }
        }
        let dtypes: Vec<DType> = inputs.iter().map(|&x| self.tensors[x].dtype()).collect();
        kind.validate(&dtypes).map_err(|reason| PlanError::invalid_operator(&kind, reason))?;
        let shapes: Vec<&[Dim]> = inputs.iter().map(|&x| self.tensors[x].shape()).collect();
        let out_shapes =
            kind.infer_shapes(&shapes).map_err(|reason| PlanError::invalid_operator(&kind, reason))?;
        let out_dtypes = kind.infer_dtypes(&dtypes);
        let outputs = match outputs {
            Some(outputs) => {
                if outputs.len() != out_shapes.len() {
                    return Err(PlanError::invalid_operator(
                        &kind,
                        format!("expected {} outputs, got {}", out_shapes.len(), outputs.len()),
                    ));
                }
                for ((&y, shape), dtype) in outputs.iter().zip(&out_shapes).zip(&out_dtypes) {
                    let Some(tensor) = self.tensors.get(y) else {
                        return Err(PlanError::structural(format!("output {y} is not in graph")));
                    };
                    if tensor.source().is_some() {
                        return Err(PlanError::structural(format!("output {y} already has a source")));
                    }
                    if tensor.shape() != shape.as_slice() || tensor.dtype() != *dtype {
                        return Err(PlanError::invalid_operator(
                            &kind,
                            format!(
                                "output {y} is {:?} {}, expected {shape:?} {dtype}",
                                tensor.shape(),
                                tensor.dtype()
                            ),
                        ));
                    }
                }
                outputs
            }
            None => out_shapes
                .into_iter()
                .zip(out_dtypes)
                .map(|(shape, dtype)| self.push_tensor(Tensor::new(shape, dtype)))
                .collect(),
        };
        let id = self.add_operator_and_connect(Operator::new(kind, inputs.to_vec(), outputs));
        if self.debug.graph() {
            println!("Added {}", self.display_operator(id));
        }
        Ok(id)
    }

    /// Inserts operator and derives its edges from producers of its inputs
    /// and consumers of its outputs.
    pub(crate) fn add_operator_and_connect(&mut self, op: Operator) -> OpId {
        let inputs = op.inputs.clone();
        let outputs = op.outputs.clone();
        let id = self.ops.push(op);
        self.op_order.push(id);
        self.sorted = false;
        for x in inputs {
            self.tensors[x].add_target(id);
            if let Some(pred) = self.tensors[x].source() {
                self.ops[pred].add_successor(id);
                self.ops[id].add_predecessor(pred);
            }
        }
        for y in outputs {
            self.tensors[y].source = Some(id);
            for succ in self.tensors[y].targets.clone() {
                self.ops[succ].add_predecessor(id);
                self.ops[id].add_successor(succ);
            }
        }
        id
    }

    /// Removes operator and detaches it from all tensors and neighbouring operators.
    /// Its tensors stay in the graph.
    pub fn remove_operator(&mut self, id: OpId) -> Result<Operator, PlanError> {
        let Some(op) = self.ops.remove(id) else {
            return Err(PlanError::structural(format!("operator {id} is not in graph")));
        };
        for &x in &op.inputs {
            if let Some(tensor) = self.tensors.get_mut(x) {
                tensor.remove_target(id);
            }
        }
        for &y in &op.outputs {
            if let Some(tensor) = self.tensors.get_mut(y) {
                if tensor.source == Some(id) {
                    tensor.source = None;
                }
            }
        }
        for &pred in &op.predecessors {
            if let Some(pred) = self.ops.get_mut(pred) {
                pred.successors.retain(|&s| s != id);
            }
        }
        for &succ in &op.successors {
            if let Some(succ) = self.ops.get_mut(succ) {
                succ.predecessors.retain(|&p| p != id);
            }
        }
        self.op_order.retain(|&o| o != id);
        self.sorted = false;
        Ok(op)
    }

    /// Removes tensor that is no longer produced nor consumed by any operator
    pub fn remove_tensor(&mut self, id: TensorId) -> Result<Tensor, PlanError> {
        let Some(tensor) = self.tensors.get(id) else {
            return Err(PlanError::structural(format!("tensor {id} is not in graph")));
        };
        if tensor.source().is_some() || !tensor.targets().is_empty() {
            return Err(PlanError::structural(format!(
                "tensor {} is still referenced by operators",
                tensor.fuid()
            )));
        }
        self.tensor_order.retain(|&t| t != id);
        self.sorted = false;
        self.tensors.remove(id).ok_or_else(|| PlanError::structural("tensor vanished"))
    }

    /// Makes operator consume `new` wherever it consumed `old`
    pub fn replace_input(&mut self, op: OpId, old: TensorId, new: TensorId) -> Result<(), PlanError> {
        let slots: Vec<usize> = self
            .try_op(op)?
            .inputs
            .iter()
            .enumerate()
            .filter_map(|(i, &x)| (x == old).then_some(i))
            .collect();
        for slot in slots {
            self.replace_input_at(op, slot, new)?;
        }
        Ok(())
    }

    /// Makes operator consume `new` as its input number `slot`
    pub fn replace_input_at(&mut self, op: OpId, slot: usize, new: TensorId) -> Result<(), PlanError> {
        if !self.tensors.contains_key(new) {
            return Err(PlanError::structural(format!("tensor {new} is not in graph")));
        }
        let Some(&old) = self.try_op(op)?.inputs.get(slot) else {
            return Err(PlanError::structural(format!("operator {op} has no input {slot}")));
        };
        self.ops[op].inputs[slot] = new;
        if !self.ops[op].inputs.contains(&old) {
            if let Some(tensor) = self.tensors.get_mut(old) {
                tensor.remove_target(op);
            }
        }
        self.tensors[new].add_target(op);
        self.relink(op);
        self.sorted = false;
        Ok(())
    }

    // Recomputes predecessors and successors of op and updates them symmetrically
    fn relink(&mut self, id: OpId) {
        let mut preds = Vec::new();
        for &x in &self.ops[id].inputs {
            if let Some(src) = self.tensors.get(x).and_then(Tensor::source) {
                if !preds.contains(&src) {
                    preds.push(src);
                }
            }
        }
        let mut succs = Vec::new();
        for &y in &self.ops[id].outputs {
            if let Some(tensor) = self.tensors.get(y) {
                for &t in tensor.targets() {
                    if !succs.contains(&t) {
                        succs.push(t);
                    }
                }
            }
        }
        for old in self.ops[id].predecessors.clone() {
            if !preds.contains(&old) {
                if let Some(old) = self.ops.get_mut(old) {
                    old.successors.retain(|&s| s != id);
                }
            }
        }
        for old in self.ops[id].successors.clone() {
            if !succs.contains(&old) {
                if let Some(old) = self.ops.get_mut(old) {
                    old.predecessors.retain(|&p| p != id);
                }
            }
        }
        for &p in &preds {
            self.ops[p].add_successor(id);
        }
        for &s in &succs {
            self.ops[s].add_predecessor(id);
        }
        self.ops[id].predecessors = preds;
        self.ops[id].successors = succs;
    }

    /// Changes shape of graph input, run [`Graph::shape_infer`] to propagate it
    pub fn set_input_shape(&mut self, id: TensorId, shape: impl Into<Vec<Dim>>) -> Result<(), PlanError> {
        let tensor = self.try_tensor(id)?;
        if tensor.source().is_some() {
            return Err(PlanError::structural(format!(
                "tensor {} is produced by an operator, only inputs can be reshaped",
                tensor.fuid()
            )));
        }
        self.tensors[id].set_shape(shape.into());
        Ok(())
    }

    /// Recomputes output shapes of all operators in topological order
    pub fn shape_infer(&mut self) -> Result<(), PlanError> {
        if !self.topo_sort() {
            return Err(PlanError::CyclicGraph);
        }
        for id in self.op_order.clone() {
            let op = &self.ops[id];
            let shapes: Vec<&[Dim]> = op.inputs.iter().map(|&x| self.tensors[x].shape()).collect();
            let new_shapes = op
                .kind
                .infer_shapes(&shapes)
                .map_err(|reason| PlanError::ShapeInferenceFailure { guid: op.guid(), reason })?;
            if new_shapes.len() != op.outputs.len() {
                return Err(PlanError::ShapeInferenceFailure {
                    guid: op.guid(),
                    reason: format!("{} outputs inferred for {} tensors", new_shapes.len(), op.outputs.len())
                        .into(),
                });
            }
            let outputs = op.outputs.clone();
            for (y, shape) in outputs.into_iter().zip(new_shapes) {
                if self.tensors[y].shape() != shape.as_slice() {
                    if self.debug.graph() {
                        println!(
                            "Tensor {} shape {:?} -> {shape:?}",
                            self.tensors[y].fuid(),
                            self.tensors[y].shape()
                        );
                    }
                    self.tensors[y].set_shape(shape);
                }
            }
        }
        Ok(())
    }

    /// Checks that every tensor is produced or consumed, that all references
    /// point into this graph and that fuids are unique.
    pub fn check_valid(&self) -> Result<(), PlanError> {
        for &t in &self.tensor_order {
            let tensor = self.try_tensor(t)?;
            if tensor.source().is_none() && tensor.targets().is_empty() {
                return Err(PlanError::structural(format!("tensor {} is not connected", tensor.fuid())));
            }
            for &op in tensor.targets() {
                if !self.ops.get(op).is_some_and(|o| o.inputs.contains(&t)) {
                    return Err(PlanError::structural(format!(
                        "target {op} of tensor {} is not a consumer in graph",
                        tensor.fuid()
                    )));
                }
            }
            if let Some(op) = tensor.source() {
                if !self.ops.get(op).is_some_and(|o| o.outputs.contains(&t)) {
                    return Err(PlanError::structural(format!(
                        "source {op} of tensor {} is not a producer in graph",
                        tensor.fuid()
                    )));
                }
            }
        }
        for &id in &self.op_order {
            let op = self.try_op(id)?;
            for &x in op.inputs.iter().chain(&op.outputs) {
                if !self.tensors.contains_key(x) {
                    return Err(PlanError::structural(format!(
                        "operator {} uses tensor {x} which is not in graph",
                        op.guid()
                    )));
                }
            }
            for &o in op.predecessors.iter().chain(&op.successors) {
                if !self.ops.contains_key(o) {
                    return Err(PlanError::structural(format!(
                        "operator {} is linked to {o} which is not in graph",
                        op.guid()
                    )));
                }
            }
        }
        if self.tensor_order.len() != self.tensors.len() || self.op_order.len() != self.ops.len() {
            return Err(PlanError::structural("iteration order is out of sync with storage"));
        }
        let mut fuids = BTreeSet::new();
        for tensor in self.tensors.values() {
            if !fuids.insert(tensor.fuid()) {
                return Err(PlanError::structural(format!("duplicate fuid {}", tensor.fuid())));
            }
        }
        Ok(())
    }

    /// Panics if id is not in graph
    #[must_use]
    #[track_caller]
    pub fn tensor(&self, id: TensorId) -> &Tensor {
        &self.tensors[id]
    }

    /// Panics if id is not in graph
    #[must_use]
    #[track_caller]
    pub fn op(&self, id: OpId) -> &Operator {
        &self.ops[id]
    }

    pub fn try_tensor(&self, id: TensorId) -> Result<&Tensor, PlanError> {
        self.tensors.get(id).ok_or_else(|| PlanError::structural(format!("tensor {id} is not in graph")))
    }

    pub fn try_op(&self, id: OpId) -> Result<&Operator, PlanError> {
        self.ops.get(id).ok_or_else(|| PlanError::structural(format!("operator {id} is not in graph")))
    }

    /// Tensors in insertion order
    pub fn tensors(&self) -> impl Iterator<Item = TensorId> + '_ {
        self.tensor_order.iter().copied()
    }

    /// Operators in insertion order, or in execution order after sort
    pub fn operators(&self) -> impl Iterator<Item = OpId> + '_ {
        self.op_order.iter().copied()
    }

    #[must_use]
    pub fn num_tensors(&self) -> usize {
        self.tensors.len()
    }

    #[must_use]
    pub fn num_operators(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn get_tensor(&self, fuid: u64) -> Option<TensorId> {
        self.tensors.iter().find(|(_, t)| t.fuid() == fuid).map(|(id, _)| id)
    }

    #[must_use]
    pub fn get_operator(&self, guid: u64) -> Option<OpId> {
        self.ops.iter().find(|(_, o)| o.guid() == guid).map(|(id, _)| id)
    }

    fn fuids(&self, ids: &[TensorId]) -> Vec<u64> {
        ids.iter().filter_map(|&t| self.tensors.get(t)).map(Tensor::fuid).collect()
    }

    fn guids(&self, ids: &[OpId]) -> Vec<u64> {
        ids.iter().filter_map(|&o| self.ops.get(o)).map(Operator::guid).collect()
    }

    /// One line description of operator using guids and fuids
    #[must_use]
    pub fn display_operator(&self, id: OpId) -> String {
        let op = &self.ops[id];
        format!(
            "OP {}, pred {:?}, succ {:?}, {}, input {:?}, output {:?}",
            op.guid(),
            self.guids(&op.predecessors),
            self.guids(&op.successors),
            op.kind,
            self.fuids(&op.inputs),
            self.fuids(&op.outputs),
        )
    }

    /// Graph in dot language for visualization
    #[must_use]
    pub fn plot_dot_graph(&self) -> String {
        use core::fmt::Write;
        let mut res_dot_graph =
            String::from("strict digraph {\n  ordering=in\n  rank=source\n  rankdir=LR\n");
        let mut edges = String::new();
        for &t in &self.tensor_order {
            let tensor = &self.tensors[t];
            let fillcolor = if tensor.source().is_none() {
                "aqua"
            } else if tensor.targets().is_empty() {
                "coral"
            } else {
                "white"
            };
            let _ = writeln!(
                res_dot_graph,
                "  t{}[label=\"{}\\n{:?}\\n{}\", shape=box, fillcolor=\"{fillcolor}\", style=filled]",
                tensor.fuid(),
                tensor.fuid(),
                tensor.shape(),
                tensor.dtype(),
            );
        }
        for &id in &self.op_order {
            let op = &self.ops[id];
            let _ = writeln!(res_dot_graph, "  o{}[label=\"{}\", shape=oval]", op.guid(), op.kind);
            for &x in &op.inputs {
                let _ = writeln!(edges, "  t{} -> o{}", self.tensors[x].fuid(), op.guid());
            }
            for &y in &op.outputs {
                let _ = writeln!(edges, "  o{} -> t{}", op.guid(), self.tensors[y].fuid());
            }
        }
        let _ = write!(res_dot_graph, "{edges}}}");
        res_dot_graph
    }
}

impl core::fmt::Display for Graph {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Graph Tensors:\n")?;
        for &t in &self.tensor_order {
            let tensor = &self.tensors[t];
            let source = tensor.source().and_then(|s| self.ops.get(s)).map(Operator::guid);
            f.write_fmt(format_args!(
                "{tensor}, source {source:?}, targets {:?}\n",
                self.guids(tensor.targets())
            ))?;
        }
        f.write_str("Graph operators:\n")?;
        for &id in &self.op_order {
            f.write_fmt(format_args!("{}\n", self.display_operator(id)))?;
        }
        Ok(())
    }
}
