use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::Graph;
use crate::{error::PlanError, operator::OpId};

impl Graph {
    /// Orders operators so that every producer runs before its consumers.
    /// Returns false and leaves the order untouched if the graph has a cycle.
    pub fn topo_sort(&mut self) -> bool {
        if self.sorted {
            return true;
        }
        // Number of distinct producers each operator still waits for
        let mut rcs: BTreeMap<OpId, usize> = BTreeMap::new();
        for &id in &self.op_order {
            let producers: BTreeSet<OpId> = self.ops[id]
                .inputs
                .iter()
                .filter_map(|&x| self.tensors.get(x).and_then(|t| t.source()))
                .collect();
            rcs.insert(id, producers.len());
        }
        let mut queue: VecDeque<OpId> =
            self.op_order.iter().copied().filter(|id| rcs[id] == 0).collect();
        let mut order = Vec::with_capacity(self.op_order.len());
        while let Some(id) = queue.pop_front() {
            order.push(id);
            let consumers: BTreeSet<OpId> = self.ops[id]
                .outputs
                .iter()
                .filter_map(|&y| self.tensors.get(y))
                .flat_map(|t| t.targets().iter().copied())
                .collect();
            // Keep insertion order among newly ready operators
            for &succ in &self.op_order {
                if consumers.contains(&succ) {
                    if let Some(rc) = rcs.get_mut(&succ) {
                        *rc -= 1;
                        if *rc == 0 {
                            queue.push_back(succ);
                        }
                    }
                }
            }
        }
        if order.len() != self.op_order.len() {
            if self.debug.sched() {
                let stuck: Vec<u64> = rcs
                    .iter()
                    .filter(|(_, &rc)| rc > 0)
                    .map(|(&id, _)| self.ops[id].guid())
                    .collect();
                println!("Cycle detected, operators {stuck:?} can not be scheduled");
            }
            return false;
        }
        if self.debug.sched() {
            let guids: Vec<u64> = order.iter().map(|&id| self.ops[id].guid()).collect();
            println!("Execution order {guids:?}");
        }
        self.op_order = order;
        self.sorted = true;
        true
    }

    /// Operators in execution order, only valid while the graph stays sorted
    pub fn execution_order(&self) -> Result<&[OpId], PlanError> {
        if !self.sorted {
            return Err(PlanError::GraphNotSorted);
        }
        Ok(&self.op_order)
    }
}
