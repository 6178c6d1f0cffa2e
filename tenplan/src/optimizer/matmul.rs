use crate::{
    error::PlanError,
    graph::Graph,
    operator::OpId,
    ops::{swaps_last_two, OpKind},
};

/// Folds transposes of the last two axes into matmul flags
pub(super) fn fuse_transposes(graph: &mut Graph) -> Result<usize, PlanError> {
    let mut fired = 0;
    for id in graph.op_order.clone() {
        if !graph.ops.contains_key(id) {
            continue;
        }
        // Same matmul again, the new operand may be transposed too
        while try_fuse(graph, id)? {
            fired += 1;
        }
    }
    Ok(fired)
}

fn try_fuse(graph: &mut Graph, id: OpId) -> Result<bool, PlanError> {
    let op = graph.try_op(id)?;
    if !matches!(op.kind, OpKind::MatMul { .. }) {
        return Ok(false);
    }
    let candidate = op.inputs.iter().take(2).enumerate().find_map(|(slot, &x)| {
        let transpose = graph.tensors[x].source()?;
        let t = &graph.ops[transpose];
        match (&t.kind, t.inputs.as_slice()) {
            (OpKind::Transpose { permute }, &[src]) if swaps_last_two(permute) => {
                Some((slot, x, transpose, src))
            }
            _ => None,
        }
    });
    let Some((slot, x, transpose, src)) = candidate else {
        return Ok(false);
    };
    if graph.debug.opt() {
        println!(
            "Fusing transpose {} into matmul {} operand {slot}",
            graph.ops[transpose].guid(),
            graph.ops[id].guid()
        );
    }
    if let OpKind::MatMul { trans_a, trans_b } = &mut graph.ops[id].kind {
        if slot == 0 {
            *trans_a = !*trans_a;
        } else {
            *trans_b = !*trans_b;
        }
    }
    graph.replace_input_at(id, slot, src)?;
    graph.remove_if_unused(transpose, x)?;
    Ok(true)
}
