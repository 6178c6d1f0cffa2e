use crate::{
    error::PlanError,
    graph::Graph,
    operator::OpId,
    ops::{is_inverse, OpKind},
};

/// Splices out pairs of transposes that undo each other
pub(super) fn eliminate_inverse_transposes(graph: &mut Graph) -> Result<usize, PlanError> {
    let mut fired = 0;
    let mut i = 0;
    while i < graph.op_order.len() {
        let id = graph.op_order[i];
        if try_eliminate(graph, id)? {
            fired += 1;
            // Both removed operators are at or before i
            i = i.saturating_sub(2);
        } else {
            i += 1;
        }
    }
    Ok(fired)
}

fn try_eliminate(graph: &mut Graph, second: OpId) -> Result<bool, PlanError> {
    let op = graph.try_op(second)?;
    let OpKind::Transpose { permute: second_permute } = &op.kind else {
        return Ok(false);
    };
    let (&[x], &[y]) = (op.inputs.as_slice(), op.outputs.as_slice()) else {
        return Ok(false);
    };
    let Some(first) = graph.tensors[x].source() else {
        return Ok(false);
    };
    let prev = &graph.ops[first];
    let OpKind::Transpose { permute: first_permute } = &prev.kind else {
        return Ok(false);
    };
    if !is_inverse(first_permute, second_permute) {
        return Ok(false);
    }
    let &[src] = prev.inputs.as_slice() else {
        return Ok(false);
    };
    // Output of the graph, there is no consumer to rewire
    if graph.tensors[y].targets().is_empty() || src == y {
        return Ok(false);
    }
    if graph.debug.opt() {
        println!(
            "Eliminating inverse transposes {} and {}, tensor {} now reads tensor {}",
            prev.guid(),
            op.guid(),
            graph.tensors[y].fuid(),
            graph.tensors[src].fuid()
        );
    }
    for consumer in graph.tensors[y].targets().to_vec() {
        graph.replace_input(consumer, y, src)?;
    }
    graph.remove_if_unused(second, y)?;
    graph.remove_if_unused(first, x)?;
    Ok(true)
}
