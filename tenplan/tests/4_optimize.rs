use tenplan::{DType, DummyRuntime, Graph, OpKind, PlanError, UOp};

fn graph() -> Graph {
    Graph::new(Box::new(DummyRuntime::default()))
}

fn transpose(permute: &[usize]) -> OpKind {
    OpKind::Transpose { permute: permute.to_vec() }
}

#[test]
fn inverse_transposes_are_removed() -> Result<(), PlanError> {
    let mut graph = graph();
    let x = graph.add_tensor([2, 3, 4], DType::F32);
    let t1 = graph.add_op(transpose(&[1, 2, 0]), &[x], None)?;
    let y1 = graph.op(t1).outputs()[0];
    let t2 = graph.add_op(transpose(&[2, 0, 1]), &[y1], None)?;
    let y2 = graph.op(t2).outputs()[0];
    let relu = graph.add_op(OpKind::Unary(UOp::Relu), &[y2], None)?;
    let out = graph.op(relu).outputs()[0];

    assert_eq!(graph.optimize()?, 1);
    assert_eq!(graph.num_operators(), 1);
    assert_eq!(graph.num_tensors(), 2);
    assert_eq!(graph.op(relu).inputs(), [x]);
    assert!(graph.op(relu).predecessors().is_empty());
    assert_eq!(graph.tensor(x).targets(), [relu]);
    assert_eq!(graph.tensor(out).shape(), [2, 3, 4]);
    assert!(!graph.is_sorted());
    graph.check_valid()?;
    Ok(())
}

#[test]
fn chain_of_inverse_pairs_collapses() -> Result<(), PlanError> {
    let mut graph = graph();
    let x = graph.add_tensor([2, 3], DType::F32);
    let mut y = x;
    for _ in 0..6 {
        let t = graph.add_op(transpose(&[1, 0]), &[y], None)?;
        y = graph.op(t).outputs()[0];
    }
    let neg = graph.add_op(OpKind::Unary(UOp::Neg), &[y], None)?;
    assert_eq!(graph.optimize()?, 3);
    assert_eq!(graph.num_operators(), 1);
    assert_eq!(graph.op(neg).inputs(), [x]);
    graph.check_valid()?;
    Ok(())
}

#[test]
fn non_inverse_transposes_stay() -> Result<(), PlanError> {
    let mut graph = graph();
    let x = graph.add_tensor([2, 3, 4], DType::F32);
    let t1 = graph.add_op(transpose(&[1, 2, 0]), &[x], None)?;
    let y1 = graph.op(t1).outputs()[0];
    let t2 = graph.add_op(transpose(&[1, 2, 0]), &[y1], None)?;
    let y2 = graph.op(t2).outputs()[0];
    graph.add_op(OpKind::Unary(UOp::Abs), &[y2], None)?;
    assert_eq!(graph.optimize()?, 0);
    assert_eq!(graph.num_operators(), 3);
    // Nothing changed, so the graph stays sorted
    assert!(graph.is_sorted());
    Ok(())
}

#[test]
fn graph_output_transpose_is_kept() -> Result<(), PlanError> {
    let mut graph = graph();
    let x = graph.add_tensor([2, 3], DType::F32);
    let t1 = graph.add_op(transpose(&[1, 0]), &[x], None)?;
    let y1 = graph.op(t1).outputs()[0];
    graph.add_op(transpose(&[1, 0]), &[y1], None)?;
    assert_eq!(graph.optimize()?, 0);
    assert_eq!(graph.num_operators(), 2);
    Ok(())
}

#[test]
fn shared_intermediate_is_kept() -> Result<(), PlanError> {
    let mut graph = graph();
    let x = graph.add_tensor([2, 3], DType::F32);
    let t1 = graph.add_op(transpose(&[1, 0]), &[x], None)?;
    let y1 = graph.op(t1).outputs()[0];
    let t2 = graph.add_op(transpose(&[1, 0]), &[y1], None)?;
    let y2 = graph.op(t2).outputs()[0];
    let a = graph.add_op(OpKind::Unary(UOp::Exp), &[y2], None)?;
    // Second reader of the first transpose
    let b = graph.add_op(OpKind::Unary(UOp::Sqrt), &[y1], None)?;
    assert_eq!(graph.optimize()?, 1);
    assert_eq!(graph.op(a).inputs(), [x]);
    assert_eq!(graph.op(b).inputs(), [y1]);
    assert_eq!(graph.tensor(y1).source(), Some(t1));
    assert_eq!(graph.num_operators(), 3);
    graph.check_valid()?;
    Ok(())
}

#[test]
fn transposes_fuse_into_matmul() -> Result<(), PlanError> {
    let mut graph = graph();
    let a = graph.add_tensor([5, 3, 2], DType::F32);
    let b = graph.add_tensor([5, 4, 3], DType::F32);
    let ta = graph.add_op(transpose(&[0, 2, 1]), &[a], None)?;
    let at = graph.op(ta).outputs()[0];
    let tb = graph.add_op(transpose(&[0, 2, 1]), &[b], None)?;
    let bt = graph.op(tb).outputs()[0];
    let mm = graph.add_op(OpKind::MatMul { trans_a: false, trans_b: false }, &[at, bt], None)?;
    let out = graph.op(mm).outputs()[0];
    assert_eq!(graph.tensor(out).shape(), [5, 2, 4]);

    assert_eq!(graph.optimize()?, 2);
    assert_eq!(graph.op(mm).kind(), &OpKind::MatMul { trans_a: true, trans_b: true });
    assert_eq!(graph.op(mm).inputs(), [a, b]);
    assert_eq!(graph.num_operators(), 1);
    assert_eq!(graph.num_tensors(), 3);
    graph.check_valid()?;
    // Function is unchanged, so is the output shape
    graph.shape_infer()?;
    assert_eq!(graph.tensor(out).shape(), [5, 2, 4]);
    Ok(())
}

#[test]
fn fusion_toggles_existing_flag() -> Result<(), PlanError> {
    let mut graph = graph();
    let a = graph.add_tensor([3, 2], DType::F32);
    let b = graph.add_tensor([3, 4], DType::F32);
    let tb = graph.add_op(transpose(&[1, 0]), &[b], None)?;
    let bt = graph.op(tb).outputs()[0];
    let mm = graph.add_op(OpKind::MatMul { trans_a: true, trans_b: true }, &[a, bt], None)?;
    assert_eq!(graph.tensor(graph.op(mm).outputs()[0]).shape(), [2, 4]);
    assert_eq!(graph.optimize()?, 1);
    assert_eq!(graph.op(mm).kind(), &OpKind::MatMul { trans_a: true, trans_b: false });
    assert_eq!(graph.op(mm).inputs(), [a, b]);
    graph.shape_infer()?;
    assert_eq!(graph.tensor(graph.op(mm).outputs()[0]).shape(), [2, 4]);
    Ok(())
}

#[test]
fn transpose_with_other_readers_is_kept() -> Result<(), PlanError> {
    let mut graph = graph();
    let a = graph.add_tensor([3, 3], DType::F32);
    let ta = graph.add_op(transpose(&[1, 0]), &[a], None)?;
    let at = graph.op(ta).outputs()[0];
    let mm = graph.add_op(OpKind::MatMul { trans_a: false, trans_b: false }, &[at, at], None)?;
    let relu = graph.add_op(OpKind::Unary(UOp::Relu), &[at], None)?;
    assert_eq!(graph.optimize()?, 2);
    assert_eq!(graph.op(mm).kind(), &OpKind::MatMul { trans_a: true, trans_b: true });
    assert_eq!(graph.op(mm).inputs(), [a, a]);
    assert_eq!(graph.op(relu).inputs(), [at]);
    assert_eq!(graph.tensor(at).targets(), [relu]);
    assert_eq!(graph.num_operators(), 3);
    graph.check_valid()?;
    Ok(())
}

#[test]
fn partial_swap_does_not_fuse() -> Result<(), PlanError> {
    let mut graph = graph();
    let a = graph.add_tensor([2, 3, 4], DType::F32);
    let w = graph.add_tensor([4, 5], DType::F32);
    let ta = graph.add_op(transpose(&[1, 0, 2]), &[a], None)?;
    let at = graph.op(ta).outputs()[0];
    let mm = graph.add_op(OpKind::MatMul { trans_a: false, trans_b: false }, &[at, w], None)?;
    assert_eq!(graph.optimize()?, 0);
    assert_eq!(graph.op(mm).inputs(), [at, w]);
    Ok(())
}
