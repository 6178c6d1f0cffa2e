use tenplan::{BOp, DType, DummyRuntime, Graph, OpKind, PlanError, UOp};

fn graph() -> Graph {
    Graph::new(Box::new(DummyRuntime::default()))
}

#[test]
fn concat() -> Result<(), PlanError> {
    let mut graph = graph();
    let x = graph.add_tensor([2, 2, 3, 1], DType::F32);
    let y = graph.add_tensor([2, 2, 1, 1], DType::F32);
    let z = graph.add_tensor([2, 2, 2, 1], DType::F32);
    let op = graph.add_op(OpKind::Concat { axis: 2 }, &[x, y, z], None)?;
    let out = graph.op(op).outputs()[0];
    assert_eq!(graph.tensor(out).shape(), [2, 2, 6, 1]);
    assert_eq!(graph.tensor(out).dtype(), DType::F32);

    let w = graph.add_tensor([2, 3, 1, 1], DType::F32);
    assert!(matches!(
        graph.add_op(OpKind::Concat { axis: -2 }, &[x, w], None),
        Err(PlanError::InvalidOperator { .. })
    ));
    let op = graph.add_op(OpKind::Concat { axis: -2 }, &[y, z], None)?;
    assert_eq!(graph.tensor(graph.op(op).outputs()[0]).shape(), [2, 2, 3, 1]);
    Ok(())
}

#[test]
fn matmul() -> Result<(), PlanError> {
    let mut graph = graph();
    let a = graph.add_tensor([1, 2, 5], DType::F16);
    let b = graph.add_tensor([3, 4, 5], DType::F16);
    let op = graph.add_op(OpKind::MatMul { trans_a: false, trans_b: true }, &[a, b], None)?;
    assert_eq!(graph.tensor(graph.op(op).outputs()[0]).shape(), [3, 2, 4]);
    assert_eq!(graph.tensor(graph.op(op).outputs()[0]).bytes(), 3 * 2 * 4 * 2);

    let c = graph.add_tensor([5, 2], DType::F16);
    let d = graph.add_tensor([5, 7], DType::F16);
    let op = graph.add_op(OpKind::MatMul { trans_a: true, trans_b: false }, &[c, d], None)?;
    assert_eq!(graph.tensor(graph.op(op).outputs()[0]).shape(), [2, 7]);
    Ok(())
}

#[test]
fn matmul_batch_takes_larger_dim() -> Result<(), PlanError> {
    let mut graph = graph();
    let a = graph.add_tensor([2, 3, 4], DType::F32);
    let b = graph.add_tensor([3, 4, 5], DType::F32);
    let op = graph.add_op(OpKind::MatMul { trans_a: false, trans_b: false }, &[a, b], None)?;
    assert_eq!(graph.tensor(graph.op(op).outputs()[0]).shape(), [3, 3, 5]);

    let c = graph.add_tensor([6, 3, 4], DType::F32);
    let d = graph.add_tensor([2, 1, 4, 5], DType::F32);
    let op = graph.add_op(OpKind::MatMul { trans_a: false, trans_b: false }, &[c, d], None)?;
    assert_eq!(graph.tensor(graph.op(op).outputs()[0]).shape(), [2, 6, 3, 5]);
    Ok(())
}

#[test]
fn broadcast_and_cast() -> Result<(), PlanError> {
    let mut graph = graph();
    let x = graph.add_tensor([4, 1, 3], DType::I32);
    let y = graph.add_tensor([5, 1], DType::I32);
    let op = graph.add_op(OpKind::Binary(BOp::Sub), &[x, y], None)?;
    let z = graph.op(op).outputs()[0];
    assert_eq!(graph.tensor(z).shape(), [4, 5, 3]);
    let op = graph.add_op(OpKind::Cast { dtype: DType::F64 }, &[z], None)?;
    let w = graph.op(op).outputs()[0];
    assert_eq!(graph.tensor(w).shape(), [4, 5, 3]);
    assert_eq!(graph.tensor(w).dtype(), DType::F64);
    assert_eq!(graph.tensor(w).bytes(), 4 * 5 * 3 * 8);
    Ok(())
}

#[test]
fn input_shape_change_propagates() -> Result<(), PlanError> {
    let mut graph = graph();
    let x = graph.add_tensor([2, 3], DType::F32);
    let w = graph.add_tensor([3, 4], DType::F32);
    let mm = graph.add_op(OpKind::MatMul { trans_a: false, trans_b: false }, &[x, w], None)?;
    let y = graph.op(mm).outputs()[0];
    let relu = graph.add_op(OpKind::Unary(UOp::Relu), &[y], None)?;
    let z = graph.op(relu).outputs()[0];
    let t = graph.add_op(OpKind::Transpose { permute: vec![1, 0] }, &[z], None)?;
    let out = graph.op(t).outputs()[0];
    let fuid = graph.tensor(out).fuid();
    assert_eq!(graph.tensor(out).shape(), [4, 2]);

    graph.set_input_shape(x, [8, 3])?;
    graph.shape_infer()?;
    assert_eq!(graph.tensor(y).shape(), [8, 4]);
    assert_eq!(graph.tensor(z).shape(), [8, 4]);
    assert_eq!(graph.tensor(out).shape(), [4, 8]);
    assert_eq!(graph.tensor(out).fuid(), fuid);
    assert!(graph.is_sorted());

    // Only graph inputs can be reshaped
    assert!(matches!(graph.set_input_shape(y, [1, 1]), Err(PlanError::StructuralInvariantViolation(_))));
    Ok(())
}

#[test]
fn incompatible_input_shape_fails() -> Result<(), PlanError> {
    let mut graph = graph();
    let x = graph.add_tensor([2, 3], DType::F32);
    let w = graph.add_tensor([3, 4], DType::F32);
    let mm = graph.add_op(OpKind::MatMul { trans_a: false, trans_b: false }, &[x, w], None)?;
    graph.set_input_shape(x, [2, 5])?;
    match graph.shape_infer() {
        Err(PlanError::ShapeInferenceFailure { guid, .. }) => assert_eq!(guid, graph.op(mm).guid()),
        other => panic!("expected shape inference failure, got {other:?}"),
    }
    graph.set_input_shape(x, [3])?;
    assert!(matches!(graph.shape_infer(), Err(PlanError::ShapeInferenceFailure { .. })));
    Ok(())
}
