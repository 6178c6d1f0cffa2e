use tenplan::{
    BOp, DType, DummyConfig, DummyRuntime, Graph, OpKind, PlanConfig, PlanError, TensorId, UOp,
};

fn graph_with(config: PlanConfig) -> Graph {
    Graph::with_config(Box::new(DummyRuntime::new(&config.dummy)), config)
}

// x -> relu -> exp -> neg -> abs, every tensor 1024 bytes
fn chain(graph: &mut Graph) -> Result<Vec<TensorId>, PlanError> {
    let x = graph.add_tensor([256], DType::F32);
    let mut tensors = vec![x];
    for uop in [UOp::Relu, UOp::Exp, UOp::Neg, UOp::Abs] {
        let op = graph.add_op(OpKind::Unary(uop), &[*tensors.last().unwrap()], None)?;
        tensors.push(graph.op(op).outputs()[0]);
    }
    Ok(tensors)
}

fn assert_disjoint(graph: &Graph, tensors: &[TensorId]) {
    for (i, &x) in tensors.iter().enumerate() {
        let a = graph.tensor(x).data().unwrap().range();
        for &y in &tensors[i + 1..] {
            let b = graph.tensor(y).data().unwrap().range();
            assert!(a.end <= b.start || b.end <= a.start, "{a:?} overlaps {b:?}");
        }
    }
}

#[test]
fn every_tensor_gets_private_range() -> Result<(), PlanError> {
    let mut graph = graph_with(PlanConfig::default());
    let x = graph.add_tensor([3, 5], DType::F32);
    let w = graph.add_tensor([5, 2], DType::F32);
    let mm = graph.add_op(OpKind::MatMul { trans_a: false, trans_b: false }, &[x, w], None)?;
    let y = graph.op(mm).outputs()[0];
    let b = graph.add_tensor([1], DType::F32);
    let add = graph.add_op(OpKind::Binary(BOp::Add), &[y, b], None)?;
    let z = graph.op(add).outputs()[0];
    let cast = graph.add_op(OpKind::Cast { dtype: DType::U8 }, &[z], None)?;
    let out = graph.op(cast).outputs()[0];

    graph.data_malloc()?;
    assert!(graph.is_sorted());
    let tensors: Vec<TensorId> = graph.tensors().collect();
    assert_eq!(tensors, [x, w, y, b, z, out]);
    assert_disjoint(&graph, &tensors);
    let extent = graph.allocator().extent();
    let mut total = 0;
    for &t in &tensors {
        let blob = graph.tensor(t).data().unwrap();
        assert!(blob.range().end <= extent);
        assert!(blob.bytes >= graph.tensor(t).bytes());
        assert_eq!(blob.offset % graph.allocator().alignment(), 0);
        assert_eq!(blob.address(), blob.base.0 + blob.offset as u64);
        total += blob.bytes;
    }
    // 64 + 40 + 24 + 8 + 24 + 8
    assert_eq!(total, 168);
    assert_eq!(extent, total);
    assert_eq!(graph.allocator().peak(), extent);
    assert!(graph.allocator().is_materialized());
    Ok(())
}

#[test]
fn reuse_shares_bytes_between_disjoint_lifetimes() -> Result<(), PlanError> {
    let mut graph = graph_with(PlanConfig { reuse_memory: true, ..PlanConfig::default() });
    let tensors = chain(&mut graph)?;
    graph.data_malloc()?;
    assert_eq!(graph.allocator().extent(), 3 * 1024);

    let ranges = graph.live_ranges()?;
    assert_eq!(ranges.len(), 5);
    for (i, a) in ranges.iter().enumerate() {
        for b in &ranges[i + 1..] {
            if a.first <= b.last && b.first <= a.last {
                assert_disjoint(&graph, &[a.tensor, b.tensor]);
            }
        }
    }
    // Input stays, output lives to the end
    assert_eq!((ranges[0].first, ranges[0].last), (0, 4));
    assert_eq!((ranges[1].first, ranges[1].last), (0, 1));
    assert_eq!((ranges[4].first, ranges[4].last), (3, 4));
    let offset = |t: TensorId| graph.tensor(t).data().unwrap().offset;
    assert_eq!(offset(tensors[1]), offset(tensors[3]));
    assert_eq!(offset(tensors[2]), offset(tensors[4]));
    Ok(())
}

#[test]
fn without_reuse_chain_needs_every_tensor() -> Result<(), PlanError> {
    let mut graph = graph_with(PlanConfig::default());
    let tensors = chain(&mut graph)?;
    graph.data_malloc()?;
    assert_eq!(graph.allocator().extent(), 5 * 1024);
    assert_disjoint(&graph, &tensors);
    Ok(())
}

#[test]
fn over_allocation_multiplies_sizes() -> Result<(), PlanError> {
    let mut graph = graph_with(PlanConfig { over_allocation: 8, ..PlanConfig::default() });
    let x = graph.add_tensor([3], DType::F16);
    graph.add_op(OpKind::Unary(UOp::Neg), &[x], None)?;
    graph.data_malloc()?;
    assert_eq!(graph.tensor(x).data().unwrap().bytes, 48);
    assert_eq!(graph.allocator().extent(), 96);
    Ok(())
}

#[test]
fn second_plan_is_rejected() -> Result<(), PlanError> {
    let mut graph = graph_with(PlanConfig::default());
    chain(&mut graph)?;
    graph.data_malloc()?;
    let bound: Vec<_> = graph.tensors().map(|t| graph.tensor(t).data()).collect();
    assert!(matches!(graph.data_malloc(), Err(PlanError::PostBindAllocation)));
    let after: Vec<_> = graph.tensors().map(|t| graph.tensor(t).data()).collect();
    assert_eq!(bound, after);
    Ok(())
}

#[test]
fn runtime_out_of_memory() -> Result<(), PlanError> {
    let mut graph = graph_with(PlanConfig {
        dummy: DummyConfig { capacity: 4096 },
        ..PlanConfig::default()
    });
    let tensors = chain(&mut graph)?;
    match graph.data_malloc() {
        Err(PlanError::RuntimeAllocationFailure { bytes, .. }) => assert_eq!(bytes, 5 * 1024),
        other => panic!("expected runtime failure, got {other:?}"),
    }
    assert!(graph.tensor(tensors[0]).data().is_none());
    assert!(matches!(graph.store(tensors[0], &[0; 4]), Err(PlanError::DataNotBound { .. })));
    Ok(())
}

// x -> relu -> a -> concat(a, a) -> b -> concat(b, b) -> c
// Freeing a leaves an 8 byte hole below b that c does not fit into,
// so the arena ends past the peak of live bytes.
#[test]
fn reuse_arena_can_exceed_peak() -> Result<(), PlanError> {
    let mut graph = graph_with(PlanConfig { reuse_memory: true, ..PlanConfig::default() });
    let x = graph.add_tensor([2], DType::F32);
    let op = graph.add_op(OpKind::Unary(UOp::Relu), &[x], None)?;
    let a = graph.op(op).outputs()[0];
    let op = graph.add_op(OpKind::Concat { axis: 0 }, &[a, a], None)?;
    let b = graph.op(op).outputs()[0];
    let op = graph.add_op(OpKind::Concat { axis: 0 }, &[b, b], None)?;
    let c = graph.op(op).outputs()[0];
    graph.data_malloc()?;

    let offset = |t: TensorId| graph.tensor(t).data().map(|blob| blob.offset);
    assert_eq!(offset(x), Some(0));
    assert_eq!(offset(a), Some(8));
    assert_eq!(offset(b), Some(16));
    assert_eq!(offset(c), Some(32));
    assert_eq!(graph.allocator().peak(), 8 + 16 + 32);
    assert_eq!(graph.allocator().extent(), 64);
    assert!(graph.tensors().all(|t| graph.tensor(t).data().is_some_and(|blob| blob.offset + blob.bytes <= 64)));
    Ok(())
}

#[test]
fn bounded_arena() -> Result<(), PlanError> {
    let mut graph = graph_with(PlanConfig { arena_limit: 4096, ..PlanConfig::default() });
    chain(&mut graph)?;
    assert!(matches!(graph.data_malloc(), Err(PlanError::AllocationExhausted { size: 1024 })));

    let mut graph = graph_with(PlanConfig {
        arena_limit: 4096,
        reuse_memory: true,
        ..PlanConfig::default()
    });
    chain(&mut graph)?;
    graph.data_malloc()?;
    Ok(())
}

#[test]
fn data_access() -> Result<(), PlanError> {
    let mut graph = graph_with(PlanConfig::default());
    let x = graph.add_tensor([4], DType::I32);
    let op = graph.add_op(OpKind::Unary(UOp::Neg), &[x], None)?;
    let y = graph.op(op).outputs()[0];
    let mut out = [0u8; 16];
    assert!(matches!(graph.load(y, &mut out), Err(PlanError::DataNotBound { .. })));
    graph.data_malloc()?;
    graph.store(x, &[1; 16])?;
    graph.load(y, &mut out)?;
    assert!(matches!(
        graph.store(x, &[1; 17]),
        Err(PlanError::StructuralInvariantViolation(_))
    ));
    Ok(())
}

#[test]
fn plan_after_optimize_resorts() -> Result<(), PlanError> {
    let mut graph = graph_with(PlanConfig::default());
    let x = graph.add_tensor([2, 3], DType::F32);
    let t1 = graph.add_op(OpKind::Transpose { permute: vec![1, 0] }, &[x], None)?;
    let y = graph.op(t1).outputs()[0];
    let t2 = graph.add_op(OpKind::Transpose { permute: vec![1, 0] }, &[y], None)?;
    let z = graph.op(t2).outputs()[0];
    let relu = graph.add_op(OpKind::Unary(UOp::Relu), &[z], None)?;
    graph.optimize()?;
    assert!(!graph.is_sorted());
    graph.data_malloc()?;
    assert_eq!(graph.execution_order()?, [relu]);
    assert_eq!(graph.allocator().extent(), 48);
    Ok(())
}
