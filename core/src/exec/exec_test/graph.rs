use super::*;

fn validation_error(instrs: Vec<Instruction>, n_args: usize, n_locs: usize) -> ExecError {
    let err = ExecutionGraph::new(instrs, n_args, n_locs).unwrap_err();
    exec_error(&err).cloned().expect("validation should fail with ExecError")
}

#[test]
fn rejects_second_producer_of_a_slot() {
    let slot = MemLocation::cpu(0);
    let err = validation_error(
        vec![
            Instruction::load_argument("arg0", 0, 0, slot),
            Instruction::alloc("alloc", 1, Dtype::F64, vec![], slot),
        ],
        1,
        1,
    );
    assert_eq!(
        err,
        ExecError::MultipleProducers {
            loc: slot,
            first: 0,
            second: 1
        }
    );
}

#[test]
fn rejects_in_place_write_without_producer() {
    let err = validation_error(
        vec![Instruction::return_by_ref("inc", 0, vec![], MemLocation::cpu(0), increment(), false)],
        0,
        1,
    );
    assert!(matches!(err, ExecError::InPlaceWithoutProducer { instr: 0, .. }));
}

#[test]
fn rejects_read_before_write() {
    let err = validation_error(
        vec![
            Instruction::build_tup("tuple", 0, vec![MemLocation::cpu(1)], MemLocation::cpu(0)),
            Instruction::load_argument("arg0", 1, 0, MemLocation::cpu(1)),
        ],
        1,
        2,
    );
    assert_eq!(
        err,
        ExecError::ReadBeforeWrite {
            loc: MemLocation::cpu(1),
            instr: 0
        }
    );
}

#[test]
fn rejects_out_of_bounds_locations_and_arguments() {
    let err = validation_error(vec![Instruction::load_argument("arg0", 0, 0, MemLocation::cpu(4))], 1, 2);
    assert!(matches!(err, ExecError::LocationOutOfBounds { n_locs: 2, .. }));

    let err = validation_error(vec![Instruction::load_argument("arg1", 0, 1, MemLocation::cpu(0))], 1, 1);
    assert_eq!(err, ExecError::ArgumentIndexOutOfRange { index: 1, n_args: 1 });
}

#[test]
fn in_place_chains_are_accepted() {
    let slot = MemLocation::cpu(0);
    let graph = ExecutionGraph::new(
        vec![
            Instruction::alloc("alloc", 0, Dtype::F64, vec![], slot),
            Instruction::return_by_ref("inc", 1, vec![slot], slot, increment(), false),
            Instruction::return_by_ref("inc", 2, vec![], slot, increment(), false),
        ],
        0,
        1,
    )
    .unwrap();
    assert_eq!(graph.n_instrs(), 3);
    assert_eq!(graph.n_args(), 0);
    assert_eq!(graph.n_locs(), 1);
}

#[test]
fn plan_orders_reads_after_writes() {
    let mut b = GraphBuilder::new(2);
    let x = b.load_arg(0); // 0
    let y = b.load_arg(1); // 1
    let s = b.by_val("sum", &[x, y], kernels::sum()); // 2
    b.by_val("scale", &[s], kernels::scale(2.0)); // 3
    let plan = b.finish().unwrap().dependencies();

    assert_eq!(plan.roots(), &[0, 1]);
    assert_eq!(plan.successors(0), &[2]);
    assert_eq!(plan.successors(1), &[2]);
    assert_eq!(plan.successors(2), &[3]);
    assert_eq!(plan.pred_counts(), &[0, 0, 2, 1]);
}

#[test]
fn plan_orders_in_place_writes_after_earlier_readers() {
    let mut b = GraphBuilder::new(1);
    let n = b.load_arg(0); // 0
    let acc = b.alloc(Dtype::F64, &[n]); // 1
    let snapshot = b.by_val("scale", &[acc], kernels::scale(1.0)); // 2 reads acc
    b.by_ref("inc", &[], acc, increment()); // 3 must wait for 2
    b.by_ref("inc", &[], acc, increment()); // 4 must wait for 3
    b.by_val("scale", &[snapshot], kernels::scale(1.0)); // 5
    let plan = b.finish().unwrap().dependencies();

    assert_eq!(plan.successors(1), &[2, 3]);
    assert_eq!(plan.successors(2), &[3, 5]);
    assert_eq!(plan.successors(3), &[4]);
    assert_eq!(plan.n_preds(3), 2);
    assert_eq!(plan.n_preds(4), 1);
}

#[test]
fn plan_sees_in_place_writes_through_tuples() {
    let mut b = GraphBuilder::new(1);
    let x = b.load_arg(0); // 0
    let left = b.by_val("scale", &[x], kernels::scale(2.0)); // 1
    let pair = b.build_tup(&[left, x]); // 2
    let nested = b.build_tup(&[pair]); // 3
    b.by_ref("inc", &[], left, increment()); // 4 after the tuple is built
    b.by_val("sum", &[nested], kernels::sum()); // 5 reads left through two tuples
    let plan = b.finish().unwrap().dependencies();

    assert!(plan.successors(2).contains(&4));
    assert!(plan.successors(4).contains(&5));
    assert!(plan.successors(3).contains(&5));
}

#[test]
fn plan_spreads_in_place_tuple_writes_to_aliased_slots() {
    let mut b = GraphBuilder::new(1);
    let x = b.load_arg(0); // 0
    let a = b.by_val("scale", &[x], kernels::scale(1.0)); // 1
    let pair = b.build_tup(&[a]); // 2
    b.by_val("early", &[a], kernels::scale(1.0)); // 3 reads a directly
    b.by_ref("bump", &[], pair, increment()); // 4 mutates a through the tuple
    b.by_val("late", &[a], kernels::scale(1.0)); // 5
    let plan = b.finish().unwrap().dependencies();

    assert!(plan.successors(3).contains(&4));
    assert!(plan.successors(4).contains(&5));
    assert_eq!(plan.n_preds(5), 1);
}

#[test]
fn plan_is_cached_per_graph() {
    let mut b = GraphBuilder::new(1);
    b.load_arg(0);
    let graph = b.finish().unwrap();
    let first = graph.dependencies();
    let second = graph.dependencies();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.n_instrs(), 1);
}
