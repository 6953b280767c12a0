use super::*;

#[test]
fn load_argument_round_trips_the_argument() {
    let slot0 = MemLocation::cpu(0);
    let graph = ExecutionGraph::new(vec![Instruction::load_argument("arg0", 0, 0, slot0)], 1, 1).unwrap();
    let five = Object::int(5);
    let out = run_graph(graph, vec![slot0], vec![five.clone()]).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0], Object::int(5));
    assert!(Object::same_handle(&out[0], &five));
}

#[test]
fn alloc_then_increment_in_place() {
    let slot0 = MemLocation::cpu(0);
    let instrs = vec![
        Instruction::alloc("alloc", 0, Dtype::F64, vec![], slot0),
        Instruction::return_by_ref("inc", 1, vec![slot0], slot0, increment(), false),
    ];
    let graph = ExecutionGraph::new(instrs, 0, 1).unwrap();
    let out = run_graph(graph, vec![slot0], vec![]).unwrap();
    assert_eq!(out.len(), 1);
    let array = out[0].as_array().unwrap();
    assert_eq!(array.ndim(), 0);
    assert_eq!(array.to_f64_vec().unwrap(), vec![1.0]);
}

#[test]
fn build_tup_aliases_its_inputs() {
    let mut b = GraphBuilder::new(2);
    let a = b.load_arg(0);
    let c = b.load_arg(1);
    let t = b.build_tup(&[a, c]);
    let graph = b.finish().unwrap();

    let arr = Object::array(Array::from_f64(&[2], vec![1.0, 2.0]).unwrap());
    let scalar = Object::float(0.5);
    let out = run_graph(graph, vec![t], vec![arr.clone(), scalar.clone()]).unwrap();
    let tuple = out[0].as_tuple().unwrap();
    assert!(Object::same_handle(&tuple[0], &arr));
    assert!(Object::same_handle(&tuple[1], &scalar));

    arr.as_array().unwrap().fill_f64(9.0).unwrap();
    assert_eq!(tuple[0].as_array().unwrap().to_f64_vec().unwrap(), vec![9.0, 9.0]);
}

#[test]
fn alloc_reads_dimensions_from_slots() {
    let mut b = GraphBuilder::new(2);
    let rows = b.load_arg(0);
    let cols = b.load_arg(1);
    let gpu = b.loc_on(Device::Gpu);
    b.push(Instruction::alloc("alloc", 7, Dtype::I32, vec![rows, cols], gpu));
    let graph = b.finish().unwrap();

    let out = run_graph(graph, vec![gpu], vec![Object::int(2), Object::int(3)]).unwrap();
    let array = out[0].as_array().unwrap();
    assert_eq!(array.shape(), &[2, 3]);
    assert_eq!(array.dtype(), Dtype::I32);
    assert_eq!(array.device(), Device::Gpu);
}

#[test]
fn negative_dimension_fails_the_run() {
    let mut b = GraphBuilder::new(1);
    let n = b.load_arg(0);
    let out = b.alloc(Dtype::F64, &[n]);
    let graph = b.finish().unwrap();
    let err = run_graph(graph, vec![out], vec![Object::int(-2)]).unwrap_err();
    assert!(matches!(exec_error(&err), Some(ExecError::InvalidShape { .. })));
}

#[test]
fn by_val_result_lands_in_the_write_slot() {
    let mut b = GraphBuilder::new(1);
    let x = b.load_arg(0);
    let y = b.by_val("scale", &[x], kernels::scale(4.0));
    let graph = b.finish().unwrap();
    let input = Object::array(Array::from_f64(&[3], vec![1.0, 2.0, 3.0]).unwrap());
    let out = run_graph(graph, vec![y, x], vec![input.clone()]).unwrap();
    assert_eq!(out[0].as_array().unwrap().to_f64_vec().unwrap(), vec![4.0, 8.0, 12.0]);
    assert!(Object::same_handle(&out[1], &input));
}

#[test]
fn argument_count_mismatch_is_rejected() {
    let mut b = GraphBuilder::new(2);
    let a = b.load_arg(0);
    let graph = Arc::new(b.finish().unwrap());
    let mut interp = create_interpreter(graph, vec![a], 1, None).unwrap();
    let err = interp.run(&Tuple::from(vec![Object::int(1)])).unwrap_err();
    assert_eq!(
        exec_error(&err),
        Some(&ExecError::ArgumentCountMismatch { expected: 2, got: 1 })
    );
    // nothing fired, so the interpreter is still usable
    let out = interp.run(&Tuple::from(vec![Object::int(1), Object::int(2)])).unwrap();
    assert_eq!(out[0], Object::int(1));
}

#[test]
fn out_of_range_argument_index_fails_and_poisons() {
    let slot0 = MemLocation::cpu(0);
    let graph = ExecutionGraph::new_unchecked(vec![Instruction::load_argument("arg3", 0, 3, slot0)], 1, 1);
    let mut interp = create_interpreter(Arc::new(graph), vec![slot0], 1, None).unwrap();
    let args = Tuple::from(vec![Object::int(5)]);

    let err = interp.run(&args).unwrap_err();
    assert_eq!(
        exec_error(&err),
        Some(&ExecError::ArgumentIndexOutOfRange { index: 3, n_args: 1 })
    );
    let err = interp.run(&args).unwrap_err();
    assert_eq!(exec_error(&err), Some(&ExecError::Poisoned));
}

#[test]
fn kernel_panic_poisons_sequential_interpreter() {
    let mut b = GraphBuilder::new(0);
    let out = b.by_val("boom", &[], ByValCallable::new(|_| panic!("kernel exploded")));
    let mut interp = create_interpreter(Arc::new(b.finish().unwrap()), vec![out], 1, None).unwrap();

    let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| interp.run(&Tuple::empty())));
    assert!(unwound.is_err());
    let err = interp.run(&Tuple::empty()).unwrap_err();
    assert_eq!(exec_error(&err), Some(&ExecError::Poisoned));
}

#[test]
fn unwritten_read_is_an_internal_error() {
    let instrs = vec![Instruction::build_tup("tuple", 0, vec![MemLocation::cpu(1)], MemLocation::cpu(0))];
    let graph = ExecutionGraph::new_unchecked(instrs, 0, 2);
    let err = run_graph(graph, vec![MemLocation::cpu(0)], vec![]).unwrap_err();
    assert_eq!(
        exec_error(&err),
        Some(&ExecError::UndefinedRead {
            loc: MemLocation::cpu(1)
        })
    );
}

#[test]
fn kernel_errors_propagate_with_context() {
    let mut b = GraphBuilder::new(0);
    let out = b.by_val("explode", &[], ByValCallable::new(|_| Err(anyhow::anyhow!("kernel blew up"))));
    let graph = Arc::new(b.finish().unwrap());
    let mut interp = create_interpreter(graph, vec![out], 1, None).unwrap();

    let err = interp.run(&Tuple::empty()).unwrap_err();
    let chain = format!("{:#}", err);
    assert!(chain.contains("kernel `explode` failed"), "{}", chain);
    assert!(chain.contains("kernel blew up"), "{}", chain);
    assert!(exec_error(&err).is_none());

    let err = interp.run(&Tuple::empty()).unwrap_err();
    assert_eq!(exec_error(&err), Some(&ExecError::Poisoned));
}

#[test]
fn output_locations_are_checked_at_construction() {
    let mut b = GraphBuilder::new(1);
    b.load_arg(0);
    let graph = Arc::new(b.finish().unwrap());
    let err = create_interpreter(graph, vec![MemLocation::cpu(5)], 1, None).err().unwrap();
    assert!(matches!(
        exec_error(&err),
        Some(ExecError::LocationOutOfBounds { n_locs: 1, .. })
    ));
}

#[test]
fn repeated_runs_start_from_a_fresh_arena() {
    let mut b = GraphBuilder::new(1);
    let n = b.load_arg(0);
    let acc = b.alloc(Dtype::F64, &[n]);
    b.by_ref("inc", &[], acc, increment());
    let graph = Arc::new(b.finish().unwrap());
    let mut interp = create_interpreter(graph, vec![acc], 1, None).unwrap();
    let args = Tuple::from(vec![Object::int(3)]);

    let first = interp.run(&args).unwrap();
    let second = interp.run(&args).unwrap();
    assert_eq!(first, second);
    assert_eq!(first[0].as_array().unwrap().to_f64_vec().unwrap(), vec![1.0; 3]);
    // each run allocates its own output; earlier results are not touched
    assert!(!Object::same_handle(&first[0], &second[0]));

    let third = interp.run(&Tuple::from(vec![Object::int(1)])).unwrap();
    assert_eq!(third[0].as_array().unwrap().size(), 1);
}

#[test]
fn arena_releases_handles_between_runs() {
    let mut b = GraphBuilder::new(1);
    let x = b.load_arg(0);
    let graph = Arc::new(b.finish().unwrap());
    let mut interp = create_interpreter(graph, vec![x], 1, None).unwrap();

    let first_arg = Object::int(1);
    let out = interp.run(&Tuple::from(vec![first_arg.clone()])).unwrap();
    drop(out);
    // held by the test and by the arena slot until the next run
    assert_eq!(Arc::strong_count(&first_arg), 2);
    interp.run(&Tuple::from(vec![Object::int(2)])).unwrap();
    assert_eq!(Arc::strong_count(&first_arg), 1);

    let second_arg = Object::int(3);
    interp.run(&Tuple::from(vec![second_arg.clone()])).unwrap();
    drop(interp);
    assert_eq!(Arc::strong_count(&second_arg), 1);
}

#[test]
fn instruction_accessors_are_stable() {
    let loc = MemLocation::cpu(2);
    let instr = Instruction::return_by_ref(
        "inc",
        42,
        vec![MemLocation::cpu(0), MemLocation::cpu(1)],
        loc,
        increment(),
        true,
    );
    for _ in 0..3 {
        assert_eq!(instr.read_locs(), &[MemLocation::cpu(0), MemLocation::cpu(1)]);
        assert_eq!(instr.write_loc(), loc);
    }
    assert_eq!(instr.kind(), InstructionKind::ReturnByRef);
    assert_eq!(instr.provenance(), 42);
    assert!(instr.quick());
    assert!(!instr.produces());
    assert_eq!(instr.to_string(), "@2 = inc(@0, @1)");

    let load = Instruction::load_argument("arg0", 0, 0, MemLocation::cpu(0));
    assert!(load.quick());
    assert!(matches!(load.op(), InstrOp::LoadArgument { index: 0 }));
    assert_ne!(load.id(), instr.id());
}

#[test]
fn empty_graph_returns_empty_tuple() {
    let graph = ExecutionGraph::new(vec![], 0, 0).unwrap();
    let out = run_graph(graph, vec![], vec![]).unwrap();
    assert!(out.is_empty());
}
