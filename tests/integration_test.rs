//! End-to-end scenarios over whole JSON programs.

use prism::ir::{Instr, Literal, Op, Program};
use prism::{opt, ssa};
use serde_json::json;

fn parse(value: serde_json::Value) -> Program {
    serde_json::from_value(value).expect("valid program JSON")
}

fn ops(instrs: &[Instr]) -> Vec<Option<Op>> {
    instrs.iter().map(Instr::op).collect()
}

#[test]
fn test_constant_folding_pipeline() {
    let program = parse(json!({
        "functions": [{
            "name": "main",
            "instrs": [
                {"op": "const", "dest": "a", "type": "int", "value": 2},
                {"op": "const", "dest": "b", "type": "int", "value": 3},
                {"op": "add", "dest": "c", "type": "int", "args": ["a", "b"]},
                {"op": "print", "args": ["c"]}
            ]
        }]
    }));

    let out = opt::lvn::run(&program.functions[0]).unwrap();
    assert_eq!(
        out[2],
        serde_json::from_value(json!({"op": "const", "dest": "c", "type": "int", "value": 5}))
            .unwrap()
    );
}

#[test]
fn test_common_subexpression_then_cleanup() {
    let program = parse(json!({
        "functions": [{
            "name": "main",
            "instrs": [
                {"op": "add", "dest": "x", "type": "int", "args": ["a", "b"]},
                {"op": "add", "dest": "y", "type": "int", "args": ["a", "b"]},
                {"op": "print", "args": ["y"]}
            ]
        }]
    }));

    let func = &program.functions[0];
    let after_lvn = opt::lvn::run(func).unwrap();
    assert_eq!(after_lvn[1].op(), Some(Op::Id));

    // x feeds y's copy, so global DCE keeps both.
    let cleaned = opt::dce::global(&prism::Function {
        instrs: after_lvn,
        ..func.clone()
    })
    .unwrap();
    assert_eq!(cleaned.len(), 3);
}

#[test]
fn test_commutative_canonicalization() {
    let program = parse(json!({
        "functions": [{
            "name": "main",
            "instrs": [
                {"op": "add", "dest": "x", "type": "int", "args": ["a", "b"]},
                {"op": "add", "dest": "y", "type": "int", "args": ["b", "a"]},
                {"op": "print", "args": ["y"]}
            ]
        }]
    }));

    let out = opt::lvn::run(&program.functions[0]).unwrap();
    assert_eq!(out[1].op(), Some(Op::Id));
    assert_eq!(out[1].args(), ["x".to_string()]);
}

#[test]
fn test_idempotent_compare_folds_to_true() {
    let program = parse(json!({
        "functions": [{
            "name": "main",
            "instrs": [
                {"op": "eq", "dest": "z", "type": "bool", "args": ["a", "a"]},
                {"op": "print", "args": ["z"]}
            ]
        }]
    }));

    let out = opt::lvn::run(&program.functions[0]).unwrap();
    match &out[0] {
        Instr::Const { value, .. } => assert_eq!(*value, Literal::Bool(true)),
        other => panic!("expected folded const, got {:?}", other),
    }
}

#[test]
fn test_licm_hoists_invariant_out_of_loop() {
    let program = parse(json!({
        "functions": [{
            "name": "main",
            "instrs": [
                {"op": "const", "dest": "p", "type": "int", "value": 2},
                {"op": "const", "dest": "q", "type": "int", "value": 3},
                {"op": "const", "dest": "cond", "type": "bool", "value": true},
                {"label": "header"},
                {"op": "add", "dest": "x", "type": "int", "args": ["p", "q"]},
                {"op": "print", "args": ["x"]},
                {"op": "br", "args": ["cond"], "labels": ["header", "end"]},
                {"label": "end"},
                {"op": "ret"}
            ]
        }]
    }));

    let out = opt::licm::run(&program.functions[0]).unwrap();
    let add_idx = out.iter().position(|i| i.op() == Some(Op::Add)).unwrap();
    let header_idx = out
        .iter()
        .position(|i| matches!(i, Instr::Label { label } if label == "header"))
        .unwrap();
    assert!(add_idx < header_idx, "invariant add should precede the loop");
}

#[test]
fn test_dead_store_scenario() {
    let program = parse(json!({
        "functions": [{
            "name": "main",
            "instrs": [
                {"op": "const", "dest": "one", "type": "int", "value": 1},
                {"op": "const", "dest": "v1", "type": "int", "value": 10},
                {"op": "const", "dest": "v2", "type": "int", "value": 20},
                {"op": "alloc", "dest": "p", "type": {"ptr": "int"}, "args": ["one"]},
                {"op": "store", "args": ["p", "v1"]},
                {"op": "store", "args": ["p", "v2"]},
                {"op": "load", "dest": "w", "type": "int", "args": ["p"]},
                {"op": "print", "args": ["w"]},
                {"op": "free", "args": ["p"]},
                {"op": "ret"}
            ]
        }]
    }));

    let out = opt::dead_store::eliminate(&program.functions[0]).unwrap();
    let stores: Vec<&Instr> = out.iter().filter(|i| i.op() == Some(Op::Store)).collect();
    assert_eq!(stores.len(), 1);
    assert_eq!(stores[0].args()[1], "v2");
}

#[test]
fn test_ssa_round_trip_structure() {
    let program = parse(json!({
        "functions": [{
            "name": "main",
            "instrs": [
                {"op": "const", "dest": "cond", "type": "bool", "value": true},
                {"op": "br", "args": ["cond"], "labels": ["left", "right"]},
                {"label": "left"},
                {"op": "const", "dest": "a", "type": "int", "value": 1},
                {"op": "jmp", "labels": ["join"]},
                {"label": "right"},
                {"op": "const", "dest": "a", "type": "int", "value": 2},
                {"op": "jmp", "labels": ["join"]},
                {"label": "join"},
                {"op": "print", "args": ["a"]},
                {"op": "ret"}
            ]
        }]
    }));

    let func = &program.functions[0];
    let ssa_instrs = ssa::construct(func).unwrap();
    let ssa_func = prism::Function {
        instrs: ssa_instrs.clone(),
        ..func.clone()
    };
    assert!(ssa::is_ssa(&Program {
        functions: vec![ssa_func.clone()]
    }));
    assert!(ssa_instrs.iter().any(|i| i.op() == Some(Op::Phi)));

    let back = ssa::destruct(&ssa_func).unwrap();
    assert!(back.iter().all(|i| i.op() != Some(Op::Phi)));
    // The merged value is re-materialized with copies on both branches, and
    // the print still reads the merged name.
    let copies = back.iter().filter(|i| i.op() == Some(Op::Id)).count();
    assert_eq!(copies, 2);
    let print = back.iter().find(|i| i.op() == Some(Op::Print)).unwrap();
    let printed = &print.args()[0];
    assert!(back
        .iter()
        .any(|i| i.op() == Some(Op::Id) && i.dest() == Some(printed.as_str())));
}

#[test]
fn test_lvn_is_idempotent() {
    let program = parse(json!({
        "functions": [{
            "name": "main",
            "instrs": [
                {"op": "const", "dest": "a", "type": "int", "value": 2},
                {"op": "const", "dest": "b", "type": "int", "value": 3},
                {"op": "add", "dest": "c", "type": "int", "args": ["a", "b"]},
                {"op": "mul", "dest": "d", "type": "int", "args": ["b", "a"]},
                {"op": "print", "args": ["c"]},
                {"op": "print", "args": ["d"]}
            ]
        }]
    }));

    let func = &program.functions[0];
    let once = opt::lvn::run(func).unwrap();
    let twice = opt::lvn::run(&prism::Function {
        instrs: once.clone(),
        ..func.clone()
    })
    .unwrap();
    assert_eq!(once, twice);
}

#[test]
fn test_dce_is_monotone_and_preserves_effects() {
    let program = parse(json!({
        "functions": [{
            "name": "main",
            "instrs": [
                {"op": "const", "dest": "a", "type": "int", "value": 1},
                {"op": "const", "dest": "dead", "type": "int", "value": 2},
                {"op": "print", "args": ["a"]},
                {"op": "ret"}
            ]
        }]
    }));

    let func = &program.functions[0];
    for pass in [opt::dce::eliminate, opt::dce::local, opt::dce::global] {
        let out = pass(func).unwrap();
        assert!(out.len() <= func.instrs.len());
        assert_eq!(ops(&out).iter().filter(|o| **o == Some(Op::Print)).count(), 1);
        assert_eq!(ops(&out).iter().filter(|o| **o == Some(Op::Ret)).count(), 1);
    }

    let out = opt::dce::eliminate(func).unwrap();
    assert!(out.iter().all(|i| i.dest() != Some("dead")));
}

#[test]
fn test_program_json_round_trip_is_verbatim() {
    let source = json!({
        "functions": [{
            "name": "main",
            "args": [{"name": "n", "type": "int"}, {"name": "p", "type": {"ptr": "int"}}],
            "type": "int",
            "instrs": [
                {"op": "const", "dest": "a", "type": "int", "value": 2},
                {"label": "loop"},
                {"op": "add", "dest": "a", "type": "int", "args": ["a", "n"]},
                {"op": "store", "args": ["p", "a"]},
                {"op": "gt", "dest": "big", "type": "bool", "args": ["a", "n"]},
                {"op": "br", "args": ["big"], "labels": ["out", "loop"]},
                {"label": "out"},
                {"op": "ret", "args": ["a"]}
            ]
        }]
    });

    let program: Program = serde_json::from_value(source.clone()).unwrap();
    let back = serde_json::to_value(&program).unwrap();
    assert_eq!(back, source);
}

#[test]
fn test_pipeline_lvn_then_liveness_shrinks_program() {
    let program = parse(json!({
        "functions": [{
            "name": "main",
            "instrs": [
                {"op": "const", "dest": "a", "type": "int", "value": 2},
                {"op": "const", "dest": "b", "type": "int", "value": 3},
                {"op": "add", "dest": "c", "type": "int", "args": ["a", "b"]},
                {"op": "add", "dest": "d", "type": "int", "args": ["b", "a"]},
                {"op": "print", "args": ["d"]},
                {"op": "ret"}
            ]
        }]
    }));

    let func = &program.functions[0];
    let after_lvn = opt::lvn::run(func).unwrap();
    let after_dce = opt::dce::eliminate(&prism::Function {
        instrs: after_lvn,
        ..func.clone()
    })
    .unwrap();

    // d folds to 5 and a, b, c all die.
    assert!(after_dce.len() < func.instrs.len());
    let d = after_dce.iter().find(|i| i.dest() == Some("d")).unwrap();
    assert!(matches!(
        d,
        Instr::Const {
            value: Literal::Int(5),
            ..
        }
    ));
}
