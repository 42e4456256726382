use std::fmt::Write;
use std::sync::Arc;

use bcopt::prelude::*;
use bcopt_test_utils::{program_with, user_func};

fn call(nargs: u32, name: &str) -> Bytecode {
    Bytecode::FCallD {
        nargs,
        func: Arc::from(name),
        unpack: false,
    }
}

/// `$s = "hello"; if (function_exists("strlen")) return strlen($s); return 0;`
fn guarded_strlen() -> Func {
    let s = LocalId::new(0);
    Func::builder()
        .name("guarded")
        .num_locals(1)
        .blocks(vec![
            Block::new(
                0,
                vec![
                    Bytecode::String(Arc::from("hello")),
                    Bytecode::PopL(s),
                    Bytecode::String(Arc::from("strlen")),
                    call(1, "function_exists"),
                    Bytecode::JmpZ(BlockId::new(2)),
                ],
            )
            .fallthrough(1),
            Block::new(1, vec![Bytecode::CGetL(s), call(1, "strlen"), Bytecode::RetC]),
            Block::new(2, vec![Bytecode::Int(0), Bytecode::RetC]),
        ])
        .new()
}

fn listing(analysis: &FuncAnalysis) -> String {
    let mut out = String::new();
    for (i, state) in analysis.entry_states.iter().enumerate() {
        match state {
            Some(state) => writeln!(out, "B{i}: {state}").unwrap(),
            None => writeln!(out, "B{i}: unreachable").unwrap(),
        }
    }
    writeln!(out, "returns {}", analysis.return_type).unwrap();
    out
}

#[test]
fn folds_through_a_guarded_builtin_call() {
    let mut index = Index::new(program_with([guarded_strlen()])).unwrap();
    let analysis = FuncAnalyzer::new(&mut index).analyze(user_func(0)).unwrap();
    insta::assert_snapshot!(listing(&analysis).trim_end(), @r#"
    B0: locals [Uninit] stack []
    B1: locals [Str="hello"] stack []
    B2: unreachable
    returns Int=5
    "#);
}

#[test]
fn disabled_folding_keeps_the_call() {
    let index = Index::new(program_with([guarded_strlen()])).unwrap();
    let mut index = index.with_options(Options {
        const_fold_builtins: false,
        fold_function_exists: false,
        ..Options::default()
    });
    let analysis = FuncAnalyzer::new(&mut index).analyze(user_func(0)).unwrap();
    assert!(analysis.is_reachable(BlockId::new(2)));
    assert_eq!(analysis.return_type, Type::int());
}
