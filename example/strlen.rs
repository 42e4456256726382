use std::sync::Arc;

use bcopt::prelude::*;

/// ```text
/// function greeting_len() {
///     $s = "hello";
///     if (function_exists("strlen")) {
///         return strlen($s);
///     }
///     return 0;
/// }
/// ```
fn greeting_len() -> Func {
    let s = LocalId::new(0);
    Func::builder()
        .name("greeting_len")
        .num_locals(1)
        .blocks(vec![
            Block::new(
                0,
                vec![
                    Bytecode::String(Arc::from("hello")),
                    Bytecode::PopL(s),
                    Bytecode::String(Arc::from("strlen")),
                    Bytecode::FCallD {
                        nargs: 1,
                        func: Arc::from("function_exists"),
                        unpack: false,
                    },
                    Bytecode::JmpZ(BlockId::new(2)),
                ],
            )
            .fallthrough(1),
            Block::new(
                1,
                vec![
                    Bytecode::CGetL(s),
                    Bytecode::FCallD {
                        nargs: 1,
                        func: Arc::from("strlen"),
                        unpack: false,
                    },
                    Bytecode::RetC,
                ],
            ),
            Block::new(2, vec![Bytecode::Int(0), Bytecode::RetC]),
        ])
        .new()
}

fn builtin(name: &str, param: Type, ret: Type, attrs: FuncAttrs) -> Func {
    Func::builder()
        .name(name)
        .params(vec![Param::new("arg").typed(param)])
        .ret_type(ret)
        .attrs(attrs | FuncAttrs::BUILTIN)
        .new()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut program = Program::new();
    program.add_func(builtin(
        "strlen",
        Type::str(),
        Type::int(),
        FuncAttrs::FOLDABLE | FuncAttrs::NO_THROW,
    ));
    program.add_func(builtin(
        "function_exists",
        Type::str(),
        Type::bool(),
        FuncAttrs::NO_THROW,
    ));
    let func = program.add_func(greeting_len());

    let mut index = Index::new(program)?;
    let analysis = FuncAnalyzer::new(&mut index).analyze(func)?;

    for (i, state) in analysis.entry_states.iter().enumerate() {
        match state {
            Some(state) => println!("B{i}: {state}"),
            None => println!("B{i}: unreachable"),
        }
    }
    println!("returns {}", analysis.return_type);
    Ok(())
}
