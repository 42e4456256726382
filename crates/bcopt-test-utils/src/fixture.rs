//! Program fixtures and a propagation recorder for interpreter tests.

use std::fmt;

use bcopt_interp::{CollectedInfo, Index, Interp, RunFlags, State, run};
use bcopt_ir::{BlockId, Func, FuncAttrs, FuncId, Param, Program};
use bcopt_types::Type;

/// One call of the propagation callback.
#[derive(Clone, Debug, PartialEq)]
pub struct Propagation {
    pub block: BlockId,
    pub state: Option<State>,
}

/// Records every propagation a block run makes, in order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropagateLog {
    pub events: Vec<Propagation>,
}

impl PropagateLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A callback appending to this log.
    pub fn recorder(&mut self) -> impl FnMut(BlockId, Option<&State>) + '_ {
        move |block: BlockId, state: Option<&State>| {
            self.events.push(Propagation {
                block,
                state: state.cloned(),
            })
        }
    }

    pub fn targets(&self) -> Vec<BlockId> {
        self.events.iter().map(|e| e.block).collect()
    }

    /// Blocks asked to re-run without a new state.
    pub fn forced(&self) -> Vec<BlockId> {
        self.events
            .iter()
            .filter(|e| e.state.is_none())
            .map(|e| e.block)
            .collect()
    }
}

impl fmt::Display for PropagateLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for event in &self.events {
            match &event.state {
                Some(state) => writeln!(f, "B{} <- {state}", event.block)?,
                None => writeln!(f, "B{} <- reprocess", event.block)?,
            }
        }
        Ok(())
    }
}

/// Everything observable from one block run.
#[derive(Debug)]
pub struct BlockRun {
    pub flags: RunFlags,
    pub log: PropagateLog,
    /// State after the last interpreted instruction.
    pub state: State,
    pub collect: CollectedInfo,
}

/// Run block `block` of `func` from `state`.
pub fn run_block(index: &Index, func: FuncId, block: u32, mut state: State) -> BlockRun {
    let ctx = index.context(func);
    let blk = &index.func(func).blocks[block as usize];
    let mut collect = CollectedInfo::new();
    let mut log = PropagateLog::new();
    let flags = run(
        &mut Interp::new(index, ctx, &mut collect, blk, &mut state),
        log.recorder(),
    );
    BlockRun {
        flags,
        log,
        state,
        collect,
    }
}

/// Declare a builtin.
pub fn builtin(name: &str, params: Vec<Param>, ret: Type, attrs: FuncAttrs) -> Func {
    Func::builder()
        .name(name)
        .params(params)
        .ret_type(ret)
        .attrs(attrs | FuncAttrs::BUILTIN)
        .new()
}

fn standard_builtins() -> Vec<Func> {
    let pure = FuncAttrs::FOLDABLE | FuncAttrs::NO_THROW;
    vec![
        builtin(
            "strlen",
            vec![Param::new("s").typed(Type::str())],
            Type::int(),
            pure,
        ),
        builtin(
            "strtolower",
            vec![Param::new("s").typed(Type::str())],
            Type::str(),
            pure,
        ),
        builtin(
            "str_repeat",
            vec![
                Param::new("s").typed(Type::str()),
                Param::new("n").typed(Type::int()),
            ],
            Type::str(),
            FuncAttrs::FOLDABLE,
        ),
        builtin(
            "intval",
            vec![
                Param::new("v"),
                Param::new("base")
                    .typed(Type::int())
                    .default_value(bcopt_types::ConstValue::Int(10)),
            ],
            Type::int(),
            pure,
        ),
        builtin(
            "function_exists",
            vec![Param::new("name").typed(Type::str())],
            Type::bool(),
            FuncAttrs::NO_THROW,
        ),
        builtin(
            "compact",
            vec![Param::new("names")],
            Type::arr(),
            FuncAttrs::READS_CALLER_FRAME | FuncAttrs::VARIADIC,
        ),
    ]
}

/// A program holding a few common builtins (`strlen`, `strtolower`,
/// `str_repeat`, `intval`, `function_exists`, `compact`) followed by `funcs`.
pub fn program_with(funcs: impl IntoIterator<Item = Func>) -> Program {
    let mut program = Program::new();
    for func in standard_builtins().into_iter().chain(funcs) {
        program.add_func(func);
    }
    program
}

/// Id of the `n`th function passed to [`program_with`].
pub fn user_func(n: u32) -> FuncId {
    FuncId::new(standard_builtins().len() as u32 + n)
}
