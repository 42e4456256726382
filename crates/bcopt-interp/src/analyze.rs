use std::collections::BTreeSet;

use bcopt_ir::{BlockId, Func, FuncId, LocalId};
use bcopt_types::{HasBottom, Lattice, Type};
use petgraph::graph::DiGraph;
use petgraph::visit::DfsPostOrder;
use tracing::{debug, warn};

use crate::collect::CollectedInfo;
use crate::dispatch::default_dispatch;
use crate::error::AnalyzeError;
use crate::flags::RunFlags;
use crate::index::Index;
use crate::interp::{DispatchFn, Interp, run_with};
use crate::state::State;

/// Fixpoint result for one function.
#[derive(Clone, Debug)]
pub struct FuncAnalysis {
    pub func: FuncId,
    /// Entry state of every block, `None` for blocks never reached.
    pub entry_states: Vec<Option<State>>,
    /// Flags from the final run of every reached block.
    pub block_flags: Vec<Option<RunFlags>>,
    /// Join of every block's return contribution.
    pub return_type: Type,
    /// The parameter every return passes through unmodified, if they agree.
    pub ret_param: Option<LocalId>,
    pub collect: CollectedInfo,
    /// Number of block runs performed.
    pub visits: usize,
}

impl FuncAnalysis {
    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.entry_states[block.index()].is_some()
    }
}

/// Worklist driver that runs the blocks of a function to a fixpoint.
///
/// Blocks are visited in reverse post-order. A block is re-run when its entry
/// state grows, when it is explicitly asked for through a `None`
/// propagation, or when a local static it used has been widened in the
/// index since its last run.
pub struct FuncAnalyzer<'i> {
    index: &'i mut Index,
    max_iterations: usize,
    max_passes: usize,
    dispatch: DispatchFn,
}

impl<'i> FuncAnalyzer<'i> {
    pub fn new(index: &'i mut Index) -> Self {
        FuncAnalyzer {
            index,
            max_iterations: 10_000,
            max_passes: 16,
            dispatch: default_dispatch,
        }
    }

    /// Limit the number of block runs per function.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Limit the number of whole-program passes in
    /// [`analyze_program`](Self::analyze_program).
    pub fn with_max_passes(mut self, max: usize) -> Self {
        self.max_passes = max;
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchFn) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn index(&self) -> &Index {
        self.index
    }

    /// Analyze every function with a body until inferred return types stop
    /// changing, and return the analyses of the final pass.
    pub fn analyze_program(&mut self) -> Result<Vec<FuncAnalysis>, AnalyzeError> {
        let funcs: Vec<FuncId> = self
            .index
            .program()
            .func_ids()
            .filter(|id| !self.index.func(*id).blocks.is_empty())
            .collect();
        for pass in 1..=self.max_passes {
            let mut changed = false;
            let mut results = Vec::with_capacity(funcs.len());
            for &func in &funcs {
                let analysis = self.analyze(func)?;
                changed |= self
                    .index
                    .refine_return_type(func, analysis.return_type.clone());
                results.push(analysis);
            }
            debug!(pass, changed, "program pass done");
            if !changed {
                return Ok(results);
            }
        }
        warn!(passes = self.max_passes, "return types did not stabilize");
        Err(AnalyzeError::PassesExhausted(self.max_passes))
    }

    /// Run the blocks of `func_id` to a fixpoint.
    pub fn analyze(&mut self, func_id: FuncId) -> Result<FuncAnalysis, AnalyzeError> {
        // The index is refined while blocks run, so work on a copy.
        let func = self.index.func(func_id).clone();
        if func.blocks.is_empty() {
            return Err(AnalyzeError::NoBody(func.name.clone()));
        }
        let ctx = self.index.context(func_id);
        let num_blocks = func.blocks.len();
        let rank = rpo_ranks(&func);

        let mut entry_states: Vec<Option<State>> = vec![None; num_blocks];
        let mut block_flags: Vec<Option<RunFlags>> = vec![None; num_blocks];
        let mut collect = CollectedInfo::new();
        let mut worklist = BTreeSet::new();

        entry_states[func.entry.index()] = Some(State::entry(&func));
        worklist.insert((rank[func.entry.index()], func.entry));

        let mut visits = 0;
        while let Some((_, bid)) = worklist.pop_first() {
            // A forced re-run of a block nothing has reached yet has nothing
            // to interpret.
            let Some(mut state) = entry_states[bid.index()].clone() else {
                continue;
            };
            visits += 1;
            if visits > self.max_iterations {
                warn!(func = %func.name, visits, "fixpoint fuel exhausted");
                return Err(AnalyzeError::FuelExhausted {
                    func: func.name.clone(),
                    limit: self.max_iterations,
                });
            }

            let mut outgoing: Vec<(BlockId, Option<State>)> = Vec::new();
            let flags = {
                let mut interp = Interp::new(
                    &*self.index,
                    ctx,
                    &mut collect,
                    &func.blocks[bid.index()],
                    &mut state,
                );
                run_with(
                    &mut interp,
                    |target, out| outgoing.push((target, out.cloned())),
                    self.dispatch,
                )
            };
            block_flags[bid.index()] = Some(flags);

            let mut widened = false;
            for (local, ty) in &collect.local_statics {
                widened |= self.index.refine_local_static(func_id, *local, ty);
            }

            for (target, out) in outgoing {
                let Some(out) = out else {
                    debug!(block = %target, "forced re-run");
                    worklist.insert((rank[target.index()], target));
                    continue;
                };
                let changed = if let Some(existing) = entry_states[target.index()].as_mut() {
                    existing.merge(&out)
                } else {
                    entry_states[target.index()] = Some(out);
                    true
                };
                if changed {
                    worklist.insert((rank[target.index()], target));
                }
            }

            if widened {
                for (i, flags) in block_flags.iter().enumerate() {
                    if let Some(flags) = flags {
                        if self.uses_stale_static(func_id, flags) {
                            let stale = BlockId::new(i as u32);
                            debug!(block = %stale, "re-run after local static widened");
                            worklist.insert((rank[i], stale));
                        }
                    }
                }
            }
        }

        let (return_type, ret_param) = fold_returns(&block_flags);
        debug!(
            func = %func.name,
            visits,
            return_type = %return_type,
            "function analyzed"
        );
        Ok(FuncAnalysis {
            func: func_id,
            entry_states,
            block_flags,
            return_type,
            ret_param,
            collect,
            visits,
        })
    }

    fn uses_stale_static(&self, func: FuncId, flags: &RunFlags) -> bool {
        flags.used_local_statics.as_ref().is_some_and(|used| {
            used.iter()
                .any(|(local, seen)| self.index.lookup_local_static(func, *local) != *seen)
        })
    }
}

/// Reverse post-order rank of every block; unreachable blocks sort last.
fn rpo_ranks(func: &Func) -> Vec<usize> {
    let num_blocks = func.blocks.len();
    let mut graph = DiGraph::<(), ()>::with_capacity(num_blocks, num_blocks);
    let nodes: Vec<_> = (0..num_blocks).map(|_| graph.add_node(())).collect();
    for blk in &func.blocks {
        for succ in blk.successors() {
            graph.add_edge(nodes[blk.id.index()], nodes[succ.index()], ());
        }
    }

    let mut post_order = Vec::with_capacity(num_blocks);
    let mut dfs = DfsPostOrder::new(&graph, nodes[func.entry.index()]);
    while let Some(node) = dfs.next(&graph) {
        post_order.push(node.index());
    }

    let mut rank: Vec<usize> = (0..num_blocks).map(|i| num_blocks + i).collect();
    for (r, block) in post_order.into_iter().rev().enumerate() {
        rank[block] = r;
    }
    rank
}

/// Join the returns of all blocks. The function returns a parameter only
/// if every returning block returns that same parameter.
fn fold_returns(block_flags: &[Option<RunFlags>]) -> (Type, Option<LocalId>) {
    let mut ty = Type::bottom();
    let mut param: Option<Option<LocalId>> = None;
    for flags in block_flags.iter().flatten() {
        if flags.returned.is_none() {
            continue;
        }
        ty = ty.join(&flags.return_contribution());
        param = Some(match param {
            None => flags.ret_param,
            Some(p) if p == flags.ret_param => p,
            Some(_) => None,
        });
    }
    (ty, param.flatten())
}
