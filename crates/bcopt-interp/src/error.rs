use std::sync::Arc;

/// Failures of the fixpoint driver.
///
/// Interpreting a single block never fails; these only arise when
/// iterating a whole function or program.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalyzeError {
    /// The block worklist did not drain within the configured visit budget.
    #[error("function '{func}' did not reach a fixpoint within {limit} block visits")]
    FuelExhausted { func: Arc<str>, limit: usize },
    /// Builtins and declarations cannot be analyzed.
    #[error("function '{0}' has no body")]
    NoBody(Arc<str>),
    /// Inferred return types kept changing across whole-program passes.
    #[error("return types did not stabilize within {0} passes")]
    PassesExhausted(usize),
}
