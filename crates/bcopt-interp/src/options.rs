/// Switches for the optional rewrites the interpreter reports.
///
/// Disabling an option only forgoes an optimization; the abstract states
/// computed are sound either way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    /// Evaluate calls to foldable builtins with constant arguments.
    pub const_fold_builtins: bool,
    /// Report cheaper replacement sequences in `StepFlags::strength_reduced`.
    pub strength_reduce: bool,
    /// Resolve `function_exists` on constant names at analysis time.
    pub fold_function_exists: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            const_fold_builtins: true,
            strength_reduce: true,
            fold_function_exists: true,
        }
    }
}
