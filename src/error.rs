//! Crate-wide error type.
//!
//! Every fallible operation in this crate — compilation, a single worker
//! step, or a controller operation — returns [`Result`]. There is no panic
//! path for program-level mistakes (unbound symbols, bad arity, type
//! mismatches); those are always [`Error`] variants so a host can recover
//! a session rather than unwind across worker threads.

use thiserror::Error;

/// All ways this crate can fail, from compilation through to controller
/// bookkeeping.
#[derive(Debug, Error)]
pub enum Error {
    /// The AST could not be lowered to bytecode: a malformed top-level form,
    /// an assignment to a non-identifier, or an unsupported construct.
    #[error("compile error: {0}")]
    CompileError(String),

    /// `PushB` found no binding for a symbol under any of the four lookup
    /// tiers (locals, functions, foreign table, builtins).
    #[error("unbound symbol: '{0}'")]
    UnboundSymbol(String),

    /// An operator or call site was given a value of the wrong shape —
    /// arithmetic on non-numbers, calling a non-callable, `conc`'s second
    /// argument not a list, and so on.
    #[error("type error: {0}")]
    TypeError(String),

    /// `Wait` inspected a list that transitively contains an unresolved
    /// future. The VM does not search arbitrary structured data for
    /// futures, only directly-waited values and lists.
    #[error("waiting on structured data containing futures")]
    FutureShapeError,

    /// A probe-enforced step budget was exhausted. Fatal for the session,
    /// not just the worker that hit it.
    #[error("step budget of {0} instructions exceeded")]
    BudgetExceeded(u64),

    /// The controller observed a state it should be structurally
    /// impossible to reach: a future resolved twice, a terminated worker
    /// invoked again, or a cyclic future chain.
    #[error("controller error: {0}")]
    ControllerError(#[from] ControllerError),
}

/// Specific controller-invariant violations, kept as their own enum so
/// callers can match on which invariant broke without parsing a message.
///
/// A worker invoked again after it has already terminated, or an id with
/// no matching worker, are not represented here: both are handled as
/// silent no-ops at the call sites that can observe them (`run_worker`,
/// `wake`, `is_terminated`) rather than surfaced as errors, since they can
/// only arise from a resolution racing against a controller that has
/// already torn the worker's record down — by the time either would fire,
/// there is no caller left waiting on the outcome.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("future already resolved")]
    FutureAlreadyResolved,

    #[error("cyclic future chain detected")]
    CyclicFutureChain,
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
