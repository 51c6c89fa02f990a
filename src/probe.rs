//! Observation hooks into a running worker.
//!
//! Grounded on the original controller's `LocalProbe`: a small set of
//! callbacks a worker invokes at well-defined points, used for tracing,
//! step budgets, and test assertions without the VM loop itself knowing
//! about any of those concerns.

use crate::bytecode::Op;
use crate::error::{Error, Result};

/// Hooks a worker calls during execution (§2b).
pub trait Probe: Send + Sync {
    /// Called before each instruction executes.
    fn on_step(&self, worker_id: u64, ip: usize, op: &Op) -> Result<()> {
        let _ = (worker_id, ip, op);
        Ok(())
    }

    /// Called once when a worker's `run` loop starts (or resumes after a
    /// `Wait`).
    fn on_run(&self, worker_id: u64) {
        let _ = worker_id;
    }

    /// Called once a worker stops running, whether because it returned
    /// from its outermost frame or suspended on `Wait`.
    fn on_stopped(&self, worker_id: u64) {
        let _ = worker_id;
    }

    /// Called when a worker enters a new call frame.
    fn on_enter(&self, worker_id: u64, function_id: &str) {
        let _ = (worker_id, function_id);
    }

    /// Called when a worker returns from its outermost frame with its
    /// final value logged for diagnostics.
    fn on_return(&self, worker_id: u64) {
        let _ = worker_id;
    }

    /// A free-form log line, used by the `print` builtin (§6).
    fn log(&self, worker_id: u64, message: &str) {
        let _ = (worker_id, message);
    }
}

/// A probe that does nothing and never objects to anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProbe;

impl Probe for NoopProbe {}

/// A probe enforcing a hard cap on the number of instructions a single
/// worker may execute, so a runaway or looping program cannot occupy a
/// worker (and its invoker thread) forever (§2b, §5).
#[derive(Debug)]
pub struct StepBudgetProbe {
    limit: u64,
    steps: std::sync::atomic::AtomicU64,
}

impl StepBudgetProbe {
    pub fn new(limit: u64) -> Self {
        StepBudgetProbe {
            limit,
            steps: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn steps_taken(&self) -> u64 {
        self.steps.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl Probe for StepBudgetProbe {
    fn on_step(&self, _worker_id: u64, _ip: usize, _op: &Op) -> Result<()> {
        let taken = self
            .steps
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1;
        if taken > self.limit {
            return Err(Error::BudgetExceeded(self.limit));
        }
        Ok(())
    }

    fn log(&self, worker_id: u64, message: &str) {
        tracing::info!(worker_id, %message, "probe log");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn noop_probe_accepts_everything() {
        let probe = NoopProbe;
        assert!(probe.on_step(0, 0, &Op::Pop).is_ok());
    }

    #[test]
    fn step_budget_probe_errors_once_exhausted() {
        let probe = StepBudgetProbe::new(2);
        assert!(probe.on_step(0, 0, &Op::PushV(Value::Null)).is_ok());
        assert!(probe.on_step(0, 1, &Op::PushV(Value::Null)).is_ok());
        let err = probe.on_step(0, 2, &Op::PushV(Value::Null)).unwrap_err();
        assert!(matches!(err, Error::BudgetExceeded(2)));
    }
}
