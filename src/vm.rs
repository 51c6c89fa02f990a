//! The fetch-decode-execute loop.
//!
//! `step` advances a single worker by exactly one instruction and is pure
//! with respect to everything except the worker it's given: spawning a new
//! worker for `ACall` and calling out to a host function both go through
//! small trait objects ([`Spawner`], [`HostFunctions`]) so this module
//! never needs to know how the controller tracks workers or futures.

use std::sync::Arc;

use crate::bytecode::{Executable, Op};
use crate::error::{Error, Result};
use crate::future::Future;
use crate::probe::Probe;
use crate::value::Value;
use crate::worker::WorkerState;
use crate::builtins;

/// How a controller spawns the worker behind an `ACall`. Implemented by
/// the controller; `step` only needs to ask for it.
pub trait Spawner {
    fn spawn(&self, function_id: &str, args: Vec<Value>) -> Arc<Future>;
}

/// How a `Call`/`ACall` on a `ForeignPtr` reaches a host-provided function.
pub trait HostFunctions: Send + Sync {
    fn call(&self, module: &str, name: &str, args: Vec<Value>) -> Result<Value>;
}

/// A `HostFunctions` that has none registered; any foreign call errors.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHostFunctions;

impl HostFunctions for NoHostFunctions {
    fn call(&self, module: &str, name: &str, _args: Vec<Value>) -> Result<Value> {
        Err(Error::UnboundSymbol(format!("{module}.{name}")))
    }
}

/// What happened after one `step`.
pub enum StepOutcome {
    /// The worker should keep running.
    Continue,
    /// The worker's outermost frame returned; it is done for good.
    Finished(Value),
    /// The worker suspended on `Wait` and must be resumed later by the
    /// controller once the future it's waiting on resolves.
    Suspended,
}

/// Pop `arity` arguments pushed in call order (so they come off the stack
/// in reverse) and restore their original left-to-right order.
fn pop_args(worker: &mut WorkerState, arity: usize) -> Result<Vec<Value>> {
    let mut args = Vec::with_capacity(arity);
    for _ in 0..arity {
        args.push(
            worker
                .pop()
                .ok_or_else(|| Error::TypeError("call: not enough arguments on the stack".into()))?,
        );
    }
    args.reverse();
    Ok(args)
}

fn frame_locals_snapshot(worker: &WorkerState) -> crate::value::Bindings {
    worker.locals().clone()
}

/// Advance `worker` by exactly one instruction.
pub fn step(
    worker: &mut WorkerState,
    exe: &Executable,
    probe: &dyn Probe,
    worker_id: u64,
    host: &dyn HostFunctions,
    spawner: &dyn Spawner,
) -> Result<StepOutcome> {
    let op = exe.code[worker.ip].clone();
    probe.on_step(worker_id, worker.ip, &op)?;
    worker.ip += 1;

    match op {
        Op::PushV(value) => {
            let value = match value {
                Value::FunctionPtr { id, captures: None } => Value::FunctionPtr {
                    id,
                    captures: Some(Arc::new(frame_locals_snapshot(worker))),
                },
                other => other,
            };
            worker.push(value);
            Ok(StepOutcome::Continue)
        }

        Op::PushB(name) => {
            if let Some(value) = worker.get_local(&name) {
                worker.push(value.clone());
                return Ok(StepOutcome::Continue);
            }
            if exe.locations.contains_key(&name) {
                worker.push(Value::FunctionPtr {
                    id: name,
                    captures: None,
                });
                return Ok(StepOutcome::Continue);
            }
            if let Some((fname, module)) = exe.foreign.get(&name) {
                worker.push(Value::ForeignPtr {
                    name: fname.clone(),
                    module: module.clone(),
                });
                return Ok(StepOutcome::Continue);
            }
            if builtins::is_builtin(&name) {
                worker.push(Value::InstructionRef(name));
                return Ok(StepOutcome::Continue);
            }
            Err(Error::UnboundSymbol(name))
        }

        Op::Pop => {
            worker.pop();
            Ok(StepOutcome::Continue)
        }

        Op::Bind(name) => {
            let value = worker
                .pop()
                .ok_or_else(|| Error::TypeError("bind: nothing on the stack".into()))?;
            worker.set_local(name, value);
            Ok(StepOutcome::Continue)
        }

        Op::Jump(distance) => {
            worker.ip = (worker.ip as isize + distance) as usize;
            Ok(StepOutcome::Continue)
        }

        Op::JumpIE(distance) => {
            let b = worker
                .pop()
                .ok_or_else(|| Error::TypeError("jumpie: nothing on the stack".into()))?;
            let a = worker
                .pop()
                .ok_or_else(|| Error::TypeError("jumpie: nothing on the stack".into()))?;
            if a == b {
                worker.ip = (worker.ip as isize + distance) as usize;
            }
            Ok(StepOutcome::Continue)
        }

        Op::Call(arity) => {
            let callee = worker
                .pop()
                .ok_or_else(|| Error::TypeError("call: missing callee".into()))?;
            let args = pop_args(worker, arity)?;
            match callee {
                Value::FunctionPtr { id, captures } => {
                    let entry = *exe
                        .locations
                        .get(&id)
                        .ok_or_else(|| Error::UnboundSymbol(id.clone()))?;
                    let locals = captures.map(|c| (*c).clone()).unwrap_or_default();
                    let return_ip = worker.ip;
                    probe.on_enter(worker_id, &id);
                    worker.enter(entry, return_ip, locals);
                    Ok(StepOutcome::Continue)
                }
                Value::InstructionRef(name) => {
                    let result = builtins::call(&name, args, probe, worker_id)?;
                    worker.push(result);
                    Ok(StepOutcome::Continue)
                }
                Value::ForeignPtr { name, module } => {
                    let result = host.call(&module, &name, args)?;
                    worker.push(result);
                    Ok(StepOutcome::Continue)
                }
                other => Err(Error::TypeError(format!(
                    "cannot call a {}",
                    other.type_name()
                ))),
            }
        }

        Op::ACall(arity) => {
            let callee = worker
                .pop()
                .ok_or_else(|| Error::TypeError("acall: missing callee".into()))?;
            let args = pop_args(worker, arity)?;
            let id = match callee {
                Value::FunctionPtr { id, .. } => id,
                other => {
                    return Err(Error::TypeError(format!(
                        "cannot asynchronously call a {}",
                        other.type_name()
                    )))
                }
            };
            let future = spawner.spawn(&id, args);
            worker.push(Value::FutureHandle(future));
            Ok(StepOutcome::Continue)
        }

        Op::Return => {
            let value = worker
                .pop()
                .ok_or_else(|| Error::TypeError("return: nothing on the stack".into()))?;
            if worker.can_return() {
                worker.leave_frame();
                worker.push(value);
                probe.on_return(worker_id);
                Ok(StepOutcome::Continue)
            } else {
                worker.stop();
                probe.on_return(worker_id);
                Ok(StepOutcome::Finished(value))
            }
        }

        Op::Wait(_offset) => {
            let value = worker
                .pop()
                .ok_or_else(|| Error::TypeError("wait: nothing on the stack".into()))?;
            match value {
                Value::FutureHandle(ref fut) => {
                    match fut.get_or_register((worker_id, worker.ip)) {
                        Some(resolved) => {
                            worker.push(resolved);
                            Ok(StepOutcome::Continue)
                        }
                        None => Ok(StepOutcome::Suspended),
                    }
                }
                Value::List(ref items) if items.iter().any(Value::is_future) => {
                    Err(Error::FutureShapeError)
                }
                other => {
                    // Waiting on anything that isn't a future, or a list
                    // containing one, is a silent no-op (§9).
                    worker.push(other);
                    Ok(StepOutcome::Continue)
                }
            }
        }
    }
}

/// Outcome of running a worker until it either finishes or suspends.
pub enum RunOutcome {
    Finished(Value),
    Suspended,
}

/// Drive `worker` with repeated [`step`] calls until it finishes or
/// suspends on a `Wait`.
pub fn run(
    worker: &mut WorkerState,
    exe: &Executable,
    probe: &dyn Probe,
    worker_id: u64,
    host: &dyn HostFunctions,
    spawner: &dyn Spawner,
) -> Result<RunOutcome> {
    probe.on_run(worker_id);
    let outcome = loop {
        match step(worker, exe, probe, worker_id, host, spawner)? {
            StepOutcome::Continue => continue,
            StepOutcome::Finished(value) => break RunOutcome::Finished(value),
            StepOutcome::Suspended => break RunOutcome::Suspended,
        }
    };
    probe.on_stopped(worker_id);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Node;
    use crate::bytecode::CompileOutput;
    use crate::compiler::compile_toplevel;
    use crate::probe::NoopProbe;
    use std::collections::HashMap;

    struct NoSpawn;
    impl Spawner for NoSpawn {
        fn spawn(&self, _function_id: &str, _args: Vec<Value>) -> Arc<Future> {
            unimplemented!("not exercised in these tests")
        }
    }

    fn link(forms: Vec<Node>) -> Executable {
        let output: CompileOutput = compile_toplevel(&forms).unwrap();
        Executable::link(output)
    }

    fn run_entry(exe: &Executable, entry: &str, args: Vec<Value>) -> Value {
        let mut worker = WorkerState::new(exe.locations[entry], args, exe.bindings.clone());
        match run(
            &mut worker,
            exe,
            &NoopProbe,
            0,
            &NoHostFunctions,
            &NoSpawn,
        )
        .unwrap()
        {
            RunOutcome::Finished(v) => v,
            RunOutcome::Suspended => panic!("unexpected suspend"),
        }
    }

    #[test]
    fn simple_call_adds_one() {
        let forms = vec![Node::assign(
            "f",
            Node::def(vec!["x"], Node::binop("+", Node::id("x"), Node::literal(1.0))),
        )];
        let exe = link(forms);
        assert_eq!(run_entry(&exe, "f", vec![Value::Number(41.0)]), Value::Number(42.0));
    }

    #[test]
    fn if_else_picks_the_right_branch() {
        let forms = vec![Node::assign(
            "f",
            Node::def(
                vec!["x"],
                Node::if_(
                    Node::call(Node::id("="), vec![Node::id("x"), Node::literal(0.0)]),
                    Node::literal("zero"),
                    Node::literal("nonzero"),
                ),
            ),
        )];
        let exe = link(forms);
        assert_eq!(
            run_entry(&exe, "f", vec![Value::Number(0.0)]),
            Value::String("zero".to_string())
        );
        assert_eq!(
            run_entry(&exe, "f", vec![Value::Number(5.0)]),
            Value::String("nonzero".to_string())
        );
    }

    #[test]
    fn equality_builtin_is_reached_through_call_not_binop() {
        // `Node::binop("=", ...)` always lowers as assignment (§4.D); the
        // equality builtin is only reachable by calling `=` explicitly.
        let forms = vec![Node::assign(
            "f",
            Node::def(
                vec!["a", "b"],
                Node::call(Node::id("="), vec![Node::id("a"), Node::id("b")]),
            ),
        )];
        let exe = link(forms);
        assert_eq!(
            run_entry(&exe, "f", vec![Value::Number(1.0), Value::Number(1.0)]),
            Value::Bool(true)
        );
        assert_eq!(
            run_entry(&exe, "f", vec![Value::Number(1.0), Value::Number(2.0)]),
            Value::Bool(false)
        );
    }

    #[test]
    fn closure_captures_enclosing_locals() {
        let forms = vec![Node::assign(
            "make_adder",
            Node::def(
                vec!["n"],
                Node::def(vec!["x"], Node::binop("+", Node::id("x"), Node::id("n"))),
            ),
        )];
        let exe = link(forms);
        let adder = run_entry(&exe, "make_adder", vec![Value::Number(10.0)]);
        let id = match &adder {
            Value::FunctionPtr { id, .. } => id.clone(),
            _ => panic!("expected a function"),
        };
        let mut worker = WorkerState::new(
            exe.locations[&id],
            vec![Value::Number(5.0)],
            HashMap::new(),
        );
        if let Value::FunctionPtr { captures, .. } = adder {
            if let Some(c) = captures {
                for (k, v) in c.iter() {
                    worker.set_local(k.clone(), v.clone());
                }
            }
        }
        let result = match run(&mut worker, &exe, &NoopProbe, 0, &NoHostFunctions, &NoSpawn)
            .unwrap()
        {
            RunOutcome::Finished(v) => v,
            RunOutcome::Suspended => panic!("unexpected suspend"),
        };
        assert_eq!(result, Value::Number(15.0));
    }

    #[test]
    fn wait_on_non_future_is_a_no_op() {
        let forms = vec![Node::assign(
            "f",
            Node::def(vec![], Node::await_(Node::literal(7.0))),
        )];
        let exe = link(forms);
        assert_eq!(run_entry(&exe, "f", vec![]), Value::Number(7.0));
    }

    #[test]
    fn wait_on_unresolved_future_suspends() {
        let forms = vec![Node::assign("f", Node::def(vec!["x"], Node::await_(Node::id("x"))))];
        let exe = link(forms);
        let future = Arc::new(Future::new());
        let mut worker = WorkerState::new(
            exe.locations["f"],
            vec![Value::FutureHandle(future)],
            exe.bindings.clone(),
        );
        match run(&mut worker, &exe, &NoopProbe, 0, &NoHostFunctions, &NoSpawn).unwrap() {
            RunOutcome::Suspended => {}
            RunOutcome::Finished(_) => panic!("expected suspend"),
        }
    }
}
