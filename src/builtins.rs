//! Built-in instruction primitives (§4.B "built-in instruction
//! primitives", §6).
//!
//! Each builtin takes its arguments already popped off the data stack, in
//! call order, and returns the value to push back. They are reachable two
//! ways: as the lowering target of a `Binop` whose operator isn't `=`, or
//! by name through `PushB`'s fourth lookup tier followed by a `Call`.

use crate::error::{Error, Result};
use crate::probe::Probe;
use crate::value::Value;

/// The full set of names resolvable at `PushB`'s builtin tier.
pub const NAMES: &[&str] = &[
    "+", "*", "=", "list", "conc", "first", "rest", "nth", "atomp", "nullp", "print",
];

pub fn is_builtin(name: &str) -> bool {
    NAMES.contains(&name)
}

fn as_number(v: &Value, who: &str) -> Result<f64> {
    match v {
        Value::Number(n) => Ok(*n),
        other => Err(Error::TypeError(format!(
            "{who}: expected a number, got a {}",
            other.type_name()
        ))),
    }
}

fn as_list(v: &Value, who: &str) -> Result<&[Value]> {
    v.as_list()
        .ok_or_else(|| Error::TypeError(format!("{who}: expected a list, got a {}", v.type_name())))
}

/// Dispatch a call to a builtin by name. `probe` receives `print`'s output
/// rather than this module writing to stdout directly, so a host can
/// capture it (§6 "stdout").
pub fn call(name: &str, args: Vec<Value>, probe: &dyn Probe, worker_id: u64) -> Result<Value> {
    match name {
        "+" => {
            let mut sum = 0.0;
            for a in &args {
                sum += as_number(a, "+")?;
            }
            Ok(Value::Number(sum))
        }
        "*" => {
            let mut product = 1.0;
            for a in &args {
                product *= as_number(a, "*")?;
            }
            Ok(Value::Number(product))
        }
        "=" => {
            let [a, b] = take2(args, "=")?;
            Ok(Value::Bool(a == b))
        }
        "list" => Ok(Value::List(args)),
        "conc" => {
            let [a, b] = take2(args, "conc")?;
            let mut items = as_list(&a, "conc")?.to_vec();
            items.extend(as_list(&b, "conc")?.iter().cloned());
            Ok(Value::List(items))
        }
        "first" => {
            let [a] = take1(args, "first")?;
            let items = as_list(&a, "first")?;
            items
                .first()
                .cloned()
                .ok_or_else(|| Error::TypeError("first: empty list".into()))
        }
        "rest" => {
            let [a] = take1(args, "rest")?;
            let items = as_list(&a, "rest")?;
            Ok(Value::List(items.iter().skip(1).cloned().collect()))
        }
        "nth" => {
            let [a, b] = take2(args, "nth")?;
            let idx = as_number(&b, "nth")? as usize;
            let items = as_list(&a, "nth")?;
            items
                .get(idx)
                .cloned()
                .ok_or_else(|| Error::TypeError(format!("nth: index {idx} out of range")))
        }
        "atomp" => {
            let [a] = take1(args, "atomp")?;
            Ok(Value::Bool(a.is_atom()))
        }
        "nullp" => {
            let [a] = take1(args, "nullp")?;
            Ok(Value::Bool(a.is_null_list()))
        }
        "print" => {
            let rendered = args
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            probe.log(worker_id, &rendered);
            Ok(Value::Null)
        }
        other => Err(Error::UnboundSymbol(other.to_string())),
    }
}

fn take1(mut args: Vec<Value>, who: &str) -> Result<[Value; 1]> {
    if args.len() != 1 {
        return Err(Error::TypeError(format!(
            "{who}: expected 1 argument, got {}",
            args.len()
        )));
    }
    Ok([args.remove(0)])
}

fn take2(mut args: Vec<Value>, who: &str) -> Result<[Value; 2]> {
    if args.len() != 2 {
        return Err(Error::TypeError(format!(
            "{who}: expected 2 arguments, got {}",
            args.len()
        )));
    }
    let b = args.remove(1);
    let a = args.remove(0);
    Ok([a, b])
}
