//! The instruction set and the linked, runnable form of a compiled program.
//!
//! [`Op`] is deliberately small and carries its operands inline rather than
//! indexing into a constant pool — the distilled grammar has no constant
//! deduplication concerns at this scale, and inline operands keep `vm.rs`'s
//! dispatch loop a flat match with no secondary lookups for the common case.

use std::collections::HashMap;

use crate::value::Value;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single VM instruction (§4.B).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Op {
    /// Push a literal value.
    PushV(Value),
    /// Resolve a symbol through the four-tier lookup (locals, compiled
    /// function locations, foreign table, builtins) and push the result.
    PushB(String),
    /// Discard the top of the data stack.
    Pop,
    /// Pop the top of the data stack and bind it to a name in the current
    /// frame's local scope.
    Bind(String),
    /// Unconditional relative jump: `ip += distance`.
    Jump(isize),
    /// Pop two values `a`, `b` (`b` popped first); if `a == b`, jump by
    /// `distance`. Otherwise fall through.
    JumpIE(isize),
    /// Pop a callee and `arity` arguments (callee popped first, then
    /// arguments in reverse push order), enter the callee synchronously.
    Call(usize),
    /// Like `Call`, but the callee runs on a new worker and a future for
    /// its result is pushed in place of a direct call.
    ACall(usize),
    /// Pop the top of the data stack, pop the current frame, and push the
    /// value back for the caller.
    Return,
    /// Pop a value; if it is a future (or a list containing one), suspend
    /// the current worker until it resolves, then push the resolved value.
    /// `offset` is retained for instruction-table fidelity but the compiler
    /// only ever emits `Wait(0)` (§9).
    Wait(usize),
}

/// One compiled function body, prior to linking into a flat executable.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CodeObject {
    pub ops: Vec<Op>,
}

/// Everything the compiler produces for one compilation unit, before the
/// per-function code vectors are concatenated into a single flat
/// executable (§3 "Executable").
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    /// Every compiled function, keyed by its unique compiler-generated
    /// identifier (`"#<index>:<name>"`), in the order they were compiled.
    pub functions: Vec<(String, CodeObject)>,
    /// Top-level `name = ...` bindings. A `Definition` right-hand side
    /// binds a `FunctionPtr` whose `id` names an entry in `functions`; an
    /// `import(name, module)` call binds a `ForeignPtr`.
    pub bindings: HashMap<String, Value>,
}

/// A compiled program, linked into one flat instruction vector (§3, §6).
///
/// `locations` maps a function identifier to the index in `code` where
/// that function's body begins. For any top-level binding whose value is a
/// `FunctionPtr`, `locations` additionally carries an alias keyed by the
/// binding's surface name, pointing at the same index — this lets `PushB`
/// resolve a bare top-level name against `locations` directly (tier two of
/// §4.B's lookup order) even when a worker's local scope has not been
/// seeded with the top-level bindings (§9).
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Executable {
    pub code: Vec<Op>,
    pub locations: HashMap<String, usize>,
    pub bindings: HashMap<String, Value>,
    pub foreign: HashMap<String, (String, String)>,
}

impl Executable {
    /// Concatenate every compiled function's code into one vector and
    /// resolve top-level bindings into the `locations` and `foreign`
    /// tables. Relative jumps inside each function body need no rewriting:
    /// they were already compiled relative to their own start, and
    /// concatenation only shifts every function's absolute start, which
    /// `Call`/`ACall` look up fresh via `locations` rather than baking in.
    pub fn link(output: CompileOutput) -> Executable {
        let mut code = Vec::new();
        let mut locations = HashMap::new();

        for (id, body) in output.functions {
            let start = code.len();
            locations.insert(id, start);
            code.extend(body.ops);
        }

        let mut foreign = HashMap::new();
        for (name, value) in &output.bindings {
            match value {
                Value::FunctionPtr { id, .. } => {
                    if let Some(&start) = locations.get(id) {
                        locations.entry(name.clone()).or_insert(start);
                    }
                }
                Value::ForeignPtr { name: fname, module } => {
                    foreign.insert(name.clone(), (fname.clone(), module.clone()));
                }
                _ => {}
            }
        }

        Executable {
            code,
            locations,
            bindings: output.bindings,
            foreign,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn func(id: &str, ops: Vec<Op>) -> (String, CodeObject) {
        (id.to_string(), CodeObject { ops })
    }

    #[test]
    fn link_concatenates_in_order_and_records_start_offsets() {
        let output = CompileOutput {
            functions: vec![
                func("#0:f", vec![Op::PushV(Value::Number(1.0)), Op::Return]),
                func("#1:g", vec![Op::PushV(Value::Number(2.0)), Op::Return]),
            ],
            bindings: HashMap::new(),
        };
        let exe = Executable::link(output);
        assert_eq!(exe.code.len(), 4);
        assert_eq!(exe.locations["#0:f"], 0);
        assert_eq!(exe.locations["#1:g"], 2);
    }

    #[test]
    fn link_aliases_top_level_function_bindings_by_surface_name() {
        let mut bindings = HashMap::new();
        bindings.insert(
            "f".to_string(),
            Value::FunctionPtr {
                id: "#0:f".to_string(),
                captures: None,
            },
        );
        let output = CompileOutput {
            functions: vec![func("#0:f", vec![Op::Return])],
            bindings,
        };
        let exe = Executable::link(output);
        assert_eq!(exe.locations["f"], exe.locations["#0:f"]);
    }

    #[test]
    fn link_populates_foreign_table_from_bindings() {
        let mut bindings = HashMap::new();
        bindings.insert(
            "sqrt".to_string(),
            Value::ForeignPtr {
                name: "sqrt".to_string(),
                module: "math".to_string(),
            },
        );
        let exe = Executable::link(CompileOutput {
            functions: vec![],
            bindings,
        });
        assert_eq!(
            exe.foreign["sqrt"],
            ("sqrt".to_string(), "math".to_string())
        );
    }
}
