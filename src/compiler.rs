//! Lowering the AST to bytecode (§4.D).
//!
//! Relative jump offsets mean each function's code is compiled entirely
//! relative to its own start, with no knowledge of where it will land once
//! concatenated into the final executable — concatenation in
//! [`crate::bytecode::Executable::link`] is then a pure append, never a
//! rewrite.

use std::collections::HashMap;

use crate::ast::Node;
use crate::bytecode::{CodeObject, CompileOutput, Op};
use crate::error::{Error, Result};
use crate::value::Value;

struct Compiler {
    counter: usize,
    functions: Vec<(String, CodeObject)>,
}

impl Compiler {
    fn new() -> Self {
        Compiler {
            counter: 0,
            functions: Vec::new(),
        }
    }

    /// Compile a function body, register it, and return its unique
    /// identifier. The prologue binds parameters right-to-left: `Bind`
    /// pops as it binds, so binding the last parameter first consumes
    /// arguments off the stack in the order the call pushed them.
    fn compile_function(&mut self, params: &[String], body: &Node, name_hint: &str) -> Result<String> {
        let id = format!("#{}:{}", self.counter, name_hint);
        self.counter += 1;

        let mut ops = Vec::new();
        for param in params.iter().rev() {
            ops.push(Op::Bind(param.clone()));
        }
        ops.extend(self.compile_expr(body)?);
        ops.push(Op::Return);

        self.functions.push((id.clone(), CodeObject { ops }));
        Ok(id)
    }

    fn compile_expr(&mut self, node: &Node) -> Result<Vec<Op>> {
        match node {
            Node::Literal(value) => Ok(vec![Op::PushV(value.clone())]),

            Node::Id(name) => Ok(vec![Op::PushB(name.clone())]),

            Node::Definition { params, body } => {
                let id = self.compile_function(params, body, "anon")?;
                // `captures: None` is a request, not a fact: the VM fills
                // in a snapshot of the current frame's locals the moment
                // this `PushV` executes (§4.D "Closure construction").
                // Top-level definitions never reach this path — they are
                // recorded directly as executable bindings at compile
                // time, never pushed by an instruction — so every runtime
                // occurrence of a bare `FunctionPtr` literal is, by
                // construction, a closure construction site.
                Ok(vec![Op::PushV(Value::FunctionPtr { id, captures: None })])
            }

            Node::Progn(nodes) => {
                if nodes.is_empty() {
                    return Ok(vec![Op::PushV(Value::Null)]);
                }
                let mut ops = Vec::new();
                for (i, n) in nodes.iter().enumerate() {
                    ops.extend(self.compile_expr(n)?);
                    if i + 1 < nodes.len() {
                        ops.push(Op::Pop);
                    }
                }
                Ok(ops)
            }

            Node::Argument(inner) => self.compile_expr(inner),

            Node::Await(inner) => {
                let mut ops = self.compile_expr(inner)?;
                ops.push(Op::Wait(0));
                Ok(ops)
            }

            Node::Call { callee, args } => {
                let (is_async, target) = match callee.as_ref() {
                    Node::Async(inner) => (true, inner.as_ref()),
                    other => (false, other),
                };
                let mut ops = Vec::new();
                for arg in args {
                    ops.extend(self.compile_expr(arg)?);
                }
                ops.extend(self.compile_expr(target)?);
                ops.push(if is_async {
                    Op::ACall(args.len())
                } else {
                    Op::Call(args.len())
                });
                Ok(ops)
            }

            Node::Async(_) => Err(Error::CompileError(
                "`async` is only meaningful as a call's callee".to_string(),
            )),

            Node::If { cond, then, els } => {
                // Layout: cond, PushV(true), JumpIE(len(els)+1), els, Jump(len(then)), then.
                // `JumpIE` pops the literal `true` and cond's value and jumps
                // past `els` (and the `Jump` that follows it) when they're
                // equal, landing directly on `then`; otherwise execution
                // falls into `els`, which then jumps past `then`.
                let cond_ops = self.compile_expr(cond)?;
                let then_ops = self.compile_expr(then)?;
                let els_ops = self.compile_expr(els)?;

                let mut ops = cond_ops;
                ops.push(Op::PushV(Value::Bool(true)));
                ops.push(Op::JumpIE(els_ops.len() as isize + 1));
                ops.extend(els_ops);
                ops.push(Op::Jump(then_ops.len() as isize));
                ops.extend(then_ops);
                Ok(ops)
            }

            Node::Binop { op, lhs, rhs } if op == "=" => {
                let name = match lhs.as_ref() {
                    Node::Id(name) => name.clone(),
                    _ => {
                        return Err(Error::CompileError(
                            "assignment target must be an identifier".to_string(),
                        ))
                    }
                };
                let mut ops = self.compile_expr(rhs)?;
                ops.push(Op::Bind(name.clone()));
                // Assignment is itself an expression: re-read the name so
                // its value (not unit) is left on the stack for the
                // enclosing context.
                ops.push(Op::PushB(name));
                Ok(ops)
            }

            Node::Binop { op, lhs, rhs } => {
                // Operand order is rhs, then lhs — harmless for the
                // symmetric primitives this reaches (`+`, `*`, `=`), and
                // kept this way for fidelity with how infix operators are
                // lowered.
                let mut ops = self.compile_expr(rhs)?;
                ops.extend(self.compile_expr(lhs)?);
                ops.push(Op::PushB(op.clone()));
                ops.push(Op::Call(2));
                Ok(ops)
            }
        }
    }
}

fn import_target(args: &[Node]) -> Option<(String, String)> {
    match args {
        [Node::Literal(Value::String(fname)), Node::Literal(Value::String(module))] => {
            Some((fname.clone(), module.clone()))
        }
        [Node::Argument(a), Node::Argument(b)] => import_target(&[(**a).clone(), (**b).clone()]),
        _ => None,
    }
}

/// Compile a sequence of top-level `name = ...` forms into a
/// [`CompileOutput`] ready for [`crate::bytecode::Executable::link`]
/// (§4.D "Top level").
pub fn compile_toplevel(forms: &[Node]) -> Result<CompileOutput> {
    let mut compiler = Compiler::new();
    let mut bindings = HashMap::new();

    for form in forms {
        let (lhs, rhs) = match form {
            Node::Binop { op, lhs, rhs } if op == "=" => (lhs, rhs),
            _ => {
                return Err(Error::CompileError(
                    "top level accepts only `name = ...` forms".to_string(),
                ))
            }
        };
        let name = match lhs.as_ref() {
            Node::Id(name) => name.clone(),
            _ => {
                return Err(Error::CompileError(
                    "top-level assignment target must be an identifier".to_string(),
                ))
            }
        };

        match rhs.as_ref() {
            Node::Definition { params, body } => {
                let id = compiler.compile_function(params, body, &name)?;
                bindings.insert(name, Value::FunctionPtr { id, captures: None });
            }
            Node::Call { callee, args } if matches!(callee.as_ref(), Node::Id(n) if n == "import") => {
                let (fname, module) = import_target(args).ok_or_else(|| {
                    Error::CompileError(
                        "import(name, module) expects two string literals".to_string(),
                    )
                })?;
                bindings.insert(name, Value::ForeignPtr { name: fname, module });
            }
            _ => {
                return Err(Error::CompileError(
                    "top-level binding must be a function definition or an import() call"
                        .to_string(),
                ))
            }
        }
    }

    Ok(CompileOutput {
        functions: compiler.functions,
        bindings,
    })
}
