//! A small distributed virtual machine with first-class asynchronous
//! function calls.
//!
//! A program is a set of top-level function definitions (plus host
//! imports), compiled to a flat bytecode [`bytecode::Executable`] and run
//! by a [`controller::Controller`], which owns every worker and every
//! future created while the program runs. Calling a function can be
//! synchronous ([`bytecode::Op::Call`]) or asynchronous
//! ([`bytecode::Op::ACall`]); an asynchronous call returns immediately
//! with a future, and `await` ([`bytecode::Op::Wait`]) suspends the
//! calling worker until that future resolves.
//!
//! ```
//! use asyncvm::ast::Node;
//! use asyncvm::bytecode::Executable;
//! use asyncvm::compiler::compile_toplevel;
//! use asyncvm::controller::{Controller, Limits};
//! use asyncvm::value::Value;
//!
//! let forms = vec![Node::assign(
//!     "add_one",
//!     Node::def(vec!["x"], Node::binop("+", Node::id("x"), Node::literal(1.0))),
//! )];
//! let executable = Executable::link(compile_toplevel(&forms).unwrap());
//! let controller = Controller::new(executable, Limits::unbounded());
//! let future = controller.run("add_one", vec![Value::Number(41.0)]).unwrap();
//! controller.finish();
//! assert_eq!(controller.result(&future), Some(Value::Number(42.0)));
//! ```

pub mod ast;
pub mod builtins;
pub mod bytecode;
pub mod compiler;
pub mod controller;
pub mod error;
pub mod future;
pub mod invoker;
pub mod probe;
pub mod value;
pub mod vm;
pub mod worker;

pub use controller::{Controller, Limits};
pub use error::{Error, Result};
pub use future::Future;
pub use value::Value;
