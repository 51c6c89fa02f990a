//! Abstract syntax tree node kinds consumed by the compiler (§4.D, §6).
//!
//! The parser that produces these nodes is an external collaborator and is
//! out of scope for this crate (§1) — this module only defines the node
//! shapes the compiler accepts, so that an external parser (or a test) can
//! construct them directly.

use crate::value::Value;

/// A literal value as written in source, already converted to a [`Value`]
/// by whatever produced the AST (§4.A: "Conversion from parsed host
/// literals to Values is explicit").
pub type Literal = Value;

/// One node of the AST. Node kinds mirror §4.D exactly: `Definition`,
/// `Literal`, `Id`, `Progn`, `Call`, `Async`, `Argument`, `Await`, `If`,
/// `Binop`.
#[derive(Debug, Clone)]
pub enum Node {
    /// A function definition: `fn(params){ body }`.
    Definition {
        /// Parameter names, in declaration order.
        params: Vec<String>,
        body: Box<Node>,
    },
    /// A literal value.
    Literal(Literal),
    /// An identifier reference.
    Id(String),
    /// A sequence of expressions; only the final one's value survives.
    Progn(Vec<Node>),
    /// A function call `f(a1, ..., an)`. `callee` may be wrapped in
    /// [`Node::Async`] to request an asynchronous call.
    Call { callee: Box<Node>, args: Vec<Node> },
    /// Marks a call's callee as asynchronous (`async f(...)`). Only valid
    /// as the direct `callee` of a [`Node::Call`].
    Async(Box<Node>),
    /// A call argument. Carries its value expression; present as its own
    /// node kind for fidelity with the distilled grammar, though it
    /// compiles identically to its inner expression (§4.D).
    Argument(Box<Node>),
    /// `await e`. `e` must be a [`Node::Call`] or [`Node::Id`].
    Await(Box<Node>),
    /// `if (cond) then else els`.
    If {
        cond: Box<Node>,
        then: Box<Node>,
        els: Box<Node>,
    },
    /// A binary operator form. `op == "="` is assignment; anything else is
    /// a primitive-call form lowered to `PushB(op)` + `Call(2)`.
    Binop {
        op: String,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
}

impl Node {
    pub fn id(name: impl Into<String>) -> Node {
        Node::Id(name.into())
    }

    pub fn literal(value: impl Into<Value>) -> Node {
        Node::Literal(value.into())
    }

    pub fn call(callee: Node, args: Vec<Node>) -> Node {
        Node::Call {
            callee: Box::new(callee),
            args,
        }
    }

    pub fn async_call(callee: Node, args: Vec<Node>) -> Node {
        Node::Call {
            callee: Box::new(Node::Async(Box::new(callee))),
            args,
        }
    }

    pub fn binop(op: impl Into<String>, lhs: Node, rhs: Node) -> Node {
        Node::Binop {
            op: op.into(),
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn assign(name: impl Into<String>, rhs: Node) -> Node {
        Node::Binop {
            op: "=".to_string(),
            lhs: Box::new(Node::Id(name.into())),
            rhs: Box::new(rhs),
        }
    }

    pub fn if_(cond: Node, then: Node, els: Node) -> Node {
        Node::If {
            cond: Box::new(cond),
            then: Box::new(then),
            els: Box::new(els),
        }
    }

    pub fn await_(expr: Node) -> Node {
        Node::Await(Box::new(expr))
    }

    pub fn def(params: Vec<&str>, body: Node) -> Node {
        Node::Definition {
            params: params.into_iter().map(String::from).collect(),
            body: Box::new(body),
        }
    }
}
