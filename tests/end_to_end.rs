//! End-to-end program tests: compile a small top-level program, run it
//! through a real [`Controller`], and check the result a caller would
//! actually observe.

use std::sync::Arc;
use std::time::{Duration, Instant};

use asyncvm::ast::Node;
use asyncvm::bytecode::Executable;
use asyncvm::compiler::compile_toplevel;
use asyncvm::controller::{Controller, Limits};
use asyncvm::future::Future;
use asyncvm::value::Value;

fn link(forms: Vec<Node>) -> Executable {
    Executable::link(compile_toplevel(&forms).unwrap())
}

fn wait_for_result(controller: &Arc<Controller>, future: &Arc<Future>) -> Value {
    let start = Instant::now();
    loop {
        if let Some(value) = controller.result(future) {
            return value;
        }
        if start.elapsed() > Duration::from_secs(5) {
            panic!("program did not finish in time");
        }
        std::thread::yield_now();
    }
}

#[test]
fn simple_call() {
    let forms = vec![Node::assign(
        "square",
        Node::def(vec!["x"], Node::binop("*", Node::id("x"), Node::id("x"))),
    )];
    let controller = Controller::new(link(forms), Limits::unbounded());
    let future = controller.run("square", vec![Value::Number(6.0)]).unwrap();
    controller.finish();
    assert_eq!(wait_for_result(&controller, &future), Value::Number(36.0));
}

#[test]
fn if_else_via_jumpie() {
    let forms = vec![Node::assign(
        "classify",
        Node::def(
            vec!["x"],
            Node::if_(
                Node::call(Node::id("="), vec![Node::id("x"), Node::literal(0.0)]),
                Node::literal("zero"),
                Node::literal("other"),
            ),
        ),
    )];
    let controller = Controller::new(link(forms), Limits::unbounded());

    let zero = controller.run("classify", vec![Value::Number(0.0)]).unwrap();
    let other = controller.run("classify", vec![Value::Number(3.0)]).unwrap();
    controller.finish();

    assert_eq!(
        wait_for_result(&controller, &zero),
        Value::String("zero".to_string())
    );
    assert_eq!(
        wait_for_result(&controller, &other),
        Value::String("other".to_string())
    );
}

#[test]
fn single_async_call_and_await() {
    let forms = vec![
        Node::assign(
            "slow_double",
            Node::def(vec!["x"], Node::binop("*", Node::id("x"), Node::literal(2.0))),
        ),
        Node::assign(
            "main",
            Node::def(
                vec!["x"],
                Node::await_(Node::async_call(Node::id("slow_double"), vec![Node::id("x")])),
            ),
        ),
    ];
    let controller = Controller::new(link(forms), Limits::unbounded());
    let future = controller.run("main", vec![Value::Number(21.0)]).unwrap();
    controller.finish();
    assert_eq!(wait_for_result(&controller, &future), Value::Number(42.0));
}

#[test]
fn two_independent_futures_resolve_separately() {
    let forms = vec![
        Node::assign("ident", Node::def(vec!["x"], Node::id("x"))),
        Node::assign(
            "main",
            Node::def(
                vec![],
                Node::Progn(vec![
                    Node::assign(
                        "a",
                        Node::async_call(Node::id("ident"), vec![Node::literal(10.0)]),
                    ),
                    Node::assign(
                        "b",
                        Node::async_call(Node::id("ident"), vec![Node::literal(32.0)]),
                    ),
                    Node::binop("+", Node::await_(Node::id("a")), Node::await_(Node::id("b"))),
                ]),
            ),
        ),
    ];
    let controller = Controller::new(link(forms), Limits::unbounded());
    let future = controller.run("main", vec![]).unwrap();
    controller.finish();
    assert_eq!(wait_for_result(&controller, &future), Value::Number(42.0));
}

#[test]
fn list_conc_first_rest_round_trip() {
    let forms = vec![Node::assign(
        "head_of_combined",
        Node::def(
            vec!["a", "b"],
            Node::call(
                Node::id("first"),
                vec![Node::call(Node::id("conc"), vec![Node::id("a"), Node::id("b")])],
            ),
        ),
    )];
    let controller = Controller::new(link(forms), Limits::unbounded());
    let future = controller
        .run(
            "head_of_combined",
            vec![
                Value::List(vec![Value::Number(1.0), Value::Number(2.0)]),
                Value::List(vec![Value::Number(3.0)]),
            ],
        )
        .unwrap();
    controller.finish();
    assert_eq!(wait_for_result(&controller, &future), Value::Number(1.0));
}

#[test]
fn chained_future_resolution_propagates_through_set_future_value() {
    let forms = vec![Node::assign(
        "wait_for_it",
        Node::def(vec!["x"], Node::await_(Node::id("x"))),
    )];
    let controller = Controller::new(link(forms), Limits::unbounded());

    let outer = Arc::new(Future::new());
    let inner = Arc::new(Future::new());

    let future = controller
        .run("wait_for_it", vec![Value::FutureHandle(outer.clone())])
        .unwrap();

    // Resolve the outer future with a still-unresolved inner future: this
    // chains rather than resolving outright (§4.F).
    controller
        .set_future_value(&outer, Value::FutureHandle(inner.clone()))
        .unwrap();
    assert!(!outer.is_resolved());

    controller.set_future_value(&inner, Value::Number(99.0)).unwrap();
    controller.finish();

    assert!(outer.is_resolved());
    assert_eq!(wait_for_result(&controller, &future), Value::Number(99.0));
}

#[test]
fn equality_call_picks_then_branch() {
    // §8 scenario 2: `if (1 = 1) 10 else 20` -> 10.
    let forms = vec![Node::assign(
        "main",
        Node::def(
            vec![],
            Node::if_(
                Node::call(Node::id("="), vec![Node::literal(1.0), Node::literal(1.0)]),
                Node::literal(10.0),
                Node::literal(20.0),
            ),
        ),
    )];
    let controller = Controller::new(link(forms), Limits::unbounded());
    let future = controller.run("main", vec![]).unwrap();
    controller.finish();
    assert_eq!(wait_for_result(&controller, &future), Value::Number(10.0));
}

#[test]
fn print_output_is_captured_per_worker_and_finished_tracks_top_level() {
    let forms = vec![Node::assign(
        "greet",
        Node::def(
            vec!["name"],
            Node::call(Node::id("print"), vec![Node::id("name")]),
        ),
    )];
    let controller = Controller::new(link(forms), Limits::unbounded());
    assert!(!controller.finished());

    let future = controller
        .run("greet", vec![Value::String("hi".to_string())])
        .unwrap();
    controller.finish();
    wait_for_result(&controller, &future);

    assert!(controller.finished());
    let probes = controller.probes();
    assert_eq!(probes.len(), 1);
    assert_eq!(controller.stdout(0), vec!["hi".to_string()]);
}
