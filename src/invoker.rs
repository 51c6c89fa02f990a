//! Running a worker's `run_async` closure on some execution substrate.
//!
//! The controller knows nothing about threads, thread pools, or async
//! runtimes — it hands each worker a boxed closure and asks an [`Invoker`]
//! to run it. [`ThreadInvoker`] is the reference implementation, grounded
//! on the original controller's `threading.Thread`-per-worker model.

use crate::future::WorkerId;

/// A unit of work the controller wants run: drive one worker until it
/// either finishes or suspends.
pub type RunAsync = Box<dyn FnOnce() + Send + 'static>;

/// Abstraction over how a worker's `run_async` closure actually gets
/// executed.
pub trait Invoker: Send + Sync {
    fn invoke(&self, worker_id: WorkerId, run_async: RunAsync);

    /// Block until every invocation handed to this invoker has returned.
    /// Used by a controller's `finish` to wait for outstanding workers
    /// before reporting the session's result (§6).
    fn join_all(&self);
}

/// Spawns one OS thread per invocation, matching the original
/// `LocalController._run_machine`'s blocking-thread model rather than an
/// async-task scheduler — nothing about this VM's workload (CPU-bound
/// bytecode stepping) benefits from an async runtime's I/O multiplexing.
#[derive(Default)]
pub struct ThreadInvoker {
    handles: std::sync::Mutex<Vec<std::thread::JoinHandle<()>>>,
}

impl ThreadInvoker {
    pub fn new() -> Self {
        ThreadInvoker::default()
    }
}

impl Invoker for ThreadInvoker {
    fn invoke(&self, worker_id: WorkerId, run_async: RunAsync) {
        let handle = std::thread::Builder::new()
            .name(format!("asyncvm-worker-{worker_id}"))
            .spawn(run_async)
            .expect("failed to spawn worker thread");
        self.handles.lock().unwrap().push(handle);
    }

    fn join_all(&self) {
        // A worker being joined here may itself spawn further invocations
        // (an `ACall` callee, or a wake after a future resolves) before it
        // returns, appending new handles after this call's initial drain.
        // Keep draining until a pass finds nothing left to join.
        loop {
            let batch: Vec<_> = self.handles.lock().unwrap().drain(..).collect();
            if batch.is_empty() {
                break;
            }
            for handle in batch {
                let _ = handle.join();
            }
        }
    }
}

/// Runs invocations synchronously on the caller's own thread. Useful for
/// tests and single-threaded embeddings where the overhead (and
/// nondeterminism) of real threads isn't wanted.
#[derive(Default)]
pub struct InlineInvoker;

impl Invoker for InlineInvoker {
    fn invoke(&self, _worker_id: WorkerId, run_async: RunAsync) {
        run_async();
    }

    fn join_all(&self) {}
}
