//! The controller: the single owner of every worker, every future, and the
//! linked executable they run against (§4.F, §5, §6).
//!
//! Workers never talk to each other directly. A worker suspends by
//! registering itself on a future ([`Future::get_or_register`]); the
//! controller is the only thing that ever resolves a future and wakes the
//! workers waiting on it, whether that resolution comes from a worker
//! finishing (`ACall`'s callee returning) or from a host calling
//! [`Controller::set_future_value`] directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::bytecode::Executable;
use crate::error::{Error, Result};
use crate::future::{Continuation, Future, WorkerId};
use crate::invoker::{Invoker, ThreadInvoker};
use crate::probe::{NoopProbe, Probe, StepBudgetProbe};
use crate::value::Value;
use crate::vm::{self, HostFunctions, NoHostFunctions, RunOutcome, Spawner};
use crate::worker::WorkerState;

/// Resource limits for a session, analogous to a sandbox's configured
/// ceilings rather than anything the language itself exposes (§2a).
#[derive(Debug, Clone, Copy, Default)]
pub struct Limits {
    /// Maximum instructions any single worker may execute. `None` means
    /// unbounded.
    pub max_steps: Option<u64>,
}

impl Limits {
    pub fn unbounded() -> Self {
        Limits { max_steps: None }
    }

    pub fn with_max_steps(max_steps: u64) -> Self {
        Limits {
            max_steps: Some(max_steps),
        }
    }

    fn build_probe(&self) -> Arc<dyn Probe> {
        match self.max_steps {
            Some(limit) => Arc::new(StepBudgetProbe::new(limit)),
            None => Arc::new(NoopProbe),
        }
    }
}

/// Wraps a [`Limits`]-derived probe with a per-worker output buffer, so
/// `print` (which calls [`Probe::log`]) becomes something a host can read
/// back afterwards rather than an ephemeral trace line — mirroring how
/// `littrs::sandbox::Output` accumulates a sandboxed program's printed
/// output alongside its return value.
struct CapturingProbe {
    inner: Arc<dyn Probe>,
    stdout: Mutex<Vec<String>>,
}

impl CapturingProbe {
    fn new(inner: Arc<dyn Probe>) -> Self {
        CapturingProbe {
            inner,
            stdout: Mutex::new(Vec::new()),
        }
    }

    fn stdout(&self) -> Vec<String> {
        self.stdout.lock().unwrap().clone()
    }
}

impl Probe for CapturingProbe {
    fn on_step(&self, worker_id: u64, ip: usize, op: &crate::bytecode::Op) -> Result<()> {
        self.inner.on_step(worker_id, ip, op)
    }

    fn on_run(&self, worker_id: u64) {
        self.inner.on_run(worker_id);
    }

    fn on_stopped(&self, worker_id: u64) {
        self.inner.on_stopped(worker_id);
    }

    fn on_enter(&self, worker_id: u64, function_id: &str) {
        self.inner.on_enter(worker_id, function_id);
    }

    fn on_return(&self, worker_id: u64) {
        self.inner.on_return(worker_id);
    }

    fn log(&self, worker_id: u64, message: &str) {
        self.stdout.lock().unwrap().push(message.to_string());
        self.inner.log(worker_id, message);
    }
}

struct WorkerRecord {
    state: Mutex<Option<WorkerState>>,
    future: Arc<Future>,
    terminated: Mutex<bool>,
    probe: Arc<CapturingProbe>,
}

/// Owns the executable, every worker's state, and every future created
/// during a session.
pub struct Controller {
    executable: Executable,
    workers: Mutex<HashMap<WorkerId, WorkerRecord>>,
    next_id: AtomicU64,
    invoker: Box<dyn Invoker>,
    limits: Limits,
    host: Arc<dyn HostFunctions>,
    /// The first worker registered via [`Controller::run`], i.e. the
    /// top-level machine (as opposed to one spawned by `ACall`). `finished`
    /// tracks this worker specifically, not "any worker" or "all workers".
    top_level: Mutex<Option<WorkerId>>,
}

impl Controller {
    /// Build a controller with the reference `ThreadInvoker` and no
    /// foreign functions registered.
    pub fn new(executable: Executable, limits: Limits) -> Arc<Controller> {
        Controller::with_invoker_and_host(
            executable,
            limits,
            Box::new(ThreadInvoker::new()),
            Arc::new(NoHostFunctions),
        )
    }

    pub fn with_invoker_and_host(
        executable: Executable,
        limits: Limits,
        invoker: Box<dyn Invoker>,
        host: Arc<dyn HostFunctions>,
    ) -> Arc<Controller> {
        Arc::new(Controller {
            executable,
            workers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            invoker,
            limits,
            host,
            top_level: Mutex::new(None),
        })
    }

    pub fn executable(&self) -> &Executable {
        &self.executable
    }

    /// The trace-event sink for one worker, if it has been registered
    /// (§6 "Controller interface").
    pub fn get_probe(&self, worker_id: WorkerId) -> Option<Arc<dyn Probe>> {
        self.workers
            .lock()
            .unwrap()
            .get(&worker_id)
            .map(|record| record.probe.clone() as Arc<dyn Probe>)
    }

    /// Every worker's own probe, in no particular order (§6).
    pub fn probes(&self) -> Vec<Arc<dyn Probe>> {
        self.workers
            .lock()
            .unwrap()
            .values()
            .map(|record| record.probe.clone() as Arc<dyn Probe>)
            .collect()
    }

    /// True once the top-level machine — the worker registered by
    /// [`Controller::run`] — has terminated (§6).
    pub fn finished(&self) -> bool {
        match *self.top_level.lock().unwrap() {
            Some(id) => self.is_terminated(id),
            None => false,
        }
    }

    /// Everything `print` has appended for one worker so far (§6 "stdout").
    pub fn stdout(&self, worker_id: WorkerId) -> Vec<String> {
        self.workers
            .lock()
            .unwrap()
            .get(&worker_id)
            .map(|record| record.probe.stdout())
            .unwrap_or_default()
    }

    /// Register a new worker bound for `function_name`'s entry point, with
    /// `args` as its initial data stack. Returns its id and its result
    /// future; the worker does not start running until [`Controller::invoke`].
    pub fn new_machine(&self, function_name: &str, args: Vec<Value>) -> Result<(WorkerId, Arc<Future>)> {
        let entry = *self
            .executable
            .locations
            .get(function_name)
            .ok_or_else(|| Error::UnboundSymbol(function_name.to_string()))?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let future = Arc::new(Future::new());
        let state = WorkerState::new(entry, args, self.executable.bindings.clone());
        let probe = Arc::new(CapturingProbe::new(self.limits.build_probe()));
        self.workers.lock().unwrap().insert(
            id,
            WorkerRecord {
                state: Mutex::new(Some(state)),
                future: future.clone(),
                terminated: Mutex::new(false),
                probe,
            },
        );
        Ok((id, future))
    }

    /// Start (or resume) driving worker `id` on this controller's invoker.
    pub fn invoke(self: &Arc<Self>, id: WorkerId) {
        let controller = self.clone();
        self.invoker.invoke(id, Box::new(move || controller.run_worker(id)));
    }

    /// Run a single top-level program: registers a worker for `function_name`,
    /// starts it, and returns its result future immediately (§6).
    pub fn run(self: &Arc<Self>, function_name: &str, args: Vec<Value>) -> Result<Arc<Future>> {
        let (id, future) = self.new_machine(function_name, args)?;
        self.top_level.lock().unwrap().get_or_insert(id);
        self.invoke(id);
        Ok(future)
    }

    /// Atomically check a future's value or register `worker_id` to be
    /// woken at `resume_ip` once it resolves (§4.F).
    pub fn get_or_wait(&self, future: &Arc<Future>, worker_id: WorkerId, resume_ip: usize) -> Option<Value> {
        future.get_or_register((worker_id, resume_ip))
    }

    /// Resolve `future` with `value` from outside any worker — the host
    /// completing a deferred operation, for instance — and wake whatever
    /// that resolution unblocks.
    pub fn set_future_value(self: &Arc<Self>, future: &Arc<Future>, value: Value) -> Result<()> {
        let woken = future.resolve(value.clone())?;
        self.wake_all(woken, value);
        Ok(())
    }

    /// Block until every worker this controller has started has finished
    /// running (§6 "finish").
    pub fn finish(&self) {
        self.invoker.join_all();
    }

    pub fn result(&self, future: &Arc<Future>) -> Option<Value> {
        future.value()
    }

    pub fn is_terminated(&self, id: WorkerId) -> bool {
        self.workers
            .lock()
            .unwrap()
            .get(&id)
            .map(|record| *record.terminated.lock().unwrap())
            .unwrap_or(true)
    }

    fn run_worker(self: Arc<Self>, id: WorkerId) {
        let (mut state, probe) = {
            let workers = self.workers.lock().unwrap();
            let Some(record) = workers.get(&id) else {
                return;
            };
            let state = match record.state.lock().unwrap().take() {
                Some(state) => state,
                None => return,
            };
            (state, record.probe.clone())
        };

        let spawner: &dyn Spawner = &self;
        let outcome = vm::run(
            &mut state,
            &self.executable,
            probe.as_ref(),
            id,
            self.host.as_ref(),
            spawner,
        );

        match outcome {
            Ok(RunOutcome::Finished(value)) => self.finish_worker(id, value),
            Ok(RunOutcome::Suspended) => {
                let workers = self.workers.lock().unwrap();
                if let Some(record) = workers.get(&id) {
                    *record.state.lock().unwrap() = Some(state);
                }
            }
            Err(err) => self.fail_worker(id, err),
        }
    }

    fn finish_worker(self: &Arc<Self>, id: WorkerId, value: Value) {
        let future = {
            let workers = self.workers.lock().unwrap();
            let Some(record) = workers.get(&id) else {
                return;
            };
            *record.terminated.lock().unwrap() = true;
            record.future.clone()
        };
        match future.resolve(value.clone()) {
            Ok(woken) => self.wake_all(woken, value),
            Err(_) => {
                // The worker's own result future can only ever be resolved
                // once, by this code path, so this should not happen; if
                // it does there is nothing useful to do but drop it.
            }
        }
    }

    fn fail_worker(&self, id: WorkerId, err: Error) {
        if let Some(record) = self.workers.lock().unwrap().get(&id) {
            record.probe.log(id, &format!("worker {id} failed: {err}"));
            *record.terminated.lock().unwrap() = true;
        }
    }

    fn wake_all(self: &Arc<Self>, continuations: Vec<Continuation>, value: Value) {
        for (worker_id, resume_ip) in continuations {
            self.wake(worker_id, resume_ip, value.clone());
        }
    }

    fn wake(self: &Arc<Self>, id: WorkerId, resume_ip: usize, value: Value) {
        let state = {
            let workers = self.workers.lock().unwrap();
            let Some(record) = workers.get(&id) else {
                return;
            };
            record.state.lock().unwrap().take()
        };
        let Some(mut state) = state else {
            return;
        };
        state.ip = resume_ip;
        state.push(value);
        {
            let workers = self.workers.lock().unwrap();
            if let Some(record) = workers.get(&id) {
                *record.state.lock().unwrap() = Some(state);
            }
        }
        self.invoke(id);
    }
}

impl Spawner for Arc<Controller> {
    fn spawn(&self, function_id: &str, args: Vec<Value>) -> Arc<Future> {
        let (id, future) = self
            .new_machine(function_id, args)
            .expect("ACall target must exist in the linked executable");
        self.invoke(id);
        future
    }
}
