//! Per-worker execution state.
//!
//! A worker is one logical thread of VM execution: a data stack, a call
//! stack of frames, and an instruction pointer. Bindings are lexical and
//! strictly per-frame — `PushB`'s first lookup tier reads only the current
//! frame's scope, never an enclosing one (§4.C).

use std::collections::HashMap;

use crate::value::Value;

/// One entry on the call stack: where to resume the caller, and that
/// frame's local bindings.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Instruction index to resume at when this frame returns.
    pub return_ip: usize,
    pub locals: HashMap<String, Value>,
}

impl Frame {
    pub fn new(return_ip: usize, locals: HashMap<String, Value>) -> Self {
        Frame { return_ip, locals }
    }
}

/// The state of a single worker (§4.C).
#[derive(Debug)]
pub struct WorkerState {
    pub data: Vec<Value>,
    pub frames: Vec<Frame>,
    pub ip: usize,
    pub stopped: bool,
}

impl WorkerState {
    /// A fresh worker about to execute starting at `entry_ip`, with `args`
    /// already pushed onto the data stack (leftmost at the bottom) and
    /// `locals` seeded for frame zero — typically the executable's
    /// top-level bindings, so a bare top-level name resolves as a local
    /// without needing a separate global-scope lookup tier (§9).
    pub fn new(entry_ip: usize, args: Vec<Value>, locals: HashMap<String, Value>) -> Self {
        WorkerState {
            data: args,
            frames: vec![Frame::new(entry_ip, locals)],
            ip: entry_ip,
            stopped: false,
        }
    }

    pub fn push(&mut self, value: Value) {
        self.data.push(value);
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.data.pop()
    }

    pub fn peek(&self) -> Option<&Value> {
        self.data.last()
    }

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("worker always has at least one frame")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames
            .last_mut()
            .expect("worker always has at least one frame")
    }

    pub fn get_local(&self, name: &str) -> Option<&Value> {
        self.current_frame().locals.get(name)
    }

    /// The current frame's full local scope, used to snapshot captures for
    /// a closure constructed at this point (§4.D "Closure construction").
    pub fn locals(&self) -> &HashMap<String, Value> {
        &self.current_frame().locals
    }

    pub fn set_local(&mut self, name: String, value: Value) {
        self.current_frame_mut().locals.insert(name, value);
    }

    /// Push a new frame for a call, returning to `return_ip` once it
    /// returns.
    pub fn enter(&mut self, entry_ip: usize, return_ip: usize, locals: HashMap<String, Value>) {
        self.frames.push(Frame::new(return_ip, locals));
        self.ip = entry_ip;
    }

    /// True once only the outermost frame remains — returning from it ends
    /// the worker rather than resuming a caller (§4.C, §4.E `Return`).
    pub fn can_return(&self) -> bool {
        self.frames.len() > 1
    }

    /// Pop the current frame and resume at its recorded return IP.
    pub fn leave_frame(&mut self) {
        let frame = self.frames.pop().expect("worker always has at least one frame");
        self.ip = frame.return_ip;
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_worker_seeds_frame_zero_locals_and_stack() {
        let mut locals = HashMap::new();
        locals.insert("f".to_string(), Value::Number(1.0));
        let worker = WorkerState::new(3, vec![Value::Number(10.0)], locals);
        assert_eq!(worker.ip, 3);
        assert_eq!(worker.data, vec![Value::Number(10.0)]);
        assert_eq!(worker.get_local("f"), Some(&Value::Number(1.0)));
        assert!(!worker.can_return());
    }

    #[test]
    fn enter_and_leave_frame_round_trips_ip() {
        let mut worker = WorkerState::new(0, vec![], HashMap::new());
        worker.enter(10, 1, HashMap::new());
        assert_eq!(worker.ip, 10);
        assert!(worker.can_return());
        worker.leave_frame();
        assert_eq!(worker.ip, 1);
        assert!(!worker.can_return());
    }

    #[test]
    fn locals_are_per_frame() {
        let mut worker = WorkerState::new(0, vec![], HashMap::new());
        worker.set_local("x".to_string(), Value::Number(1.0));
        worker.enter(5, 1, HashMap::new());
        assert_eq!(worker.get_local("x"), None);
        worker.leave_frame();
        assert_eq!(worker.get_local("x"), Some(&Value::Number(1.0)));
    }
}
