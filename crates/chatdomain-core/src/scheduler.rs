//! Deferred execution on the main loop.
//!
//! The registry never runs work on another thread. "Scheduling" means queueing
//! a closure that the host's event loop runs after the current callback
//! returns.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

pub type Task = Box<dyn FnOnce()>;

pub trait Scheduler {
    /// Run `task` once the callback currently executing on the loop has returned,
    /// before the loop picks up its next queued task.
    fn postpone_call(&self, task: Task);

    /// Queue `task` as a separate main loop iteration.
    fn on_main(&self, task: Task);
}

#[derive(Default)]
struct Queues {
    postponed: RefCell<VecDeque<Task>>,
    tasks: RefCell<VecDeque<Task>>,
}

/// Cooperative single-threaded loop. Hosts without an event loop of their own
/// (the CLI, tests) drive it explicitly with [`MainLoop::run_until_idle`].
#[derive(Clone, Default)]
pub struct MainLoop {
    queues: Rc<Queues>,
}

impl MainLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle suitable for [`crate::Host`].
    pub fn handle(&self) -> Rc<dyn Scheduler> {
        Rc::new(self.clone())
    }

    pub fn pending(&self) -> usize {
        self.queues.postponed.borrow().len() + self.queues.tasks.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Run one queued task plus every postponed call it produced.
    /// Returns the number of closures executed.
    pub fn run_turn(&self) -> usize {
        let mut ran = self.drain_postponed();
        let next = self.queues.tasks.borrow_mut().pop_front();
        if let Some(task) = next {
            task();
            ran += 1;
            ran += self.drain_postponed();
        }
        ran
    }

    /// Keep turning until nothing is queued. Returns the number of closures executed.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            let turn = self.run_turn();
            if turn == 0 {
                break;
            }
            ran += turn;
        }
        ran
    }

    fn drain_postponed(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.queues.postponed.borrow_mut().pop_front();
            let Some(task) = next else {
                break;
            };
            task();
            ran += 1;
        }
        ran
    }
}

impl Scheduler for MainLoop {
    fn postpone_call(&self, task: Task) {
        self.queues.postponed.borrow_mut().push_back(task);
    }

    fn on_main(&self, task: Task) {
        self.queues.tasks.borrow_mut().push_back(task);
    }
}
