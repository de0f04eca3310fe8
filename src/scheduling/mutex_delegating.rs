//! Mutual exclusion by delegation.
//!
//! Every caller wraps its critical section in a stack Tasklet and pushes it.
//! The first pusher becomes the owner and runs all critical sections that
//! queue up, including the other callers'. After
//! [`MUTEX_HANDOVER_LIMIT`] sections the owner hands the queue to the caller
//! of the next section so that no thread gets stuck serving the others
//! forever.

use log::debug;

use crate::config::MUTEX_HANDOVER_LIMIT;
use crate::structs::tasklet_queue::TaskletQueue;
use crate::sync::{poll_pause, AtomicU8, Ordering};
use crate::tasklet::Tasklet;

const PENDING: u8 = 0;
const DONE: u8 = 1;
const HANDOVER: u8 = 2;

pub struct MutexDelegating {
    queue: TaskletQueue,
}

impl MutexDelegating {
    pub fn new() -> Self {
        Self {
            queue: TaskletQueue::new(),
        }
    }

    /// Runs `fun` under the lock, possibly on another thread, and returns
    /// its result once it has run.
    pub fn atomic<F, R>(&self, fun: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        let done = AtomicU8::new(PENDING);
        let mut fun = Some(fun);
        let mut result = None;
        let task = Tasklet::new();
        {
            let (fun, result, done) = (&mut fun, &mut result, &done);
            // Safety: `push` only returns after `done` left PENDING, which
            // is the closure's last access to this stack frame.
            unsafe {
                task.set_scoped(move |t| {
                    *result = fun.take().map(|f| f());
                    let state = if t.is_handover() { HANDOVER } else { DONE };
                    done.store(state, Ordering::Release);
                });
            }
        }
        // Safety: `push` returns only once `done` left PENDING, and `task`
        // outlives that.
        unsafe { self.push(&task, &done) };
        result.expect("critical section completed without a result")
    }

    /// # Safety
    /// `task` is queued under the queueing contract and reports through
    /// `done`.
    unsafe fn push(&self, task: &Tasklet, done: &AtomicU8) {
        if unsafe { self.queue.push(task) } {
            self.process(done);
        } else {
            self.wait(done);
        }
    }

    /// Runs queued sections until the queue is released or handed over.
    fn process(&self, done: &AtomicU8) {
        let mut budget = MUTEX_HANDOVER_LIMIT;
        loop {
            match self.queue.pull() {
                Some(msg) if budget == 0 => {
                    debug!("mutex {:p} hands over to {:p}", self, msg);
                    msg.set_handover();
                    msg.run();
                    break;
                }
                Some(msg) => {
                    budget -= 1;
                    msg.run();
                }
                None => {
                    if self.queue.try_release() {
                        break;
                    }
                }
            }
        }
        assert!(
            done.load(Ordering::Acquire) != PENDING,
            "mutex owner left before its own section ran"
        );
    }

    /// Waits until our section ran, taking over if the owner hands over.
    fn wait(&self, done: &AtomicU8) {
        loop {
            poll_pause();
            match done.load(Ordering::Acquire) {
                HANDOVER => return self.process(done),
                DONE => return,
                _ => {}
            }
        }
    }
}

impl Default for MutexDelegating {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use core::cell::UnsafeCell;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    struct Shared {
        inside: AtomicBool,
        count: UnsafeCell<u64>,
    }

    // Safety: `count` is only touched inside the mutex.
    unsafe impl Sync for Shared {}

    #[test]
    fn uncontended_section_runs_on_the_caller() {
        let mutex = MutexDelegating::new();
        let caller = thread::current().id();
        let ran_on = mutex.atomic(|| thread::current().id());
        assert_eq!(ran_on, caller);
        assert_eq!(mutex.atomic(|| 40 + 2), 42);
    }

    #[test]
    fn contended_sections_are_exclusive_and_complete() {
        const THREADS: u64 = 8;
        const ROUNDS: u64 = 2_000;
        let mutex = MutexDelegating::new();
        let shared = Shared {
            inside: AtomicBool::new(false),
            count: UnsafeCell::new(0),
        };
        // a whole `&Shared` has to be captured, its fields alone are not Sync
        let shared = &shared;
        let mutex = &mutex;
        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(move || {
                    for _ in 0..ROUNDS {
                        mutex.atomic(move || {
                            assert!(!shared.inside.swap(true, Ordering::SeqCst));
                            unsafe { *shared.count.get() += 1 };
                            shared.inside.store(false, Ordering::SeqCst);
                        });
                    }
                });
            }
        });
        assert_eq!(mutex.atomic(move || unsafe { *shared.count.get() }), THREADS * ROUNDS);
    }

    #[test]
    fn sections_return_values_to_their_own_callers() {
        let mutex = MutexDelegating::new();
        thread::scope(|s| {
            for id in 0..4u64 {
                let mutex = &mutex;
                s.spawn(move || {
                    for round in 0..500u64 {
                        assert_eq!(mutex.atomic(move || id * 1_000 + round), id * 1_000 + round);
                    }
                });
            }
        });
    }
}
