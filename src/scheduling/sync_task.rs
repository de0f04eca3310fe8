//! Synchronous cross-core calls.
//!
//! The caller ships a closure to another Place's synchronous queue and spins
//! until it has run. While spinning it keeps serving its own synchronous
//! queue, otherwise two Places calling each other would deadlock.

use log::trace;

use crate::scheduling::place::{local_place, Place};
use crate::sync::{poll_pause, AtomicBool, Ordering};
use crate::tasklet::Tasklet;

pub struct SynchronousTask {
    dest: &'static Place,
}

pub fn synchronous_at(place: &'static Place) -> SynchronousTask {
    SynchronousTask::new(place)
}

impl SynchronousTask {
    pub fn new(dest: &'static Place) -> Self {
        Self { dest }
    }

    /// Runs `fun` on the destination Place and returns its result. Runs
    /// inline when the destination is the local Place.
    pub fn atomic<F, R>(&self, fun: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        if self.dest.is_local() {
            return fun();
        }

        let done = AtomicBool::new(false);
        let mut fun = Some(fun);
        let mut result = None;
        let task = Tasklet::new();
        {
            let (fun, result, done) = (&mut fun, &mut result, &done);
            // Safety: we do not return before `done` is set, which is the
            // closure's last access to this stack frame.
            unsafe {
                task.set_scoped(move |_| {
                    *result = fun.take().map(|f| f());
                    done.store(true, Ordering::Release);
                });
            }
        }
        trace!("synchronous call to place {}", self.dest.thread_id());
        // Safety: `task` stays on this frame until `done` is set.
        unsafe { self.dest.push_sync(&task) };

        let local = local_place();
        while !done.load(Ordering::Acquire) {
            poll_pause();
            local.process_sync_tasks();
        }
        result.expect("synchronous task completed without a result")
    }
}
