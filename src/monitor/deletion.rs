//! Reference counting with a one-shot deferred delete.

use core::ptr;

use log::debug;

use crate::scheduling::place::local_place;
use crate::sync::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use crate::tasklet::Tasklet;

/// Counts in-flight uses of an object and schedules its delete task once
/// the last use is gone.
///
/// The delete task goes to the shared queue of whichever Place performed
/// the final release. Moving it anywhere more specific is up to the task.
pub struct DeletionMonitor {
    refcount: AtomicUsize,
    delete_task: AtomicPtr<Tasklet>,
    deleting: AtomicBool,
}

impl DeletionMonitor {
    pub fn new() -> Self {
        Self {
            refcount: AtomicUsize::new(0),
            delete_task: AtomicPtr::new(ptr::null_mut()),
            deleting: AtomicBool::new(false),
        }
    }

    pub fn ref_count(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }

    pub fn is_deleting(&self) -> bool {
        self.deleting.load(Ordering::Acquire)
    }

    pub fn acquire_ref(&self) {
        self.refcount.fetch_add(1, Ordering::AcqRel);
    }

    pub fn release_ref(&self) {
        let old = self.refcount.fetch_sub(1, Ordering::AcqRel);
        assert!(old > 0, "deletion monitor {:p} released without reference", self);
        if old == 1 {
            self.schedule();
        }
    }

    /// Installs the delete task. It runs as soon as no references remain,
    /// which may be right away.
    ///
    /// # Safety
    /// `msg` is queued under the [queueing contract](crate::tasklet) from
    /// this call on, even while references remain.
    pub unsafe fn do_delete<F>(&self, msg: &Tasklet, fun: F)
    where
        F: FnOnce(&Tasklet) + Send + 'static,
    {
        assert!(
            !self.deleting.swap(true, Ordering::AcqRel),
            "delete task installed twice on {:p}",
            self
        );
        // Hold a reference while installing so that exactly one decrement,
        // ours or a concurrent release, sees the count drop to zero after
        // the task is visible.
        self.refcount.fetch_add(1, Ordering::AcqRel);
        msg.set(fun);
        self.delete_task
            .store(msg as *const Tasklet as *mut Tasklet, Ordering::Release);
        self.release_ref();
    }

    fn schedule(&self) {
        let task = self.delete_task.swap(ptr::null_mut(), Ordering::AcqRel);
        if task.is_null() {
            return;
        }
        debug!("deletion monitor {:p} schedules delete task {:p}", self, task);
        // Safety: `do_delete` queued the Tasklet under the queueing
        // contract, and the swap above hands it out once.
        unsafe { local_place().push_shared(&*task) };
    }
}

impl Default for DeletionMonitor {
    fn default() -> Self {
        Self::new()
    }
}
