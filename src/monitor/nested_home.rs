//! Nested monitor pinned to a fixed home Place.
//!
//! Works like [`NestedMonitorDelegating`](super::NestedMonitorDelegating)
//! except that every request and response runs on the home, so requests
//! keep their FIFO order.

use log::trace;
use spin::Once;

use crate::monitor::{Deletable, DeletionMonitor, Monitor};
use crate::scheduling::place::{Mode, Place};
use crate::structs::tasklet_queue::TaskletQueue;
use crate::tasklet::Tasklet;

pub struct NestedMonitorHome {
    home: Once<&'static Place>,
    deletion: DeletionMonitor,
    waitq: TaskletQueue,
}

impl NestedMonitorHome {
    pub fn new() -> Self {
        Self {
            home: Once::new(),
            deletion: DeletionMonitor::new(),
            waitq: TaskletQueue::new(),
        }
    }

    pub fn with_home(home: &'static Place) -> Self {
        let monitor = Self::new();
        monitor.set_home(home);
        monitor
    }

    pub fn set_home(&self, home: &'static Place) {
        assert!(!self.home.is_completed(), "monitor {:p} already has a home", self);
        self.home.call_once(|| home);
    }

    pub fn home(&self) -> &'static Place {
        match self.home.get() {
            Some(home) => home,
            None => panic!("nested monitor {:p} used without home", self),
        }
    }

    pub fn is_idle(&self) -> bool {
        !self.waitq.is_locked()
    }

    fn run_next(&self, msg: &Tasklet) {
        trace!("nested home monitor {:p} runs next {:p}", self, msg);
        // Safety: `msg` came out of `waitq`, where `request` queued it under
        // the queueing contract.
        unsafe { self.home().run_local(msg, Mode::Async) };
    }
}

impl Monitor for NestedMonitorHome {
    unsafe fn request<F>(&self, msg: &Tasklet, fun: F) -> bool
    where
        F: FnOnce(&Tasklet) + Send + 'static,
    {
        let home = self.home();
        if !unsafe { self.waitq.push(msg.set(fun)) } {
            return false;
        }
        self.acquire_ref();
        let first = self
            .waitq
            .pull()
            .expect("nested monitor lost its first request");
        unsafe { home.run(first, Mode::MayInline) };
        true
    }

    /// Runs on the home Place.
    fn request_done(&self) {
        if let Some(next) = self.waitq.pull() {
            return self.run_next(next);
        }
        if self.waitq.try_release() {
            self.release_ref();
        } else {
            let next = self
                .waitq
                .pull()
                .expect("failed release without pending request");
            self.run_next(next);
        }
    }

    unsafe fn response<F>(&self, msg: &Tasklet, fun: F)
    where
        F: FnOnce(&Tasklet) + Send + 'static,
    {
        unsafe { self.home().run(msg.set(fun), Mode::MayInline) };
    }

    fn response_done(&self) {}
}

impl Deletable for NestedMonitorHome {
    fn deletion_monitor(&self) -> &DeletionMonitor {
        &self.deletion
    }
}

impl Default for NestedMonitorHome {
    fn default() -> Self {
        Self::new()
    }
}
