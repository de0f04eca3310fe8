//! Monitor pinned to a home Place, with strict FIFO order.
//!
//! A counter of pending requests decides who forwards work to the home.
//! The request that finds the counter at zero is sent to the home directly;
//! later ones go to a shared stack that the home drains in bulk into its
//! private FIFO when the running request finishes.

use log::trace;
use spin::Once;

use crate::monitor::{Deletable, DeletionMonitor, Monitor};
use crate::scheduling::place::{Mode, Place};
use crate::structs::homed_queues::{PrivateTaskletQueue, SharedTaskletQueue};
use crate::sync::{pause, AtomicUsize, Ordering};
use crate::tasklet::Tasklet;

pub struct MonitorHomed {
    home: Once<&'static Place>,
    deletion: DeletionMonitor,
    pending_requests: AtomicUsize,
    /// accessed only on the home Place
    private_queue: PrivateTaskletQueue,
    /// requests from other threads
    shared_queue: SharedTaskletQueue,
}

impl MonitorHomed {
    pub fn new() -> Self {
        Self {
            home: Once::new(),
            deletion: DeletionMonitor::new(),
            pending_requests: AtomicUsize::new(0),
            private_queue: PrivateTaskletQueue::new(),
            shared_queue: SharedTaskletQueue::new(),
        }
    }

    pub fn with_home(home: &'static Place) -> Self {
        let monitor = Self::new();
        monitor.set_home(home);
        monitor
    }

    /// Assigns the home of a monitor created without one.
    pub fn set_home(&self, home: &'static Place) {
        assert!(!self.home.is_completed(), "monitor {:p} already has a home", self);
        self.home.call_once(|| home);
    }

    pub fn home(&self) -> &'static Place {
        match self.home.get() {
            Some(home) => home,
            None => panic!("homed monitor {:p} used without home", self),
        }
    }

    pub fn pending_requests(&self) -> usize {
        self.pending_requests.load(Ordering::Acquire)
    }
}

impl Monitor for MonitorHomed {
    unsafe fn request<F>(&self, msg: &Tasklet, fun: F) -> bool
    where
        F: FnOnce(&Tasklet) + Send + 'static,
    {
        let home = self.home();
        msg.set(fun);
        self.acquire_ref();
        if self.pending_requests.fetch_add(1, Ordering::AcqRel) == 0 {
            // the only request in flight goes to the home directly
            unsafe { home.push_shared(msg) };
            true
        } else {
            unsafe { self.shared_queue.push(msg) };
            false
        }
    }

    /// Runs on the home Place.
    fn request_done(&self) {
        let home = self.home();
        if self.pending_requests.fetch_sub(1, Ordering::AcqRel) > 1 {
            // we schedule the next one; its push may still be in flight
            loop {
                if let Some(msg) = self.private_queue.pop() {
                    trace!("homed monitor {:p} runs next {:p}", self, msg);
                    // Safety: `request` queued it under the queueing contract.
                    unsafe { home.run_local(msg, Mode::Async) };
                    break;
                }
                self.shared_queue.retrieve(&self.private_queue);
                pause();
            }
        }
        self.release_ref();
    }

    unsafe fn response<F>(&self, msg: &Tasklet, fun: F)
    where
        F: FnOnce(&Tasklet) + Send + 'static,
    {
        let home = self.home();
        self.acquire_ref();
        unsafe { home.run(msg.set(fun), Mode::Async) };
    }

    fn response_done(&self) {
        self.release_ref();
    }
}

impl Deletable for MonitorHomed {
    fn deletion_monitor(&self) -> &DeletionMonitor {
        &self.deletion
    }
}

impl Default for MonitorHomed {
    fn default() -> Self {
        Self::new()
    }
}
