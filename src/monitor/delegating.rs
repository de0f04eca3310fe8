//! Monitor that runs the object wherever its holder happens to be.
//!
//! Two delegation queues: `request_queue` admits one request at a time,
//! `queue` serialises the admitted request with the responses to calls it
//! issued. Whoever pushes first into an idle queue takes the entry out again
//! and runs it on its own Place, so the object migrates to its users.
//!
//! A request that issues a call keeps the object admitted but should let go
//! of `queue` with [`MonitorDelegating::continue_request`] so that the
//! response can get in. Only one response may be outstanding at a time;
//! a second concurrent response panics.

use log::debug;

use crate::monitor::{Deletable, DeletionMonitor, Monitor};
use crate::scheduling::place::{local_place, Mode};
use crate::structs::delegation_queue::DelegationQueue;
use crate::sync::{AtomicBool, Ordering};
use crate::tasklet::Tasklet;

pub struct MonitorDelegating {
    deletion: DeletionMonitor,
    in_response: AtomicBool,
    /// all unprocessed requests
    request_queue: DelegationQueue,
    /// the admitted request and its pending responses
    queue: DelegationQueue,
}

impl MonitorDelegating {
    pub fn new() -> Self {
        Self {
            deletion: DeletionMonitor::new(),
            in_response: AtomicBool::new(false),
            request_queue: DelegationQueue::new(),
            queue: DelegationQueue::new(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.request_queue.is_idle() && self.queue.is_idle()
    }

    /// The running request issued a call and waits for its response. Lets
    /// the response in while keeping other requests out.
    pub fn continue_request(&self) {
        self.release();
    }

    /// # Safety
    /// `msg` is queued under the queueing contract.
    unsafe fn enqueue(&self, msg: &Tasklet) {
        if unsafe { self.queue.push(msg) } {
            debug!("acquired monitor {:p}", self);
            let msg = self
                .queue
                .pop()
                .expect("delegation queue lost its first entry");
            unsafe { local_place().run_local(msg, Mode::Async) };
        } else {
            debug!("delegated monitor {:p}", self);
        }
    }

    fn release(&self) {
        if self.queue.try_release() {
            debug!("released monitor {:p}", self);
        } else {
            debug!("reschedule monitor {:p}", self);
            let msg = self
                .queue
                .pop()
                .expect("failed release without pending entry");
            // Safety: entries were queued by `enqueue` under the same contract.
            unsafe { local_place().run_local(msg, Mode::Async) };
        }
    }
}

impl Monitor for MonitorDelegating {
    unsafe fn request<F>(&self, msg: &Tasklet, fun: F) -> bool
    where
        F: FnOnce(&Tasklet) + Send + 'static,
    {
        msg.set(fun);
        self.acquire_ref();
        if unsafe { self.request_queue.push(msg) } {
            let msg = self
                .request_queue
                .pop()
                .expect("delegation queue lost its first entry");
            unsafe { self.enqueue(msg) };
            true
        } else {
            false
        }
    }

    fn request_done(&self) {
        if !self.request_queue.try_release() {
            let msg = self
                .request_queue
                .pop()
                .expect("failed release without pending request");
            // Safety: admitted by `request`, still under its contract.
            unsafe { self.enqueue(msg) };
        }
        // a running response releases the monitor itself
        if !self.in_response.load(Ordering::Acquire) {
            self.release();
        }
        self.release_ref();
    }

    unsafe fn response<F>(&self, msg: &Tasklet, fun: F)
    where
        F: FnOnce(&Tasklet) + Send + 'static,
    {
        self.acquire_ref();
        msg.set(fun);
        assert!(
            !self.in_response.swap(true, Ordering::AcqRel),
            "concurrent responses on delegating monitor {:p}",
            self
        );
        unsafe { self.enqueue(msg) };
    }

    fn response_done(&self) {
        assert!(
            self.in_response.swap(false, Ordering::AcqRel),
            "response_done without response on {:p}",
            self
        );
        self.release();
        self.release_ref();
    }
}

impl Deletable for MonitorDelegating {
    fn deletion_monitor(&self) -> &DeletionMonitor {
        &self.deletion
    }
}

impl Default for MonitorDelegating {
    fn default() -> Self {
        Self::new()
    }
}
