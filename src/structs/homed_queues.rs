//! Queues of a homed monitor: remote threads push onto a shared stack, the
//! home thread retrieves it in bulk into its private stack.

use crate::structs::link::{AtomicLink, Link};
use crate::sync::Ordering;
use crate::tasklet::Tasklet;

/// LIFO stack touched only by the home thread.
pub struct PrivateTaskletQueue {
    tail: AtomicLink,
}

impl PrivateTaskletQueue {
    pub fn new() -> Self {
        Self {
            tail: AtomicLink::new(Link::Free),
        }
    }

    /// # Safety
    /// Home thread only, and `msg` is queued under the
    /// [queueing contract](crate::tasklet).
    pub unsafe fn push(&self, msg: &Tasklet) -> bool {
        let oldtail = self.tail.exchange(Link::node(msg), Ordering::Relaxed);
        msg.link().store(oldtail, Ordering::Relaxed);
        oldtail == Link::Free
    }

    pub fn is_empty(&self) -> bool {
        !self.tail.load(Ordering::Relaxed).is_node()
    }

    pub fn pop(&self) -> Option<&Tasklet> {
        match self.tail.load(Ordering::Relaxed) {
            Link::Node(p) => {
                // Safety: a queued Tasklet stays alive until it has run.
                let t = unsafe { &*p.as_ptr() };
                let next = t.link().exchange(Link::Init, Ordering::Relaxed);
                self.tail.store(next, Ordering::Relaxed);
                Some(t)
            }
            _ => None,
        }
    }
}

impl Default for PrivateTaskletQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-blocking LIFO stack for incoming tasks.
pub struct SharedTaskletQueue {
    tail: AtomicLink,
}

impl SharedTaskletQueue {
    pub fn new() -> Self {
        Self {
            tail: AtomicLink::new(Link::Free),
        }
    }

    /// Returns `true` if the stack was empty.
    ///
    /// # Safety
    /// `msg` is queued under the [queueing contract](crate::tasklet).
    pub unsafe fn push(&self, msg: &Tasklet) -> bool {
        assert!(msg.is_init(), "pushing uninitialised tasklet {:p}", msg);
        msg.link().store(Link::Incomplete, Ordering::Relaxed);
        let oldtail = self.tail.exchange(Link::node(msg), Ordering::AcqRel);
        msg.link().store(oldtail, Ordering::Release);
        oldtail == Link::Free
    }

    /// Moves everything pushed so far into `q`, oldest on top.
    pub fn retrieve(&self, q: &PrivateTaskletQueue) {
        let mut current = self.tail.exchange(Link::Free, Ordering::AcqRel);
        while let Link::Node(p) = current {
            // Safety: a queued Tasklet stays alive until it has run.
            let t = unsafe { &*p.as_ptr() };
            let next = t.wait_link();
            // Safety: moves an already queued Tasklet between our queues.
            unsafe { q.push(t) };
            current = next;
        }
    }
}

impl Default for SharedTaskletQueue {
    fn default() -> Self {
        Self::new()
    }
}
