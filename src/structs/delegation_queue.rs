//! Pseudo-FIFO queue with delegation support: the first pusher into an idle
//! queue becomes responsible for draining it.
//!
//! Entries that arrive while the owner is busy pile up on a LIFO stack. The
//! owner detaches that stack in one exchange and works through it newest
//! first, so a batch that arrived concurrently comes out reversed. Entries
//! pushed one at a time, each after the previous one was taken, keep their
//! order.

use core::cell::UnsafeCell;

use crate::structs::link::{AtomicLink, Link};
use crate::sync::Ordering;
use crate::tasklet::Tasklet;

pub struct DelegationQueue {
    /// Detached entries not yet handed out. Owner only.
    head: UnsafeCell<Link>,
    tail: AtomicLink,
}

// Safety: `head` is only accessed by the current owner, which the tail
// protocol makes unique.
unsafe impl Send for DelegationQueue {}
unsafe impl Sync for DelegationQueue {}

impl DelegationQueue {
    pub fn new() -> Self {
        Self {
            head: UnsafeCell::new(Link::Free),
            tail: AtomicLink::new(Link::Free),
        }
    }

    /// Returns `true` if the queue was idle, making the caller its owner.
    ///
    /// # Safety
    /// `msg` is queued under the [queueing contract](crate::tasklet).
    pub unsafe fn push(&self, msg: &Tasklet) -> bool {
        assert!(msg.is_init(), "pushing uninitialised tasklet {:p}", msg);
        msg.link().store(Link::Incomplete, Ordering::Relaxed);
        let oldtail = self.tail.exchange(Link::node(msg), Ordering::AcqRel);
        let next = match oldtail {
            Link::Locked => Link::Free,
            other => other,
        };
        msg.link().store(next, Ordering::Release);
        oldtail == Link::Free
    }

    /// Next entry for the owner, or `None` if nothing is pending. The queue
    /// stays owned either way.
    pub fn pop(&self) -> Option<&Tasklet> {
        // Safety: only the owner pops.
        let head = unsafe { &mut *self.head.get() };
        let current = match *head {
            Link::Node(t) => t,
            _ => match self.tail.exchange(Link::Locked, Ordering::AcqRel) {
                Link::Node(t) => t,
                Link::Locked => return None,
                Link::Free => panic!("pop on idle delegation queue {:p}", self),
                other => panic!("corrupt delegation queue tail {:?}", other),
            },
        };
        // Safety: a queued Tasklet stays alive until it has run.
        let t = unsafe { &*current.as_ptr() };
        *head = match t.unlink() {
            Link::Locked => Link::Free,
            next => next,
        };
        Some(t)
    }

    /// Gives up ownership. Fails if something is still pending, in which
    /// case the caller has to keep popping.
    pub fn try_release(&self) -> bool {
        // Safety: only the owner releases.
        if unsafe { (*self.head.get()).is_node() } {
            return false;
        }
        match self.tail.compare_exchange(
            Link::Locked,
            Link::Free,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(Link::Free) => panic!("tried unlocking a free queue"),
            Err(_) => false,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.tail.load(Ordering::Acquire) == Link::Free
    }
}

impl Default for DelegationQueue {
    fn default() -> Self {
        Self::new()
    }
}
