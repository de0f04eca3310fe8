//! Multi-producer queue with FIFO pull and an owner-only private list.
//!
//! Producers push onto a shared LIFO chain. The owner detaches the whole
//! chain at once and reverses it into its private list, so pulls see the
//! producers' order. The shared tail also works as the ownership flag:
//! `Free` means nobody is processing and the next pusher is responsible for
//! waking someone up.

use crate::structs::link::{AtomicLink, CacheAligned, Link};
use crate::sync::Ordering;
use crate::tasklet::Tasklet;

pub struct TaskletQueue {
    private_tail: CacheAligned<AtomicLink>,
    shared_tail: CacheAligned<AtomicLink>,
}

impl TaskletQueue {
    pub fn new() -> Self {
        Self {
            private_tail: CacheAligned(AtomicLink::new(Link::Free)),
            shared_tail: CacheAligned(AtomicLink::new(Link::Free)),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.shared_tail.load(Ordering::Acquire) != Link::Free
    }

    pub fn try_acquire(&self) -> bool {
        self.shared_tail
            .compare_exchange(Link::Free, Link::Locked, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Pushes into the shared chain. Returns `true` if this acquired the
    /// queue because it was idle.
    ///
    /// # Safety
    /// `t` is queued under the [queueing contract](crate::tasklet).
    pub unsafe fn push(&self, t: &Tasklet) -> bool {
        assert!(t.is_init(), "pushing uninitialised tasklet {:p}", t);
        t.link().store(Link::Incomplete, Ordering::Relaxed);
        let oldtail = self.shared_tail.exchange(Link::node(t), Ordering::AcqRel);
        t.link().store(oldtail, Ordering::Release);
        oldtail == Link::Free
    }

    /// Adds a task for LIFO processing.
    ///
    /// # Safety
    /// Owner only, and `t` is queued under the
    /// [queueing contract](crate::tasklet).
    pub unsafe fn push_private(&self, t: &Tasklet) -> bool {
        assert!(t.is_init(), "pushing uninitialised tasklet {:p}", t);
        let oldtail = self.private_tail.exchange(Link::node(t), Ordering::Relaxed);
        t.link().store(oldtail, Ordering::Relaxed);
        oldtail == Link::Free
    }

    /// Next task in FIFO order, or `None` if the queue seems empty. Owner
    /// only; the shared tail is left `Locked`.
    pub fn pull(&self) -> Option<&Tasklet> {
        if let Link::Node(p) = self.private_tail.exchange(Link::Free, Ordering::Relaxed) {
            // Safety: a queued Tasklet stays alive until it has run.
            let t = unsafe { &*p.as_ptr() };
            let next = t.link().exchange(Link::Init, Ordering::Relaxed);
            self.private_tail.store(next, Ordering::Relaxed);
            return Some(t);
        }

        let mut current = match self.shared_tail.exchange(Link::Locked, Ordering::AcqRel) {
            Link::Node(p) => p,
            _ => return None,
        };
        loop {
            // Safety: as above.
            let t = unsafe { &*current.as_ptr() };
            match t.wait_link() {
                Link::Node(next) => {
                    // everything older than `t` goes onto the private list
                    let prev = self.private_tail.exchange(Link::node(t), Ordering::Relaxed);
                    t.link().store(prev, Ordering::Relaxed);
                    current = next;
                }
                _ => {
                    t.link().store(Link::Init, Ordering::Relaxed);
                    return Some(t);
                }
            }
        }
    }

    /// Releases ownership unless new work arrived in the meantime.
    pub fn try_release(&self) -> bool {
        if self.private_tail.load(Ordering::Relaxed).is_node() {
            return false;
        }
        self.shared_tail
            .compare_exchange(Link::Locked, Link::Free, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }
}

impl Default for TaskletQueue {
    fn default() -> Self {
        Self::new()
    }
}
