//! Per-hardware-thread scheduling.
//!
//! Each hardware thread owns one [`Place`]. Other threads hand it work by
//! pushing Tasklets into its queue; the first push into an idle Place sends
//! a wake-up interrupt. The hardware-entry glue brackets every interrupt and
//! system call with [`Place::enter_kernel`] and [`Place::process_tasks`].

use alloc::boxed::Box;
use lazy_static::lazy_static;
use log::{debug, info, trace};
use strum_macros::Display;

use crate::config::MAX_THREADS;
use crate::platform::platform;
use crate::structs::tasklet_queue::TaskletQueue;
use crate::sync::{AtomicBool, AtomicUsize, Ordering};
use crate::tasklet::Tasklet;

/// Linear index of a hardware thread.
pub type ThreadId = usize;
/// Interrupt controller id used to address wake-ups.
pub type ApicId = u32;

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Queue on the local fast path; runs from the dispatch loop.
    Async,
    /// Run right away if already on the target Place.
    MayInline,
}

pub struct Place {
    thread_id: AtomicUsize,
    apic_id: AtomicUsize,
    nesting: AtomicBool,
    /// pending tasks
    queue: TaskletQueue,
    /// pending high priority synchronous tasks
    queue_sync: TaskletQueue,
}

lazy_static! {
    static ref PLACES: Box<[Place]> = (0..MAX_THREADS).map(|_| Place::new()).collect();
}

pub fn place(thread_id: ThreadId) -> &'static Place {
    assert!(thread_id < MAX_THREADS, "no place for thread {}", thread_id);
    &PLACES[thread_id]
}

/// Boot hook for hardware thread `thread_id`.
pub fn init_place(thread_id: ThreadId, apic_id: ApicId) -> &'static Place {
    let place = place(thread_id);
    place.init(thread_id, apic_id);
    place
}

/// The Place of the hardware thread executing the caller.
pub fn local_place() -> &'static Place {
    place(platform().current_thread())
}

impl Place {
    fn new() -> Self {
        Self {
            thread_id: AtomicUsize::new(0),
            apic_id: AtomicUsize::new(0),
            nesting: AtomicBool::new(false),
            queue: TaskletQueue::new(),
            queue_sync: TaskletQueue::new(),
        }
    }

    /// Called once per hardware thread during boot, on that thread. The
    /// Place starts out active, as if the boot code had entered the kernel.
    pub fn init(&self, thread_id: ThreadId, apic_id: ApicId) {
        info!("init Place {:p} thread={} apic={}", self, thread_id, apic_id);
        self.thread_id.store(thread_id, Ordering::Relaxed);
        self.apic_id.store(apic_id as usize, Ordering::Relaxed);
        self.nesting.store(true, Ordering::Relaxed);
        // an early push may have taken a queue first, which holds it just as well
        self.queue.try_acquire();
        self.queue_sync.try_acquire();
        debug_assert!(self.queue.is_locked() && self.queue_sync.is_locked());
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id.load(Ordering::Relaxed)
    }

    pub fn apic_id(&self) -> ApicId {
        self.apic_id.load(Ordering::Relaxed) as ApicId
    }

    pub fn is_local(&self) -> bool {
        core::ptr::eq(self, local_place())
    }

    /// `true` while the hardware thread is in kernel mode processing tasks.
    pub fn is_active(&self) -> bool {
        self.nesting.load(Ordering::Relaxed)
    }

    /// Runs `msg` on this Place, which must be the caller's own.
    ///
    /// # Safety
    /// `msg` is queued under the [queueing contract](crate::tasklet).
    pub unsafe fn run_local(&self, msg: &Tasklet, mode: Mode) {
        assert!(self.is_local(), "run_local on remote place {}", self.thread_id());
        match mode {
            Mode::Async => unsafe { self.push_private(msg) },
            Mode::MayInline => msg.run(),
        }
    }

    /// # Safety
    /// `msg` is queued under the [queueing contract](crate::tasklet).
    pub unsafe fn run(&self, msg: &Tasklet, mode: Mode) {
        unsafe {
            if self.is_local() {
                self.run_local(msg, mode);
            } else {
                self.push_shared(msg);
            }
        }
    }

    /// # Safety
    /// `msg` is queued under the [queueing contract](crate::tasklet).
    pub unsafe fn push_shared(&self, msg: &Tasklet) {
        trace!("place {} push shared {:p}", self.thread_id(), msg);
        if unsafe { self.queue.push(msg) } {
            self.wakeup();
        }
    }

    /// Queues a high priority task that a remote thread is spinning on.
    ///
    /// # Safety
    /// `msg` is queued under the [queueing contract](crate::tasklet).
    pub unsafe fn push_sync(&self, msg: &Tasklet) {
        assert!(!self.is_local(), "synchronous push to own place");
        trace!("place {} push synchronous {:p}", self.thread_id(), msg);
        if unsafe { self.queue_sync.push(msg) } {
            self.preempt();
        }
    }

    /// Prepares task processing on interrupt or system call entry. Returns
    /// `true` on a nested entry.
    pub fn enter_kernel(&self) -> bool {
        // pushers must not send a wake-up while we are in here anyway
        self.queue.try_acquire();
        self.queue_sync.try_acquire();
        self.nesting.swap(true, Ordering::AcqRel)
    }

    /// Wakes the Place if it was idle.
    pub fn preempt(&self) -> bool {
        if self.queue.try_acquire() {
            self.wakeup();
            true
        } else {
            false
        }
    }

    /// Runs tasks until both queues are empty and released, so that the
    /// next sender knows it has to wake this Place up.
    pub fn process_tasks(&self) {
        loop {
            if let Some(msg) = self.queue_sync.pull() {
                msg.run();
                continue;
            }
            if let Some(msg) = self.queue.pull() {
                msg.run();
                continue;
            }
            if !self.queue_sync.try_release() {
                continue;
            }
            if !self.queue.try_release() {
                self.queue_sync.try_acquire();
                continue;
            }
            // A synchronous push that raced the two releases found `queue`
            // still held and did not wake us; take the queues back for it.
            if self.queue_sync.is_locked() && self.queue.try_acquire() {
                self.queue_sync.try_acquire();
                continue;
            }
            break;
        }
        self.nesting.store(false, Ordering::Release);
    }

    /// Runs pending synchronous tasks without releasing their queue. Every
    /// spin loop that waits for a remote Place has to call this.
    pub fn process_sync_tasks(&self) {
        while let Some(msg) = self.queue_sync.pull() {
            msg.run();
        }
    }

    /// # Safety
    /// Local Place only, and `msg` is queued under the queueing contract.
    unsafe fn push_private(&self, msg: &Tasklet) {
        trace!("place {} push private {:p}", self.thread_id(), msg);
        unsafe { self.queue.push_private(msg) };
    }

    fn wakeup(&self) {
        debug!("wake up place {}", self.thread_id());
        platform().send_wakeup(self.apic_id());
    }
}

impl core::fmt::Debug for Place {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Place")
            .field("thread_id", &self.thread_id())
            .field("apic_id", &self.apic_id())
            .field("active", &self.is_active())
            .finish()
    }
}
