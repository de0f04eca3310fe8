//! Cache-line sized continuations.
//!
//! A [`Tasklet`] stores one small closure inline together with the function
//! that knows how to call it, so queueing work never allocates. The link
//! word doubles as the state machine:
//!
//! ```text
//! Unused --set()--> Init --push--> (queue owned) --pop--> Init --run()--> Unused
//! ```
//!
//! A Tasklet lives inside the object that issued the work. Queues keep only
//! its address, so every operation that enqueues one is `unsafe` and shares
//! one contract:
//!
//! # Queueing contract
//! From the moment a Tasklet is handed to a queue until its closure has been
//! invoked, the Tasklet must not move, must stay valid, and must not be
//! `set`, `run` or enqueued again by anyone else. Once invoked, the closure
//! owns it: it may re-arm the Tasklet or end the life of the object holding
//! it, as long as it does not touch the Tasklet afterwards.
//!
//! Dropping a Tasklet that is still queued panics.
//!
//! Queueing therefore needs an `unsafe` block:
//!
//! ```compile_fail,E0133
//! use kasync::{place, Tasklet};
//!
//! let t = Tasklet::new();
//! t.set(|_| {});
//! place(0).push_shared(&t);
//! let moved = t;
//! ```

use core::cell::UnsafeCell;
use core::fmt;
use core::marker::{PhantomData, PhantomPinned};
use core::mem::{align_of, size_of, MaybeUninit};

use log::trace;

use crate::config::CACHELINE_SIZE;
use crate::structs::link::{AtomicLink, Link};
use crate::sync::{pause, AtomicBool, Ordering};

/// Bytes of closure state that fit next to the header.
pub const PAYLOAD_SIZE: usize = 40;
const PAYLOAD_WORDS: usize = PAYLOAD_SIZE / size_of::<u64>();

/// Invokes (`true`) or drops (`false`) the closure stored in the payload.
type Handler = unsafe fn(&Tasklet, bool);

#[repr(C, align(64))]
pub struct Tasklet {
    link: AtomicLink,
    handler: UnsafeCell<Option<Handler>>,
    handover: AtomicBool,
    payload: UnsafeCell<MaybeUninit<[u64; PAYLOAD_WORDS]>>,
    _pinned: PhantomPinned,
}

#[cfg(not(loom))]
const _: () = assert!(size_of::<Tasklet>() == CACHELINE_SIZE);
const _: () = assert!(align_of::<Tasklet>() == CACHELINE_SIZE);

// Safety: the payload and handler are only touched by whoever currently
// holds the Tasklet (the setter before publishing it, the popper after
// taking it out of a queue); the queues hand it over with acquire/release.
unsafe impl Send for Tasklet {}
unsafe impl Sync for Tasklet {}

struct Fits<F>(PhantomData<F>);

impl<F> Fits<F> {
    const OK: () = assert!(
        size_of::<F>() <= PAYLOAD_SIZE && align_of::<F>() <= align_of::<u64>(),
        "tasklet payload is too big"
    );
}

unsafe fn trampoline<F: FnOnce(&Tasklet)>(t: &Tasklet, invoke: bool) {
    // Move the closure out before the Tasklet is released: from then on its
    // owner may reuse or free it.
    let fun = unsafe { (t.payload.get() as *const F).read() };
    if invoke {
        t.link.store(Link::Unused, Ordering::Release);
        fun(t);
    }
}

impl Tasklet {
    pub fn new() -> Self {
        Self {
            link: AtomicLink::new(Link::Unused),
            handler: UnsafeCell::new(None),
            handover: AtomicBool::new(false),
            payload: UnsafeCell::new(MaybeUninit::uninit()),
            _pinned: PhantomPinned,
        }
    }

    /// Stores `fun` and moves the Tasklet from `Unused` to `Init`.
    ///
    /// Panics if the Tasklet still holds an earlier closure or is queued.
    pub fn set<F>(&self, fun: F) -> &Self
    where
        F: FnOnce(&Tasklet) + Send + 'static,
    {
        // Safety: `'static` closures stay valid however long the Tasklet waits.
        unsafe { self.set_scoped(fun) }
    }

    /// Like [`set`](Self::set) for closures that borrow from the caller.
    ///
    /// # Safety
    /// The caller must not let the borrowed data go out of scope before the
    /// Tasklet has run, typically by spinning on a completion flag.
    pub unsafe fn set_scoped<F>(&self, fun: F) -> &Self
    where
        F: FnOnce(&Tasklet) + Send,
    {
        let () = Fits::<F>::OK;
        // `Locked` keeps a concurrent setter or runner out of the payload
        if let Err(state) =
            self.link
                .compare_exchange(Link::Unused, Link::Locked, Ordering::Acquire, Ordering::Acquire)
        {
            panic!("tasklet {:p} set while {:?}", self, state);
        }
        unsafe {
            (self.payload.get() as *mut F).write(fun);
            *self.handler.get() = Some(trampoline::<F>);
        }
        self.handover.store(false, Ordering::Relaxed);
        self.link.store(Link::Init, Ordering::Release);
        self
    }

    /// Invokes the stored closure exactly once.
    ///
    /// The state is back to `Unused` before the closure starts, so the
    /// closure may immediately re-arm this Tasklet.
    pub fn run(&self) {
        trace!("run tasklet {:p}", self);
        if let Err(state) =
            self.link
                .compare_exchange(Link::Init, Link::Locked, Ordering::Acquire, Ordering::Acquire)
        {
            panic!("tasklet {:p} run while {:?}", self, state);
        }
        let handler = unsafe { (*self.handler.get()).take() }
            .expect("initialised tasklet without handler");
        // the handler marks the Tasklet unused once the closure is moved out
        unsafe { handler(self, true) }
    }

    pub fn is_unused(&self) -> bool {
        self.link.load(Ordering::Acquire) == Link::Unused
    }

    pub fn is_init(&self) -> bool {
        self.link.load(Ordering::Acquire) == Link::Init
    }

    /// Marks an initialised Tasklet as "the receiver takes over processing".
    pub fn set_handover(&self) {
        assert!(self.is_init(), "handover on a tasklet that is not initialised");
        self.handover.store(true, Ordering::Release);
    }

    /// Whether the last [`set_handover`](Self::set_handover) applies to the
    /// current closure. Readable from inside the running closure.
    pub fn is_handover(&self) -> bool {
        self.handover.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn link(&self) -> &AtomicLink {
        &self.link
    }

    /// Reads the successor of a queued Tasklet, spinning while its push is
    /// still in flight.
    #[inline]
    pub(crate) fn wait_link(&self) -> Link {
        loop {
            let next = self.link.load(Ordering::Acquire);
            if next != Link::Incomplete {
                return next;
            }
            pause();
        }
    }

    /// Detaches a Tasklet from its queue: returns its successor and makes it
    /// runnable again.
    #[inline]
    pub(crate) fn unlink(&self) -> Link {
        let next = self.wait_link();
        self.link.store(Link::Init, Ordering::Relaxed);
        next
    }
}

impl Default for Tasklet {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Tasklet {
    fn drop(&mut self) {
        match self.link.load(Ordering::Acquire) {
            Link::Unused => {}
            Link::Init => {
                if let Some(handler) = self.handler.get_mut().take() {
                    unsafe { handler(self, false) }
                }
            }
            state => panic!("tasklet {:p} dropped while queued ({:?})", self, state),
        }
    }
}

impl fmt::Debug for Tasklet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tasklet")
            .field("at", &(self as *const Self))
            .field("link", &self.link)
            .field("handover", &self.is_handover())
            .finish()
    }
}
