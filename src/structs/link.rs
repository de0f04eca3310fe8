//! The tagged link word shared by Tasklets and queue tails.

use core::fmt;
use core::ptr::NonNull;

use crate::sync::{AtomicUsize, Ordering};
use crate::tasklet::Tasklet;

const FREE: usize = 0;
const INCOMPLETE: usize = 1;
const LOCKED: usize = 2;
const UNUSED: usize = 3;
const INIT: usize = 4;

// Tag values must never collide with a Tasklet address.
const _: () = assert!(INIT < core::mem::align_of::<Tasklet>());

/// Decoded link word.
///
/// On a queue tail: `Free` is idle, `Locked` is owned but empty and `Node`
/// is the newest entry. On a Tasklet: `Unused`/`Init` outside of queues,
/// `Incomplete` while a push is in flight, otherwise the next entry
/// (`Node`) or the end of the chain (`Free`/`Locked`).
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Free,
    Incomplete,
    Locked,
    Unused,
    Init,
    Node(NonNull<Tasklet>),
}

impl Link {
    #[inline]
    pub fn node(t: &Tasklet) -> Self {
        Link::Node(NonNull::from(t))
    }

    #[inline]
    pub fn is_node(self) -> bool {
        matches!(self, Link::Node(_))
    }

    #[inline]
    fn encode(self) -> usize {
        match self {
            Link::Free => FREE,
            Link::Incomplete => INCOMPLETE,
            Link::Locked => LOCKED,
            Link::Unused => UNUSED,
            Link::Init => INIT,
            Link::Node(t) => t.as_ptr() as usize,
        }
    }

    #[inline]
    fn decode(raw: usize) -> Self {
        match raw {
            FREE => Link::Free,
            INCOMPLETE => Link::Incomplete,
            LOCKED => Link::Locked,
            UNUSED => Link::Unused,
            INIT => Link::Init,
            addr => {
                debug_assert_eq!(addr % core::mem::align_of::<Tasklet>(), 0);
                // Safety: every non-tag value was produced from a `&Tasklet`.
                Link::Node(unsafe { NonNull::new_unchecked(addr as *mut Tasklet) })
            }
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Link::Free => f.write_str("Free"),
            Link::Incomplete => f.write_str("Incomplete"),
            Link::Locked => f.write_str("Locked"),
            Link::Unused => f.write_str("Unused"),
            Link::Init => f.write_str("Init"),
            Link::Node(t) => write!(f, "Node({:p})", t.as_ptr()),
        }
    }
}

/// An atomic cell that only ever holds encoded [`Link`]s.
pub struct AtomicLink(AtomicUsize);

impl AtomicLink {
    pub fn new(link: Link) -> Self {
        Self(AtomicUsize::new(link.encode()))
    }

    #[inline]
    pub fn load(&self, order: Ordering) -> Link {
        Link::decode(self.0.load(order))
    }

    #[inline]
    pub fn store(&self, link: Link, order: Ordering) {
        self.0.store(link.encode(), order)
    }

    #[inline]
    pub fn exchange(&self, link: Link, order: Ordering) -> Link {
        Link::decode(self.0.swap(link.encode(), order))
    }

    #[inline]
    pub fn compare_exchange(
        &self,
        current: Link,
        new: Link,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Link, Link> {
        self.0
            .compare_exchange(current.encode(), new.encode(), success, failure)
            .map(Link::decode)
            .map_err(Link::decode)
    }
}

impl fmt::Debug for AtomicLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(Ordering::Relaxed), f)
    }
}

/// Keeps hot atomics of different owners on separate cache lines.
#[derive(Debug, Default)]
#[repr(align(64))]
pub struct CacheAligned<T>(pub T);

impl<T> core::ops::Deref for CacheAligned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}
