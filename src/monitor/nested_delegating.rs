//! Monitor for objects whose requests call back into themselves.
//!
//! The holder keeps the object for the whole request, including the calls
//! it issues; responses to those calls bypass the queue and are sent to the
//! Place that currently holds the object. That Place is tracked in `home`,
//! which changes whenever a new holder takes over.

use core::ptr;

use log::trace;

use crate::monitor::{Deletable, DeletionMonitor, Monitor};
use crate::scheduling::place::{local_place, Mode, Place};
use crate::structs::tasklet_queue::TaskletQueue;
use crate::sync::{AtomicPtr, Ordering};
use crate::tasklet::Tasklet;

pub struct NestedMonitorDelegating {
    deletion: DeletionMonitor,
    /// where responses go; null while idle
    home: AtomicPtr<Place>,
    waitq: TaskletQueue,
}

impl NestedMonitorDelegating {
    pub fn new() -> Self {
        Self {
            deletion: DeletionMonitor::new(),
            home: AtomicPtr::new(ptr::null_mut()),
            waitq: TaskletQueue::new(),
        }
    }

    /// The Place currently holding the object.
    pub fn holder(&self) -> Option<&'static Place> {
        let home = self.home.load(Ordering::Acquire);
        // Safety: only pointers into the static Place table are stored.
        unsafe { home.as_ref() }
    }

    pub fn is_idle(&self) -> bool {
        !self.waitq.is_locked()
    }

    fn run_next(&self, place: &'static Place, msg: &Tasklet) {
        trace!("nested monitor {:p} runs next {:p}", self, msg);
        // Safety: `msg` came out of `waitq`, where `request` queued it under
        // the queueing contract.
        unsafe { place.run_local(msg, Mode::Async) };
    }
}

impl Monitor for NestedMonitorDelegating {
    unsafe fn request<F>(&self, msg: &Tasklet, fun: F) -> bool
    where
        F: FnOnce(&Tasklet) + Send + 'static,
    {
        if !unsafe { self.waitq.push(msg.set(fun)) } {
            return false;
        }
        self.acquire_ref();
        let here = local_place();
        self.home
            .store(here as *const Place as *mut Place, Ordering::Release);
        let first = self
            .waitq
            .pull()
            .expect("nested monitor lost its first request");
        unsafe { here.run_local(first, Mode::MayInline) };
        true
    }

    fn request_done(&self) {
        let here = match self.holder() {
            Some(here) if here.is_local() => here,
            other => panic!("nested monitor {:p} finished on foreign place {:?}", self, other),
        };
        if let Some(next) = self.waitq.pull() {
            return self.run_next(here, next);
        }
        if self.waitq.try_release() {
            // a new holder may already have stored its Place
            let _ = self.home.compare_exchange(
                here as *const Place as *mut Place,
                ptr::null_mut(),
                Ordering::AcqRel,
                Ordering::Relaxed,
            );
            self.release_ref();
        } else {
            let next = self
                .waitq
                .pull()
                .expect("failed release without pending request");
            self.run_next(here, next);
        }
    }

    unsafe fn response<F>(&self, msg: &Tasklet, fun: F)
    where
        F: FnOnce(&Tasklet) + Send + 'static,
    {
        let home = match self.holder() {
            Some(home) => home,
            None => panic!("response to idle nested monitor {:p}", self),
        };
        unsafe { home.run(msg.set(fun), Mode::MayInline) };
    }

    fn response_done(&self) {}
}

impl Deletable for NestedMonitorDelegating {
    fn deletion_monitor(&self) -> &DeletionMonitor {
        &self.deletion
    }
}

impl Default for NestedMonitorDelegating {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::scheduling::place::place;
    use crate::testing::{self, drain, leak, on_core, wait_until, Guarded};
    use alloc::vec::Vec;
    use std::thread;

    #[test]
    fn idle_monitor_runs_the_request_inline() {
        let _guard = testing::setup();
        let obj: &'static Guarded<NestedMonitorDelegating> = leak(Guarded::new(NestedMonitorDelegating::new()));
        let t = Tasklet::new();
        assert!(unsafe { obj.monitor.request(&t, move |_| {
            obj.enter(1);
            assert!(core::ptr::eq(obj.monitor.holder().unwrap(), local_place()));
            obj.leave();
            obj.monitor.request_done();
        }) });
        assert_eq!(obj.trace.events(), [1]);
        assert!(obj.monitor.is_idle());
        assert!(obj.monitor.holder().is_none());
        assert_eq!(obj.monitor.deletion_monitor().ref_count(), 0);
    }

    #[test]
    fn waiting_request_runs_on_the_holder() {
        let _guard = testing::setup();
        let obj: &'static Guarded<NestedMonitorDelegating> = leak(Guarded::new(NestedMonitorDelegating::new()));
        let late: &'static Tasklet = leak(Tasklet::new());
        let t = Tasklet::new();

        unsafe { obj.monitor.request(&t, move |_| {
            obj.enter(1);
            let first = on_core(4, || {
                obj.monitor.request(late, move |_| {
                    obj.enter(2);
                    obj.leave();
                    obj.monitor.request_done();
                })
            });
            assert!(!first);
            obj.leave();
            obj.monitor.request_done();
        }) };
        // the late request was handed to our Place
        assert_eq!(obj.trace.events(), [1]);
        drain();
        assert_eq!(obj.trace.events(), [1, 2]);
        assert_eq!(obj.cores.events(), [0, 0]);
        assert!(obj.monitor.is_idle());
    }

    #[test]
    fn response_comes_back_to_the_holder() {
        let _guard = testing::setup();
        let obj: &'static Guarded<NestedMonitorDelegating> = leak(Guarded::new(NestedMonitorDelegating::new()));
        let reply: &'static Tasklet = leak(Tasklet::new());
        let t = Tasklet::new();

        on_core(5, || {
            unsafe { obj.monitor.request(&t, move |_| {
                obj.enter(1);
                obj.leave();
                // the callee lives on another core and answers from there
                on_core(2, || {
                    obj.monitor.response(reply, move |_| {
                        obj.enter(2);
                        obj.leave();
                        obj.monitor.response_and_request_done();
                    })
                });
            }) };
        });
        assert!(!obj.monitor.is_idle());
        assert!(core::ptr::eq(obj.monitor.holder().unwrap(), place(5)));

        on_core(5, drain);
        assert_eq!(obj.trace.events(), [1, 2]);
        assert_eq!(obj.cores.events(), [5, 5]);
        assert!(obj.monitor.is_idle());
        assert_eq!(obj.monitor.deletion_monitor().ref_count(), 0);
    }

    #[test]
    fn concurrent_requests_are_mutually_exclusive() {
        const PER_CORE: usize = 300;
        let _guard = testing::setup();
        let obj: &'static Guarded<NestedMonitorDelegating> = leak(Guarded::new(NestedMonitorDelegating::new()));
        let cores = [1usize, 2, 3, 4];
        let total = cores.len() * PER_CORE;

        let handles: Vec<_> = cores
            .iter()
            .map(|&core| {
                thread::spawn(move || {
                    testing::become_core(core);
                    let ts: Vec<Tasklet> = (0..PER_CORE).map(|_| Tasklet::new()).collect();
                    for (i, t) in ts.iter().enumerate() {
                        unsafe { obj.monitor.request(t, move |_| {
                            obj.enter(core * PER_CORE + i);
                            obj.leave();
                            obj.monitor.request_done();
                        }) };
                        drain();
                    }
                    wait_until(|| obj.trace.len() == total);
                    ts
                })
            })
            .collect();
        let tasklets: Vec<Vec<Tasklet>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        testing::drain_all();

        assert_eq!(obj.trace.len(), total);
        assert!(obj.monitor.is_idle());
        assert_eq!(obj.monitor.deletion_monitor().ref_count(), 0);
        drop(tasklets);
    }

    #[test]
    fn remote_responses_interleave_with_requests() {
        let _guard = testing::setup();
        let obj: &'static Guarded<NestedMonitorDelegating> = leak(Guarded::new(NestedMonitorDelegating::new()));
        testing::requests_with_remote_responses(obj, 150, |_| {});
        assert!(obj.monitor.is_idle());
        assert!(obj.monitor.holder().is_none());
        assert_eq!(obj.monitor.deletion_monitor().ref_count(), 0);
    }
}
