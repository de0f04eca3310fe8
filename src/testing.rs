//! Test harness: Places driven by std threads.
//!
//! The platform's notion of "current hardware thread" is a thread-local, so
//! any test thread can act as any core. Tests that touch Places hold the
//! guard returned by [`setup`], which serialises them and leaves every
//! Place idle.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, Once};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use lazy_static::lazy_static;

use crate::config::{BootConfig, MAX_THREADS};
use crate::monitor::Monitor;
use crate::platform::{platform, Platform};
use crate::scheduling::place::{local_place, place, ApicId, ThreadId};
use crate::tasklet::Tasklet;

/// Places initialised for tests.
pub const CORES: usize = 8;

thread_local! {
    static CURRENT: Cell<ThreadId> = const { Cell::new(0) };
}

pub struct TestPlatform {
    wakeups: Vec<AtomicUsize>,
    output: spin::Mutex<String>,
}

impl Platform for TestPlatform {
    fn current_thread(&self) -> ThreadId {
        CURRENT.with(|current| current.get())
    }

    fn send_wakeup(&self, apic: ApicId) {
        self.wakeups[apic as usize].fetch_add(1, Ordering::SeqCst);
    }

    fn print(&self, string: &str) {
        self.output.lock().push_str(string);
    }
}

lazy_static! {
    static ref PLATFORM: TestPlatform = TestPlatform {
        wakeups: (0..MAX_THREADS).map(|_| AtomicUsize::new(0)).collect(),
        output: spin::Mutex::new(String::new()),
    };
}

static SERIAL: Mutex<()> = Mutex::new(());
static INIT: Once = Once::new();

pub fn setup() -> MutexGuard<'static, ()> {
    // a failed test must not take the others down with it
    let guard = SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    INIT.call_once(|| crate::init(&*PLATFORM, &BootConfig::linear(CORES)));
    become_core(0);
    drain_all();
    guard
}

pub fn become_core(id: ThreadId) {
    assert!(id < CORES, "core {} is not part of the test machine", id);
    CURRENT.with(|current| current.set(id));
}

/// Runs `f` while pretending to be core `id`.
pub fn on_core<R>(id: ThreadId, f: impl FnOnce() -> R) -> R {
    assert!(id < CORES, "core {} is not part of the test machine", id);
    let previous = CURRENT.with(|current| current.replace(id));
    let result = f();
    CURRENT.with(|current| current.set(previous));
    result
}

/// One interrupt's worth of work on the current core.
pub fn drain() {
    let place = local_place();
    place.enter_kernel();
    place.process_tasks();
}

pub fn drain_all() {
    for id in 0..CORES {
        on_core(id, drain);
    }
}

/// Drains the current core until `done` holds.
pub fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(30);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for tasks");
        drain();
        thread::yield_now();
    }
}

pub fn wakeups(apic: ApicId) -> usize {
    PLATFORM.wakeups[apic as usize].load(Ordering::SeqCst)
}

pub fn output() -> String {
    PLATFORM.output.lock().clone()
}

pub fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

/// Worker threads that keep running the dispatch loop of their core.
pub struct Cores {
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl Cores {
    pub fn start(ids: &[ThreadId]) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let workers = ids
            .iter()
            .map(|&id| {
                let stop = stop.clone();
                thread::spawn(move || {
                    become_core(id);
                    while !stop.load(Ordering::SeqCst) {
                        drain();
                        thread::yield_now();
                    }
                    drain();
                })
            })
            .collect();
        Self { stop, workers }
    }
}

impl Drop for Cores {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        for worker in self.workers.drain(..) {
            let joined = worker.join();
            if !thread::panicking() {
                joined.expect("core worker panicked");
            }
        }
    }
}

#[derive(Default)]
pub struct Trace(spin::Mutex<Vec<usize>>);

impl Trace {
    pub fn record(&self, event: usize) {
        self.0.lock().push(event);
    }

    pub fn events(&self) -> Vec<usize> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

/// A kernel object stand-in that detects overlapping execution.
pub struct Guarded<M> {
    pub monitor: M,
    inside: AtomicBool,
    /// events in execution order
    pub trace: Trace,
    /// core that ran each event
    pub cores: Trace,
}

impl<M> Guarded<M> {
    pub fn new(monitor: M) -> Self {
        Self {
            monitor,
            inside: AtomicBool::new(false),
            trace: Trace::default(),
            cores: Trace::default(),
        }
    }

    pub fn enter(&self, event: usize) {
        assert!(
            !self.inside.swap(true, Ordering::SeqCst),
            "two tasklets inside the monitor at event {}",
            event
        );
        self.trace.record(event);
        self.cores.record(platform().current_thread());
    }

    pub fn leave(&self) {
        self.inside.store(false, Ordering::SeqCst);
    }
}

/// The Tasklets of one request that issues a call.
#[derive(Default)]
pub struct Call {
    pub request: Tasklet,
    pub call: Tasklet,
    pub response: Tasklet,
}

/// Cores 1 to 4 send requests to `obj`. Each request issues a call that
/// core 5 or 6 answers with a response into `obj` while further requests
/// keep arriving. `hold` runs at the end of every request, after the call
/// went out. Request `e` records event `e`, its response `e + total`.
///
/// Checks that every event ran once and every response followed its
/// request. Core 7 keeps running so that it can serve as a home.
pub fn requests_with_remote_responses<M>(obj: &'static Guarded<M>, per_core: usize, hold: fn(&M))
where
    M: Monitor + Sync + 'static,
{
    const REQUESTERS: [ThreadId; 4] = [1, 2, 3, 4];
    let total = REQUESTERS.len() * per_core;
    let callees = Cores::start(&[5, 6, 7]);

    let requesters: Vec<_> = REQUESTERS
        .iter()
        .map(|&core| {
            thread::spawn(move || {
                become_core(core);
                for i in 0..per_core {
                    let event = (core - 1) * per_core + i;
                    let call: &'static Call = leak(Call::default());
                    let request = move |_: &Tasklet| {
                        obj.enter(event);
                        obj.leave();
                        let answer = move |_: &Tasklet| {
                            let response = move |_: &Tasklet| {
                                obj.enter(event + total);
                                obj.leave();
                                obj.monitor.response_and_request_done();
                            };
                            // Safety: `call` is leaked.
                            unsafe { obj.monitor.response(&call.response, response) };
                        };
                        call.call.set(answer);
                        // Safety: `call` is leaked.
                        unsafe { place(5 + event % 2).push_shared(&call.call) };
                        hold(&obj.monitor);
                    };
                    // Safety: `call` is leaked.
                    unsafe { obj.monitor.request(&call.request, request) };
                    drain();
                }
                wait_until(|| obj.trace.len() == 2 * total);
            })
        })
        .collect();
    for requester in requesters {
        requester.join().expect("requester panicked");
    }
    drop(callees);
    drain_all();

    let events = obj.trace.events();
    assert_eq!(events.len(), 2 * total);
    let mut position = alloc::vec![usize::MAX; 2 * total];
    for (at, &event) in events.iter().enumerate() {
        assert_eq!(position[event], usize::MAX, "event {} ran twice", event);
        position[event] = at;
    }
    for event in 0..total {
        assert!(
            position[event] < position[event + total],
            "response {} overtook its request",
            event
        );
    }
}
