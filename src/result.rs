//! Typed result delivery for asynchronous kernel calls.
//!
//! Every asynchronous call takes a `&dyn IResult<T>` and a Tasklet and
//! answers exactly once through [`IResult::response`], usually from inside
//! the callee's monitor. The receiver typically forwards the answer into its
//! own monitor with [`Monitor::response`](crate::Monitor::response).
//!
//! The Tasklet travels with the answer under the
//! [queueing contract](crate::tasklet), so delivering one is `unsafe`.

use spin::Mutex;

use crate::error::KernelError;
use crate::scheduling::place::local_place;
use crate::sync::poll_pause;
use crate::tasklet::Tasklet;

pub trait IResult<T> {
    /// # Safety
    /// `t` is handed over under the [queueing contract](crate::tasklet).
    unsafe fn response(&self, t: &Tasklet, result: Result<T, KernelError>);

    /// # Safety
    /// As for [`response`](Self::response).
    unsafe fn error(&self, t: &Tasklet, err: KernelError) {
        unsafe { self.response(t, Err(err)) };
    }
}

/// Shorthand for calls that only report success or failure.
pub trait VoidResult: IResult<()> {
    /// # Safety
    /// As for [`IResult::response`].
    unsafe fn success(&self, t: &Tasklet) {
        unsafe { self.response(t, Ok(())) };
    }
}

impl<R: IResult<()> + ?Sized> VoidResult for R {}

/// Routes responses to a method of `obj`.
///
/// ```ignore
/// struct Frame { sink: ..., }
/// impl Frame {
///     unsafe fn allocated(&self, t: &Tasklet, r: Result<usize, KernelError>) { ... }
/// }
/// let sink = MSink::new(&frame, Frame::allocated);
/// allocator.alloc(&t, &sink);
/// ```
pub struct MSink<'a, O, T> {
    obj: &'a O,
    method: unsafe fn(&O, &Tasklet, Result<T, KernelError>),
}

impl<'a, O, T> MSink<'a, O, T> {
    pub fn new(obj: &'a O, method: unsafe fn(&O, &Tasklet, Result<T, KernelError>)) -> Self {
        Self { obj, method }
    }
}

impl<O, T> IResult<T> for MSink<'_, O, T> {
    unsafe fn response(&self, t: &Tasklet, result: Result<T, KernelError>) {
        unsafe { (self.method)(self.obj, t, result) }
    }
}

/// Blocking receiver for boot code.
///
/// [`wait`](Self::wait) keeps running the local Place until the answer
/// arrives. Only valid on the boot thread before the system runs
/// asynchronously: inside a tasklet it re-enters the dispatch loop.
pub struct KFuture<T> {
    value: Mutex<Option<Result<T, KernelError>>>,
}

impl<T> KFuture<T> {
    pub const fn new() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }

    pub fn is_set(&self) -> bool {
        self.value.lock().is_some()
    }

    pub fn reset(&self) {
        *self.value.lock() = None;
    }

    /// Takes the answer, waiting for it first.
    pub fn wait(&self) -> Result<T, KernelError> {
        loop {
            if let Some(value) = self.value.lock().take() {
                return value;
            }
            let place = local_place();
            place.enter_kernel();
            place.process_tasks();
            poll_pause();
        }
    }
}

impl<T> IResult<T> for KFuture<T> {
    unsafe fn response(&self, _t: &Tasklet, result: Result<T, KernelError>) {
        *self.value.lock() = Some(result);
    }
}

impl<T> Default for KFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::monitor::{Monitor, MonitorDelegating};
    use crate::scheduling::place::place;
    use crate::testing::{self, leak, on_core};
    use core::cell::Cell;

    struct Counter {
        total: Cell<u64>,
        failures: Cell<u32>,
    }

    impl Counter {
        fn added(&self, _t: &Tasklet, r: Result<u64, KernelError>) {
            match r {
                Ok(v) => self.total.set(self.total.get() + v),
                Err(_) => self.failures.set(self.failures.get() + 1),
            }
        }
    }

    #[test]
    fn msink_forwards_to_the_method() {
        let counter = Counter {
            total: Cell::new(0),
            failures: Cell::new(0),
        };
        let sink = MSink::new(&counter, Counter::added);
        let t = Tasklet::new();
        unsafe { sink.response(&t, Ok(4)) };
        unsafe { sink.response(&t, Ok(6)) };
        unsafe { sink.error(&t, KernelError::InsufficientResources) };
        assert_eq!(counter.total.get(), 10);
        assert_eq!(counter.failures.get(), 1);
    }

    #[test]
    fn void_results_report_success() {
        let future = KFuture::<()>::new();
        let t = Tasklet::new();
        unsafe { future.success(&t) };
        assert!(future.is_set());
        assert_eq!(future.wait(), Ok(()));
        assert!(!future.is_set());
    }

    #[test]
    fn future_waits_for_a_remote_answer() {
        let _guard = testing::setup();
        let future: &'static KFuture<u64> = leak(KFuture::new());
        let request: &'static Tasklet = leak(Tasklet::new());
        let answer: &'static Tasklet = leak(Tasklet::new());

        // the callee answers from core 2, the result task comes back to us
        request.set(move |_| {
            answer.set(move |t| unsafe { future.response(t, Ok(42)) });
            unsafe { place(0).push_shared(answer) };
        });
        unsafe { place(2).push_shared(request) };
        on_core(2, testing::drain);

        assert!(!future.is_set());
        assert_eq!(future.wait(), Ok(42));
        future.reset();
        assert!(!future.is_set());
    }

    #[test]
    fn future_collects_errors_from_monitored_objects() {
        let _guard = testing::setup();
        let monitor: &'static MonitorDelegating = leak(MonitorDelegating::new());
        let future: &'static KFuture<u64> = leak(KFuture::new());
        let t = Tasklet::new();
        unsafe { monitor.request(&t, move |t| {
            future.error(t, KernelError::InvalidCapability);
            monitor.request_done();
        }) };
        assert_eq!(future.wait(), Err(KernelError::InvalidCapability));
        assert!(monitor.is_idle());
    }
}
