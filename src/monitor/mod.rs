//! Monitors give a kernel object the illusion of single-threaded execution.
//!
//! Callers never touch an object's state directly. They wrap the operation
//! in a [`Tasklet`] and hand it to the object's monitor, which either lets
//! the caller run it right away or queues it for whoever currently holds the
//! object. The holder signals the end of an operation with
//! [`Monitor::request_done`] or [`Monitor::response_done`], which starts the
//! next queued operation or releases the object.
//!
//! Each object picks a variant statically:
//!
//! | variant | runs on | order |
//! |---|---|---|
//! | [`MonitorStateless`] | local Place | none |
//! | [`MonitorDelegating`] | wherever dequeued | pseudo-FIFO |
//! | [`MonitorHomed`] | fixed home | FIFO |
//! | [`NestedMonitorDelegating`] | current holder | pseudo-FIFO |
//! | [`NestedMonitorHome`] | fixed home | FIFO |
//! | [`NestedMonitorDummy`] | caller, inline | none |
//! | [`SimpleMonitorHome`] | fixed home, unqueued | FIFO |

use crate::tasklet::Tasklet;

pub mod delegating;
pub mod deletion;
pub mod homed;
pub mod nested_delegating;
pub mod nested_dummy;
pub mod nested_home;
pub mod simple_home;
pub mod stateless;

pub use delegating::MonitorDelegating;
pub use deletion::DeletionMonitor;
pub use homed::MonitorHomed;
pub use nested_delegating::NestedMonitorDelegating;
pub use nested_dummy::NestedMonitorDummy;
pub use nested_home::NestedMonitorHome;
pub use simple_home::SimpleMonitorHome;
pub use stateless::MonitorStateless;

/// Request/response mutual exclusion for one kernel object.
///
/// The Tasklets handed to a monitor are queued under the
/// [queueing contract](crate::tasklet), which is why `request` and
/// `response` are `unsafe`.
pub trait Monitor {
    /// Binds `fun` to `msg` and admits it. Returns `true` if this call found
    /// the object idle and started execution; otherwise the current holder
    /// runs it later.
    ///
    /// # Safety
    /// `msg` is queued under the [queueing contract](crate::tasklet).
    unsafe fn request<F>(&self, msg: &Tasklet, fun: F) -> bool
    where
        F: FnOnce(&Tasklet) + Send + 'static;

    /// Ends the current request and starts the next admitted one.
    fn request_done(&self);

    /// Delivers the continuation of a call the object issued itself. Runs
    /// serialised with the object's requests.
    ///
    /// # Safety
    /// `msg` is queued under the [queueing contract](crate::tasklet).
    unsafe fn response<F>(&self, msg: &Tasklet, fun: F)
    where
        F: FnOnce(&Tasklet) + Send + 'static;

    fn response_done(&self);

    /// The response finished the request that issued the call.
    fn response_and_request_done(&self) {
        self.request_done();
        self.response_done();
    }
}

/// Monitors that track references and defer the object's deletion.
pub trait Deletable {
    fn deletion_monitor(&self) -> &DeletionMonitor;

    fn acquire_ref(&self) {
        self.deletion_monitor().acquire_ref();
    }

    fn release_ref(&self) {
        self.deletion_monitor().release_ref();
    }

    /// See [`DeletionMonitor::do_delete`].
    ///
    /// # Safety
    /// `msg` is queued under the [queueing contract](crate::tasklet).
    unsafe fn do_delete<F>(&self, msg: &Tasklet, fun: F)
    where
        F: FnOnce(&Tasklet) + Send + 'static,
    {
        unsafe { self.deletion_monitor().do_delete(msg, fun) }
    }
}
