//! Monitor for objects without mutable state: every operation is simply
//! posted to the caller's Place.

use crate::monitor::Monitor;
use crate::scheduling::place::local_place;
use crate::tasklet::Tasklet;

#[derive(Debug, Default)]
pub struct MonitorStateless;

impl MonitorStateless {
    pub const fn new() -> Self {
        Self
    }

    /// # Safety
    /// `msg` is queued under the [queueing contract](crate::tasklet).
    pub unsafe fn post<F>(&self, msg: &Tasklet, fun: F)
    where
        F: FnOnce(&Tasklet) + Send + 'static,
    {
        unsafe { local_place().push_shared(msg.set(fun)) };
    }
}

impl Monitor for MonitorStateless {
    unsafe fn request<F>(&self, msg: &Tasklet, fun: F) -> bool
    where
        F: FnOnce(&Tasklet) + Send + 'static,
    {
        unsafe { self.post(msg, fun) };
        true
    }

    fn request_done(&self) {}

    unsafe fn response<F>(&self, msg: &Tasklet, fun: F)
    where
        F: FnOnce(&Tasklet) + Send + 'static,
    {
        unsafe { self.post(msg, fun) };
    }

    fn response_done(&self) {}
}
