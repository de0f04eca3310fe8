//! Stand-in for a nested monitor on objects that are known to be
//! uncontended: everything runs inline and only the references are tracked.

use crate::monitor::{Deletable, DeletionMonitor, Monitor};
use crate::scheduling::place::{local_place, Mode};
use crate::tasklet::Tasklet;

#[derive(Default)]
pub struct NestedMonitorDummy {
    deletion: DeletionMonitor,
}

impl NestedMonitorDummy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Monitor for NestedMonitorDummy {
    unsafe fn request<F>(&self, msg: &Tasklet, fun: F) -> bool
    where
        F: FnOnce(&Tasklet) + Send + 'static,
    {
        self.acquire_ref();
        unsafe { local_place().run_local(msg.set(fun), Mode::MayInline) };
        true
    }

    fn request_done(&self) {
        self.release_ref();
    }

    unsafe fn response<F>(&self, msg: &Tasklet, fun: F)
    where
        F: FnOnce(&Tasklet) + Send + 'static,
    {
        self.acquire_ref();
        unsafe { local_place().run_local(msg.set(fun), Mode::MayInline) };
    }

    fn response_done(&self) {
        self.release_ref();
    }
}

impl Deletable for NestedMonitorDummy {
    fn deletion_monitor(&self) -> &DeletionMonitor {
        &self.deletion
    }
}
