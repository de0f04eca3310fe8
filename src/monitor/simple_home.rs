//! Home-pinned monitor without any queue: requests and responses are just
//! sent to the home Place. Exclusion comes from the home running one
//! tasklet at a time, so this only suits objects with a single writer.

use spin::Once;

use crate::monitor::{Deletable, DeletionMonitor, Monitor};
use crate::scheduling::place::{Mode, Place};
use crate::tasklet::Tasklet;

pub struct SimpleMonitorHome {
    home: Once<&'static Place>,
    deletion: DeletionMonitor,
}

impl SimpleMonitorHome {
    pub fn new() -> Self {
        Self {
            home: Once::new(),
            deletion: DeletionMonitor::new(),
        }
    }

    pub fn with_home(home: &'static Place) -> Self {
        let monitor = Self::new();
        monitor.set_home(home);
        monitor
    }

    pub fn set_home(&self, home: &'static Place) {
        assert!(!self.home.is_completed(), "monitor {:p} already has a home", self);
        self.home.call_once(|| home);
    }

    pub fn home(&self) -> Option<&'static Place> {
        self.home.get().copied()
    }
}

impl Monitor for SimpleMonitorHome {
    unsafe fn request<F>(&self, msg: &Tasklet, fun: F) -> bool
    where
        F: FnOnce(&Tasklet) + Send + 'static,
    {
        let home = match self.home() {
            Some(home) => home,
            None => panic!("simple monitor {:p} used without home", self),
        };
        self.acquire_ref();
        unsafe { home.run(msg.set(fun), Mode::MayInline) };
        true
    }

    fn request_done(&self) {
        self.release_ref();
    }

    unsafe fn response<F>(&self, msg: &Tasklet, fun: F)
    where
        F: FnOnce(&Tasklet) + Send + 'static,
    {
        unsafe { self.request(msg, fun) };
    }

    fn response_done(&self) {
        self.request_done();
    }
}

impl Deletable for SimpleMonitorHome {
    fn deletion_monitor(&self) -> &DeletionMonitor {
        &self.deletion
    }
}

impl Default for SimpleMonitorHome {
    fn default() -> Self {
        Self::new()
    }
}
