use spin::Once;

use crate::scheduling::place::{ApicId, ThreadId};

/// Hardware services the scheduling layer needs from bring-up code.
pub trait Platform: Send + Sync {
    /// Linear id of the hardware thread executing the caller.
    fn current_thread(&self) -> ThreadId;
    /// Send the wake-up interrupt to a hardware thread.
    fn send_wakeup(&self, apic: ApicId);
    fn print(&self, string: &str);
}

pub static PLATFORM: Once<&'static dyn Platform> = Once::new();

pub fn init(platform: &'static dyn Platform) {
    PLATFORM.call_once(|| platform);
}

pub fn platform() -> &'static dyn Platform {
    PLATFORM
        .get()
        .copied()
        .expect("kasync platform not initialized")
}

pub fn try_platform() -> Option<&'static dyn Platform> {
    PLATFORM.get().copied()
}
