//! Tasklets, per-core Places and lock-free monitors for a many-core kernel.
//!
//! Every kernel object embeds one of the [`monitor`] implementations and
//! hands it closures wrapped in [`Tasklet`]s. The monitor decides whether the
//! caller runs the closure or whether the current owner picks it up later;
//! Places run the resulting work on each hardware thread.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod error;
pub mod klog;
pub mod monitor;
pub mod platform;
pub mod result;
pub mod scheduling;
pub mod structs;
pub mod tasklet;

mod sync;

#[cfg(all(test, not(loom)))]
mod testing;

pub use config::{BootConfig, HwThread};
pub use error::KernelError;
pub use monitor::{
    Deletable, DeletionMonitor, Monitor, MonitorDelegating, MonitorHomed, MonitorStateless,
    NestedMonitorDelegating, NestedMonitorDummy, NestedMonitorHome, SimpleMonitorHome,
};
pub use result::{IResult, KFuture, MSink, VoidResult};
pub use scheduling::mutex_delegating::MutexDelegating;
pub use scheduling::place::{init_place, local_place, place, ApicId, Mode, Place, ThreadId};
pub use scheduling::sync_task::{synchronous_at, SynchronousTask};
pub use tasklet::Tasklet;

use platform::Platform;

/// Boot-time setup: installs the platform and the kernel logger, then
/// initialises the Place of every configured hardware thread.
pub fn init(platform: &'static dyn Platform, config: &BootConfig) {
    platform::init(platform);
    klog::init(config.log_level);
    for hw in &config.threads {
        init_place(hw.thread_id, hw.apic_id);
    }
    log::info!("kasync ready on {} hardware threads", config.threads.len());
}
