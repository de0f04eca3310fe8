use alloc::vec::Vec;
use log::LevelFilter;

use crate::scheduling::place::{ApicId, ThreadId};

/// Every Tasklet occupies exactly one cache line.
pub const CACHELINE_SIZE: usize = 64;

/// Size of the fixed Place table.
pub const MAX_THREADS: usize = 256;

/// Critical sections a `MutexDelegating` owner runs before handing over.
pub const MUTEX_HANDOVER_LIMIT: usize = 100;

/// A hardware thread discovered during bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwThread {
    pub thread_id: ThreadId,
    pub apic_id: ApicId,
}

#[derive(Debug, Clone)]
pub struct BootConfig {
    pub threads: Vec<HwThread>,
    pub log_level: LevelFilter,
}

impl BootConfig {
    /// Thread ids `0..count`, with APIC ids equal to the thread id.
    pub fn linear(count: usize) -> Self {
        assert!(count <= MAX_THREADS, "{} threads exceed the Place table", count);
        Self {
            threads: (0..count)
                .map(|id| HwThread {
                    thread_id: id,
                    apic_id: id as ApicId,
                })
                .collect(),
            ..Self::default()
        }
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            threads: Vec::new(),
            log_level: LevelFilter::Info,
        }
    }
}
