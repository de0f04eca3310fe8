pub mod delegation_queue;
pub mod homed_queues;
pub mod link;
pub mod tasklet_queue;

pub use delegation_queue::DelegationQueue;
pub use homed_queues::{PrivateTaskletQueue, SharedTaskletQueue};
pub use tasklet_queue::TaskletQueue;
