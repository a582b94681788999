//! Retry module: backoff policy and the delayed re-submission scheduler.

mod policy;
mod scheduler;

pub use policy::RetryPolicy;
pub use scheduler::RetryScheduler;
