//! Queue module: fixed-capacity FIFO between submission and the workers.

mod bounded;

pub use bounded::{BoundedQueue, SendPermit};
