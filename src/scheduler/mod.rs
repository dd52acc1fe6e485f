//! Request scheduling for the prediction core.
//!
//! Bounds concurrent generation work and the line of requests waiting for it.

mod pool;

pub use pool::{ExecutionPermit, ExecutionPool, PoolConfig, PoolError};
