// Order execution module
pub mod executor;

pub use executor::{ExecutionError, ExecutionOutcome, OrderExecutor};
