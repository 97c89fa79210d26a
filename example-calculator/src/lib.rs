//! A calculator served over callsocket rpc, one method per calling convention.

mod client;
pub mod messages;
mod service;

pub use client::CalculatorClient;
pub use service::dispatcher;

/// Method names, as registered with the dispatcher.
pub mod method {
    pub const SUM: &str = "Sum";
    pub const PRIME_NUMBER_DECOMPOSITION: &str = "PrimeNumberDecomposition";
    pub const COMPUTE_AVERAGE: &str = "ComputeAverage";
    pub const FIND_MAXIMUM: &str = "FindMaximum";
    pub const SQUARE_ROOT: &str = "SquareRoot";
}
