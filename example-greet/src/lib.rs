//! A greeting service served over callsocket rpc.

mod client;
pub mod messages;
mod service;

pub use client::GreetClient;
pub use service::dispatcher;

/// Method names, as registered with the dispatcher.
pub mod method {
    pub const GREET: &str = "Greet";
    pub const GREET_MANY_TIMES: &str = "GreetManyTimes";
    pub const LONG_GREET: &str = "LongGreet";
    pub const GREET_EVERYONE: &str = "GreetEveryone";
    pub const GREET_WITH_DEADLINE: &str = "GreetWithDeadline";
}
