//! Make rpc calls: [`connect`] a [`Channel`], then call methods with one of the
//! four call drivers.

mod calls;
mod channel;

pub use calls::{BidiStreamingCall, ClientStreamingCall};
pub use channel::{connect, Channel};
