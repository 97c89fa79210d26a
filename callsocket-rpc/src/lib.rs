//! Callsocket RPC
//!
//! Streaming rpc calls over a single `callsocket` connection. Every call is one
//! of four conventions:
//!
//! * unary: one request, one response.
//! * server streaming: one request, a stream of responses.
//! * client streaming: a stream of requests, one response.
//! * bidi streaming: a stream of requests and a stream of responses, progressing
//!   independently.
//!
//! A call is bound to a [`CallContext`], which carries its deadline and cancellation.
//! Messages for the call travel on a [`CallStream`]. Every call ends with exactly one
//! terminal [`Status`]: `OK`, or a failure code with a message.
//!
//! On the client, a [`client::Channel`] opens calls. On the server, a
//! [`server::Dispatcher`] routes each inbound call by method name to a registered
//! handler, and runs it as its own task. Failures are local to one call: a slow or
//! failing handler never affects its siblings on the same connection.
//!
//! Messages are protocol buffers, tagged with their `prost::Name` so each side can
//! check it received what it expected.

#![warn(missing_docs)]

mod configuration;
mod context;
mod error;
mod frame;
mod registry;
mod router;
mod status;
mod stream;

pub mod client;
pub mod server;

#[cfg(test)]
mod test_support;

pub use configuration::Configuration;
pub use context::CallContext;
pub use error::{Error, Result};
pub use frame::{Convention, Frame, FrameCodec, FrameKind, Payload};
pub use router::CallRouter;
pub use status::{Code, Status};
pub use stream::{CallStream, DirectionState, MessageSink, MessageStream, StreamReceiver, StreamSender};

/// A connection future carrying rpc frames. Spawn it to drive its calls.
pub type RpcConnection<TStream> = callsocket::Connection<TStream, FrameCodec, CallRouter>;
