//! Message-oriented nonblocking stream connections.
//!
//! A `Connection` owns one byte stream. It decodes inbound bytes into messages
//! and hands each one to a `MessageReactor`, and it encodes outbound messages
//! from an mpsc queue onto the stream. The connection is a `Future`: spawn it
//! on your runtime, and it completes when the stream is done.
//!
//! Bring your own `Codec`. `callsocket-prost` provides one for protocol buffers.

#![deny(missing_docs)]

mod connection;
mod encoding;
mod error;
mod message_reactor;
mod socket_listener;

pub use connection::Connection;
pub use encoding::Codec;
pub use encoding::Decoder;
pub use encoding::Encoder;
pub use error::DeserializeError;
pub use message_reactor::MessageReactor;
pub use message_reactor::ReactorStatus;
pub use socket_listener::SocketListener;
pub use socket_listener::SocketResult;
pub use socket_listener::TcpSocketListener;
