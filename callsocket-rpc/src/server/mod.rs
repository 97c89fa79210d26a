//! Serve rpc calls: register handlers on a [`Dispatcher`], then serve connections
//! with a [`SocketRpcServer`] or [`serve_stream`].

mod acceptor;
mod dispatcher;
mod handlers;
mod socket_server;

pub(crate) use acceptor::CallAcceptor;
pub use dispatcher::{Dispatcher, Handler, HandlerFuture};
pub use socket_server::{serve_stream, SocketRpcServer};
