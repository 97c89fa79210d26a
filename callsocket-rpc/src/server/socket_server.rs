use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use callsocket::{Connection, SocketListener, SocketResult};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};

use super::{CallAcceptor, Dispatcher};
use crate::{registry::CallRegistry, CallRouter, Configuration, FrameCodec, RpcConnection};

/// A `SocketRpcServer` is a server future. It listens on a socket and spawns a
/// connection task for each accepted stream. Each connection routes its calls
/// through the shared `Dispatcher`.
///
/// The future completes if the listener fails.
pub struct SocketRpcServer<TListener>
where
    TListener: SocketListener,
{
    listener: TListener,
    dispatcher: Arc<Dispatcher>,
    configuration: Configuration,
}

impl<TListener> SocketRpcServer<TListener>
where
    TListener: SocketListener,
{
    /// Construct a new `SocketRpcServer` with a listener.
    pub fn new(
        listener: TListener,
        dispatcher: Arc<Dispatcher>,
        configuration: Configuration,
    ) -> Self {
        Self {
            listener,
            dispatcher,
            configuration,
        }
    }
}

impl<TListener> Unpin for SocketRpcServer<TListener> where TListener: SocketListener {}

impl<TListener> Future for SocketRpcServer<TListener>
where
    TListener: SocketListener,
{
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            break match self.listener.poll_accept(context) {
                Poll::Ready(SocketResult::Stream(stream)) => {
                    let connection =
                        serve_stream(stream, self.dispatcher.clone(), &self.configuration);
                    tokio::spawn(connection);
                    continue;
                }
                Poll::Ready(SocketResult::Disconnect) => {
                    log::error!("listener disconnected - stopping server");
                    Poll::Ready(())
                }
                Poll::Pending => Poll::Pending,
            };
        }
    }
}

/// Serve calls on one accepted stream. Spawn the returned connection to run it.
///
/// This works with any stream, so you can serve over something other than tcp.
pub fn serve_stream<TStream>(
    stream: TStream,
    dispatcher: Arc<Dispatcher>,
    configuration: &Configuration,
) -> RpcConnection<TStream>
where
    TStream: AsyncRead + AsyncWrite + Unpin,
{
    let (outbound, outbound_messages) =
        mpsc::channel(configuration.max_queued_outbound_messages.max(1));
    let calls = CallRegistry::default();
    let router = CallRouter::server(
        calls.clone(),
        CallAcceptor::new(dispatcher, outbound, calls),
    );
    Connection::new(
        stream,
        FrameCodec::default(),
        configuration.max_buffer_length,
        configuration.buffer_allocation_increment,
        configuration.max_queued_outbound_messages,
        outbound_messages,
        router,
    )
}
