use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use callsocket::Connection;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    sync::mpsc,
};

use crate::{
    registry::{CallRegistry, CallRoute},
    stream::Side,
    CallContext, CallRouter, CallStream, Configuration, Convention, Error, Frame, FrameCodec,
    RpcConnection, Status,
};

/// A client for making calls to a callsocket rpc server.
///
/// Calls on one channel share its connection, and progress independently: every
/// call has its own stream, context and terminal status. Channels are cheap to clone.
#[derive(Debug, Clone)]
pub struct Channel {
    outbound: mpsc::Sender<Frame>,
    calls: CallRegistry,
    next_call_id: Arc<AtomicU64>,
    is_alive: Arc<AtomicBool>,
}

impl Channel {
    /// Make a channel over any stream. Spawn the returned connection to drive it.
    pub fn over_stream<TStream>(
        stream: TStream,
        configuration: &Configuration,
    ) -> (Self, RpcConnection<TStream>)
    where
        TStream: AsyncRead + AsyncWrite + Unpin,
    {
        let (outbound, outbound_messages) =
            mpsc::channel(configuration.max_queued_outbound_messages.max(1));
        let calls = CallRegistry::default();
        let is_alive = Arc::new(AtomicBool::new(true));
        let channel = Self {
            outbound,
            calls: calls.clone(),
            next_call_id: Arc::new(AtomicU64::new(1)),
            is_alive: is_alive.clone(),
        };
        let connection = Connection::new(
            stream,
            FrameCodec::default(),
            configuration.max_buffer_length,
            configuration.buffer_allocation_increment,
            configuration.max_queued_outbound_messages,
            outbound_messages,
            CallRouter::client(calls, is_alive),
        );
        (channel, connection)
    }

    /// False once the connection has closed. Calls on a closed channel fail with `INTERNAL`.
    pub fn is_alive(&self) -> bool {
        self.is_alive.load(Ordering::Relaxed)
    }

    /// Open a call to `method`, bound to `context`.
    ///
    /// The returned stream is exclusively owned by the caller. Dropping it before the
    /// call completes cancels the call at the server.
    pub async fn call(
        &self,
        method: &str,
        context: &CallContext,
        convention: Convention,
    ) -> Result<CallStream, Status> {
        if !self.is_alive() {
            // early-out if the connection is closed
            return Err(Error::ConnectionIsClosed.into());
        }
        if let Some(cause) = context.err() {
            return Err(cause);
        }

        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let (inbound_sender, inbound) = mpsc::unbounded_channel();
        let terminal = Arc::default();
        self.calls.register(
            call_id,
            CallRoute {
                inbound: inbound_sender,
                context: context.clone(),
                terminal: Arc::clone(&terminal),
            },
        )?;
        // From here on, dropping the stream deregisters the call.
        let stream = CallStream::new(
            Side::Client,
            call_id,
            convention,
            context.clone(),
            self.outbound.clone(),
            self.calls.clone(),
            inbound,
            terminal,
        );

        log::debug!("{call_id} opening {convention} call to {method}");
        let open = Frame::open(call_id, method, convention, context.remaining());
        tokio::select! {
            biased;
            cause = context.done() => Err(cause),
            sent = self.outbound.send(open) => match sent {
                Ok(()) => Ok(stream),
                Err(_closed) => Err(Error::ConnectionIsClosed.into()),
            },
        }
    }
}

/// Connect a new rpc channel to a server.
///
/// Spawn the returned connection; the channel works for as long as it runs.
pub async fn connect(
    address: SocketAddr,
    configuration: &Configuration,
) -> crate::Result<(Channel, RpcConnection<TcpStream>)> {
    log::trace!("new channel {address}, {configuration:?}");

    let stream = TcpStream::connect(address).await?;
    stream.set_nodelay(true)?;
    Ok(Channel::over_stream(stream, configuration))
}
