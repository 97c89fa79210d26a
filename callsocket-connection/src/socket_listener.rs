use std::{
    net::SocketAddr,
    task::{Context, Poll},
    time::Duration,
};

use socket2::{Domain, Socket, TcpKeepalive, Type};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
};

/// Something that accepts streams, polled from a server future.
pub trait SocketListener {
    /// An accepted stream.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Poll for the next accepted stream.
    fn poll_accept(&mut self, context: &mut Context<'_>) -> Poll<SocketResult<Self::Stream>>;
}

/// What a listener produced.
#[derive(Debug)]
pub enum SocketResult<T> {
    /// A newly accepted stream.
    Stream(T),
    /// The listener failed. It will not accept anything else.
    Disconnect,
}

/// A tcp listener, configured for many small messages.
///
/// Accepted streams have nodelay set; the listening socket carries the keepalive
/// settings and reuses its address.
#[derive(Debug)]
pub struct TcpSocketListener {
    listener: TcpListener,
}

impl TcpSocketListener {
    /// Bind and listen on `address`.
    ///
    /// This binds synchronously, and registers with the tokio runtime it is called from.
    pub fn listen(
        address: SocketAddr,
        backlog: u32,
        keepalive: Option<Duration>,
    ) -> std::io::Result<Self> {
        let socket = Socket::new(Domain::for_address(address), Type::STREAM, None)?;
        let keepalive = match keepalive {
            Some(time) => TcpKeepalive::new().with_time(time),
            None => TcpKeepalive::new(),
        };
        socket.set_nonblocking(true)?;
        socket.set_tcp_nodelay(true)?;
        socket.set_tcp_keepalive(&keepalive)?;
        socket.set_reuse_address(true)?;
        socket.bind(&address.into())?;
        socket.listen(i32::try_from(backlog).unwrap_or(i32::MAX))?;

        let listener = TcpListener::from_std(socket.into())?;
        log::info!("listening on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    /// The bound address. Useful after listening on port 0.
    pub fn local_address(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl SocketListener for TcpSocketListener {
    type Stream = TcpStream;

    fn poll_accept(&mut self, context: &mut Context<'_>) -> Poll<SocketResult<TcpStream>> {
        self.listener.poll_accept(context).map(|accepted| match accepted {
            Ok((stream, address)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    log::warn!("{address} could not set nodelay: {e:?}");
                }
                log::debug!("{address} accepted");
                SocketResult::Stream(stream)
            }
            Err(e) => {
                log::error!("accept failed: {e:?}");
                SocketResult::Disconnect
            }
        })
    }
}
