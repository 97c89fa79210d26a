use std::{
    collections::VecDeque,
    future::Future,
    io::IoSlice,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Buf;
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    sync::mpsc,
};

use crate::{Codec, Decoder, DeserializeError, Encoder, MessageReactor, ReactorStatus};

/// Reads yielded per poll before the connection gives the runtime a turn.
const MAX_READS_PER_POLL: usize = 16;

/// Buffers offered per vectored write. Platforms allow anywhere from 16 to 1024.
const UIO_MAXIOV: usize = 128;

/// A bidirectional, message-oriented stream.
///
/// Inbound bytes are decoded and delivered to the `MessageReactor` in arrival order.
/// Outbound messages are taken from the mpsc queue, encoded, and written in queue order.
///
/// The connection completes when the remote closes the stream, when a read or write
/// fails, when the reactor asks to disconnect, or when every outbound sender is dropped
/// and the queued messages have been written.
pub struct Connection<TStream, TCodec, TReactor>
where
    TStream: AsyncRead + AsyncWrite + Unpin,
    TCodec: Codec,
    TReactor: MessageReactor<Inbound = <TCodec as Decoder>::Message>,
{
    stream: TStream,
    codec: TCodec,
    reactor: TReactor,
    outbound_messages: mpsc::Receiver<<TCodec as Encoder>::Message>,
    outbound_messages_buffer: Vec<<TCodec as Encoder>::Message>,
    outbound_closed: bool,
    send_buffer: VecDeque<<TCodec as Encoder>::Serialized>,
    receive_buffer: Vec<u8>,
    receive_buffer_start_offset: usize,
    receive_buffer_slice_end: usize,
    max_buffer_length: usize,
    buffer_allocation_increment: usize,
    max_queued_send_messages: usize,
}

impl<TStream, TCodec, TReactor> std::fmt::Display for Connection<TStream, TCodec, TReactor>
where
    TStream: AsyncRead + AsyncWrite + Unpin,
    TCodec: Codec,
    TReactor: MessageReactor<Inbound = <TCodec as Decoder>::Message>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let read_start = self.receive_buffer_start_offset;
        let read_end = self.receive_buffer_slice_end;
        let read_capacity = self.receive_buffer.len();
        let write_queue = self.send_buffer.len();
        let write_length: usize = self.send_buffer.iter().map(|b| b.remaining()).sum();
        write!(f, "Connection: {{read{{start: {read_start}, end: {read_end}, capacity: {read_capacity}}}, write{{queue: {write_queue}, length: {write_length}}}}}")
    }
}

impl<TStream, TCodec, TReactor> Unpin for Connection<TStream, TCodec, TReactor>
where
    TStream: AsyncRead + AsyncWrite + Unpin,
    TCodec: Codec,
    TReactor: MessageReactor<Inbound = <TCodec as Decoder>::Message>,
{
}

impl<TStream, TCodec, TReactor> Drop for Connection<TStream, TCodec, TReactor>
where
    TStream: AsyncRead + AsyncWrite + Unpin,
    TCodec: Codec,
    TReactor: MessageReactor<Inbound = <TCodec as Decoder>::Message>,
{
    fn drop(&mut self) {
        log::debug!("connection dropped: {self}")
    }
}

impl<TStream, TCodec, TReactor> Future for Connection<TStream, TCodec, TReactor>
where
    TStream: AsyncRead + AsyncWrite + Unpin,
    TCodec: Codec,
    TReactor: MessageReactor<Inbound = <TCodec as Decoder>::Message>,
{
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        if let Poll::Ready(()) = this.poll_read_inbound(context) {
            return Poll::Ready(());
        }
        if let Poll::Ready(()) = this.poll_serialize_outbound(context) {
            return Poll::Ready(());
        }
        match this.poll_write_buffers(context) {
            Poll::Ready(Err(e)) => {
                log::warn!("error while writing to stream: {e:?}");
                return Poll::Ready(());
            }
            Poll::Ready(Ok(())) => {
                if this.outbound_closed {
                    log::debug!("outbound queue closed and drained - closing connection");
                    return Poll::Ready(());
                }
            }
            Poll::Pending => (),
        }
        Poll::Pending
    }
}

impl<TStream, TCodec, TReactor> Connection<TStream, TCodec, TReactor>
where
    TStream: AsyncRead + AsyncWrite + Unpin,
    TCodec: Codec,
    TReactor: MessageReactor<Inbound = <TCodec as Decoder>::Message>,
{
    /// Create a new connection around a stream.
    ///
    /// Messages sent to the `outbound_messages` queue's sender are written to the stream.
    /// Messages read from the stream are delivered to `reactor`.
    pub fn new(
        stream: TStream,
        codec: TCodec,
        max_buffer_length: usize,
        buffer_allocation_increment: usize,
        max_queued_send_messages: usize,
        outbound_messages: mpsc::Receiver<<TCodec as Encoder>::Message>,
        reactor: TReactor,
    ) -> Self {
        Self {
            stream,
            codec,
            reactor,
            outbound_messages,
            outbound_messages_buffer: Vec::new(),
            outbound_closed: false,
            send_buffer: Default::default(),
            receive_buffer: Vec::new(),
            receive_buffer_start_offset: 0,
            receive_buffer_slice_end: 0,
            max_buffer_length,
            buffer_allocation_increment: buffer_allocation_increment.max(1),
            max_queued_send_messages: max_queued_send_messages.max(1),
        }
    }

    /// Ready when the connection should close.
    fn poll_read_inbound(&mut self, context: &mut Context<'_>) -> Poll<()> {
        for _ in 0..MAX_READS_PER_POLL {
            if !self.make_room_to_read() {
                log::error!(
                    "receive buffer is full without a complete message. Resetting connection - max: {} {self}",
                    self.max_buffer_length
                );
                return Poll::Ready(());
            }

            let mut read_buffer =
                ReadBuf::new(&mut self.receive_buffer[self.receive_buffer_slice_end..]);
            match Pin::new(&mut self.stream).poll_read(context, &mut read_buffer) {
                Poll::Ready(Ok(())) => {
                    let bytes_read = read_buffer.filled().len();
                    if bytes_read == 0 {
                        log::info!("connection was shut down as read returned 0");
                        return Poll::Ready(());
                    }
                    self.receive_buffer_slice_end += bytes_read;
                    if self.dispatch_messages_from_read_queue() == ReactorStatus::Disconnect {
                        return Poll::Ready(());
                    }
                }
                Poll::Ready(Err(e)) => {
                    log::warn!("error while reading from stream: {e:?} {self}");
                    return Poll::Ready(());
                }
                Poll::Pending => {
                    return Poll::Pending;
                }
            }
        }
        log::trace!("read budget exhausted, yielding");
        context.waker().wake_by_ref();
        Poll::Pending
    }

    /// Grow or compact the receive buffer. False when there is no room to read into.
    fn make_room_to_read(&mut self) -> bool {
        if self.receive_buffer.len() - self.receive_buffer_slice_end < self.buffer_allocation_increment
            && self.receive_buffer.len() < self.max_buffer_length
        {
            let new_length = (self.receive_buffer.len() + self.buffer_allocation_increment)
                .min(self.max_buffer_length);
            self.receive_buffer.resize(new_length, 0);
        }
        if self.receive_buffer_slice_end == self.receive_buffer.len()
            && 0 < self.receive_buffer_start_offset
        {
            let length = self.receive_buffer_slice_end - self.receive_buffer_start_offset;
            log::debug!("rotating {length}b of buffer to make room to read");
            self.receive_buffer
                .copy_within(self.receive_buffer_start_offset..self.receive_buffer_slice_end, 0);
            self.receive_buffer_start_offset = 0;
            self.receive_buffer_slice_end = length;
        }
        self.receive_buffer_slice_end < self.receive_buffer.len()
    }

    fn dispatch_messages_from_read_queue(&mut self) -> ReactorStatus {
        while self.receive_buffer_start_offset < self.receive_buffer_slice_end {
            let buffer =
                &self.receive_buffer[self.receive_buffer_start_offset..self.receive_buffer_slice_end];
            match self.codec.decode(buffer) {
                Ok((length, message)) => {
                    self.receive_buffer_start_offset += length;
                    if self.reactor.on_inbound_message(message) == ReactorStatus::Disconnect {
                        log::debug!("reactor requested disconnect");
                        return ReactorStatus::Disconnect;
                    }
                }
                Err(DeserializeError::IncompleteBuffer { next_message_size }) => {
                    if self.max_buffer_length < next_message_size {
                        log::error!("tried to receive message that is too long. Resetting connection - max: {}, requested: {}", self.max_buffer_length, next_message_size);
                        return ReactorStatus::Disconnect;
                    }
                    log::trace!("waiting for the next message of length {next_message_size}");
                    break;
                }
                Err(DeserializeError::InvalidBuffer) => {
                    log::error!("message was invalid - broken stream");
                    return ReactorStatus::Disconnect;
                }
                Err(DeserializeError::SkipMessage { distance }) => {
                    if self.receive_buffer_slice_end - self.receive_buffer_start_offset < distance {
                        log::trace!("cannot skip yet, need to read more. Skipping: {distance}, remaining:{}", self.receive_buffer_slice_end - self.receive_buffer_start_offset);
                        break;
                    }
                    log::debug!("skipping message of length {distance}");
                    self.receive_buffer_start_offset += distance;
                }
            }
        }
        if self.receive_buffer_start_offset == self.receive_buffer_slice_end {
            self.receive_buffer_start_offset = 0;
            self.receive_buffer_slice_end = 0;
        }
        ReactorStatus::Continue
    }

    /// Moves messages from the outbound queue into the write queue. Ready when the
    /// connection should close.
    fn poll_serialize_outbound(&mut self, context: &mut Context<'_>) -> Poll<()> {
        while !self.outbound_closed {
            let max_outbound = self
                .max_queued_send_messages
                .saturating_sub(self.send_buffer.len());
            if max_outbound == 0 {
                log::trace!("send is full: {self}");
                // Come back once the writer has drained some of the send buffer.
                context.waker().wake_by_ref();
                break;
            }
            match self.outbound_messages.poll_recv_many(
                context,
                &mut self.outbound_messages_buffer,
                max_outbound,
            ) {
                Poll::Ready(0) => {
                    log::debug!("outbound queue closed");
                    self.outbound_closed = true;
                }
                Poll::Ready(how_many) => {
                    log::trace!("polled {how_many} messages to send");
                    let mut messages = std::mem::take(&mut self.outbound_messages_buffer);
                    for message in messages.drain(..) {
                        let buffer = self.codec.encode(message);
                        if self.max_buffer_length < buffer.remaining() {
                            log::error!(
                                "tried to send too large a message. Max {}, attempted: {}",
                                self.max_buffer_length,
                                buffer.remaining()
                            );
                            return Poll::Ready(());
                        }
                        self.send_buffer.push_back(buffer);
                    }
                    self.outbound_messages_buffer = messages;
                }
                Poll::Pending => break,
            }
        }
        Poll::Pending
    }

    /// Ready(Ok) when everything queued has been written.
    fn poll_write_buffers(&mut self, context: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        while !self.send_buffer.is_empty() {
            let buffers: Vec<IoSlice> = self
                .send_buffer
                .iter()
                .take(UIO_MAXIOV)
                .map(|buffer| IoSlice::new(buffer.chunk()))
                .collect();
            match Pin::new(&mut self.stream).poll_write_vectored(context, &buffers) {
                Poll::Ready(Ok(0)) => {
                    log::info!("write stream was closed");
                    return Poll::Ready(Err(std::io::ErrorKind::WriteZero.into()));
                }
                Poll::Ready(Ok(written)) => {
                    self.rotate_send_buffers(written);
                    if self.send_buffer.is_empty() {
                        if let Poll::Ready(Err(e)) = Pin::new(&mut self.stream).poll_flush(context)
                        {
                            return Poll::Ready(Err(e));
                        }
                    }
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }
        Poll::Ready(Ok(()))
    }

    fn rotate_send_buffers(&mut self, mut written: usize) {
        while 0 < written {
            let Some(front) = self.send_buffer.front_mut() else {
                log::error!("rotated all buffers but {written} bytes unaccounted for");
                break;
            };
            // A chunk is what was offered to the writer; non-contiguous buffers go around again.
            let offered = front.chunk().len();
            if offered <= written {
                written -= offered;
                front.advance(offered);
                if !front.has_remaining() {
                    if let Some(done) = self.send_buffer.pop_front() {
                        self.codec.return_buffer(done);
                    }
                }
            } else {
                log::debug!("shifting partially written buffer of {offered}b by {written}b");
                front.advance(written);
                break;
            }
        }
    }
}
