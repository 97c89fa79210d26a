use std::marker::PhantomData;

use futures::Stream;

use super::{StreamReceiver, StreamSender};
use crate::{Payload, Status};

/// A write direction carrying messages of one type.
#[derive(Debug)]
pub struct MessageSink<M> {
    sender: StreamSender,
    _phantom: PhantomData<fn(M)>,
}

impl<M> MessageSink<M>
where
    M: prost::Message + prost::Name,
{
    /// Wrap an untyped write direction.
    pub fn new(sender: StreamSender) -> Self {
        Self {
            sender,
            _phantom: PhantomData,
        }
    }

    /// Encode and send one message. See [`StreamSender::send`].
    pub async fn send(&mut self, message: &M) -> Result<(), Status> {
        self.sender.send(Payload::encode(message)).await
    }

    /// See [`StreamSender::close_send`].
    pub async fn close_send(&mut self) -> Result<(), Status> {
        self.sender.close_send().await
    }

    /// The untyped write direction.
    pub fn into_inner(self) -> StreamSender {
        self.sender
    }
}

/// A read direction carrying messages of one type.
#[derive(Debug)]
pub struct MessageStream<M> {
    receiver: StreamReceiver,
    _phantom: PhantomData<fn() -> M>,
}

impl<M> MessageStream<M>
where
    M: prost::Message + prost::Name + Default,
{
    /// Wrap an untyped read direction.
    pub fn new(receiver: StreamReceiver) -> Self {
        Self {
            receiver,
            _phantom: PhantomData,
        }
    }

    /// Receive and decode the next message. `Ok(None)` is the end marker.
    ///
    /// A message that does not decode as `M` fails the stream with `INTERNAL`.
    pub async fn recv(&mut self) -> Result<Option<M>, Status> {
        match self.receiver.recv().await? {
            Some(payload) => match payload.decode() {
                Ok(message) => Ok(Some(message)),
                Err(e) => Err(self.receiver.fail(Status::from(e))),
            },
            None => Ok(None),
        }
    }

    /// Receive until the end marker, collecting every message.
    pub async fn collect_all(&mut self) -> Result<Vec<M>, Status> {
        let mut messages = Vec::new();
        while let Some(message) = self.recv().await? {
            messages.push(message);
        }
        Ok(messages)
    }

    /// See [`StreamReceiver::close_recv`].
    pub fn close_recv(&mut self) {
        self.receiver.close_recv()
    }

    /// A lazy, finite sequence of the remaining messages. It ends after the end
    /// marker, or after yielding the first failure.
    pub fn into_stream(self) -> impl Stream<Item = Result<M, Status>> + Send + 'static
    where
        M: Send + 'static,
    {
        futures::stream::unfold(Some(self), |state| async move {
            let mut stream = state?;
            match stream.recv().await {
                Ok(Some(message)) => Some((Ok(message), Some(stream))),
                Ok(None) => None,
                Err(status) => Some((Err(status), None)),
            }
        })
    }

    /// The untyped read direction.
    pub fn into_inner(self) -> StreamReceiver {
        self.receiver
    }
}
