use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, OnceLock,
};

use tokio::sync::mpsc;

use crate::{
    registry::{CallRegistry, Inbound},
    CallContext, Convention, Frame, Payload, Status,
};

mod receiver;
mod sender;
mod typed;

pub use receiver::StreamReceiver;
pub use sender::StreamSender;
pub use typed::{MessageSink, MessageStream};

/// The state of one direction of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionState {
    /// Messages may flow.
    Open,
    /// No more messages will be sent, but the call is still in flight.
    HalfClosed,
    /// The direction is finished. Sends fail; receives return the end marker or the failure.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Client,
    Server,
}

/// Shared by both halves of a stream.
///
/// On the client, dropping the last half of an unfinished call cancels it at the server.
#[derive(Debug)]
pub(crate) struct CallGuard {
    call_id: u64,
    side: Side,
    context: CallContext,
    outbound: mpsc::Sender<Frame>,
    calls: CallRegistry,
    terminal: Arc<OnceLock<Status>>,
    abandoned: AtomicBool,
}

impl CallGuard {
    /// Why the call can make no further progress, if it can't.
    fn check_live(&self) -> Result<(), Status> {
        if let Some(cause) = self.context.err() {
            self.abandon(&cause);
            return Err(cause);
        }
        match self.terminal.get() {
            Some(status) if status.is_ok() => Err(Status::internal("call already completed")),
            Some(status) => Err(status.clone()),
            None => Ok(()),
        }
    }

    /// Stop tracking an unfinished client call and tell the server why.
    fn abandon(&self, cause: &Status) {
        if self.side != Side::Client
            || self.terminal.get().is_some()
            || self.abandoned.swap(true, Ordering::AcqRel)
        {
            return;
        }
        self.calls.remove(self.call_id);
        log::debug!("{} abandoning call: {cause}", self.call_id);
        if let Err(e) = self.outbound.try_send(Frame::cancel(self.call_id, cause)) {
            log::warn!("{} failed to send cancellation: {e:?}", self.call_id);
        }
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.abandon(&Status::canceled("call dropped by client"));
    }
}

/// The message channel backing one call.
///
/// A stream has two independent directions. The local write direction is driven with
/// `send` and `close_send`; the remote write direction is drained with `recv`.
/// `split` separates them for calls that send and receive concurrently.
#[derive(Debug)]
pub struct CallStream {
    call_id: u64,
    convention: Convention,
    sender: StreamSender,
    receiver: StreamReceiver,
}

impl CallStream {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        side: Side,
        call_id: u64,
        convention: Convention,
        context: CallContext,
        outbound: mpsc::Sender<Frame>,
        calls: CallRegistry,
        inbound: mpsc::UnboundedReceiver<Inbound>,
        terminal: Arc<OnceLock<Status>>,
    ) -> Self {
        let guard = Arc::new(CallGuard {
            call_id,
            side,
            context,
            outbound,
            calls,
            terminal,
            abandoned: AtomicBool::new(false),
        });
        Self {
            call_id,
            convention,
            sender: StreamSender::new(guard.clone()),
            receiver: StreamReceiver::new(guard, inbound),
        }
    }

    /// The call's id, unique within its connection.
    pub fn call_id(&self) -> u64 {
        self.call_id
    }

    /// The calling convention this stream was opened with.
    pub fn convention(&self) -> Convention {
        self.convention
    }

    /// The call's context.
    pub fn context(&self) -> &CallContext {
        self.sender.context()
    }

    /// See [`StreamSender::send`].
    pub async fn send(&mut self, payload: Payload) -> Result<(), Status> {
        self.sender.send(payload).await
    }

    /// See [`StreamSender::close_send`].
    pub async fn close_send(&mut self) -> Result<(), Status> {
        self.sender.close_send().await
    }

    /// See [`StreamReceiver::recv`].
    pub async fn recv(&mut self) -> Result<Option<Payload>, Status> {
        self.receiver.recv().await
    }

    /// See [`StreamReceiver::close_recv`].
    pub fn close_recv(&mut self) {
        self.receiver.close_recv()
    }

    /// State of the local write direction.
    pub fn send_state(&self) -> DirectionState {
        self.sender.state()
    }

    /// State of the remote write direction, as seen locally.
    pub fn recv_state(&self) -> DirectionState {
        self.receiver.state()
    }

    /// Separate the write and read directions. Each half may move to its own task.
    pub fn split(self) -> (StreamSender, StreamReceiver) {
        (self.sender, self.receiver)
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use crate::{
        server::Dispatcher,
        test_support::{number, serve, serve_with_handle, Number},
        CallContext, Code, Convention, DirectionState, MessageSink, MessageStream, Payload, Status,
    };

    async fn echo(
        _context: CallContext,
        mut requests: MessageStream<Number>,
        mut responses: MessageSink<Number>,
    ) -> Result<(), Status> {
        while let Some(request) = requests.recv().await? {
            responses.send(&request).await?;
        }
        Ok(())
    }

    async fn silent(
        context: CallContext,
        observed: mpsc::UnboundedSender<Status>,
    ) -> Result<(), Status> {
        let cause = context.done().await;
        let _ = observed.send(cause.clone());
        Err(cause)
    }

    async fn countdown(
        _context: CallContext,
        request: Number,
        mut responses: MessageSink<Number>,
    ) -> Result<(), Status> {
        for value in (1..=request.value).rev() {
            responses.send(&number(value)).await?;
        }
        Err(Status::invalid_argument("ran out"))
    }

    /// A dispatcher with a bidi `Echo`, and a `Silent` method that reports its cancellation cause.
    fn dispatcher() -> (Dispatcher, mpsc::UnboundedReceiver<Status>) {
        let (observed_sender, observed) = mpsc::unbounded_channel();
        let mut dispatcher = Dispatcher::new();
        dispatcher
            .register_bidi_streaming("Echo", echo)
            .expect("register echo");
        dispatcher
            .register_bidi_streaming(
                "Silent",
                move |context: CallContext,
                      _requests: MessageStream<Number>,
                      _responses: MessageSink<Number>| {
                    silent(context, observed_sender.clone())
                },
            )
            .expect("register silent");
        (dispatcher, observed)
    }

    async fn observe(observed: &mut mpsc::UnboundedReceiver<Status>) -> Status {
        tokio::time::timeout(Duration::from_secs(5), observed.recv())
            .await
            .expect("handler should observe cancellation")
            .expect("handler reports")
    }

    #[tokio::test]
    async fn send_after_close_send_fails_and_reading_continues() {
        let (dispatcher, _observed) = dispatcher();
        let channel = serve(dispatcher);
        let context = CallContext::background();
        let mut stream = channel
            .call("Echo", &context, Convention::BidiStreaming)
            .await
            .expect("call opens");

        stream.send(Payload::encode(&number(1))).await.expect("send");
        stream.close_send().await.expect("close send");
        stream.close_send().await.expect("close send is idempotent");
        let status = stream
            .send(Payload::encode(&number(2)))
            .await
            .expect_err("send after close_send");
        assert_eq!(Code::Internal, status.code());
        assert_eq!(DirectionState::HalfClosed, stream.send_state());

        let echoed = stream
            .recv()
            .await
            .expect("recv works")
            .expect("one message");
        assert_eq!(number(1), echoed.decode::<Number>().expect("decodes"));
        assert_eq!(Ok(None), stream.recv().await);
        assert_eq!(Ok(None), stream.recv().await, "end marker repeats");
        assert_eq!(DirectionState::Closed, stream.recv_state());
    }

    #[tokio::test]
    async fn typed_directions_unwrap_to_the_same_untyped_stream() {
        let (dispatcher, _observed) = dispatcher();
        let channel = serve(dispatcher);
        let context = CallContext::background();
        let (sender, receiver) = channel
            .call("Echo", &context, Convention::BidiStreaming)
            .await
            .expect("call opens")
            .split();
        let mut sink = MessageSink::<Number>::new(sender);
        let mut responses = MessageStream::<Number>::new(receiver);

        sink.send(&number(5)).await.expect("typed send");
        assert_eq!(Some(number(5)), responses.recv().await.expect("typed recv"));

        let mut sender = sink.into_inner();
        sender
            .send(Payload::encode(&number(6)))
            .await
            .expect("untyped send");
        sender.close_send().await.expect("close send");
        assert_eq!(DirectionState::HalfClosed, sender.state());

        let mut receiver = responses.into_inner();
        let echoed = receiver
            .recv()
            .await
            .expect("untyped recv")
            .expect("one message");
        assert_eq!("test.Number", echoed.schema());
        assert_eq!(number(6), echoed.decode::<Number>().expect("decodes"));
        assert_eq!(Ok(None), receiver.recv().await);
        assert_eq!(DirectionState::Closed, receiver.state());
    }

    #[tokio::test]
    async fn recv_after_close_recv_fails() {
        let (dispatcher, mut observed) = dispatcher();
        let channel = serve(dispatcher);
        let context = CallContext::background();
        let mut stream = channel
            .call("Silent", &context, Convention::BidiStreaming)
            .await
            .expect("call opens");

        stream.close_recv();
        assert_eq!(DirectionState::Closed, stream.recv_state());
        let status = stream.recv().await.expect_err("recv after close_recv");
        assert_eq!(Code::Internal, status.code());

        assert_eq!(Code::Canceled, observe(&mut observed).await.code());
    }

    #[tokio::test]
    async fn cancel_unblocks_recv_and_reaches_the_handler() {
        let (dispatcher, mut observed) = dispatcher();
        let channel = serve(dispatcher);
        let context = CallContext::background();
        let mut stream = channel
            .call("Silent", &context, Convention::BidiStreaming)
            .await
            .expect("call opens");

        let (received, ()) = tokio::join!(stream.recv(), async {
            tokio::task::yield_now().await;
            context.cancel(Status::canceled("enough"));
        });
        assert_eq!(Err(Status::canceled("enough")), received);
        assert_eq!(Err(Status::canceled("enough")), stream.recv().await);

        assert_eq!(Status::canceled("enough"), observe(&mut observed).await);
    }

    #[tokio::test]
    async fn dropping_an_unfinished_call_cancels_it() {
        let (dispatcher, mut observed) = dispatcher();
        let channel = serve(dispatcher);
        let stream = channel
            .call("Silent", &CallContext::background(), Convention::BidiStreaming)
            .await
            .expect("call opens");
        drop(stream);

        assert_eq!(Code::Canceled, observe(&mut observed).await.code());
        assert!(channel.is_alive());
    }

    #[tokio::test]
    async fn failure_after_messages_keeps_the_messages() {
        let mut dispatcher = Dispatcher::new();
        dispatcher
            .register_server_streaming("Countdown", countdown)
            .expect("register");
        let channel = serve(dispatcher);

        let mut responses = channel
            .server_streaming::<Number, Number>("Countdown", &CallContext::background(), &number(3))
            .await
            .expect("call opens");
        for expected in [3, 2, 1] {
            assert_eq!(Ok(Some(number(expected))), responses.recv().await);
        }
        let status = responses.recv().await.expect_err("handler failed");
        assert_eq!(Status::invalid_argument("ran out"), status);
        assert_eq!(Err(status), responses.recv().await, "failure repeats");
    }

    #[tokio::test]
    async fn connection_loss_fails_in_flight_calls() {
        let (dispatcher, mut observed) = dispatcher();
        let (channel, server) = serve_with_handle(dispatcher);
        let mut silent = channel
            .call("Silent", &CallContext::background(), Convention::BidiStreaming)
            .await
            .expect("call opens");
        // A round trip on a later call shows the server accepted the first one.
        let mut echo = channel
            .call("Echo", &CallContext::background(), Convention::BidiStreaming)
            .await
            .expect("call opens");
        echo.send(Payload::encode(&number(1))).await.expect("send");
        assert!(matches!(echo.recv().await, Ok(Some(_))));

        server.abort();
        let status = silent.recv().await.expect_err("connection is gone");
        assert_eq!(Code::Internal, status.code());
        let status = echo.recv().await.expect_err("connection is gone");
        assert_eq!(Code::Internal, status.code());
        assert!(!channel.is_alive());

        let status = channel
            .call("Echo", &CallContext::background(), Convention::BidiStreaming)
            .await
            .expect_err("closed channel");
        assert_eq!(Code::Internal, status.code());

        assert_eq!(Code::Canceled, observe(&mut observed).await.code());
    }
}
