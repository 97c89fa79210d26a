use futures::{Stream, StreamExt};

use super::Channel;
use crate::{CallContext, Convention, MessageSink, MessageStream, Payload, Status};

impl Channel {
    /// Call a unary method: send one request, receive exactly one response.
    pub async fn unary<Request, Response>(
        &self,
        method: &str,
        context: &CallContext,
        request: &Request,
    ) -> Result<Response, Status>
    where
        Request: prost::Message + prost::Name,
        Response: prost::Message + prost::Name + Default,
    {
        let mut stream = self.call(method, context, Convention::Unary).await?;
        stream.send(Payload::encode(request)).await?;
        stream.close_send().await?;
        let (_sender, receiver) = stream.split();
        recv_single_response(MessageStream::new(receiver)).await
    }

    /// Call a server-streaming method: send one request, then drain the responses.
    ///
    /// The returned stream ends with the end marker once the server completes with `OK`.
    pub async fn server_streaming<Request, Response>(
        &self,
        method: &str,
        context: &CallContext,
        request: &Request,
    ) -> Result<MessageStream<Response>, Status>
    where
        Request: prost::Message + prost::Name,
        Response: prost::Message + prost::Name + Default,
    {
        let mut stream = self
            .call(method, context, Convention::ServerStreaming)
            .await?;
        stream.send(Payload::encode(request)).await?;
        stream.close_send().await?;
        let (_sender, receiver) = stream.split();
        Ok(MessageStream::new(receiver))
    }

    /// Call a client-streaming method. Send requests on the returned call, then
    /// close it to receive the single response.
    pub async fn client_streaming<Request, Response>(
        &self,
        method: &str,
        context: &CallContext,
    ) -> Result<ClientStreamingCall<Request, Response>, Status>
    where
        Request: prost::Message + prost::Name,
        Response: prost::Message + prost::Name + Default,
    {
        let (sender, receiver) = self
            .call(method, context, Convention::ClientStreaming)
            .await?
            .split();
        Ok(ClientStreamingCall {
            requests: MessageSink::new(sender),
            responses: MessageStream::new(receiver),
        })
    }

    /// Call a bidi-streaming method. Requests and responses progress independently.
    pub async fn bidi_streaming<Request, Response>(
        &self,
        method: &str,
        context: &CallContext,
    ) -> Result<BidiStreamingCall<Request, Response>, Status>
    where
        Request: prost::Message + prost::Name,
        Response: prost::Message + prost::Name + Default,
    {
        let (sender, receiver) = self
            .call(method, context, Convention::BidiStreaming)
            .await?
            .split();
        Ok(BidiStreamingCall {
            requests: MessageSink::new(sender),
            responses: MessageStream::new(receiver),
        })
    }
}

/// Receive one response followed by the `OK` end marker.
async fn recv_single_response<Response>(
    mut responses: MessageStream<Response>,
) -> Result<Response, Status>
where
    Response: prost::Message + prost::Name + Default,
{
    let Some(response) = responses.recv().await? else {
        return Err(Status::internal("call completed without a response"));
    };
    match responses.recv().await? {
        None => Ok(response),
        Some(_) => Err(Status::internal("call returned more than one response")),
    }
}

/// An in-flight client-streaming call.
#[derive(Debug)]
pub struct ClientStreamingCall<Request, Response> {
    requests: MessageSink<Request>,
    responses: MessageStream<Response>,
}

impl<Request, Response> ClientStreamingCall<Request, Response>
where
    Request: prost::Message + prost::Name,
    Response: prost::Message + prost::Name + Default,
{
    /// Send one request.
    pub async fn send(&mut self, request: &Request) -> Result<(), Status> {
        self.requests.send(request).await
    }

    /// Finish sending and wait for the aggregated response.
    pub async fn close_and_recv(mut self) -> Result<Response, Status> {
        self.requests.close_send().await?;
        recv_single_response(self.responses).await
    }
}

/// An in-flight bidi-streaming call.
#[derive(Debug)]
pub struct BidiStreamingCall<Request, Response> {
    requests: MessageSink<Request>,
    responses: MessageStream<Response>,
}

impl<Request, Response> BidiStreamingCall<Request, Response>
where
    Request: prost::Message + prost::Name + Send + Sync + 'static,
    Response: prost::Message + prost::Name + Default,
{
    /// Separate the directions, to drive them from independent tasks. Only the
    /// sending task may send, and only the receiving task may receive.
    pub fn split(self) -> (MessageSink<Request>, MessageStream<Response>) {
        (self.requests, self.responses)
    }

    /// Run the call to completion.
    ///
    /// A send loop pushes every request then closes the send direction, as its own
    /// task. Meanwhile the receive loop hands each response to `on_response` until
    /// the end marker. The call is done when both loops are done.
    ///
    /// The call's outcome is the receive outcome: a send that fails because the call
    /// already completed is not an error of its own.
    pub async fn drive<S>(
        self,
        requests: S,
        mut on_response: impl FnMut(Response),
    ) -> Result<(), Status>
    where
        S: Stream<Item = Request> + Send + 'static,
    {
        let (mut sink, mut responses) = self.split();
        let send_loop = tokio::spawn(async move {
            let mut requests = std::pin::pin!(requests);
            while let Some(request) = requests.next().await {
                sink.send(&request).await?;
            }
            sink.close_send().await
        });

        let received = loop {
            match responses.recv().await {
                Ok(Some(response)) => on_response(response),
                Ok(None) => break Ok(()),
                Err(status) => break Err(status),
            }
        };
        if received.is_err() {
            send_loop.abort();
        }
        let sent = match send_loop.await {
            Ok(sent) => sent,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(Status::internal(format!("send loop failed: {e}"))),
        };
        if let Err(status) = &sent {
            log::debug!("send loop stopped: {status}");
        }
        received
    }
}

#[cfg(test)]
mod test {
    use futures::StreamExt;

    use crate::{
        server::Dispatcher,
        test_support::{number, serve, Number},
        CallContext, Code, MessageSink, MessageStream, Status,
    };

    async fn count_to(
        _context: CallContext,
        request: Number,
        mut responses: MessageSink<Number>,
    ) -> Result<(), Status> {
        for value in 1..=request.value {
            responses.send(&number(value)).await?;
        }
        Ok(())
    }

    async fn sum(
        _context: CallContext,
        mut requests: MessageStream<Number>,
    ) -> Result<Number, Status> {
        let mut total = 0;
        while let Some(request) = requests.recv().await? {
            total += request.value;
        }
        Ok(number(total))
    }

    async fn double(
        _context: CallContext,
        mut requests: MessageStream<Number>,
        mut responses: MessageSink<Number>,
    ) -> Result<(), Status> {
        while let Some(request) = requests.recv().await? {
            responses.send(&number(request.value * 2)).await?;
        }
        Ok(())
    }

    fn dispatcher() -> Dispatcher {
        let mut dispatcher = Dispatcher::new();
        dispatcher
            .register_server_streaming("CountTo", count_to)
            .expect("register");
        dispatcher
            .register_client_streaming("Sum", sum)
            .expect("register");
        dispatcher
            .register_bidi_streaming("Double", double)
            .expect("register");
        dispatcher
    }

    #[tokio::test]
    async fn server_streaming_ends_with_the_end_marker() {
        let channel = serve(dispatcher());
        let mut responses = channel
            .server_streaming::<Number, Number>("CountTo", &CallContext::background(), &number(4))
            .await
            .expect("call opens");
        let values: Vec<i64> = responses
            .collect_all()
            .await
            .expect("completes")
            .into_iter()
            .map(|n| n.value)
            .collect();
        assert_eq!(vec![1, 2, 3, 4], values);
        assert_eq!(Ok(None), responses.recv().await);

        let responses = channel
            .server_streaming::<Number, Number>("CountTo", &CallContext::background(), &number(2))
            .await
            .expect("call opens");
        let streamed: Vec<Result<Number, Status>> = responses.into_stream().collect().await;
        assert_eq!(vec![Ok(number(1)), Ok(number(2))], streamed);
    }

    #[tokio::test]
    async fn client_streaming_aggregates_every_request() {
        let channel = serve(dispatcher());
        let mut call = channel
            .client_streaming::<Number, Number>("Sum", &CallContext::background())
            .await
            .expect("call opens");
        for value in [1, 2, 3, 4] {
            call.send(&number(value)).await.expect("send");
        }
        assert_eq!(number(10), call.close_and_recv().await.expect("sum"));

        let empty = channel
            .client_streaming::<Number, Number>("Sum", &CallContext::background())
            .await
            .expect("call opens");
        assert_eq!(number(0), empty.close_and_recv().await.expect("empty sum"));
    }

    #[tokio::test]
    async fn bidi_streaming_drives_both_directions() {
        let channel = serve(dispatcher());
        let call = channel
            .bidi_streaming::<Number, Number>("Double", &CallContext::background())
            .await
            .expect("call opens");
        let mut doubled = Vec::new();
        call.drive(futures::stream::iter([1, 2, 3].map(number)), |response| {
            doubled.push(response.value)
        })
        .await
        .expect("completes");
        assert_eq!(vec![2, 4, 6], doubled);
    }

    #[tokio::test]
    async fn unary_on_a_streaming_method_is_internal() {
        let channel = serve(dispatcher());
        let status = channel
            .unary::<Number, Number>("CountTo", &CallContext::background(), &number(2))
            .await
            .expect_err("wrong convention");
        assert_eq!(Code::Internal, status.code());
    }
}
