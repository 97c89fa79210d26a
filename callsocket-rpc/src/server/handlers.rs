//! Server-side call drivers: adapt typed handler functions to a [`CallStream`].

use std::{future::Future, sync::Arc};

use crate::{CallContext, CallStream, MessageSink, MessageStream, Status};

/// Receive exactly one request.
async fn recv_request<Request>(stream: &mut CallStream) -> Result<Request, Status>
where
    Request: prost::Message + prost::Name + Default,
{
    match stream.recv().await? {
        Some(payload) => Ok(payload.decode()?),
        None => Err(Status::internal("client closed the call without a request")),
    }
}

pub(crate) async fn unary<Request, Response, F, Fut>(
    handler: Arc<F>,
    context: CallContext,
    mut stream: CallStream,
) -> Result<(), Status>
where
    Request: prost::Message + prost::Name + Default,
    Response: prost::Message + prost::Name,
    F: Fn(CallContext, Request) -> Fut,
    Fut: Future<Output = Result<Response, Status>>,
{
    let request = recv_request(&mut stream).await?;
    let response = (*handler)(context, request).await?;
    stream.send(crate::Payload::encode(&response)).await?;
    stream.close_send().await
}

pub(crate) async fn server_streaming<Request, Response, F, Fut>(
    handler: Arc<F>,
    context: CallContext,
    mut stream: CallStream,
) -> Result<(), Status>
where
    Request: prost::Message + prost::Name + Default,
    Response: prost::Message + prost::Name,
    F: Fn(CallContext, Request, MessageSink<Response>) -> Fut,
    Fut: Future<Output = Result<(), Status>>,
{
    let request = recv_request(&mut stream).await?;
    let (sender, _receiver) = stream.split();
    (*handler)(context, request, MessageSink::new(sender)).await
}

pub(crate) async fn client_streaming<Request, Response, F, Fut>(
    handler: Arc<F>,
    context: CallContext,
    stream: CallStream,
) -> Result<(), Status>
where
    Request: prost::Message + prost::Name + Default,
    Response: prost::Message + prost::Name,
    F: Fn(CallContext, MessageStream<Request>) -> Fut,
    Fut: Future<Output = Result<Response, Status>>,
{
    let (sender, receiver) = stream.split();
    let mut responses = MessageSink::new(sender);
    let response = (*handler)(context, MessageStream::new(receiver)).await?;
    responses.send(&response).await?;
    responses.close_send().await
}

pub(crate) async fn bidi_streaming<Request, Response, F, Fut>(
    handler: Arc<F>,
    context: CallContext,
    stream: CallStream,
) -> Result<(), Status>
where
    Request: prost::Message + prost::Name + Default,
    Response: prost::Message + prost::Name,
    F: Fn(CallContext, MessageStream<Request>, MessageSink<Response>) -> Fut,
    Fut: Future<Output = Result<(), Status>>,
{
    let (sender, receiver) = stream.split();
    (*handler)(
        context,
        MessageStream::new(receiver),
        MessageSink::new(sender),
    )
    .await
}
