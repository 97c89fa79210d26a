use callsocket_rpc::{client::Channel, CallContext, MessageStream, Status};
use futures::{Stream, StreamExt};

use crate::{
    messages::{
        GreetEveryoneRequest, GreetEveryoneResponse, GreetManyTimesRequest,
        GreetManyTimesResponse, GreetRequest, GreetResponse, GreetWithDeadlineRequest,
        GreetWithDeadlineResponse, Greeting, LongGreetRequest, LongGreetResponse,
    },
    method,
};

/// Typed calls to a greeting server.
#[derive(Debug, Clone)]
pub struct GreetClient {
    channel: Channel,
}

impl GreetClient {
    /// Make calls over `channel`.
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    pub async fn greet(&self, context: &CallContext, greeting: Greeting) -> Result<String, Status> {
        let response: GreetResponse = self
            .channel
            .unary(
                method::GREET,
                context,
                &GreetRequest {
                    greeting: Some(greeting),
                },
            )
            .await?;
        Ok(response.result)
    }

    /// Ten numbered greetings, streamed as the server produces them.
    pub async fn greet_many_times(
        &self,
        context: &CallContext,
        greeting: Greeting,
    ) -> Result<MessageStream<GreetManyTimesResponse>, Status> {
        self.channel
            .server_streaming(
                method::GREET_MANY_TIMES,
                context,
                &GreetManyTimesRequest {
                    greeting: Some(greeting),
                },
            )
            .await
    }

    /// One greeting for everyone in `greetings`.
    pub async fn long_greet(
        &self,
        context: &CallContext,
        greetings: impl IntoIterator<Item = Greeting>,
    ) -> Result<String, Status> {
        let mut call = self
            .channel
            .client_streaming::<LongGreetRequest, LongGreetResponse>(method::LONG_GREET, context)
            .await?;
        for greeting in greetings {
            call.send(&LongGreetRequest {
                greeting: Some(greeting),
            })
            .await?;
        }
        Ok(call.close_and_recv().await?.result)
    }

    /// Greet everyone in `greetings`, collecting the greeting the server answers each with.
    pub async fn greet_everyone(
        &self,
        context: &CallContext,
        greetings: impl Stream<Item = Greeting> + Send + 'static,
    ) -> Result<Vec<String>, Status> {
        let call = self
            .channel
            .bidi_streaming::<GreetEveryoneRequest, GreetEveryoneResponse>(
                method::GREET_EVERYONE,
                context,
            )
            .await?;
        let mut results = Vec::new();
        call.drive(
            greetings.map(|greeting| GreetEveryoneRequest {
                greeting: Some(greeting),
            }),
            |response| results.push(response.result),
        )
        .await?;
        Ok(results)
    }

    /// A greeting that takes the server a few seconds. Bound it with the context's deadline.
    pub async fn greet_with_deadline(
        &self,
        context: &CallContext,
        greeting: Greeting,
    ) -> Result<String, Status> {
        let response: GreetWithDeadlineResponse = self
            .channel
            .unary(
                method::GREET_WITH_DEADLINE,
                context,
                &GreetWithDeadlineRequest {
                    greeting: Some(greeting),
                },
            )
            .await?;
        Ok(response.result)
    }
}
