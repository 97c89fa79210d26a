use std::time::Duration;

use callsocket_rpc::{server::Dispatcher, CallContext, MessageSink, MessageStream, Status};

use crate::{
    messages::{
        GreetEveryoneRequest, GreetEveryoneResponse, GreetManyTimesRequest,
        GreetManyTimesResponse, GreetRequest, GreetResponse, GreetWithDeadlineRequest,
        GreetWithDeadlineResponse, Greeting, LongGreetRequest, LongGreetResponse,
    },
    method,
};

const GREETINGS_PER_REQUEST: usize = 10;
/// How long GreetWithDeadline pretends to work.
pub(crate) const GREETING_WORK: Duration = Duration::from_secs(3);

/// All greeting methods, ready to serve.
pub fn dispatcher() -> callsocket_rpc::Result<Dispatcher> {
    let mut dispatcher = Dispatcher::new();
    dispatcher.register_unary(method::GREET, greet)?;
    dispatcher.register_server_streaming(method::GREET_MANY_TIMES, greet_many_times)?;
    dispatcher.register_client_streaming(method::LONG_GREET, long_greet)?;
    dispatcher.register_bidi_streaming(method::GREET_EVERYONE, greet_everyone)?;
    dispatcher.register_unary(method::GREET_WITH_DEADLINE, greet_with_deadline)?;
    Ok(dispatcher)
}

fn required(greeting: Option<Greeting>) -> Result<Greeting, Status> {
    greeting.ok_or_else(|| Status::invalid_argument("request has no greeting"))
}

async fn greet(_context: CallContext, request: GreetRequest) -> Result<GreetResponse, Status> {
    log::info!("received Greet: {request:?}");
    let greeting = required(request.greeting)?;
    Ok(GreetResponse {
        result: format!("Hello {}", greeting.first_name),
    })
}

async fn greet_many_times(
    _context: CallContext,
    request: GreetManyTimesRequest,
    mut responses: MessageSink<GreetManyTimesResponse>,
) -> Result<(), Status> {
    log::info!("received GreetManyTimes: {request:?}");
    let greeting = required(request.greeting)?;
    for i in 0..GREETINGS_PER_REQUEST {
        responses
            .send(&GreetManyTimesResponse {
                result: format!("Hello {} number {i}", greeting.first_name),
            })
            .await?;
    }
    Ok(())
}

async fn long_greet(
    _context: CallContext,
    mut requests: MessageStream<LongGreetRequest>,
) -> Result<LongGreetResponse, Status> {
    log::info!("received LongGreet");
    let mut result = String::new();
    while let Some(request) = requests.recv().await? {
        let greeting = required(request.greeting)?;
        result.push_str(&format!("Hello {}! ", greeting.first_name));
    }
    Ok(LongGreetResponse { result })
}

async fn greet_everyone(
    _context: CallContext,
    mut requests: MessageStream<GreetEveryoneRequest>,
    mut responses: MessageSink<GreetEveryoneResponse>,
) -> Result<(), Status> {
    log::info!("received GreetEveryone");
    let mut result = String::new();
    while let Some(request) = requests.recv().await? {
        let greeting = required(request.greeting)?;
        result.push_str(&format!("Hello {}! ", greeting.first_name));
        responses
            .send(&GreetEveryoneResponse {
                result: result.clone(),
            })
            .await?;
    }
    Ok(())
}

pub(crate) async fn greet_with_deadline(
    context: CallContext,
    request: GreetWithDeadlineRequest,
) -> Result<GreetWithDeadlineResponse, Status> {
    log::info!("received GreetWithDeadline: {request:?}");
    let greeting = required(request.greeting)?;
    tokio::select! {
        _ = tokio::time::sleep(GREETING_WORK) => Ok(GreetWithDeadlineResponse {
            result: format!("Hello {}", greeting.first_name),
        }),
        cause = context.done() => {
            log::info!("GreetWithDeadline for {} gave up: {cause}", greeting.first_name);
            Err(cause)
        }
    }
}
