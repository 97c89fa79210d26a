use callsocket_rpc::{server::Dispatcher, CallContext, MessageSink, MessageStream, Status};

use crate::{
    messages::{
        ComputeAverageRequest, ComputeAverageResponse, FindMaximumRequest, FindMaximumResponse,
        PrimeNumberDecompositionRequest, PrimeNumberDecompositionResponse, SquareRootRequest,
        SquareRootResponse, SumRequest, SumResponse,
    },
    method,
};

/// Trial divisions between checks of the call's context.
const DIVISIONS_PER_YIELD: u64 = 1 << 16;

/// All calculator methods, ready to serve.
pub fn dispatcher() -> callsocket_rpc::Result<Dispatcher> {
    let mut dispatcher = Dispatcher::new();
    dispatcher.register_unary(method::SUM, sum)?;
    dispatcher.register_server_streaming(
        method::PRIME_NUMBER_DECOMPOSITION,
        prime_number_decomposition,
    )?;
    dispatcher.register_client_streaming(method::COMPUTE_AVERAGE, compute_average)?;
    dispatcher.register_bidi_streaming(method::FIND_MAXIMUM, find_maximum)?;
    dispatcher.register_unary(method::SQUARE_ROOT, square_root)?;
    Ok(dispatcher)
}

async fn sum(_context: CallContext, request: SumRequest) -> Result<SumResponse, Status> {
    log::info!("received Sum: {request:?}");
    Ok(SumResponse {
        sum_result: i64::from(request.first_number) + i64::from(request.second_number),
    })
}

async fn prime_number_decomposition(
    context: CallContext,
    request: PrimeNumberDecompositionRequest,
    mut factors: MessageSink<PrimeNumberDecompositionResponse>,
) -> Result<(), Status> {
    log::info!("received PrimeNumberDecomposition: {request:?}");
    let mut number = request.number;
    if number <= 0 {
        return Err(Status::invalid_argument(format!(
            "Received a non-positive number: {number}"
        )));
    }

    let mut divisor: i64 = 2;
    let mut divisions: u64 = 0;
    while number > 1 {
        if divisor.checked_mul(divisor).map_or(true, |square| square > number) {
            // nothing at or below the square root divides it: the remainder is prime
            divisor = number;
        }
        if number % divisor == 0 {
            factors
                .send(&PrimeNumberDecompositionResponse {
                    prime_factor: divisor,
                })
                .await?;
            number /= divisor;
        } else {
            divisor += 1;
        }

        divisions += 1;
        if divisions % DIVISIONS_PER_YIELD == 0 {
            if let Some(cause) = context.err() {
                return Err(cause);
            }
            tokio::task::yield_now().await;
        }
    }
    Ok(())
}

async fn compute_average(
    _context: CallContext,
    mut numbers: MessageStream<ComputeAverageRequest>,
) -> Result<ComputeAverageResponse, Status> {
    log::info!("received ComputeAverage");
    let mut sum: i64 = 0;
    let mut count: u64 = 0;
    while let Some(request) = numbers.recv().await? {
        sum += i64::from(request.number);
        count += 1;
    }
    if count == 0 {
        return Err(Status::invalid_argument("no numbers to average"));
    }
    Ok(ComputeAverageResponse {
        average: sum as f64 / count as f64,
    })
}

async fn find_maximum(
    _context: CallContext,
    mut numbers: MessageStream<FindMaximumRequest>,
    mut maxima: MessageSink<FindMaximumResponse>,
) -> Result<(), Status> {
    log::info!("received FindMaximum");
    let mut maximum: Option<i32> = None;
    while let Some(request) = numbers.recv().await? {
        if maximum.map_or(true, |maximum| maximum < request.number) {
            maximum = Some(request.number);
            maxima
                .send(&FindMaximumResponse {
                    maximum: request.number,
                })
                .await?;
        }
    }
    Ok(())
}

async fn square_root(
    _context: CallContext,
    request: SquareRootRequest,
) -> Result<SquareRootResponse, Status> {
    log::info!("received SquareRoot: {request:?}");
    if request.number < 0 {
        return Err(Status::invalid_argument(format!(
            "Received a negative number: {}",
            request.number
        )));
    }
    Ok(SquareRootResponse {
        number_root: f64::from(request.number).sqrt(),
    })
}
