use callsocket_rpc::{client::Channel, CallContext, MessageStream, Status};
use futures::{Stream, StreamExt};

use crate::{
    messages::{
        ComputeAverageRequest, ComputeAverageResponse, FindMaximumRequest, FindMaximumResponse,
        PrimeNumberDecompositionRequest, PrimeNumberDecompositionResponse, SquareRootRequest,
        SquareRootResponse, SumRequest, SumResponse,
    },
    method,
};

/// Typed calls to a calculator server.
#[derive(Debug, Clone)]
pub struct CalculatorClient {
    channel: Channel,
}

impl CalculatorClient {
    /// Make calls over `channel`.
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    pub async fn sum(
        &self,
        context: &CallContext,
        first_number: i32,
        second_number: i32,
    ) -> Result<i64, Status> {
        let response: SumResponse = self
            .channel
            .unary(
                method::SUM,
                context,
                &SumRequest {
                    first_number,
                    second_number,
                },
            )
            .await?;
        Ok(response.sum_result)
    }

    /// The prime factors of `number`, smallest first, as the server finds them.
    pub async fn prime_number_decomposition(
        &self,
        context: &CallContext,
        number: i64,
    ) -> Result<MessageStream<PrimeNumberDecompositionResponse>, Status> {
        self.channel
            .server_streaming(
                method::PRIME_NUMBER_DECOMPOSITION,
                context,
                &PrimeNumberDecompositionRequest { number },
            )
            .await
    }

    pub async fn compute_average(
        &self,
        context: &CallContext,
        numbers: impl IntoIterator<Item = i32>,
    ) -> Result<f64, Status> {
        let mut call = self
            .channel
            .client_streaming::<ComputeAverageRequest, ComputeAverageResponse>(
                method::COMPUTE_AVERAGE,
                context,
            )
            .await?;
        for number in numbers {
            call.send(&ComputeAverageRequest { number }).await?;
        }
        Ok(call.close_and_recv().await?.average)
    }

    /// The running maxima of `numbers`, one per increase.
    pub async fn find_maximum(
        &self,
        context: &CallContext,
        numbers: impl Stream<Item = i32> + Send + 'static,
    ) -> Result<Vec<i32>, Status> {
        let call = self
            .channel
            .bidi_streaming::<FindMaximumRequest, FindMaximumResponse>(
                method::FIND_MAXIMUM,
                context,
            )
            .await?;
        let mut maxima = Vec::new();
        call.drive(
            numbers.map(|number| FindMaximumRequest { number }),
            |response| maxima.push(response.maximum),
        )
        .await?;
        Ok(maxima)
    }

    pub async fn square_root(&self, context: &CallContext, number: i32) -> Result<f64, Status> {
        let response: SquareRootResponse = self
            .channel
            .unary(method::SQUARE_ROOT, context, &SquareRootRequest { number })
            .await?;
        Ok(response.number_root)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use callsocket_rpc::{client::Channel, server::serve_stream, CallContext, Code, Configuration};

    use super::CalculatorClient;

    fn serve() -> CalculatorClient {
        let (client_stream, server_stream) = tokio::io::duplex(64 * 1024);
        let configuration = Configuration::default();
        let dispatcher = Arc::new(crate::dispatcher().expect("calculator registers"));
        tokio::spawn(serve_stream(server_stream, dispatcher, &configuration));
        let (channel, connection) = Channel::over_stream(client_stream, &configuration);
        tokio::spawn(connection);
        CalculatorClient::new(channel)
    }

    fn is_prime(n: i64) -> bool {
        n >= 2 && (2..).take_while(|d| d * d <= n).all(|d| n % d != 0)
    }

    #[tokio::test]
    async fn sum_is_exact() {
        let client = serve();
        let context = CallContext::background();
        for (a, b) in [(6, 60), (-3, 3), (i32::MAX, i32::MAX), (i32::MIN, -1)] {
            assert_eq!(
                i64::from(a) + i64::from(b),
                client.sum(&context, a, b).await.expect("sum")
            );
        }
    }

    #[tokio::test]
    async fn decomposition_multiplies_back() {
        let client = serve();
        let context = CallContext::background();
        for n in [1, 2, 12, 120, 97, 1024, 600_851_475_143, 2 * 999_983] {
            let factors: Vec<i64> = client
                .prime_number_decomposition(&context, n)
                .await
                .expect("call opens")
                .collect_all()
                .await
                .expect("decomposes")
                .into_iter()
                .map(|response| response.prime_factor)
                .collect();
            assert_eq!(n, factors.iter().product::<i64>(), "{n}: {factors:?}");
            assert!(factors.iter().all(|f| is_prime(*f)), "{n}: {factors:?}");
            assert!(factors.windows(2).all(|w| w[0] <= w[1]), "{n}: {factors:?}");
        }
        assert_eq!(
            vec![2, 2, 2, 3, 5],
            client
                .prime_number_decomposition(&context, 120)
                .await
                .expect("call opens")
                .collect_all()
                .await
                .expect("decomposes")
                .into_iter()
                .map(|response| response.prime_factor)
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn decomposition_rejects_non_positive_numbers() {
        let client = serve();
        let status = client
            .prime_number_decomposition(&CallContext::background(), 0)
            .await
            .expect("call opens")
            .collect_all()
            .await
            .expect_err("zero has no decomposition");
        assert_eq!(Code::InvalidArgument, status.code());
    }

    #[tokio::test]
    async fn average_is_the_mean() {
        let client = serve();
        let context = CallContext::background();
        assert_eq!(
            2.5,
            client
                .compute_average(&context, [1, 2, 3, 4])
                .await
                .expect("average")
        );
        assert_eq!(
            -1.0,
            client
                .compute_average(&context, [i32::MIN, i32::MAX])
                .await
                .expect("average")
                * 2.0
        );
        let status = client
            .compute_average(&context, [])
            .await
            .expect_err("nothing to average");
        assert_eq!(Code::InvalidArgument, status.code());
    }

    #[tokio::test]
    async fn maximum_is_emitted_only_on_increase() {
        let client = serve();
        let maxima = client
            .find_maximum(
                &CallContext::background(),
                futures::stream::iter([1, 5, 3, 6, 2, 20, 20, -4]),
            )
            .await
            .expect("maxima");
        assert_eq!(vec![1, 5, 6, 20], maxima);

        let maxima = client
            .find_maximum(&CallContext::background(), futures::stream::iter([-7, -9, -2]))
            .await
            .expect("maxima");
        assert_eq!(vec![-7, -2], maxima);
    }

    #[tokio::test]
    async fn square_root_rejects_negative_numbers() {
        let client = serve();
        let context = CallContext::background();
        let root = client.square_root(&context, 10).await.expect("root of 10");
        assert!((root - 3.1623).abs() < 1e-4, "{root}");

        let status = client
            .square_root(&context, -2)
            .await
            .expect_err("negative");
        assert_eq!(Code::InvalidArgument, status.code());
        assert_eq!("Received a negative number: -2", status.message());
    }
}
