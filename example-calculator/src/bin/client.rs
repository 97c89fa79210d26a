use callsocket_rpc::{client, CallContext, Configuration};
use example_calculator::CalculatorClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let endpoint = std::env::var("ENDPOINT").unwrap_or_else(|_| "localhost:50051".to_string());
    let address = tokio::net::lookup_host(&endpoint)
        .await?
        .next()
        .ok_or_else(|| format!("could not resolve {endpoint}"))?;
    let (channel, connection) = client::connect(address, &Configuration::default()).await?;
    tokio::spawn(connection);
    let calculator = CalculatorClient::new(channel);
    let context = CallContext::background();

    println!("Sum(6, 60) = {}", calculator.sum(&context, 6, 60).await?);

    let mut factors = calculator
        .prime_number_decomposition(&context, 120)
        .await?;
    while let Some(factor) = factors.recv().await? {
        println!("PrimeNumberDecomposition(120) factor: {}", factor.prime_factor);
    }

    let average = calculator.compute_average(&context, [1, 2, 3, 4]).await?;
    println!("ComputeAverage(1, 2, 3, 4) = {average}");

    let maxima = calculator
        .find_maximum(&context, futures::stream::iter([1, 5, 3, 6, 2, 20]))
        .await?;
    println!("FindMaximum(1, 5, 3, 6, 2, 20) maxima: {maxima:?}");

    println!("SquareRoot(10) = {}", calculator.square_root(&context, 10).await?);
    match calculator.square_root(&context, -2).await {
        Ok(root) => println!("SquareRoot(-2) = {root}"),
        Err(status) => println!("SquareRoot(-2) failed: {status}"),
    }
    Ok(())
}
