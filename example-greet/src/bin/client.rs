use std::time::Duration;

use callsocket_rpc::{client, CallContext, Configuration};
use example_greet::{messages::Greeting, GreetClient};

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
    let greeter = GreetClient::new(channel);
    let context = CallContext::background();
    let felipe = Greeting::new("Felipe", "Sulzbach");

    println!("Greet: {}", greeter.greet(&context, felipe.clone()).await?);

    let mut greetings = greeter.greet_many_times(&context, felipe.clone()).await?;
    while let Some(greeting) = greetings.recv().await? {
        println!("GreetManyTimes: {}", greeting.result);
    }

    let everyone = ["Ana", "Bia", "Caio"].map(|name| Greeting::new(name, ""));
    println!(
        "LongGreet: {}",
        greeter.long_greet(&context, everyone.clone()).await?
    );
    for result in greeter
        .greet_everyone(&context, futures::stream::iter(everyone))
        .await?
    {
        println!("GreetEveryone: {result}");
    }

    for budget in [Duration::from_secs(5), Duration::from_secs(1)] {
        let context = CallContext::background().with_deadline(budget);
        match greeter.greet_with_deadline(&context, felipe.clone()).await {
            Ok(result) => println!("GreetWithDeadline within {budget:?}: {result}"),
            Err(status) => println!("GreetWithDeadline within {budget:?} failed: {status}"),
        }
    }
    Ok(())
}
