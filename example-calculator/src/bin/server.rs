use std::{net::SocketAddr, sync::Arc, time::Duration};

use callsocket::TcpSocketListener;
use callsocket_rpc::{server::SocketRpcServer, Configuration};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let address: SocketAddr = std::env::var("HOST")
        .unwrap_or_else(|_| "0.0.0.0:50051".to_string())
        .parse()?;
    let listener = TcpSocketListener::listen(address, 1024, Some(Duration::from_secs(60)))?;
    let dispatcher = Arc::new(example_calculator::dispatcher()?);
    log::info!("calculator server running on {address}");

    tokio::spawn(SocketRpcServer::new(
        listener,
        dispatcher,
        Configuration::default(),
    ))
    .await?;
    Ok(())
}
