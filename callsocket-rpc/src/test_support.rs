use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    client::Channel,
    server::{serve_stream, Dispatcher},
    Configuration,
};

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct Number {
    #[prost(int64, tag = "1")]
    pub value: i64,
}
impl prost::Name for Number {
    const NAME: &'static str = "Number";
    const PACKAGE: &'static str = "test";
}

pub fn number(value: i64) -> Number {
    Number { value }
}

/// Serve `dispatcher` over an in-memory stream, and connect a channel to it.
pub fn serve(dispatcher: Dispatcher) -> Channel {
    serve_with_handle(dispatcher).0
}

/// Like `serve`, with the server connection's task so a test can kill it.
pub fn serve_with_handle(dispatcher: Dispatcher) -> (Channel, JoinHandle<()>) {
    let (client_stream, server_stream) = tokio::io::duplex(64 * 1024);
    let configuration = Configuration::default();
    let server = tokio::spawn(serve_stream(
        server_stream,
        Arc::new(dispatcher),
        &configuration,
    ));
    let (channel, connection) = Channel::over_stream(client_stream, &configuration);
    tokio::spawn(connection);
    (channel, server)
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct Text {
    #[prost(string, tag = "1")]
    pub text: String,
}
impl prost::Name for Text {
    const NAME: &'static str = "Text";
    const PACKAGE: &'static str = "test";
}
