/// Configuration for a `callsocket` rpc connection, client or server.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub(crate) max_buffer_length: usize,
    pub(crate) buffer_allocation_increment: usize,
    pub(crate) max_queued_outbound_messages: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            max_buffer_length: 4 * (1 << 20),
            buffer_allocation_increment: 16 * (2 << 11),
            max_queued_outbound_messages: 256,
        }
    }
}

impl Configuration {
    /// Max buffer length limits the max message size. Try to use a buffer length that is at least 4 times the largest message you want to support.
    ///
    /// Default: 4MiB
    pub fn max_buffer_length(&mut self, max_buffer_length: usize) {
        self.max_buffer_length = max_buffer_length;
    }

    /// How much the receive buffer grows by when it needs more room.
    ///
    /// Default: 64KiB
    pub fn buffer_allocation_increment(&mut self, buffer_allocation_increment: usize) {
        self.buffer_allocation_increment = buffer_allocation_increment;
    }

    /// Max frames that will be queued up waiting for send on the connection.
    /// Senders wait when the queue is full.
    ///
    /// Default: 256
    pub fn max_queued_outbound_messages(&mut self, max_queued_outbound_messages: usize) {
        self.max_queued_outbound_messages = max_queued_outbound_messages;
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use super::Configuration;
    use crate::{
        client::Channel,
        server::{serve_stream, Dispatcher},
        test_support::{number, Number, Text},
        CallContext, Code, Status,
    };

    async fn repeat(_context: CallContext, request: Number) -> Result<Text, Status> {
        let length = usize::try_from(request.value)
            .map_err(|_| Status::invalid_argument("negative length"))?;
        Ok(Text {
            text: "x".repeat(length),
        })
    }

    async fn sum(
        _context: CallContext,
        mut requests: crate::MessageStream<Number>,
    ) -> Result<Number, Status> {
        let mut total = 0;
        while let Some(request) = requests.recv().await? {
            total += request.value;
        }
        Ok(number(total))
    }

    async fn send_many(channel: &Channel, count: i64) -> Result<Number, Status> {
        let mut call = channel
            .client_streaming::<Number, Number>("Sum", &CallContext::background())
            .await?;
        for i in 0..count {
            call.send(&number(i)).await?;
        }
        call.close_and_recv().await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn a_short_outbound_queue_applies_backpressure_without_stalling() {
        let mut dispatcher = Dispatcher::new();
        dispatcher
            .register_client_streaming("Sum", sum)
            .expect("register");
        let mut configuration = Configuration::default();
        configuration.max_queued_outbound_messages(4);

        let (client_stream, server_stream) = tokio::io::duplex(1024);
        tokio::spawn(serve_stream(
            server_stream,
            Arc::new(dispatcher),
            &configuration,
        ));
        let (channel, connection) = Channel::over_stream(client_stream, &configuration);
        tokio::spawn(connection);

        let total = tokio::time::timeout(Duration::from_secs(5), send_many(&channel, 2000))
            .await
            .expect("a full send queue must not stall the connection")
            .expect("sum");
        assert_eq!(1_999_000, total.value);
    }

    #[tokio::test]
    async fn a_response_larger_than_the_buffer_closes_the_connection() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register_unary("Repeat", repeat).expect("register");
        let (client_stream, server_stream) = tokio::io::duplex(64 * 1024);
        tokio::spawn(serve_stream(
            server_stream,
            Arc::new(dispatcher),
            &Configuration::default(),
        ));

        let mut configuration = Configuration::default();
        configuration.max_buffer_length(1024);
        configuration.buffer_allocation_increment(256);
        configuration.max_queued_outbound_messages(4);
        let (channel, connection) = Channel::over_stream(client_stream, &configuration);
        tokio::spawn(connection);

        let context = CallContext::background();
        let small: Text = channel
            .unary("Repeat", &context, &number(600))
            .await
            .expect("fits in the buffer");
        assert_eq!(600, small.text.len());

        let status = channel
            .unary::<Number, Text>("Repeat", &context, &number(100_000))
            .await
            .expect_err("too large");
        assert_eq!(Code::Internal, status.code());
        assert!(!channel.is_alive());
    }
}
