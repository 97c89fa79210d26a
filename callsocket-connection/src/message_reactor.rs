/// Receives a connection's inbound messages, in the order they arrived.
///
/// The reactor lives inside its connection and is dropped with it, so `Drop` is
/// where a reactor learns that the stream is gone.
pub trait MessageReactor: 'static {
    /// The decoded inbound message type.
    type Inbound;

    /// Handle one message, on the connection's task.
    ///
    /// Reading pauses while this runs. Hand long work to another task, and return
    /// `Disconnect` to close the connection.
    fn on_inbound_message(&mut self, message: Self::Inbound) -> ReactorStatus;
}

/// Whether the connection keeps going after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorStatus {
    /// Keep reading.
    Continue,
    /// Close the connection.
    Disconnect,
}
