use bytes::Buf;

use crate::DeserializeError;

/// Turns outbound messages into bytes for the stream.
pub trait Encoder {
    /// What gets encoded.
    type Message;

    /// The encoded form. The connection writes it with vectored writes, chunk by chunk.
    type Serialized: Buf;

    /// Encode one message. The result is written in full before the next one starts.
    fn encode(&mut self, message: Self::Message) -> Self::Serialized;

    /// Receives every serialized buffer back after it has been written, possibly
    /// not advanced to its end. Keep it for reuse if that helps; it is dropped otherwise.
    fn return_buffer(&mut self, _buffer: Self::Serialized) {}
}

/// Turns inbound bytes into messages.
pub trait Decoder {
    /// What gets decoded.
    type Message;

    /// Decode the first message in `buffer`, returning how many bytes it used.
    ///
    /// The buffer starts at a message boundary and may hold several messages, or only
    /// part of one. Never report more bytes than the decoded message occupies.
    fn decode(&mut self, buffer: impl Buf) -> Result<(usize, Self::Message), DeserializeError>;
}

/// Both halves of a connection's wire format.
///
/// Write your own, or pair an `Encoder` with a `Decoder` in a tuple.
pub trait Codec: Encoder + Decoder {}

impl<E: Encoder, D: Decoder> Codec for (E, D) {}

impl<E: Encoder, D: Decoder> Encoder for (E, D) {
    type Message = E::Message;
    type Serialized = E::Serialized;

    fn encode(&mut self, message: Self::Message) -> Self::Serialized {
        self.0.encode(message)
    }

    fn return_buffer(&mut self, buffer: Self::Serialized) {
        self.0.return_buffer(buffer)
    }
}

impl<E: Encoder, D: Decoder> Decoder for (E, D) {
    type Message = D::Message;

    fn decode(&mut self, buffer: impl Buf) -> Result<(usize, Self::Message), DeserializeError> {
        self.1.decode(buffer)
    }
}
