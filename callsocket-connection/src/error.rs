/// Why a `Decoder` could not produce a message from the bytes it was offered.
#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    /// The buffer holds a partial message. It is retained, and decode is
    /// called again once more bytes arrive.
    #[error("need {next_message_size}b to decode the next message")]
    IncompleteBuffer {
        /// Size hint for the next message. A connection drops the stream if this
        /// exceeds its max buffer length.
        next_message_size: usize,
    },
    /// The stream is corrupt and the connection is closed.
    #[error("invalid buffer")]
    InvalidBuffer,
    /// The next `distance` bytes are discarded without producing a message.
    #[error("skip {distance}b")]
    SkipMessage {
        /// How many bytes to skip. Decode may be called again with the same
        /// bytes if fewer than `distance` are buffered.
        distance: usize,
    },
}
