use std::time::Duration;

use bytes::Bytes;
use callsocket_prost::{ProstDecoder, ProstEncoder};

use crate::{Code, Error, Status};

/// The codec for rpc connections: length-delimited protocol buffers `Frame`s.
pub type FrameCodec = (ProstEncoder<Frame>, ProstDecoder<Frame>);

/// One unit on the wire. Every frame belongs to exactly one call.
///
/// Client to server: `Open`, then `Message`s, then optionally `CloseSend`.
/// A client may send `Cancel` at any time.
/// Server to client: `Message`s, then exactly one `Status`. An `OK` status is the end of stream.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Frame {
    /// Unique within the connection, chosen by the client.
    #[prost(uint64, tag = "1")]
    pub call_id: u64,
    /// A [`FrameKind`].
    #[prost(enumeration = "FrameKind", tag = "2")]
    pub kind: i32,
    /// `Open` only: the method to route to.
    #[prost(string, tag = "3")]
    pub method: String,
    /// `Open` only: a [`Convention`].
    #[prost(enumeration = "Convention", tag = "4")]
    pub convention: i32,
    /// `Open` only: the remaining call budget in milliseconds. 0 is no deadline.
    #[prost(uint64, tag = "5")]
    pub deadline_millis: u64,
    /// `Message` only: the message type tag.
    #[prost(string, tag = "6")]
    pub schema: String,
    /// `Message` only: the encoded message.
    #[prost(bytes = "bytes", tag = "7")]
    pub payload: Bytes,
    /// `Status` and `Cancel` only: a [`Code`] wire value.
    #[prost(int32, tag = "8")]
    pub status_code: i32,
    /// `Status` and `Cancel` only.
    #[prost(string, tag = "9")]
    pub status_message: String,
}

/// What a frame means for its call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum FrameKind {
    /// Start a call.
    Open = 0,
    /// One message in the sender's direction.
    Message = 1,
    /// The client will send no more messages.
    CloseSend = 2,
    /// The server's terminal status for the call.
    Status = 3,
    /// The client abandoned the call.
    Cancel = 4,
}

/// How many messages flow in each direction of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Convention {
    /// One request, one response.
    Unary = 0,
    /// One request, a stream of responses.
    ServerStreaming = 1,
    /// A stream of requests, one response.
    ClientStreaming = 2,
    /// Independent streams of requests and responses.
    BidiStreaming = 3,
}

impl std::fmt::Display for Convention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Unary => "unary",
            Self::ServerStreaming => "server-streaming",
            Self::ClientStreaming => "client-streaming",
            Self::BidiStreaming => "bidi-streaming",
        })
    }
}

impl Frame {
    pub(crate) fn open(
        call_id: u64,
        method: &str,
        convention: Convention,
        budget: Option<Duration>,
    ) -> Self {
        Self {
            call_id,
            kind: FrameKind::Open.into(),
            method: method.to_string(),
            convention: convention.into(),
            // Round up so a sub-millisecond budget is not mistaken for no deadline.
            deadline_millis: budget
                .map(|budget| {
                    u64::try_from(budget.as_micros().div_ceil(1000))
                        .unwrap_or(u64::MAX)
                        .max(1)
                })
                .unwrap_or_default(),
            ..Default::default()
        }
    }

    pub(crate) fn message(call_id: u64, payload: Payload) -> Self {
        Self {
            call_id,
            kind: FrameKind::Message.into(),
            schema: payload.schema,
            payload: payload.bytes,
            ..Default::default()
        }
    }

    pub(crate) fn close_send(call_id: u64) -> Self {
        Self {
            call_id,
            kind: FrameKind::CloseSend.into(),
            ..Default::default()
        }
    }

    pub(crate) fn status(call_id: u64, status: &Status) -> Self {
        Self::terminal(call_id, FrameKind::Status, status)
    }

    pub(crate) fn cancel(call_id: u64, cause: &Status) -> Self {
        Self::terminal(call_id, FrameKind::Cancel, cause)
    }

    fn terminal(call_id: u64, kind: FrameKind, status: &Status) -> Self {
        Self {
            call_id,
            kind: kind.into(),
            status_code: status.code().as_i32(),
            status_message: status.message().to_string(),
            ..Default::default()
        }
    }

    /// The call budget carried by an `Open` frame.
    pub fn budget(&self) -> Option<Duration> {
        match self.deadline_millis {
            0 => None,
            millis => Some(Duration::from_millis(millis)),
        }
    }

    /// The status carried by a `Status` or `Cancel` frame.
    pub fn to_status(&self) -> Status {
        Status::new(
            Code::from_i32(self.status_code),
            self.status_message.clone(),
        )
    }

    pub(crate) fn into_payload(self) -> Payload {
        Payload {
            schema: self.schema,
            bytes: self.payload,
        }
    }
}

/// An opaque message: encoded bytes and a tag naming their type.
///
/// Immutable once built. Typed access goes through `prost::Name`, so a payload
/// decoded as the wrong type fails instead of producing garbage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    schema: String,
    bytes: Bytes,
}

impl Payload {
    /// Wrap already-encoded bytes.
    pub fn new(schema: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            schema: schema.into(),
            bytes,
        }
    }

    /// Encode a message, tagged with its full protocol buffers name.
    pub fn encode<M>(message: &M) -> Self
    where
        M: prost::Message + prost::Name,
    {
        Self {
            schema: M::full_name(),
            bytes: message.encode_to_vec().into(),
        }
    }

    /// Decode the payload as `M`. Fails if the payload is tagged as another type.
    pub fn decode<M>(&self) -> crate::Result<M>
    where
        M: prost::Message + prost::Name + Default,
    {
        let expected = M::full_name();
        if expected != self.schema {
            return Err(Error::UnexpectedSchema {
                expected,
                actual: self.schema.clone(),
            });
        }
        Ok(M::decode(self.bytes.clone())?)
    }

    /// The message type tag.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// The encoded message.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::{test_support::Number, Code, Error, FrameKind, Payload, Status};

    use super::Frame;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Word {
        #[prost(string, tag = "1")]
        text: String,
    }
    impl prost::Name for Word {
        const NAME: &'static str = "Word";
        const PACKAGE: &'static str = "test";
    }

    #[test]
    fn payload_rejects_a_different_schema() {
        let payload = Payload::encode(&Number { value: 9 });
        assert_eq!("test.Number", payload.schema());
        assert_eq!(9, payload.decode::<Number>().expect("same type decodes").value);

        match payload.decode::<Word>() {
            Err(Error::UnexpectedSchema { expected, actual }) => {
                assert_eq!("test.Word", expected);
                assert_eq!("test.Number", actual);
            }
            other => panic!("expected a schema mismatch, got {other:?}"),
        }
    }

    #[test]
    fn open_carries_the_budget_rounded_up() {
        let frame = Frame::open(
            3,
            "Sum",
            crate::Convention::Unary,
            Some(Duration::from_micros(1500)),
        );
        assert_eq!(Ok(FrameKind::Open), FrameKind::try_from(frame.kind));
        assert_eq!(Some(Duration::from_millis(2)), frame.budget());

        let tiny = Frame::open(4, "Sum", crate::Convention::Unary, Some(Duration::ZERO));
        assert_eq!(Some(Duration::from_millis(1)), tiny.budget());

        let unbounded = Frame::open(5, "Sum", crate::Convention::Unary, None);
        assert_eq!(None, unbounded.budget());

        let enormous = Frame::open(6, "Sum", crate::Convention::Unary, Some(Duration::MAX));
        assert_eq!(u64::MAX, enormous.deadline_millis);
        assert_eq!(Some(Duration::from_millis(u64::MAX)), enormous.budget());
    }

    #[test]
    fn terminal_frames_carry_their_status() {
        let frame = Frame::status(7, &Status::invalid_argument("negative"));
        assert_eq!(Code::InvalidArgument, frame.to_status().code());
        assert_eq!("negative", frame.to_status().message());

        let cancel = Frame::cancel(7, &Status::canceled("gave up"));
        assert_eq!(Ok(FrameKind::Cancel), FrameKind::try_from(cancel.kind));
        assert_eq!(Status::canceled("gave up"), cancel.to_status());
    }
}
