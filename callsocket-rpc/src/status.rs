use crate::Error;

/// The closed set of call outcomes.
///
/// Wire values follow the grpc numbering. Unrecognized values decode as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// The call succeeded.
    Ok,
    /// The call was canceled before it completed.
    Canceled,
    /// The method is not known, or the failure could not be classified.
    Unknown,
    /// The handler rejected the request value.
    InvalidArgument,
    /// The call's deadline passed before it completed.
    DeadlineExceeded,
    /// Something unanticipated broke, like a corrupt transport or a protocol violation.
    Internal,
}

impl Code {
    /// Decode a wire value.
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::Ok,
            1 => Self::Canceled,
            3 => Self::InvalidArgument,
            4 => Self::DeadlineExceeded,
            13 => Self::Internal,
            _ => Self::Unknown,
        }
    }

    /// The wire value for this code.
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Canceled => 1,
            Self::Unknown => 2,
            Self::InvalidArgument => 3,
            Self::DeadlineExceeded => 4,
            Self::Internal => 13,
        }
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::Canceled => "CANCELED",
            Self::Unknown => "UNKNOWN",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::Internal => "INTERNAL",
        })
    }
}

/// The terminal outcome of a call: a code and a human readable message.
///
/// `Status` travels as its own frame, never inside a payload, so the far side
/// can tell a rejected request from a response without decoding anything.
/// Handlers return it with `?`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    pub(crate) fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub(crate) fn ok() -> Self {
        Self::new(Code::Ok, "")
    }

    /// Only a context's deadline produces this.
    pub(crate) fn deadline_exceeded() -> Self {
        Self::new(Code::DeadlineExceeded, "deadline exceeded")
    }

    /// The call was canceled.
    pub fn canceled(message: impl Into<String>) -> Self {
        Self::new(Code::Canceled, message)
    }

    /// The request value was rejected.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    /// An unanticipated failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    /// An unrouted call, or a failure without a better code.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(Code::Unknown, message)
    }

    /// Map a local rpc failure to the status a caller sees.
    pub fn classify(error: &Error) -> Self {
        match error {
            Error::IoFailure(_)
            | Error::ConnectionIsClosed
            | Error::DuplicateMethod(_)
            | Error::UnexpectedSchema { .. }
            | Error::Decode(_)
            | Error::ProtocolViolation(_) => Self::internal(error.to_string()),
        }
    }

    /// This status's code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// This status's message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// True for `OK`.
    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }
}

impl From<Error> for Status {
    fn from(error: Error) -> Self {
        Self::classify(&error)
    }
}

#[cfg(test)]
mod test {
    use super::{Code, Status};
    use crate::Error;

    #[test]
    fn wire_codes_round_trip_and_unrecognized_values_are_unknown() {
        for code in [
            Code::Ok,
            Code::Canceled,
            Code::Unknown,
            Code::InvalidArgument,
            Code::DeadlineExceeded,
            Code::Internal,
        ] {
            assert_eq!(code, Code::from_i32(code.as_i32()));
        }
        assert_eq!(Code::Unknown, Code::from_i32(5));
        assert_eq!(Code::Unknown, Code::from_i32(-1));
    }

    #[test]
    fn rpc_errors_classify_as_internal() {
        let errors = [
            Error::ConnectionIsClosed,
            Error::DuplicateMethod("Sum".to_string()),
            Error::UnexpectedSchema {
                expected: "a.B".to_string(),
                actual: "c.D".to_string(),
            },
            Error::ProtocolViolation("stray frame"),
            Error::IoFailure(std::io::ErrorKind::BrokenPipe.into()),
        ];
        for error in errors {
            let status = Status::classify(&error);
            assert_eq!(Code::Internal, status.code(), "{error}");
            assert_eq!(error.to_string(), status.message());
        }
    }

    #[test]
    fn status_display_names_the_code() {
        let status = Status::invalid_argument("Received a negative number: -2");
        assert_eq!(
            "INVALID_ARGUMENT: Received a negative number: -2",
            status.to_string()
        );
        assert!(!status.is_ok());
        assert!(Status::ok().is_ok());
    }
}
