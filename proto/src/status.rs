use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical status codes carried on every bus reply. The numbering and
/// semantics follow the gRPC convention so gateways can map them 1:1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Code {
    Ok,
    Canceled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl Code {
    /// HTTP status the external gateway maps this code to.
    pub fn http_status(self) -> u16 {
        match self {
            Code::Ok => 200,
            Code::Canceled => 499,
            Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange => 400,
            Code::Unauthenticated => 401,
            Code::PermissionDenied => 403,
            Code::NotFound => 404,
            Code::AlreadyExists | Code::Aborted => 409,
            Code::ResourceExhausted => 429,
            Code::Unimplemented => 501,
            Code::Unavailable => 503,
            Code::DeadlineExceeded => 504,
            Code::Unknown | Code::Internal | Code::DataLoss => 500,
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Code::Ok => "ok",
            Code::Canceled => "canceled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid argument",
            Code::DeadlineExceeded => "deadline exceeded",
            Code::NotFound => "not found",
            Code::AlreadyExists => "already exists",
            Code::PermissionDenied => "permission denied",
            Code::ResourceExhausted => "resource exhausted",
            Code::FailedPrecondition => "failed precondition",
            Code::Aborted => "aborted",
            Code::OutOfRange => "out of range",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::DataLoss => "data loss",
            Code::Unauthenticated => "unauthenticated",
        };
        write!(f, "{name}")
    }
}

/// A typed error on a bus reply: one of the canonical codes plus a
/// human-readable message surfaced verbatim to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self { Self { code, message: message.into() } }

    pub fn invalid_argument(message: impl Into<String>) -> Self { Self::new(Code::InvalidArgument, message) }

    pub fn failed_precondition(message: impl Into<String>) -> Self { Self::new(Code::FailedPrecondition, message) }

    pub fn not_found(message: impl Into<String>) -> Self { Self::new(Code::NotFound, message) }

    pub fn already_exists(message: impl Into<String>) -> Self { Self::new(Code::AlreadyExists, message) }

    pub fn aborted(message: impl Into<String>) -> Self { Self::new(Code::Aborted, message) }

    pub fn unavailable(message: impl Into<String>) -> Self { Self::new(Code::Unavailable, message) }

    pub fn unimplemented(message: impl Into<String>) -> Self { Self::new(Code::Unimplemented, message) }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self { Self::new(Code::DeadlineExceeded, message) }

    pub fn internal(message: impl Into<String>) -> Self { Self::new(Code::Internal, message) }
}
