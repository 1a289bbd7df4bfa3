//! Canonical RPC status codes
//!
//! Injected error kinds arrive from the oracle as gRPC code names
//! (`"UNAVAILABLE"`), numeric gRPC codes or numeric HTTP statuses. This
//! module resolves them to a code each adapter can render natively.

use std::fmt;

use serde::{Deserialize, Serialize};

/// gRPC canonical status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcStatus {
    Ok,
    Cancelled,
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

const ALL: [RpcStatus; 17] = [
    RpcStatus::Ok,
    RpcStatus::Cancelled,
    RpcStatus::Unknown,
    RpcStatus::InvalidArgument,
    RpcStatus::DeadlineExceeded,
    RpcStatus::NotFound,
    RpcStatus::AlreadyExists,
    RpcStatus::PermissionDenied,
    RpcStatus::ResourceExhausted,
    RpcStatus::FailedPrecondition,
    RpcStatus::Aborted,
    RpcStatus::OutOfRange,
    RpcStatus::Unimplemented,
    RpcStatus::Internal,
    RpcStatus::Unavailable,
    RpcStatus::DataLoss,
    RpcStatus::Unauthenticated,
];

impl RpcStatus {
    /// Numeric gRPC code
    pub const fn code(self) -> u16 {
        match self {
            Self::Ok => 0,
            Self::Cancelled => 1,
            Self::Unknown => 2,
            Self::InvalidArgument => 3,
            Self::DeadlineExceeded => 4,
            Self::NotFound => 5,
            Self::AlreadyExists => 6,
            Self::PermissionDenied => 7,
            Self::ResourceExhausted => 8,
            Self::FailedPrecondition => 9,
            Self::Aborted => 10,
            Self::OutOfRange => 11,
            Self::Unimplemented => 12,
            Self::Internal => 13,
            Self::Unavailable => 14,
            Self::DataLoss => 15,
            Self::Unauthenticated => 16,
        }
    }

    /// Canonical upper-case name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Cancelled => "CANCELLED",
            Self::Unknown => "UNKNOWN",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::Aborted => "ABORTED",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::Unimplemented => "UNIMPLEMENTED",
            Self::Internal => "INTERNAL",
            Self::Unavailable => "UNAVAILABLE",
            Self::DataLoss => "DATA_LOSS",
            Self::Unauthenticated => "UNAUTHENTICATED",
        }
    }

    /// Look up a status by numeric gRPC code
    pub fn from_code(code: u16) -> Option<Self> {
        ALL.into_iter().find(|s| s.code() == code)
    }

    /// Look up a status by name, case-insensitively (`"unavailable"`, `"UNAVAILABLE"`)
    pub fn from_name(name: &str) -> Option<Self> {
        ALL.into_iter().find(|s| s.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Resolve an injected error kind for the gRPC adapter
    ///
    /// Accepts names and numeric gRPC codes; anything else is `UNKNOWN`.
    pub fn resolve(kind: &str) -> Self {
        Self::from_name(kind)
            .or_else(|| kind.trim().parse::<u16>().ok().and_then(Self::from_code))
            .unwrap_or(Self::Unknown)
    }

    /// Conventional HTTP status for this code
    pub const fn http_status(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::Cancelled => 499,
            Self::InvalidArgument | Self::FailedPrecondition | Self::OutOfRange => 400,
            Self::DeadlineExceeded => 504,
            Self::NotFound => 404,
            Self::AlreadyExists | Self::Aborted => 409,
            Self::PermissionDenied => 403,
            Self::ResourceExhausted => 429,
            Self::Unimplemented => 501,
            Self::Unavailable => 503,
            Self::Unauthenticated => 401,
            Self::Unknown | Self::Internal | Self::DataLoss => 500,
        }
    }

    /// Best matching code for an HTTP status
    pub const fn from_http_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Ok,
            400 => Self::InvalidArgument,
            401 => Self::Unauthenticated,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            409 => Self::Aborted,
            429 => Self::ResourceExhausted,
            499 => Self::Cancelled,
            501 => Self::Unimplemented,
            502 | 503 => Self::Unavailable,
            504 => Self::DeadlineExceeded,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for RpcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolve an injected error kind to an HTTP status code
///
/// Numeric kinds in `100..=599` are taken as HTTP statuses; gRPC names map
/// through [`RpcStatus::http_status`]; anything else is `500`.
pub fn resolve_http_status(kind: &str) -> u16 {
    if let Ok(status) = kind.trim().parse::<u16>() {
        if (100..=599).contains(&status) {
            return status;
        }
    }
    RpcStatus::from_name(kind).map_or(500, RpcStatus::http_status)
}
