//! The error taxonomy observable on [`crate::operation::OperationResult::error_kind`].

use thiserror::Error;

/// Result type shared by every crate in the workspace.
pub type Result<T> = std::result::Result<T, FleetError>;

/// Top-level error taxonomy, as described below.
///
/// This is the *kind*, not the full error: callers that need the wire
/// detail (an RPC error's `code`/`message`, an HTTP status) read it off
/// the variant's payload.
#[derive(Debug, Clone, Error)]
pub enum FleetError {
    /// Target MAC not in the registry.
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    /// Transport could not reach the IP (DNS/connect/timeout).
    #[error("device unreachable: {0}")]
    Unreachable(String),

    /// The call was in flight past its deadline.
    #[error("operation timed out")]
    Timeout,

    /// Explicit cancellation.
    #[error("operation cancelled")]
    Cancelled,

    /// Neither the Catalogue nor the ParameterMapping knows this logical name.
    #[error("unsupported parameter: {0}")]
    UnsupportedParameter(String),

    /// The declared `parameter_path` does not exist in the actual payload.
    #[error("path missing in response: {0}")]
    PathMissing(String),

    /// Value cannot be coerced to the declared type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// The device returned a protocol-level failure (Gen1 `error` field, Gen2 RPC error object).
    #[error("device error {code}: {message}")]
    DeviceError { code: i64, message: String },

    /// Non-200 HTTP without a structured error body.
    #[error("http error: {0}")]
    HttpError(u16),

    /// The all-devices safety interlock fired for a destructive verb.
    #[error("confirmation required for this operation")]
    ConfirmationRequired,

    /// Caller-contract violation (unknown group name, malformed logical name, invalid enum value).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Everything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FleetError {
    /// The `error_kind` string as it appears on `OperationResult`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownDevice(_) => "unknown-device",
            Self::Unreachable(_) => "unreachable",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::UnsupportedParameter(_) => "unsupported-parameter",
            Self::PathMissing(_) => "path-missing",
            Self::TypeMismatch { .. } => "type-mismatch",
            Self::DeviceError { .. } => "device-error",
            Self::HttpError(_) => "http-error",
            Self::ConfirmationRequired => "confirmation-required",
            Self::InvalidRequest(_) => "invalid-request",
            Self::Internal(_) => "internal",
        }
    }
}
