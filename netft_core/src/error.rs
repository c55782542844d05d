//! Error taxonomy with stable codes and recovery actions.
//!
//! Four categories: NET (sockets and connectivity), PROTO (malformed frames),
//! CAL (calibration retrieval and bias), IO (log files). Every variant maps
//! to a stable code like `NET-002` and a suggested recovery action so the
//! GUI/CLI collaborators can render actionable errors without matching on
//! variants.

use thiserror::Error;

/// Error category for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Net,
    Proto,
    Cal,
    Io,
}

/// Suggested recovery action for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    Retry,
    Reconnect,
    Fallback,
    ChooseDirectory,
    Manual,
}

#[derive(Debug, Error, Clone)]
pub enum NetftError {
    // NET
    #[error("connection refused by {host}:{port}")]
    ConnectRefused { host: String, port: u16 },
    #[error("connection to {host}:{port} timed out after {timeout_ms} ms")]
    ConnectTimeout {
        host: String,
        port: u16,
        timeout_ms: u64,
    },
    #[error("lost connection to {host}")]
    Disconnected { host: String },
    #[error("socket error during {operation}: {detail}")]
    Socket { operation: String, detail: String },

    // PROTO
    #[error("malformed {protocol} frame: expected {expected} bytes, got {actual}")]
    MalformedFrame {
        protocol: String,
        expected: usize,
        actual: usize,
    },
    #[error("unexpected {protocol} response: {detail}")]
    UnexpectedResponse { protocol: String, detail: String },

    // CAL
    #[error("http calibration failed: {0}")]
    CalibrationHttp(String),
    #[error("tcp calibration failed: {0}")]
    CalibrationTcp(String),
    #[error("calibration parse failed: {0}")]
    CalibrationParse(String),
    #[error("calibration unavailable: {0}")]
    CalibrationUnavailable(String),
    #[error("bias failed: {0}")]
    BiasFailed(String),

    // IO
    #[error("output directory not writable: {0}")]
    DirectoryNotWritable(String),
    #[error("disk full while writing {0}")]
    DiskFull(String),
    #[error("log rotation failed: {0}")]
    RotationFailed(String),
    #[error("write failed on {path}: {detail}")]
    WriteFailed { path: String, detail: String },
    #[error("close failed on {path}: {detail}")]
    CloseFailed { path: String, detail: String },

    #[error("invalid state: {0}")]
    State(String),
}

impl NetftError {
    pub fn category(&self) -> ErrorCategory {
        use NetftError::*;
        match self {
            ConnectRefused { .. } | ConnectTimeout { .. } | Disconnected { .. } | Socket { .. } => {
                ErrorCategory::Net
            }
            MalformedFrame { .. } | UnexpectedResponse { .. } => ErrorCategory::Proto,
            CalibrationHttp(_)
            | CalibrationTcp(_)
            | CalibrationParse(_)
            | CalibrationUnavailable(_)
            | BiasFailed(_) => ErrorCategory::Cal,
            DirectoryNotWritable(_)
            | DiskFull(_)
            | RotationFailed(_)
            | WriteFailed { .. }
            | CloseFailed { .. } => ErrorCategory::Io,
            State(_) => ErrorCategory::Net,
        }
    }

    /// Stable user-facing code, e.g. `NET-002`.
    pub fn code(&self) -> &'static str {
        use NetftError::*;
        match self {
            ConnectRefused { .. } => "NET-001",
            ConnectTimeout { .. } => "NET-002",
            Disconnected { .. } => "NET-003",
            Socket { .. } => "NET-004",
            State(_) => "NET-005",
            MalformedFrame { .. } => "PROTO-001",
            UnexpectedResponse { .. } => "PROTO-002",
            CalibrationHttp(_) => "CAL-001",
            CalibrationTcp(_) => "CAL-002",
            CalibrationParse(_) => "CAL-003",
            CalibrationUnavailable(_) => "CAL-004",
            BiasFailed(_) => "CAL-005",
            DirectoryNotWritable(_) => "IO-001",
            DiskFull(_) => "IO-002",
            RotationFailed(_) => "IO-003",
            WriteFailed { .. } => "IO-004",
            CloseFailed { .. } => "IO-005",
        }
    }

    pub fn recovery(&self) -> RecoveryAction {
        use NetftError::*;
        match self {
            ConnectRefused { .. } | Disconnected { .. } | Socket { .. } => RecoveryAction::Reconnect,
            ConnectTimeout { .. } => RecoveryAction::Retry,
            MalformedFrame { .. } | UnexpectedResponse { .. } => RecoveryAction::Reconnect,
            CalibrationHttp(_) | BiasFailed(_) => RecoveryAction::Fallback,
            CalibrationTcp(_) | CalibrationParse(_) => RecoveryAction::Retry,
            CalibrationUnavailable(_) | CloseFailed { .. } | State(_) => RecoveryAction::Manual,
            DirectoryNotWritable(_) | DiskFull(_) | RotationFailed(_) | WriteFailed { .. } => {
                RecoveryAction::ChooseDirectory
            }
        }
    }

    /// Classify a proto-layer failure against a known endpoint.
    pub fn from_proto(e: &netft_proto::ProtoError, host: &str, port: u16) -> Self {
        use netft_proto::ProtoError as P;
        match e {
            P::Io(io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
                NetftError::ConnectRefused {
                    host: host.to_string(),
                    port,
                }
            }
            P::Io(io) => NetftError::Socket {
                operation: "io".into(),
                detail: io.to_string(),
            },
            P::ConnectTimeout { timeout_ms, .. } => NetftError::ConnectTimeout {
                host: host.to_string(),
                port,
                timeout_ms: *timeout_ms,
            },
            P::BadLength {
                protocol,
                expected,
                actual,
            } => NetftError::MalformedFrame {
                protocol: (*protocol).to_string(),
                expected: *expected,
                actual: *actual,
            },
            P::BadHeader { protocol, .. } => NetftError::UnexpectedResponse {
                protocol: (*protocol).to_string(),
                detail: e.to_string(),
            },
            P::Closed => NetftError::Disconnected {
                host: host.to_string(),
            },
            P::Http(detail) => NetftError::CalibrationHttp(detail.clone()),
            P::MissingField(_) | P::InvalidCalibration { .. } => {
                NetftError::CalibrationParse(e.to_string())
            }
        }
    }
}

/// Construction/configuration failures, raised before any thread starts.
#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_and_categorized() {
        let e = NetftError::ConnectTimeout {
            host: "192.168.1.1".into(),
            port: 49151,
            timeout_ms: 2000,
        };
        assert_eq!(e.code(), "NET-002");
        assert_eq!(e.category(), ErrorCategory::Net);
        assert_eq!(e.recovery(), RecoveryAction::Retry);

        let e = NetftError::RotationFailed("disk gone".into());
        assert_eq!(e.code(), "IO-003");
        assert_eq!(e.recovery(), RecoveryAction::ChooseDirectory);
    }

    #[test]
    fn proto_bad_length_maps_to_malformed_frame() {
        let proto = netft_proto::ProtoError::BadLength {
            protocol: "RDT",
            expected: 36,
            actual: 35,
        };
        let e = NetftError::from_proto(&proto, "10.0.0.2", 49152);
        assert_eq!(e.code(), "PROTO-001");
        assert_eq!(e.category(), ErrorCategory::Proto);
    }
}
