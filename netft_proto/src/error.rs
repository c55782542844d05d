use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("connect to {host}:{port} timed out after {timeout_ms} ms")]
    ConnectTimeout {
        host: String,
        port: u16,
        timeout_ms: u64,
    },
    #[error("malformed {protocol} frame: expected {expected} bytes, got {actual}")]
    BadLength {
        protocol: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("bad {protocol} header: expected 0x{expected:04X}, got 0x{actual:04X}")]
    BadHeader {
        protocol: &'static str,
        expected: u16,
        actual: u16,
    },
    #[error("connection closed by sensor")]
    Closed,
    #[error("http request failed: {0}")]
    Http(String),
    #[error("calibration document missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid calibration value for {field}: {value}")]
    InvalidCalibration { field: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, ProtoError>;
