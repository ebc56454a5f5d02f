// Error taxonomy for the gateway
use std::fmt;

#[derive(Debug)]
pub enum GatewayError {
    // Wire-level errors
    FrameIncomplete { expected: usize, got: usize },
    FrameMalformed(String),

    // Request validation
    ValidationFailed(Vec<String>),

    // Downstream errors
    EsbUnavailable(String),
    LimitExceeded,

    // Socket errors
    Io(std::io::Error),

    // Anything else
    Internal(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrameIncomplete { expected, got } => {
                write!(f, "Incomplete frame: expected {} bytes, got {}", expected, got)
            }
            Self::FrameMalformed(msg) => write!(f, "Malformed frame: {}", msg),
            Self::ValidationFailed(errors) => {
                write!(f, "Validation failed: {}", errors.join("; "))
            }
            Self::EsbUnavailable(msg) => write!(f, "ESB unavailable: {}", msg),
            Self::LimitExceeded => write!(f, "Transaction amount exceeds allowed limit"),
            Self::Io(e) => write!(f, "Socket error: {}", e),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Io(err)
    }
}

impl GatewayError {
    /// ISO field 39 code reported to the ATM for this error class.
    pub fn response_code(&self) -> &'static str {
        match self {
            Self::FrameIncomplete { .. } | Self::FrameMalformed(_) => "30",
            Self::ValidationFailed(_) => "30",
            Self::EsbUnavailable(_) => "96",
            Self::LimitExceeded => "61",
            Self::Io(_) => "96",
            Self::Internal(_) => "96",
        }
    }

    pub fn is_recoverable(&self) -> bool {
        // Socket failures drop the connection; everything else is answered in-band.
        !matches!(self, Self::Io(_) | Self::FrameIncomplete { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_codes() {
        assert_eq!(GatewayError::FrameMalformed("x".into()).response_code(), "30");
        assert_eq!(GatewayError::LimitExceeded.response_code(), "61");
        assert_eq!(GatewayError::EsbUnavailable("down".into()).response_code(), "96");
        assert_eq!(
            GatewayError::ValidationFailed(vec!["Field 2 missing".into()]).response_code(),
            "30"
        );
    }

    #[test]
    fn test_recoverability() {
        let io = GatewayError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe"));
        assert!(!io.is_recoverable());
        assert!(GatewayError::LimitExceeded.is_recoverable());
    }
}
