//! Error types for the streaming core
//!
//! Every synchronous call returns [`Result`]; asynchronous operations deliver
//! their terminal error through their completion callback. [`Error::code`]
//! maps each error onto a stable numeric [`ResultCode`].

/// Result type alias using the streaming [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric classification carried by every outcome
///
/// `Success` is zero, every error is negative. The values are stable and
/// may be logged or forwarded across process boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ResultCode {
    /// Operation completed
    Success = 0,
    /// Malformed init value or option
    InvalidArgument = -1,
    /// Malformed or expired join payload
    InvalidInvite = -2,
    /// Rendezvous or transport unreachable
    ConnectionFailed = -3,
    /// Operation against a closed or unknown id
    NotFound = -4,
    /// Registry, peer or buffer limit reached
    CapacityExceeded = -5,
    /// `begin_frame` while a frame is already in flight
    FrameAlreadyInProgress = -6,
    /// Invitation or transport aborted by teardown
    Cancelled = -7,
    /// Unexpected backend failure
    Internal = -8,
    /// Library used before `init` or after `destroy`
    NotInitialized = -9,
    /// `init` called twice
    AlreadyInitialized = -10,
    /// Call not valid in the current lifecycle state
    InvalidState = -11,
}

impl ResultCode {
    /// Numeric value of this code
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Whether this code classifies a success
    pub fn is_success(self) -> bool {
        self == ResultCode::Success
    }

    /// Whether this code classifies an error
    pub fn is_error(self) -> bool {
        !self.is_success()
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} ({})", self, self.as_i32())
    }
}

/// Errors that can occur in session, scene and render operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid init value or option
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Join payload is malformed, tampered with or expired
    #[error("Invalid invite: {0}")]
    InvalidInvite(String),

    /// Rendezvous or transport could not be reached
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Object, peer or session not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Registry, peer or buffer limit reached
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// A frame is already began and not yet shown or discarded
    #[error("Frame already in progress: frame {0} has not been shown or discarded")]
    FrameAlreadyInProgress(u64),

    /// Invitation or transport aborted by teardown
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Library used before init or after destroy
    #[error("Library not initialized")]
    NotInitialized,

    /// Library init called twice
    #[error("Library already initialized")]
    AlreadyInitialized,

    /// Call not valid in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Internal error (should not occur in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Numeric classification of this error
    pub fn code(&self) -> ResultCode {
        match self {
            Error::InvalidArgument(_) => ResultCode::InvalidArgument,
            Error::InvalidInvite(_) => ResultCode::InvalidInvite,
            Error::ConnectionFailed(_) => ResultCode::ConnectionFailed,
            Error::NotFound(_) => ResultCode::NotFound,
            Error::CapacityExceeded(_) => ResultCode::CapacityExceeded,
            Error::FrameAlreadyInProgress(_) => ResultCode::FrameAlreadyInProgress,
            Error::Cancelled(_) => ResultCode::Cancelled,
            Error::NotInitialized => ResultCode::NotInitialized,
            Error::AlreadyInitialized => ResultCode::AlreadyInitialized,
            Error::InvalidState(_) => ResultCode::InvalidState,
            Error::Internal(_) | Error::Io(_) => ResultCode::Internal,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ConnectionFailed(_) | Error::Io(_))
    }

    /// Check if this error reports misuse of a lifecycle (library, frame)
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(
            self,
            Error::NotInitialized
                | Error::AlreadyInitialized
                | Error::FrameAlreadyInProgress(_)
                | Error::InvalidState(_)
        )
    }

    /// Shorthand for a [`Error::NotFound`] naming the missing entity
    pub(crate) fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        Error::NotFound(format!("{} {}", what, id))
    }
}

/// Classify an outcome the way the C-style surface does
pub fn result_code<T>(result: &Result<T>) -> ResultCode {
    match result {
        Ok(_) => ResultCode::Success,
        Err(e) => e.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidArgument("test".to_string());
        assert_eq!(err.to_string(), "Invalid argument: test");

        let err = Error::FrameAlreadyInProgress(7);
        assert!(err.to_string().contains("frame 7"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::NotFound("x".to_string()).code(),
            ResultCode::NotFound
        );
        assert_eq!(Error::NotInitialized.code().as_i32(), -9);
        assert_eq!(
            Error::FrameAlreadyInProgress(1).code(),
            ResultCode::FrameAlreadyInProgress
        );
        assert!(ResultCode::Success.is_success());
        assert!(ResultCode::Cancelled.is_error());
    }

    #[test]
    fn test_result_code_of_outcome() {
        let ok: Result<u32> = Ok(1);
        let err: Result<u32> = Err(Error::CapacityExceeded("full".to_string()));
        assert_eq!(result_code(&ok), ResultCode::Success);
        assert_eq!(result_code(&err), ResultCode::CapacityExceeded);
    }

    #[test]
    fn test_error_is_retryable() {
        assert!(Error::ConnectionFailed("test".to_string()).is_retryable());
        assert!(!Error::InvalidInvite("test".to_string()).is_retryable());
    }

    #[test]
    fn test_error_is_lifecycle_error() {
        assert!(Error::AlreadyInitialized.is_lifecycle_error());
        assert!(Error::FrameAlreadyInProgress(0).is_lifecycle_error());
        assert!(!Error::NotFound("id".to_string()).is_lifecycle_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.code(), ResultCode::Internal);
    }
}
