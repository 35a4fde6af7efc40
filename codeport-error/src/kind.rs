//! What went wrong, grouped by the stage of the translate / build / run loop.

use std::fmt;

/// The kind of error that occurred.
///
/// The CLI and tests match on this; nothing in codeport retries on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // --- setup ---
    /// Missing API key, malformed config file or compiler override
    ConfigInvalid,
    /// Bad user input, such as empty Python source or an unknown sample
    InvalidArgument,

    // --- model ---
    /// The model call failed or the reply held no code
    InferenceFailed,
    /// The provider rejected the API key
    AuthenticationFailed,
    /// The provider answered with a server error or could not be set up
    ProviderUnavailable,
    RateLimited,

    // --- native build ---
    /// No compiler on this machine passed the hello-world check
    ToolchainUnavailable,
    /// The compiler rejected the generated source
    CompileFailed,
    /// The compiled binary or the Python interpreter failed
    ExecutionFailed,

    // --- io ---
    FileNotFound,
    PermissionDenied,
    IoFailed,
    NetworkFailed,

    // --- data ---
    /// A provider reply could not be decoded
    ParseFailed,
    SerializationFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::InferenceFailed => "InferenceFailed",
            ErrorKind::AuthenticationFailed => "AuthenticationFailed",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::ToolchainUnavailable => "ToolchainUnavailable",
            ErrorKind::CompileFailed => "CompileFailed",
            ErrorKind::ExecutionFailed => "ExecutionFailed",
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",
            ErrorKind::NetworkFailed => "NetworkFailed",
            ErrorKind::ParseFailed => "ParseFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",
        }
    }

    /// Failures caused by the network or the provider rather than by the
    /// input; these start out as [`ErrorStatus::Temporary`](crate::ErrorStatus).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkFailed | ErrorKind::RateLimited | ErrorKind::ProviderUnavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
