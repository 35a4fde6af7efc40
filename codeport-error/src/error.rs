use crate::{ErrorKind, ErrorStatus};
use std::fmt;

/// Every fallible codeport call returns this.
///
/// It records what failed (`kind`), the text shown to the user (`message`),
/// whether trying later might help (`status`) and where it failed
/// (`operation` plus `context`). A wrapped lower-level error goes in `source`.
///
/// ```rust
/// use codeport_error::{Error, ErrorKind, ErrorStatus};
///
/// let err = Error::new(ErrorKind::RateLimited, "429 from provider")
///     .with_operation("translator::translate")
///     .with_context("model", "gpt-4o");
///
/// assert_eq!(err.status(), ErrorStatus::Temporary);
/// assert_eq!(err.context()[0].0, "model");
/// ```
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: ErrorStatus,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    /// The status follows from the kind: transient kinds are `Temporary`.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = if kind.is_transient() {
            ErrorStatus::Temporary
        } else {
            ErrorStatus::Permanent
        };
        Self {
            kind,
            message: message.into(),
            status,
            operation: "",
            context: Vec::new(),
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// User-facing text; for compile and run failures this is the captured stderr.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    pub fn source_ref(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }

    /// Name the failing operation. An earlier operation is kept in context
    /// under `called`, so the chain reads innermost first.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }
        self.operation = operation;
        self
    }

    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Attach the underlying error. Setting it twice is a bug (debug-asserted).
    pub fn set_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "source error already set");
        self.source = Some(source.into());
        self
    }
}

// Single line for logs: `Kind (status) at op, context { k: v } => message`
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) at {}", self.kind, self.status, self.operation)?;
        if !self.context.is_empty() {
            let pairs: Vec<String> = self.context.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
            write!(f, ", context {{ {} }}", pairs.join(", "))?;
        }
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        Ok(())
    }
}

// Multi-line for `-v` output.
impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}) at {}", self.kind, self.status, self.operation)?;
        if !self.message.is_empty() {
            writeln!(f, "\n    Message: {}", self.message)?;
        }
        if !self.context.is_empty() {
            writeln!(f, "\n    Context:")?;
            for (key, value) in &self.context {
                writeln!(f, "        {}: {}", key, value)?;
            }
        }
        if let Some(source) = &self.source {
            writeln!(f, "\n    Source: {:?}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::IoFailed,
        };
        Error::new(kind, err.to_string())
            .with_operation("io")
            .set_source(err)
    }
}

impl Error {
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    /// An API key or other required variable is not set.
    pub fn missing_env(var: &'static str) -> Self {
        Self::new(ErrorKind::ConfigInvalid, format!("environment variable {} is not set", var))
            .with_context("variable", var)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn inference_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InferenceFailed, message)
    }

    pub fn toolchain_unavailable(platform: impl Into<String>) -> Self {
        let platform = platform.into();
        Self::new(
            ErrorKind::ToolchainUnavailable,
            format!("no working C++ compiler found for {}", platform),
        )
        .with_context("platform", platform)
    }

    /// The compiler's diagnostics become the message.
    pub fn compile_failed(compiler: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::new(ErrorKind::CompileFailed, stderr).with_context("compiler", compiler)
    }

    pub fn execution_failed(program: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExecutionFailed, stderr).with_context("program", program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_kind() {
        let err = Error::new(ErrorKind::CompileFailed, "expected ';'");
        assert_eq!(err.message(), "expected ';'");
        assert_eq!(err.status(), ErrorStatus::Permanent);

        let err = Error::new(ErrorKind::NetworkFailed, "connection refused");
        assert_eq!(err.status(), ErrorStatus::Temporary);
    }

    #[test]
    fn test_operation_chain_moves_into_context() {
        let err = Error::new(ErrorKind::IoFailed, "write failed")
            .with_operation("artifact::write")
            .with_context("path", "optimized.cpp")
            .with_operation("translator::translate");

        assert_eq!(err.operation(), "translator::translate");
        assert_eq!(
            err.context(),
            &[
                ("path", "optimized.cpp".to_string()),
                ("called", "artifact::write".to_string()),
            ]
        );
    }

    #[test]
    fn test_display_is_one_line() {
        let err = Error::new(ErrorKind::RateLimited, "slow down")
            .with_operation("provider::stream")
            .with_context("model", "claude-3-5-sonnet-20240620")
            .with_context("provider", "anthropic");

        assert_eq!(
            err.to_string(),
            "RateLimited (temporary) at provider::stream, context { model: claude-3-5-sonnet-20240620, provider: anthropic } => slow down"
        );
    }

    #[test]
    fn test_domain_constructors() {
        let err = Error::missing_env("OPENAI_API_KEY");
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        assert!(err.message().contains("OPENAI_API_KEY"));

        let err = Error::toolchain_unavailable("Linux");
        assert_eq!(err.kind(), ErrorKind::ToolchainUnavailable);
        assert_eq!(err.context()[0], ("platform", "Linux".to_string()));

        let err = Error::compile_failed("g++", "error: 'x' was not declared");
        assert_eq!(err.kind(), ErrorKind::CompileFailed);
        assert_eq!(err.message(), "error: 'x' was not declared");
    }

    #[test]
    fn test_io_error_conversion() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file").into();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        assert_eq!(err.operation(), "io");
        assert!(err.source_ref().is_some());
    }
}
