//! Stable, cross-crate error type.
//!
//! Modeled on `spark-core::error::CoreError`: a stable `&'static str` code, a
//! human-readable message, and an optional boxed cause, reduced to the
//! fields this workspace actually consumes (no trace-context or node-id
//! attachment, since the covered core has no distributed tracing story of
//! its own).

use std::error::Error as StdError;
use std::fmt;

/// The stable error code namespace. Domain crates (`of-channel`,
/// `of-forwarding`) convert their own `thiserror`-derived errors into this
/// type at their public boundary, the same way `SwitchError` converts into
/// `SparkError` in the teacher crate.
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    message: String,
    cause: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl CoreError {
    /// Construct a new core error with a stable code and message.
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// Attach an underlying cause, returning the updated error.
    pub fn with_cause(mut self, cause: impl StdError + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// The stable error code, e.g. `"channel.bad_version"`.
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl StdError for CoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn StdError + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_message() {
        let err = CoreError::new("channel.bad_version", "version mismatch");
        assert_eq!(err.to_string(), "[channel.bad_version] version mismatch");
    }

    #[test]
    fn source_reflects_attached_cause() {
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = CoreError::new("transport.io", "socket failure").with_cause(cause);
        assert!(err.source().is_some());
    }
}
