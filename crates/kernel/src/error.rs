//! Error types for kernel construction.
//!
//! Runtime failures inside callbacks and actions never surface as
//! [`KernelError`]: they are reported as [`BoxError`] and logged at the
//! dispatch boundary. `KernelError` is reserved for structural problems that
//! must fail fast while the graph is being built.

/// Boxed error returned by line callbacks and connector actions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Structural errors raised while constructing kernel objects.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// A filter pattern failed to compile.
    #[error("invalid filter pattern {pattern:?}")]
    Pattern {
        /// The offending pattern text.
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A duration or time-of-day literal could not be parsed.
    #[error("invalid duration {0:?}")]
    Duration(String),

    /// A sequencer needs at least one stage and a terminal controller.
    #[error("a sequencer needs at least 2 controllers, got {0}")]
    SequenceTooShort(usize),

    /// Timers and reader loops need a tokio runtime to be spawned on.
    #[error("no tokio runtime available")]
    NoRuntime(#[source] tokio::runtime::TryCurrentError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_duration_error() {
        let err = KernelError::Duration("abc".to_string());
        assert_eq!(err.to_string(), "invalid duration \"abc\"");
    }

    #[test]
    fn should_display_sequence_error() {
        let err = KernelError::SequenceTooShort(1);
        assert_eq!(
            err.to_string(),
            "a sequencer needs at least 2 controllers, got 1"
        );
    }

    #[test]
    fn should_keep_regex_error_as_source() {
        let source = regex::Regex::new("(").unwrap_err();
        let err = KernelError::Pattern {
            pattern: "(".to_string(),
            source,
        };
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.to_string(), "invalid filter pattern \"(\"");
    }
}
