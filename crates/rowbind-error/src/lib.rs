use thiserror::Error;

/// Error reported by a row source (cursor) and carried through unchanged.
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Primary error type for rowbind operations.
///
/// Batch and single-row fills abort on the first error and leave the
/// destination partially written. The streaming filler reports only
/// source and worker failures; per-row decode failures are logged and
/// skipped there.
#[derive(Error, Debug)]
pub enum BindError {
    // === Destination Errors ===
    /// The destination handle was absent.
    #[error("destination is null")]
    NullDestination,

    /// The destination kind has no fill strategy.
    #[error("unsupported destination shape for {type_name}: {detail}")]
    UnsupportedShape {
        type_name: &'static str,
        detail: String,
    },

    // === Coercion Errors ===
    /// Raw cell bytes cannot be interpreted as the target kind.
    #[error("cannot convert {raw:?} into {target}")]
    UnsupportedConversion { raw: String, target: &'static str },

    // === Source Errors ===
    /// Error propagated verbatim from the row source.
    #[error("source error: {0}")]
    Source(#[source] SourceError),

    // === Runtime Errors ===
    /// Binder configuration is out of range.
    #[error("invalid bind configuration: {detail}")]
    InvalidConfig { detail: String },

    /// Thread or other OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A producer or decode worker thread panicked.
    #[error("worker thread panicked")]
    WorkerPanicked,
}

impl BindError {
    /// Create a conversion error, rendering the raw bytes lossily.
    pub fn unsupported_conversion(raw: &[u8], target: &'static str) -> Self {
        Self::UnsupportedConversion {
            raw: String::from_utf8_lossy(raw).into_owned(),
            target,
        }
    }

    /// Create an unsupported-shape error.
    pub fn unsupported_shape(type_name: &'static str, detail: impl Into<String>) -> Self {
        Self::UnsupportedShape {
            type_name,
            detail: detail.into(),
        }
    }

    /// Create an invalid-configuration error.
    pub fn invalid_config(detail: impl Into<String>) -> Self {
        Self::InvalidConfig {
            detail: detail.into(),
        }
    }

    /// Wrap a row source error.
    pub fn source(err: impl Into<SourceError>) -> Self {
        Self::Source(err.into())
    }

    /// Whether this error originated in the row source rather than in binding.
    pub const fn is_source(&self) -> bool {
        matches!(self, Self::Source(_))
    }

    /// Human-friendly suggestion for fixing this error.
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NullDestination => Some("Pass a mutable reference to an initialized value"),
            Self::UnsupportedShape { .. } => {
                Some("Declare the destination with record! or use a supported scalar, map or sequence")
            }
            Self::UnsupportedConversion { .. } => {
                Some("Check the column type or switch the parse policy to lenient")
            }
            Self::InvalidConfig { .. } => {
                Some("Use a non-zero queue capacity and at least one worker")
            }
            Self::Source(_) | Self::Io(_) | Self::WorkerPanicked => None,
        }
    }
}

/// Result type alias using `BindError`.
pub type Result<T> = std::result::Result<T, BindError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BindError::unsupported_conversion(b"12x", "i32");
        assert_eq!(err.to_string(), r#"cannot convert "12x" into i32"#);
    }

    #[test]
    fn test_error_display_lossy_raw() {
        let err = BindError::unsupported_conversion(&[0xff, b'a'], "bool");
        assert_eq!(err.to_string(), "cannot convert \"\u{fffd}a\" into bool");
    }

    #[test]
    fn test_error_display_shape() {
        let err = BindError::unsupported_shape("Hw", "field table out of sync");
        assert_eq!(
            err.to_string(),
            "unsupported destination shape for Hw: field table out of sync"
        );
    }

    #[test]
    fn test_source_error_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "cursor gone");
        let err = BindError::source(io);
        assert!(err.is_source());
        assert_eq!(err.to_string(), "source error: cursor gone");
        let inner = std::error::Error::source(&err).expect("source should be attached");
        assert_eq!(inner.to_string(), "cursor gone");
    }

    #[test]
    fn test_source_from_string() {
        let err = BindError::source("bad row");
        assert!(matches!(err, BindError::Source(_)));
        assert_eq!(err.to_string(), "source error: bad row");
    }

    #[test]
    fn test_io_error_converts() {
        let err: BindError = std::io::Error::other("spawn failed").into();
        assert!(matches!(err, BindError::Io(_)));
        assert_eq!(err.to_string(), "I/O error: spawn failed");
    }

    #[test]
    fn test_suggestions() {
        assert!(BindError::NullDestination.suggestion().is_some());
        assert!(BindError::unsupported_conversion(b"x", "f64").suggestion().is_some());
        assert!(BindError::WorkerPanicked.suggestion().is_none());
        assert!(!BindError::WorkerPanicked.is_source());
    }
}
