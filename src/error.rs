use std::fmt;
use thiserror::Error;

/// Location in source code for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Coarse classification of an [`Error`], for hosts that only care about
/// which phase failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Name,
    Runtime,
    Io,
}

/// All error types for awk-ai
#[derive(Error, Debug)]
pub enum Error {
    #[error("syntax error at {location}: {message}")]
    Syntax {
        message: String,
        location: SourceLocation,
    },

    #[error("name error at {location}: function `{name}` is not defined")]
    Name {
        name: String,
        location: SourceLocation,
    },

    #[error("runtime error{}: {message}", fmt_location(.location))]
    Runtime {
        message: String,
        location: Option<SourceLocation>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

fn fmt_location(location: &Option<SourceLocation>) -> String {
    location.map(|loc| format!(" at {}", loc)).unwrap_or_default()
}

impl Error {
    pub fn syntax(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            location: SourceLocation::new(line, column),
        }
    }

    pub fn name(name: impl Into<String>, location: SourceLocation) -> Self {
        Self::Name {
            name: name.into(),
            location,
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
            location: None,
        }
    }

    pub fn runtime_at(message: impl Into<String>, location: SourceLocation) -> Self {
        Self::Runtime {
            message: message.into(),
            location: Some(location),
        }
    }

    pub fn io_with_path(path: &str, err: std::io::Error) -> Self {
        Self::Io(std::io::Error::new(err.kind(), format!("{}: {}", path, err)))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Syntax { .. } => ErrorKind::Syntax,
            Error::Name { .. } => ErrorKind::Name,
            Error::Runtime { .. } | Error::Regex(_) => ErrorKind::Runtime,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            Error::Syntax { location, .. } | Error::Name { location, .. } => Some(*location),
            Error::Runtime { location, .. } => *location,
            Error::Io(_) | Error::Regex(_) => None,
        }
    }

    /// Attach a location to a runtime error that does not carry one yet.
    pub(crate) fn or_at(self, at: SourceLocation) -> Self {
        match self {
            Error::Runtime {
                message,
                location: None,
            } => Error::Runtime {
                message,
                location: Some(at),
            },
            other => other,
        }
    }
}

/// Result type alias for awk-ai operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_location() {
        let loc = SourceLocation::new(10, 5);
        assert_eq!(loc.line, 10);
        assert_eq!(loc.column, 5);
        assert_eq!(format!("{}", loc), "line 10, column 5");
    }

    #[test]
    fn test_syntax_error() {
        let err = Error::syntax("unexpected '}'", 2, 10);
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert_eq!(err.location(), Some(SourceLocation::new(2, 10)));
        let msg = format!("{}", err);
        assert!(msg.contains("syntax error at line 2, column 10"));
        assert!(msg.contains("unexpected '}'"));
    }

    #[test]
    fn test_name_error() {
        let err = Error::name("ai_missing", SourceLocation::new(1, 3));
        assert_eq!(err.kind(), ErrorKind::Name);
        assert!(format!("{}", err).contains("`ai_missing` is not defined"));
    }

    #[test]
    fn test_runtime_error() {
        let err = Error::runtime("division by zero");
        assert_eq!(err.kind(), ErrorKind::Runtime);
        assert_eq!(err.location(), None);
        assert_eq!(format!("{}", err), "runtime error: division by zero");
    }

    #[test]
    fn test_runtime_error_gains_location_once() {
        let err = Error::runtime("division by zero").or_at(SourceLocation::new(5, 3));
        assert_eq!(err.location(), Some(SourceLocation::new(5, 3)));
        let err = err.or_at(SourceLocation::new(9, 9));
        assert!(format!("{}", err).contains("line 5"));
    }

    #[test]
    fn test_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::io_with_path("missing.txt", io_err);
        assert_eq!(err.kind(), ErrorKind::Io);
        let msg = format!("{}", err);
        assert!(msg.contains("I/O error"));
        assert!(msg.contains("missing.txt"));
    }

    #[test]
    fn test_regex_error() {
        let re_err = regex::Regex::new("[invalid").unwrap_err();
        let err: Error = re_err.into();
        assert_eq!(err.kind(), ErrorKind::Runtime);
        assert!(format!("{}", err).contains("regex error"));
    }
}
