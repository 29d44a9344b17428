//! Error types for the structured YAML editor
//!
//! Provides error handling for:
//! - Parse operations (text → Document)
//! - Structural lookups (a directive's surrounding shape is wrong)
//! - Typed field lookups (a value is present but not a string)

use std::fmt::{self, Display, Formatter};

/// 1-based position of a node in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based)
    pub column: usize,
}

impl Location {
    /// Create new location
    #[inline]
    #[must_use]
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Errors while turning text into a [`Document`](crate::Document)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Malformed YAML
    #[error("syntax error{}: {message}", at(.location))]
    Syntax {
        /// Parser message
        message: String,
        /// Where parsing failed
        location: Option<Location>,
    },

    /// More than one document in the stream
    #[error("expected a single YAML document, found more than one{}", at(.location))]
    MultipleDocuments {
        /// Start of the second document
        location: Option<Location>,
    },

    /// Valid YAML that the token scanner does not model
    #[error("unsupported YAML construct{}: {message}", at(.location))]
    Unsupported {
        /// Construct that was rejected
        message: String,
        /// Start of the construct
        location: Option<Location>,
    },
}

impl ParseError {
    /// Location of the offending range, if known
    #[inline]
    #[must_use]
    pub fn location(&self) -> Option<Location> {
        match self {
            Self::Syntax { location, .. }
            | Self::MultipleDocuments { location }
            | Self::Unsupported { location, .. } => *location,
        }
    }

    pub(crate) fn unsupported(message: impl Into<String>, location: Location) -> Self {
        Self::Unsupported {
            message: message.into(),
            location: Some(location),
        }
    }
}

impl From<serde_yaml::Error> for ParseError {
    fn from(err: serde_yaml::Error) -> Self {
        let location = err
            .location()
            .map(|loc| Location::new(loc.line(), loc.column()));
        Self::Syntax {
            message: err.to_string(),
            location,
        }
    }
}

/// Errors from the editor and the block model
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum YamlError {
    /// The document could not be parsed
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// A node has the wrong shape for the directive that uses it
    #[error("invalid structure at {path}{}: {message}", at(.location))]
    Structure {
        /// Dotted path of the node
        path: String,
        /// Expected shape
        message: String,
        /// Where the node starts
        location: Option<Location>,
    },

    /// A field is present but is not a plain string scalar
    #[error("expected {expected} at {path}{}", at(.location))]
    Type {
        /// Dotted path of the field
        path: String,
        /// Expected kind of value
        expected: &'static str,
        /// Where the value starts
        location: Option<Location>,
    },
}

impl YamlError {
    /// Create structure error for path
    pub fn structure(
        path: impl Into<String>,
        message: impl Into<String>,
        location: Option<Location>,
    ) -> Self {
        Self::Structure {
            path: path.into(),
            message: message.into(),
            location,
        }
    }

    /// Location of the offending node, if known
    #[must_use]
    pub fn location(&self) -> Option<Location> {
        match self {
            Self::Parse(err) => err.location(),
            Self::Structure { location, .. } | Self::Type { location, .. } => *location,
        }
    }
}

fn at(location: &Option<Location>) -> String {
    location.map(|loc| format!(" at {loc}")).unwrap_or_default()
}

/// Result type alias for editor operations
pub type YamlResult<T> = Result<T, YamlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display_includes_location() {
        let err = ParseError::Syntax {
            message: "did not find expected key".to_string(),
            location: Some(Location::new(3, 5)),
        };
        assert_eq!(
            err.to_string(),
            "syntax error at line 3, column 5: did not find expected key"
        );
    }

    #[test]
    fn structure_error_without_location() {
        let err = YamlError::structure("prod.gitConfig", "expected a map", None);
        assert_eq!(
            err.to_string(),
            "invalid structure at prod.gitConfig: expected a map"
        );
    }

    #[test]
    fn error_conversions() {
        let parse_err = ParseError::MultipleDocuments { location: None };
        let yaml_err: YamlError = parse_err.into();
        assert!(matches!(yaml_err, YamlError::Parse(_)));
    }
}
