//! Error types for XML encoding and decoding.
//!
//! The taxonomy follows the classic coder errors: type mismatch, value not
//! found, key not found, corrupted data on the decode side, and invalid value
//! on the encode side.

use std::fmt::Display;

use thiserror::Error;

use crate::path::{CodingPath, PathSegment, display_path};

/// Errors raised while encoding values to XML or decoding them from XML.
///
/// Data errors carry the coding path at the point of failure. Contract
/// violations by container users (requesting two containers of different
/// shapes for one value) panic instead.
#[derive(Error, Debug)]
pub enum XmlCodingError {
    /// A value was found but has the wrong shape or text for the requested type.
    #[error("Type mismatch at {}: expected {expected}. {description}", display_path(.path))]
    TypeMismatch {
        expected: String,
        path: CodingPath,
        description: String,
    },

    /// A value was required but the node was null or the sequence was exhausted.
    #[error("Value not found at {}: expected {expected}. {description}", display_path(.path))]
    ValueNotFound {
        expected: String,
        path: CodingPath,
        description: String,
    },

    /// A keyed lookup found no entry.
    #[error("Key not found at {}: {key}. {description}", display_path(.path))]
    KeyNotFound {
        key: String,
        path: CodingPath,
        description: String,
    },

    /// A value was present and well-shaped but failed semantic parsing.
    #[error("Data corrupted at {}: {description}", display_path(.path))]
    DataCorrupted {
        path: CodingPath,
        description: String,
    },

    /// A value cannot be represented in XML under the active strategies.
    #[error("Invalid value at {}: {description}", display_path(.path))]
    InvalidValue {
        path: CodingPath,
        description: String,
    },

    /// The XML writer rejected an event.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Writing the rendered document failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl XmlCodingError {
    pub fn type_mismatch(path: &[PathSegment], expected: &str, reality: impl Display) -> Self {
        XmlCodingError::TypeMismatch {
            expected: expected.to_string(),
            path: path.to_vec(),
            description: format!("Expected to decode {expected} but found {reality} instead."),
        }
    }

    pub fn value_not_found(path: &[PathSegment], expected: &str) -> Self {
        XmlCodingError::ValueNotFound {
            expected: expected.to_string(),
            path: path.to_vec(),
            description: format!("Expected {expected} value but found null instead."),
        }
    }

    pub fn key_not_found(path: &[PathSegment], key: &str, description: impl Into<String>) -> Self {
        XmlCodingError::KeyNotFound {
            key: key.to_string(),
            path: path.to_vec(),
            description: description.into(),
        }
    }

    pub fn data_corrupted(path: &[PathSegment], description: impl Into<String>) -> Self {
        XmlCodingError::DataCorrupted {
            path: path.to_vec(),
            description: description.into(),
        }
    }

    pub fn invalid_value(path: &[PathSegment], description: impl Into<String>) -> Self {
        XmlCodingError::InvalidValue {
            path: path.to_vec(),
            description: description.into(),
        }
    }

    /// The coding path recorded on a data error.
    pub fn path(&self) -> Option<&[PathSegment]> {
        match self {
            XmlCodingError::TypeMismatch { path, .. }
            | XmlCodingError::ValueNotFound { path, .. }
            | XmlCodingError::KeyNotFound { path, .. }
            | XmlCodingError::DataCorrupted { path, .. }
            | XmlCodingError::InvalidValue { path, .. } => Some(path),
            XmlCodingError::Xml(_) | XmlCodingError::Io(_) => None,
        }
    }

    /// Records `at` as the failure location unless a location is already set.
    ///
    /// Errors built through the serde error traits start without a path; the
    /// engines stamp them at the innermost container boundary they cross.
    pub(crate) fn at(mut self, at: &[PathSegment]) -> Self {
        match &mut self {
            XmlCodingError::TypeMismatch { path, .. }
            | XmlCodingError::ValueNotFound { path, .. }
            | XmlCodingError::KeyNotFound { path, .. }
            | XmlCodingError::DataCorrupted { path, .. }
            | XmlCodingError::InvalidValue { path, .. } => {
                if path.is_empty() {
                    *path = at.to_vec();
                }
            }
            XmlCodingError::Xml(_) | XmlCodingError::Io(_) => {}
        }
        self
    }
}

impl serde::ser::Error for XmlCodingError {
    fn custom<T: Display>(msg: T) -> Self {
        XmlCodingError::invalid_value(&[], msg.to_string())
    }
}

impl serde::de::Error for XmlCodingError {
    fn custom<T: Display>(msg: T) -> Self {
        XmlCodingError::data_corrupted(&[], msg.to_string())
    }

    fn invalid_type(unexp: serde::de::Unexpected, exp: &dyn serde::de::Expected) -> Self {
        XmlCodingError::type_mismatch(&[], &exp.to_string(), unexp)
    }

    fn invalid_value(unexp: serde::de::Unexpected, exp: &dyn serde::de::Expected) -> Self {
        XmlCodingError::data_corrupted(&[], format!("Invalid value {unexp}, expected {exp}."))
    }

    fn invalid_length(len: usize, exp: &dyn serde::de::Expected) -> Self {
        XmlCodingError::ValueNotFound {
            expected: exp.to_string(),
            path: Vec::new(),
            description: format!("Unkeyed container is at end after {len} elements."),
        }
    }

    fn missing_field(field: &'static str) -> Self {
        XmlCodingError::key_not_found(&[], field, format!("No value associated with key \"{field}\"."))
    }
}

/// Result type alias for XML coding operations
pub type Result<T> = std::result::Result<T, XmlCodingError>;
