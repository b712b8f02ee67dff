//! Coding paths: where in the value tree an encode or decode step is running.

use std::fmt;

/// Key under which a super encoder/decoder stores or finds its value.
pub const SUPER_KEY: &str = "super";

/// One step of a coding path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// A named field or element.
    Key(String),
    /// A position inside an unkeyed (sequence) container.
    Index(usize),
}

impl PathSegment {
    pub fn key(name: impl Into<String>) -> Self {
        PathSegment::Key(name.into())
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(name) => f.write_str(name),
            PathSegment::Index(index) => write!(f, "Index {index}"),
        }
    }
}

/// Ordered path from the document root to the current position.
pub type CodingPath = Vec<PathSegment>;

/// Renders a path for error messages, e.g. `books.Index 2.title`.
pub fn display_path(path: &[PathSegment]) -> String {
    if path.is_empty() {
        return "<root>".to_string();
    }
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}
