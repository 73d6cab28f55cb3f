use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Position of a line inside a magic database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub origin: String,
    pub line: usize,
}

impl Location {
    pub fn new(origin: &str, line: usize) -> Self {
        Self {
            origin: origin.to_string(),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.origin, self.line)
    }
}

/// Errors that can occur while loading a magic database
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("{at}: syntax error: {message}")]
    Syntax { at: Location, message: String },

    #[error("{at}: unknown type `{token}`")]
    UnknownType { at: Location, token: String },

    #[error("{at}: unknown modifier `{modifier}` for type `{token}`")]
    UnknownModifier {
        at: Location,
        token: String,
        modifier: char,
    },

    #[error("{at}: continuation level {level} has no parent (deepest open level is {open})")]
    Nesting {
        at: Location,
        level: usize,
        open: usize,
    },

    #[error("{at}: invalid number `{text}`")]
    InvalidNumber { at: Location, text: String },

    #[error("{at}: `!:{attribute}` appears before any rule")]
    OrphanAttribute { at: Location, attribute: String },

    #[error("{at}: invalid regex: {message}")]
    Regex { at: Location, message: String },

    #[error("{at}: `use` refers to undefined name `{name}`")]
    UndefinedName { at: Location, name: String },

    #[error("failed to read magic database {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LoadError {
    /// Returns where in the database the error was found, if it came from a line
    pub fn location(&self) -> Option<&Location> {
        match self {
            LoadError::Syntax { at, .. }
            | LoadError::UnknownType { at, .. }
            | LoadError::UnknownModifier { at, .. }
            | LoadError::Nesting { at, .. }
            | LoadError::InvalidNumber { at, .. }
            | LoadError::OrphanAttribute { at, .. }
            | LoadError::Regex { at, .. }
            | LoadError::UndefinedName { at, .. } => Some(at),
            LoadError::Io { .. } => None,
        }
    }
}

/// Errors that can occur while reading one input
#[derive(Error, Debug)]
pub enum IdentifyError {
    #[error("cannot open `{name}`: {source}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot read `{name}`: {source}")]
    Read {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl IdentifyError {
    pub fn name(&self) -> &str {
        match self {
            IdentifyError::Open { name, .. } | IdentifyError::Read { name, .. } => name,
        }
    }
}
