use gqlforge_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("failed to parse {path}:{line}: {message}")]
    SourceParseFailed {
        path: String,
        line: usize,
        message: String,
    },

    #[error("package not found: {0}")]
    PackageNotFound(String),

    #[error("GitHub API error: {status} - {body}")]
    TransportError { status: u16, body: String },

    #[error("failed to decode {path}: {reason}")]
    DecodeFailed { path: String, reason: String },

    #[error("not a GitHub import path: {0}")]
    InvalidImportPath(String),

    #[error("no Go files found in package {0}")]
    NoSourceFiles(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error(transparent)]
    Registry(#[from] CoreError),

    #[error("package {path}: {source}")]
    Package {
        path: String,
        #[source]
        source: Box<ParserError>,
    },
}

impl ParserError {
    /// Attach the offending package path
    pub fn in_package(self, path: impl Into<String>) -> Self {
        ParserError::Package {
            path: path.into(),
            source: Box::new(self),
        }
    }

    /// The error beneath any package wrappers
    pub fn root(&self) -> &ParserError {
        match self {
            ParserError::Package { source, .. } => source.root(),
            other => other,
        }
    }
}
