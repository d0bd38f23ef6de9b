use gqlforge_core::CoreError;
use gqlforge_parser::ParserError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("Schema parse error: {0}")]
    SchemaParse(String),

    #[error("failed to bind {type_name}: {message}")]
    Binding { type_name: String, message: String },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("failed to render {filename}: {message}")]
    Render { filename: String, message: String },

    #[error(transparent)]
    Remote(#[from] ParserError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format error: {0}")]
    Fmt(#[from] std::fmt::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{stage} failed: {source}")]
    BuildFailed {
        stage: String,
        #[source]
        source: Box<CodegenError>,
    },
}

impl CodegenError {
    pub fn binding(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        CodegenError::Binding {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Attribute the error to a pipeline stage
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        CodegenError::BuildFailed {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// Name of the failing stage, for errors produced by a generation run
    pub fn stage(&self) -> Option<&str> {
        match self {
            CodegenError::BuildFailed { stage, .. } => Some(stage),
            _ => None,
        }
    }
}
