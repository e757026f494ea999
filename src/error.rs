use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Could not find Wiki Dump: {0}")]
    DumpNotFound(String),

    #[error("configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("cannot parse configuration {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot load word vector model {}: {reason}", .path.display())]
    ModelLoad { path: PathBuf, reason: String },

    #[error("cannot save word vector model {}: {reason}", .path.display())]
    ModelSave { path: PathBuf, reason: String },

    #[error("invalid hyperparameter `{name}`: {reason}")]
    Hyperparameter { name: String, reason: String },

    #[error("training failed: {0}")]
    Training(String),

    #[error("invalid dump pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("markup filter error: {0}")]
    Regex(#[from] regex::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub(crate) fn model_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PipelineError::ModelLoad { path: path.into(), reason: reason.to_string() }
    }

    pub(crate) fn model_save(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PipelineError::ModelSave { path: path.into(), reason: reason.to_string() }
    }

    pub(crate) fn hyperparameter(name: &str, reason: impl ToString) -> Self {
        PipelineError::Hyperparameter { name: name.to_owned(), reason: reason.to_string() }
    }
}
