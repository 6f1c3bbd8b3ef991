use std::path::PathBuf;
use thiserror::Error;

/// Coarse error taxonomy used to decide whether a failure is fatal to a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Io,
    Process,
    Validation,
}

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("registry not found at {0}")]
    RegistryNotFound(PathBuf),

    #[error("invalid registry: {0}")]
    InvalidRegistry(String),

    #[error("duplicate scenario id: {0}")]
    DuplicateScenario(String),

    #[error("invalid scenario id '{0}': must be lowercase alphanumeric with hyphens or underscores")]
    InvalidScenarioId(String),

    #[error("scenario not found: {0}")]
    ScenarioNotFound(String),

    #[error("configuration document not found for scenario '{scenario}': {path}")]
    ConfigDocumentMissing { scenario: String, path: PathBuf },

    #[error("template directory not found: {0}")]
    TemplateMissing(PathBuf),

    #[error("invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("destination not clearable: {path}: {source}")]
    DestinationNotClearable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("session already running for scenario: {0}")]
    SessionInFlight(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("check '{check}' failed to evaluate: {reason}")]
    Validation { check: String, reason: String },

    #[error("no results found in {0}")]
    NoResults(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BenchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BenchError::RegistryNotFound(_)
            | BenchError::InvalidRegistry(_)
            | BenchError::DuplicateScenario(_)
            | BenchError::InvalidScenarioId(_)
            | BenchError::ScenarioNotFound(_)
            | BenchError::ConfigDocumentMissing { .. }
            | BenchError::TemplateMissing(_)
            | BenchError::InvalidSetting { .. }
            | BenchError::Yaml(_) => ErrorKind::Config,
            BenchError::DestinationNotClearable { .. }
            | BenchError::NoResults(_)
            | BenchError::Io(_)
            | BenchError::Json(_) => ErrorKind::Io,
            BenchError::SessionInFlight(_) | BenchError::Process(_) => ErrorKind::Process,
            BenchError::Validation { .. } => ErrorKind::Validation,
        }
    }

    /// Config and IO failures abort the whole run; the rest are recorded per scenario.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Config | ErrorKind::Io)
    }
}

pub type Result<T> = std::result::Result<T, BenchError>;
