use crate::config::ConfigurationError;
use crate::diagnostics::BuildReport;
use crate::plugin::PluginError;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal outcome of a build.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk content directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("failed to serialize artifact {path}: {source}")]
    Serialize {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid artifact path `{0}`")]
    ArtifactPath(String),

    #[error("build failed with {} error(s)", .0.errors().count())]
    Violations(BuildReport),
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }

    /// The collected report when the build failed on content defects.
    pub fn report(&self) -> Option<&BuildReport> {
        match self {
            BuildError::Violations(report) => Some(report),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
