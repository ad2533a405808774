use thiserror::Error;

/// Error kinds produced by the registry, the lifecycle manager, the
/// dependency manager and the framework facade. Every caller-facing API in
/// the crate returns `Result<T>` over this single enum, the same way RustyDB
/// funnels every subsystem's failures through one `DbError`.
#[derive(Error, Debug)]
pub enum ModError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("install failed: {0}")]
    InstallFailed(String),

    #[error("activator failed: {0}")]
    ActivatorFailed(String),

    #[error("dependency unsatisfied: {0}")]
    DependencyUnsatisfied(String),

    #[error("framework shutdown")]
    FrameworkShutdown,

    #[error("invalid version: {0}")]
    InvalidVersion(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Clone for ModError {
    fn clone(&self) -> Self {
        match self {
            ModError::InvalidArgument(s) => ModError::InvalidArgument(s.clone()),
            ModError::IllegalState(s) => ModError::IllegalState(s.clone()),
            ModError::NotFound(s) => ModError::NotFound(s.clone()),
            ModError::InstallFailed(s) => ModError::InstallFailed(s.clone()),
            ModError::ActivatorFailed(s) => ModError::ActivatorFailed(s.clone()),
            ModError::DependencyUnsatisfied(s) => ModError::DependencyUnsatisfied(s.clone()),
            ModError::FrameworkShutdown => ModError::FrameworkShutdown,
            ModError::InvalidVersion(s) => ModError::InvalidVersion(s.clone()),
            ModError::InvalidFilter(s) => ModError::InvalidFilter(s.clone()),
            ModError::Internal(s) => ModError::Internal(s.clone()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ModError>;

impl From<serde_json::Error> for ModError {
    fn from(e: serde_json::Error) -> Self {
        ModError::Internal(e.to_string())
    }
}
