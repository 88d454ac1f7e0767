use serde::{Deserialize, Serialize};

/// The uniform error-kind surfaced on the wire in `RunResult::error` / `TaskResult::error`.
///
/// This is distinct from [`CoreError`]: `ErrorKind` is the small, stable, serializable
/// taxonomy callers can match on; `CoreError` is the richer internal error type the
/// pipeline stages return while they still have a human-readable message attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    UnsupportedLanguage,
    TimeoutExceeded,
    LaunchFailed,
    BadPlaceholder,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::UnsupportedLanguage => "UnsupportedLanguage",
            ErrorKind::TimeoutExceeded => "TimeoutExceeded",
            ErrorKind::LaunchFailed => "LaunchFailed",
            ErrorKind::BadPlaceholder => "BadPlaceholder",
            ErrorKind::Internal => "Internal",
        };
        f.write_str(s)
    }
}

/// Internal error currency for the pipeline. Every stage (language, rewriter, staging,
/// invoker) returns this; the coordinator folds it down into a normalized `RunResult`
/// before it ever reaches a caller.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("bad placeholder: {0}")]
    BadPlaceholder(String),
    #[error("unsafe path: {0}")]
    UnsafePath(String),
    #[error("failed to create job directory: {0}")]
    JobDirCreation(String),
    #[error("failed to write source file: {0}")]
    FileWrite(String),
    #[error("failed to launch container runtime: {0}")]
    LaunchFailed(String),
    #[error("execution timed out after {0:.3} seconds")]
    Timeout(f64),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Collapse to the wire-level kind. `UnsafePath` has no dedicated wire variant, since
    /// no error kind should leak host paths beyond the storage roots already visible to
    /// the user, so it folds into `Internal`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::UnsupportedLanguage(_) => ErrorKind::UnsupportedLanguage,
            CoreError::BadPlaceholder(_) => ErrorKind::BadPlaceholder,
            CoreError::Timeout(_) => ErrorKind::TimeoutExceeded,
            CoreError::LaunchFailed(_) => ErrorKind::LaunchFailed,
            CoreError::UnsafePath(_)
            | CoreError::JobDirCreation(_)
            | CoreError::FileWrite(_)
            | CoreError::Internal(_) => ErrorKind::Internal,
        }
    }
}
