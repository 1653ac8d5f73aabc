//! Runtime errors.

/// Errors from the GPU backend boundary.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("submission failed: {0}")]
    Submit(String),

    #[error("device lost: {0}")]
    DeviceLost(String),
}

/// Errors raised while recomputing or running frames.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Compile(#[from] pixelpipe_compiler::CompileError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A frame was requested before any schedule was installed.
    #[error("no schedule installed")]
    NoSchedule,
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
