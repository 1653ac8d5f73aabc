//! Compilation errors.

use pixelpipe_core::Token;

/// Errors raised while lowering a module graph to a frame schedule.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// Structural or configuration error from the core graph layer.
    #[error(transparent)]
    Core(#[from] pixelpipe_core::Error),

    /// A module could not be lowered, reported against its (type, instance).
    #[error("module {module}:{inst}: {msg}")]
    Module {
        module: Token,
        inst: Token,
        msg: String,
    },

    /// The compiled node graph cannot be ordered or sized.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
}

pub type Result<T> = std::result::Result<T, CompileError>;
