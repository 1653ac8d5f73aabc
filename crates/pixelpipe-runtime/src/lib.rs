//! Executes compiled frame schedules against a GPU backend.
//!
//! This crate stops at the backend trait: it resolves buffer references,
//! drives feedback double-buffering and enforces atomic schedule
//! installation, while actual command encoding is a [`GpuBackend`]
//! implementation's problem.

pub mod backend;
pub mod error;
pub mod pool;
pub mod runtime;

pub use backend::{GpuBackend, ResolvedBinding, ResolvedUnit, TraceBackend};
pub use error::{BackendError, Result, RuntimeError};
pub use pool::{BufferPool, PhysicalBuffer};
pub use runtime::{PassState, Runtime};
