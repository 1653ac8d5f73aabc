//! The GPU backend boundary.
//!
//! The runtime hands the backend fully resolved submit units: every buffer
//! reference replaced by a concrete allocation id. Command encoding, queue
//! management and synchronization live behind this trait; nothing above it
//! blocks on GPU completion.

use pixelpipe_core::Token;

use crate::error::BackendError;

/// A binding with its buffer reference resolved to a physical allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBinding {
    pub conn: Token,
    pub write: bool,
    /// Physical allocation id, stable for the lifetime of the schedule.
    pub buffer: usize,
    /// Bumped whenever the allocation's contents are recycled (feedback
    /// flips); lets a backend invalidate cached descriptor sets.
    pub generation: u64,
}

/// One dispatch ready for command encoding.
#[derive(Debug, Clone)]
pub struct ResolvedUnit {
    pub kernel: Token,
    pub module: Token,
    pub inst: Token,
    pub dispatch: [u32; 3],
    pub push_constants: Vec<u8>,
    pub bindings: Vec<ResolvedBinding>,
}

/// Records and submits one frame's worth of dispatches.
pub trait GpuBackend {
    fn record_and_submit(
        &mut self,
        frame: u64,
        units: &[ResolvedUnit],
    ) -> std::result::Result<(), BackendError>;
}

/// Test backend: records every submitted frame and can be told to fail.
#[derive(Debug, Default)]
pub struct TraceBackend {
    pub frames: Vec<Vec<ResolvedUnit>>,
    /// Fail the submission of this frame number, once.
    pub fail_at: Option<u64>,
}

impl TraceBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GpuBackend for TraceBackend {
    fn record_and_submit(
        &mut self,
        frame: u64,
        units: &[ResolvedUnit],
    ) -> std::result::Result<(), BackendError> {
        if self.fail_at == Some(frame) {
            self.fail_at = None;
            return Err(BackendError::Submit(format!("injected failure at frame {frame}")));
        }
        self.frames.push(units.to_vec());
        Ok(())
    }
}
