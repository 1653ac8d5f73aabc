//! Frame driver: owns the installed schedule and its buffers.
//!
//! `recompute` compiles a candidate schedule, allocates its buffers and
//! submits one frame with it; only a successful submission installs the
//! candidate. Any failure along the way leaves the previously installed
//! schedule running, so an edit that breaks the graph degrades to "the old
//! image keeps rendering", never to a torn pipeline.

use pixelpipe_compiler::{compile, FrameSchedule};
use pixelpipe_core::ModuleGraph;

use crate::backend::{GpuBackend, ResolvedBinding, ResolvedUnit};
use crate::error::Result;
use crate::pool::BufferPool;

/// What the driver is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    Compiling,
    /// Schedule built; buffers being laid out for the candidate.
    Ordering,
    Submitting,
}

struct Installed {
    schedule: FrameSchedule,
    pool: BufferPool,
}

/// The frame driver.
pub struct Runtime<B: GpuBackend> {
    backend: B,
    installed: Option<Installed>,
    state: PassState,
    frame: u64,
}

impl<B: GpuBackend> Runtime<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            installed: None,
            state: PassState::Idle,
            frame: 0,
        }
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Recompile the graph and install the result.
    ///
    /// The first frame runs against the candidate schedule before it
    /// replaces the installed one. On any error the previous schedule (if
    /// any) stays installed and keeps serving frames.
    #[tracing::instrument(skip_all, fields(frame = self.frame))]
    pub fn recompute(&mut self, graph: &mut ModuleGraph) -> Result<()> {
        self.state = PassState::Compiling;
        let result = self.recompute_inner(graph);
        self.state = PassState::Idle;
        if let Err(err) = &result {
            tracing::warn!(error = %err, "recompute failed, keeping previous schedule");
        }
        result
    }

    fn recompute_inner(&mut self, graph: &mut ModuleGraph) -> Result<()> {
        let compiled = compile(graph)?;

        self.state = PassState::Ordering;
        let mut candidate = Installed {
            pool: BufferPool::realize(&compiled.schedule),
            schedule: compiled.schedule,
        };

        self.state = PassState::Submitting;
        let units = resolve_units(&candidate.schedule, &candidate.pool);
        self.backend.record_and_submit(self.frame, &units)?;
        candidate.pool.flip_feedback();
        self.frame += 1;

        self.installed = Some(candidate);
        Ok(())
    }

    /// Submit one frame with the installed schedule.
    pub fn run_frame(&mut self) -> Result<()> {
        let installed = self
            .installed
            .as_mut()
            .ok_or(crate::error::RuntimeError::NoSchedule)?;
        self.state = PassState::Submitting;
        let units = resolve_units(&installed.schedule, &installed.pool);
        let result = self.backend.record_and_submit(self.frame, &units);
        self.state = PassState::Idle;
        result?;
        installed.pool.flip_feedback();
        self.frame += 1;
        Ok(())
    }
}

fn resolve_units(schedule: &FrameSchedule, pool: &BufferPool) -> Vec<ResolvedUnit> {
    schedule
        .units
        .iter()
        .map(|u| ResolvedUnit {
            kernel: u.kernel,
            module: u.module,
            inst: u.inst,
            dispatch: u.dispatch,
            push_constants: u.push_constants.clone(),
            bindings: u
                .bindings
                .iter()
                .map(|b| {
                    let buffer = pool.resolve(b.buffer);
                    ResolvedBinding {
                        conn: b.conn,
                        write: b.write,
                        buffer: buffer.id,
                        generation: buffer.generation,
                    }
                })
                .collect(),
        })
        .collect()
}
