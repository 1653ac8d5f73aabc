//! Compiles an editable module graph into an executable frame schedule.
//!
//! Compilation is a fixed pass pipeline:
//!
//! 1. order the modules topologically (feedback edges excluded),
//! 2. commit live parameters into per-module snapshots,
//! 3. negotiate regions of interest backward then forward,
//! 4. lower every module to compute nodes and wire them,
//! 5. order the nodes and assign buffers.
//!
//! The result is a [`CompiledGraph`]: the node graph for inspection plus a
//! [`FrameSchedule`] the runtime can submit. Compilation never mutates
//! connections or node structure of the input beyond parameter commits and
//! resolved connector state, so a failed compile leaves the graph editable.

pub mod commit;
pub mod error;
pub mod nodes;
pub mod roi;
pub mod schedule;

pub use error::{CompileError, Result};
pub use schedule::{
    Binding, BufferDesc, BufferRef, FeedbackSlot, FrameSchedule, SubmitUnit,
};

use pixelpipe_core::{ModuleGraph, NodeGraph};

/// A fully compiled pipeline.
#[derive(Debug)]
pub struct CompiledGraph {
    /// The lowered compute nodes, in creation order.
    pub nodes: NodeGraph,
    /// Ordered dispatches with buffer assignments.
    pub schedule: FrameSchedule,
}

/// Compile the module graph into a frame schedule.
#[tracing::instrument(skip_all, fields(modules = graph.module_count()))]
pub fn compile(graph: &mut ModuleGraph) -> Result<CompiledGraph> {
    let order = graph.topological_order()?;

    {
        let _span = tracing::debug_span!("commit_params").entered();
        commit::commit_params(graph)?;
    }
    {
        let _span = tracing::debug_span!("resolve_rois").entered();
        roi::resolve_rois(graph, &order)?;
    }
    let nodes = {
        let _span = tracing::debug_span!("create_nodes").entered();
        nodes::create_nodes(graph, &order)?
    };
    let schedule = {
        let _span = tracing::debug_span!("build_schedule").entered();
        schedule::build_schedule(&nodes)?
    };

    tracing::debug!(
        nodes = nodes.len(),
        units = schedule.units.len(),
        buffers = schedule.buffers.len(),
        rings = schedule.rings.len(),
        "compiled module graph"
    );
    Ok(CompiledGraph { nodes, schedule })
}
