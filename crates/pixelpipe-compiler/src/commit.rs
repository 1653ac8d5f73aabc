//! The parameter commit pass.
//!
//! Snapshots every module's live parameters into its committed block before
//! ROI negotiation, so the rest of compilation and the submitted frame see
//! one consistent parameter state even while the UI keeps editing.

use pixelpipe_core::{CommitCtx, ModuleGraph, ModuleId};

use crate::error::Result;

/// Commit live parameters for every module.
///
/// Modules with a `commit_params` capability transform their live block into
/// the committed one (reading other modules' live parameters only through
/// the [`CommitCtx`]); without the capability and with a shared layout the
/// bytes are copied verbatim. Identical live state commits to byte-identical
/// committed state.
pub fn commit_params(graph: &mut ModuleGraph) -> Result<()> {
    let mids: Vec<ModuleId> = graph.modules().map(|(id, _)| id).collect();
    for mid in mids {
        let (has_commit, shared, so) = {
            let m = graph.module(mid)?;
            (m.so.caps.commit_params, m.commit_is_live_layout(), m.so.clone())
        };
        if has_commit {
            let mut out = graph.module(mid)?.committed.clone();
            {
                let ctx = CommitCtx::new(graph, mid);
                so.plugin().commit_params(&ctx, &mut out)?;
            }
            graph.module_mut(mid)?.committed = out;
        } else if shared {
            let bytes = graph.module(mid)?.params.bytes().to_vec();
            graph.module_mut(mid)?.committed.copy_from(&bytes)?;
        }
        // A distinct commit layout without a commit callback keeps its
        // defaults; the plugin opted out of the live block entirely.
    }
    Ok(())
}
