//! Module instances and the parameter-commit context.

use std::sync::Arc;

use crate::connector::Connector;
use crate::graph::{ModuleGraph, ModuleId};
use crate::params::{ParamBlock, ParamLayout};
use crate::plugin::ModuleSo;
use crate::token::Token;
use crate::{Error, Result};

/// One user-visible processing stage: an instance of a loaded module type.
#[derive(Debug)]
pub struct Module {
    /// Module type token (matches `so.name`).
    pub name: Token,
    /// Instance token; (name, inst) is unique within a graph.
    pub inst: Token,
    /// The loaded type this instance was created from.
    pub so: Arc<ModuleSo>,
    /// Ports, in declaration order.
    pub connectors: Vec<Connector>,
    /// Live, UI-editable parameters.
    pub params: ParamBlock,
    /// Fixed-layout snapshot read by the compiled pipeline.
    pub committed: ParamBlock,
    shared_commit_layout: bool,
}

impl Module {
    pub(crate) fn new(so: Arc<ModuleSo>, inst: Token) -> Self {
        let connectors = so.desc.connectors.iter().map(Connector::new).collect();
        // The layout carries the default bytes; blocks start from them.
        let params_layout = Arc::new(so.desc.params.clone());
        let commit_layout = so
            .desc
            .commit
            .as_ref()
            .map(|l| Arc::new(l.clone()))
            .unwrap_or_else(|| params_layout.clone());
        Self {
            name: so.name,
            inst,
            connectors,
            params: ParamBlock::new(params_layout),
            committed: ParamBlock::new(commit_layout),
            shared_commit_layout: so.desc.commit.is_none(),
            so,
        }
    }

    /// Look up a connector index by name.
    pub fn connector(&self, name: Token) -> Option<usize> {
        self.connectors.iter().position(|c| c.name == name)
    }

    pub fn conn(&self, idx: usize) -> Result<&Connector> {
        self.connectors.get(idx).ok_or_else(|| Error::Config {
            module: self.name,
            inst: self.inst,
            msg: format!("connector index {} out of range", idx),
        })
    }

    pub fn conn_mut(&mut self, idx: usize) -> Result<&mut Connector> {
        let (name, inst) = (self.name, self.inst);
        self.connectors.get_mut(idx).ok_or_else(|| Error::Config {
            module: name,
            inst,
            msg: format!("connector index {} out of range", idx),
        })
    }

    /// Whether the live and committed blocks share one layout (the default
    /// when a plugin declares no separate commit layout).
    pub fn commit_is_live_layout(&self) -> bool {
        self.shared_commit_layout
    }
}

/// Read-only view handed to `commit_params`.
///
/// Exposes the committing module's live parameters and, by explicit token
/// lookup, the live parameters of other modules (e.g. a colour module
/// reading the points sampled by a picker instance). Nothing else of the
/// graph is reachable, which keeps commit pure.
pub struct CommitCtx<'a> {
    graph: &'a ModuleGraph,
    mid: ModuleId,
}

impl<'a> CommitCtx<'a> {
    pub fn new(graph: &'a ModuleGraph, mid: ModuleId) -> Self {
        Self { graph, mid }
    }

    pub fn module(&self) -> Result<&Module> {
        self.graph.module(self.mid)
    }

    /// Live parameters of the committing module.
    pub fn params(&self) -> Result<&ParamBlock> {
        Ok(&self.module()?.params)
    }

    /// Declared cross-module read: live parameters of another module,
    /// addressed by (type, instance) tokens.
    pub fn module_params(&self, name: Token, inst: Token) -> Option<&ParamBlock> {
        let mid = self.graph.module_by_token(name, inst)?;
        self.graph.module(mid).ok().map(|m| &m.params)
    }
}
