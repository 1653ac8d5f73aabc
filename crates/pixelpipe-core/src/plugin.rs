//! The module plugin contract and load-time capability validation.
//!
//! A module type is implemented as a [`ModulePlugin`]: a statically typed
//! capability set with six entry points, all overridable, all defaulting to
//! no-ops. What a plugin actually provides is declared through [`Caps`] and
//! validated once when the type is loaded into a [`ModuleSo`], the typed
//! handle the rest of the engine works with. A type that fails validation
//! (most importantly: no `create_nodes`) is unusable; every attempt to
//! instantiate it reports the same load error.

use crate::connector::ConnectorDesc;
use crate::graph::{ModuleGraph, ModuleId};
use crate::module::{CommitCtx, Module};
use crate::node::NodeCtx;
use crate::params::{ParamBlock, ParamLayout};
use crate::token::Token;
use crate::Result;

/// Errors raised while loading a module type.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    #[error("unknown module type '{0}'")]
    UnknownType(Token),

    #[error("module type '{ty}' missing required capability '{cap}'")]
    MissingCapability { ty: Token, cap: &'static str },

    #[error("module type '{ty}': {msg}")]
    BadDescription { ty: Token, msg: String },
}

/// Which entry points a plugin provides.
///
/// The typed equivalent of resolving a symbol table from a shared object:
/// the loader checks required capabilities here instead of chasing function
/// pointers, and the engine skips callbacks a plugin does not declare
/// (falling back to the built-in default behaviour).
#[derive(Debug, Clone, Copy, Default)]
pub struct Caps {
    pub init: bool,
    pub commit_params: bool,
    pub modify_roi_in: bool,
    pub modify_roi_out: bool,
    pub create_nodes: bool,
    pub ui_callback: bool,
}

impl Caps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_init(mut self) -> Self {
        self.init = true;
        self
    }

    pub fn with_commit_params(mut self) -> Self {
        self.commit_params = true;
        self
    }

    pub fn with_modify_roi_in(mut self) -> Self {
        self.modify_roi_in = true;
        self
    }

    pub fn with_modify_roi_out(mut self) -> Self {
        self.modify_roi_out = true;
        self
    }

    pub fn with_create_nodes(mut self) -> Self {
        self.create_nodes = true;
        self
    }

    pub fn with_ui_callback(mut self) -> Self {
        self.ui_callback = true;
        self
    }
}

/// Declarative description of a module type: its connectors and parameter
/// layouts. Replaces positional name/direction/layout/type tuples with a
/// structure validated at load time.
#[derive(Debug, Default)]
pub struct ModuleDesc {
    pub name: Token,
    pub connectors: Vec<ConnectorDesc>,
    pub params: ParamLayout,
    /// Layout of the committed block, when it differs from the live block.
    pub commit: Option<ParamLayout>,
}

impl ModuleDesc {
    pub fn new(name: &str) -> Self {
        Self {
            name: Token::new(name),
            ..Self::default()
        }
    }

    pub fn connector(mut self, desc: ConnectorDesc) -> Self {
        self.connectors.push(desc);
        self
    }

    pub fn params(mut self, layout: ParamLayout) -> Self {
        self.params = layout;
        self
    }

    pub fn commit(mut self, layout: ParamLayout) -> Self {
        self.commit = Some(layout);
        self
    }
}

/// A module type implementation.
///
/// All entry points are synchronous CPU-side graph construction; none may
/// block on GPU completion. Optional entry points default to no-ops and are
/// only invoked when the corresponding [`Caps`] flag is set; the engine
/// substitutes its default behaviour otherwise.
pub trait ModulePlugin: Send + Sync {
    /// Connector and parameter declaration for this type.
    fn describe(&self) -> ModuleDesc;

    /// Which of the entry points below this plugin provides.
    fn caps(&self) -> Caps;

    /// One-time per-instance setup after the connectors and parameter
    /// blocks have been created.
    fn init(&self, _module: &mut Module) -> Result<()> {
        Ok(())
    }

    /// Transform the live parameter block into the committed block.
    ///
    /// Must be pure with respect to graph state: reads live parameters (of
    /// this module and, via [`CommitCtx::module_params`], of explicitly
    /// named other modules) and writes `out`. Identical live state must
    /// produce byte-identical output.
    fn commit_params(&self, _ctx: &CommitCtx<'_>, _out: &mut ParamBlock) -> Result<()> {
        Ok(())
    }

    /// Backward (output-request) negotiation pass: the write connectors'
    /// requested ROIs are already set from downstream; adjust them and the
    /// read connectors' requests.
    fn modify_roi_out(&self, _graph: &mut ModuleGraph, _mid: ModuleId) -> Result<()> {
        Ok(())
    }

    /// Forward (availability) pass: the read connectors' ROIs are resolved
    /// to what upstream delivers; set what the write connectors offer.
    fn modify_roi_in(&self, _graph: &mut ModuleGraph, _mid: ModuleId) -> Result<()> {
        Ok(())
    }

    /// Emit the concrete compute nodes implementing this module.
    fn create_nodes(&self, _ctx: &mut NodeCtx<'_>) -> Result<()> {
        Ok(())
    }

    /// Interactive parameter hook (e.g. an import button); never called
    /// during compilation.
    fn ui_callback(&self, _graph: &mut ModuleGraph, _mid: ModuleId, _param: Token) {}
}

/// A loaded, validated module type: the typed handle handed out by the
/// registry.
pub struct ModuleSo {
    pub name: Token,
    pub desc: ModuleDesc,
    pub caps: Caps,
    plugin: Box<dyn ModulePlugin>,
}

impl ModuleSo {
    /// Validate a plugin's capability set and declaration.
    ///
    /// `create_nodes` is required; connector and parameter names must be
    /// unique and a module must declare at least one connector.
    pub fn load(plugin: Box<dyn ModulePlugin>) -> std::result::Result<Self, LoadError> {
        let desc = plugin.describe();
        let caps = plugin.caps();
        let ty = desc.name;

        if !caps.create_nodes {
            return Err(LoadError::MissingCapability {
                ty,
                cap: "create_nodes",
            });
        }
        if desc.connectors.is_empty() {
            return Err(LoadError::BadDescription {
                ty,
                msg: "no connectors declared".into(),
            });
        }
        for (i, c) in desc.connectors.iter().enumerate() {
            if desc.connectors[..i].iter().any(|o| o.name == c.name) {
                return Err(LoadError::BadDescription {
                    ty,
                    msg: format!("duplicate connector '{}'", c.name),
                });
            }
        }
        for (i, p) in desc.params.descs().iter().enumerate() {
            if desc.params.descs()[..i].iter().any(|o| o.name == p.name) {
                return Err(LoadError::BadDescription {
                    ty,
                    msg: format!("duplicate parameter '{}'", p.name),
                });
            }
        }

        Ok(Self {
            name: ty,
            desc,
            caps,
            plugin,
        })
    }

    pub fn plugin(&self) -> &dyn ModulePlugin {
        self.plugin.as_ref()
    }
}

impl std::fmt::Debug for ModuleSo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleSo")
            .field("name", &self.name)
            .field("caps", &self.caps)
            .finish()
    }
}
