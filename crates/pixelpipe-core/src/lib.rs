//! Core data model for a node-based image processing pipeline.
//!
//! A pipeline is edited as a graph of [`Module`]s wired through typed
//! [`Connector`]s; compilation lowers it to a flat [`NodeGraph`] of compute
//! dispatches. This crate holds the shared vocabulary: tokens, regions of
//! interest, pixel formats, parameter blocks, the two graphs and the plugin
//! contract module types implement.
//!
//! [`Module`]: module::Module
//! [`Connector`]: connector::Connector
//! [`NodeGraph`]: node::NodeGraph

pub mod ascii;
pub mod connector;
pub mod format;
pub mod graph;
pub mod module;
pub mod node;
pub mod params;
pub mod plugin;
pub mod registry;
pub mod roi;
pub mod token;

pub use connector::{ConnLink, Connector, ConnectorDesc, Direction};
pub use format::Format;
pub use graph::{ModuleGraph, ModuleId};
pub use module::{CommitCtx, Module};
pub use node::{Node, NodeConnector, NodeCtx, NodeDesc, NodeGraph, NodeId, NodeLink};
pub use params::{ParamBlock, ParamKind, ParamLayout};
pub use plugin::{Caps, LoadError, ModuleDesc, ModulePlugin, ModuleSo};
pub use registry::PluginRegistry;
pub use roi::Roi;
pub use token::Token;

/// Errors shared across graph editing and compilation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A module type could not be loaded or resolved.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// A per-module configuration problem, reported against the offending
    /// (type, instance) pair.
    #[error("module {module}:{inst}: {msg}")]
    Config {
        module: Token,
        inst: Token,
        msg: String,
    },

    /// A structural problem in the module or node graph.
    #[error("invalid graph: {0}")]
    InvalidGraph(String),
}

pub type Result<T> = std::result::Result<T, Error>;
