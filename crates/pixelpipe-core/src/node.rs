//! The compiled node graph and the context plugins build it through.
//!
//! Nodes are the concrete compute dispatches a module lowers to. Unlike the
//! module graph, the node graph is rebuilt from scratch on every compile and
//! never edited incrementally, so it is a flat vector with links by index.

use crate::connector::{ConnectorDesc, Direction};
use crate::format::Format;
use crate::graph::{ModuleGraph, ModuleId};
use crate::module::Module;
use crate::params::ParamBlock;
use crate::roi::Roi;
use crate::token::Token;
use crate::{Error, Result};

/// Index of a node within one compiled [`NodeGraph`].
pub type NodeId = usize;

/// Where a node-level read connector gets its data from.
#[derive(Debug, Clone, Copy)]
pub struct NodeLink {
    pub node: NodeId,
    pub conn: usize,
    /// Previous-iteration read; does not constrain execution order.
    pub feedback: bool,
}

/// A port on a compiled node. Formats and ROIs are concrete here; wildcards
/// surviving to buffer sizing are a compile error.
#[derive(Debug, Clone)]
pub struct NodeConnector {
    pub name: Token,
    pub dir: Direction,
    pub format: Format,
    pub roi: Roi,
    pub link: Option<NodeLink>,
}

impl NodeConnector {
    fn new(desc: &ConnectorDesc, roi: Roi) -> Self {
        Self {
            name: desc.name,
            dir: desc.dir,
            format: desc.format,
            roi,
            link: None,
        }
    }
}

/// One compute dispatch: a kernel name, its ports, the dispatch domain and
/// an opaque push-constant blob.
#[derive(Debug, Clone)]
pub struct Node {
    /// Kernel token, unique per module type (not per graph).
    pub name: Token,
    /// Owning module type and instance, for diagnostics and dumps.
    pub module: Token,
    pub inst: Token,
    pub connectors: Vec<NodeConnector>,
    /// Dispatch domain in threads.
    pub wd: u32,
    pub ht: u32,
    pub dp: u32,
    pub push_constants: Vec<u8>,
}

impl Node {
    /// Look up a connector index by name.
    pub fn connector(&self, name: Token) -> Option<usize> {
        self.connectors.iter().position(|c| c.name == name)
    }

    pub fn conn(&self, idx: usize) -> Result<&NodeConnector> {
        self.connectors.get(idx).ok_or_else(|| {
            Error::InvalidGraph(format!(
                "node '{}:{}:{}': connector index {} out of range",
                self.module, self.inst, self.name, idx
            ))
        })
    }
}

/// Declarative node description handed to [`NodeCtx::add_node`].
#[derive(Debug)]
pub struct NodeDesc {
    pub name: Token,
    pub connectors: Vec<(ConnectorDesc, Roi)>,
    pub wd: u32,
    pub ht: u32,
    pub dp: u32,
    pub push_constants: Vec<u8>,
}

impl NodeDesc {
    pub fn new(name: &str) -> Self {
        Self {
            name: Token::new(name),
            connectors: Vec::new(),
            wd: 0,
            ht: 0,
            dp: 1,
            push_constants: Vec::new(),
        }
    }

    /// Add a connector; its ROI is filled in later by `connector_copy` or
    /// [`connector_roi`](Self::connector_roi) for internal ports.
    pub fn connector(mut self, desc: ConnectorDesc) -> Self {
        self.connectors.push((desc, Roi::default()));
        self
    }

    /// Add a connector with an explicit ROI (module-internal ports whose
    /// size is not copied from a module connector).
    pub fn connector_roi(mut self, desc: ConnectorDesc, roi: Roi) -> Self {
        self.connectors.push((desc, roi));
        self
    }

    /// Dispatch domain in threads; the backend divides by workgroup size.
    pub fn dispatch(mut self, wd: u32, ht: u32, dp: u32) -> Self {
        self.wd = wd;
        self.ht = ht;
        self.dp = dp;
        self
    }

    pub fn push_constants(mut self, bytes: &[u8]) -> Self {
        self.push_constants = bytes.to_vec();
        self
    }
}

/// The flat graph of compiled nodes.
#[derive(Debug, Default)]
pub struct NodeGraph {
    nodes: Vec<Node>,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| Error::InvalidGraph(format!("node {} not found", id)))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| Error::InvalidGraph(format!("node {} not found", id)))
    }

    /// Nodes in creation order, which is also declaration order for the
    /// scheduler's tie-breaking.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate()
    }

    /// Append a node, returning its id. Ids are dense and creation-ordered.
    pub fn add(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Wire a node write connector into a node read connector.
    pub fn connect(&mut self, n0: NodeId, c0: usize, n1: NodeId, c1: usize) -> Result<()> {
        self.link(n0, c0, n1, c1, false)
    }

    /// Previous-iteration wiring; the sink reads what the source wrote one
    /// frame earlier, and the edge is ignored for ordering.
    pub fn feedback(&mut self, n0: NodeId, c0: usize, n1: NodeId, c1: usize) -> Result<()> {
        self.link(n0, c0, n1, c1, true)
    }

    /// Wire by connector names instead of indices.
    pub fn connect_named(
        &mut self,
        n0: NodeId,
        conn0: Token,
        n1: NodeId,
        conn1: Token,
    ) -> Result<()> {
        let c0 = self.conn_index(n0, conn0)?;
        let c1 = self.conn_index(n1, conn1)?;
        self.link(n0, c0, n1, c1, false)
    }

    fn conn_index(&self, id: NodeId, name: Token) -> Result<usize> {
        let n = self.node(id)?;
        n.connector(name).ok_or_else(|| {
            Error::InvalidGraph(format!(
                "node '{}:{}:{}': no connector '{}'",
                n.module, n.inst, n.name, name
            ))
        })
    }

    fn link(&mut self, n0: NodeId, c0: usize, n1: NodeId, c1: usize, feedback: bool) -> Result<()> {
        let (src_fmt, src_name) = {
            let n = self.node(n0)?;
            let c = n.conn(c0)?;
            if !c.dir.is_write() {
                return Err(Error::InvalidGraph(format!(
                    "node '{}:{}:{}': connector '{}' is not a write connector",
                    n.module, n.inst, n.name, c.name
                )));
            }
            (c.format, c.name)
        };
        let n = self.node(n1)?;
        let c = n.conn(c1)?;
        if !c.dir.is_read() {
            return Err(Error::InvalidGraph(format!(
                "node '{}:{}:{}': connector '{}' is not a read connector",
                n.module, n.inst, n.name, c.name
            )));
        }
        let format = Format::negotiate(c.format, src_fmt).map_err(|msg| {
            Error::InvalidGraph(format!(
                "cannot connect node connector '{}' -> '{}': {}",
                src_name, c.name, msg
            ))
        })?;

        let src_roi = self.node(n0)?.conn(c0)?.roi;
        {
            let c = self.node_mut(n1)?.conn_at(c1)?;
            c.link = Some(NodeLink {
                node: n0,
                conn: c0,
                feedback,
            });
            c.format = format;
            // reads adopt the producer's size
            c.roi = src_roi;
        }
        self.node_mut(n0)?.conn_at(c0)?.format = format;
        Ok(())
    }
}

impl Node {
    fn conn_at(&mut self, idx: usize) -> Result<&mut NodeConnector> {
        let ident = (self.module, self.inst, self.name);
        self.connectors.get_mut(idx).ok_or_else(|| {
            Error::InvalidGraph(format!(
                "node '{}:{}:{}': connector index {} out of range",
                ident.0, ident.1, ident.2, idx
            ))
        })
    }
}

/// Construction context for one module's `create_nodes` call.
///
/// Exposes the owning module read-only, lets the plugin add nodes and wire
/// them, and records `connector_copy` calls so module-level connections can
/// be lowered to node connections afterwards. A module write connector maps
/// to exactly one producing node port; a read connector may fan out to any
/// number of node ports.
pub struct NodeCtx<'a> {
    graph: &'a ModuleGraph,
    mid: ModuleId,
    nodes: &'a mut NodeGraph,
    copies: Vec<Vec<(NodeId, usize)>>,
}

impl<'a> NodeCtx<'a> {
    pub fn new(graph: &'a ModuleGraph, mid: ModuleId, nodes: &'a mut NodeGraph) -> Result<Self> {
        let nconns = graph.module(mid)?.connectors.len();
        Ok(Self {
            graph,
            mid,
            nodes,
            copies: vec![Vec::new(); nconns],
        })
    }

    pub fn module(&self) -> Result<&Module> {
        self.graph.module(self.mid)
    }

    /// Committed parameters of the owning module.
    pub fn params(&self) -> Result<&ParamBlock> {
        Ok(&self.module()?.committed)
    }

    /// Resolved ROI of a module connector.
    pub fn roi(&self, mconn: usize) -> Result<Roi> {
        Ok(self.module()?.conn(mconn)?.roi)
    }

    /// Resolved format of a module connector.
    pub fn format(&self, mconn: usize) -> Result<Format> {
        Ok(self.module()?.conn(mconn)?.format)
    }

    /// Add a node stamped with the owning module's identity.
    pub fn add_node(&mut self, desc: NodeDesc) -> Result<NodeId> {
        let (mname, minst) = {
            let m = self.module()?;
            (m.name, m.inst)
        };
        let connectors = desc
            .connectors
            .iter()
            .map(|(d, roi)| NodeConnector::new(d, *roi))
            .collect();
        Ok(self.nodes.add(Node {
            name: desc.name,
            module: mname,
            inst: minst,
            connectors,
            wd: desc.wd,
            ht: desc.ht,
            dp: desc.dp,
            push_constants: desc.push_constants,
        }))
    }

    /// Bind a module connector onto a node connector.
    ///
    /// The node connector inherits the module connector's negotiated format
    /// and resolved ROI, and module-level connections through `mconn` are
    /// later lowered onto the recorded node ports.
    pub fn connector_copy(&mut self, mconn: usize, node: NodeId, nconn: usize) -> Result<()> {
        let (mdir, mfmt, mroi, mname, minst, mcname) = {
            let m = self.module()?;
            let c = m.conn(mconn)?;
            (c.dir, c.format, c.roi, m.name, m.inst, c.name)
        };
        let ndir = self.nodes.node(node)?.conn(nconn)?.dir;
        if mdir.is_read() != ndir.is_read() {
            return Err(Error::Config {
                module: mname,
                inst: minst,
                msg: format!(
                    "connector_copy direction mismatch on '{}': {:?} vs {:?}",
                    mcname, mdir, ndir
                ),
            });
        }
        if mdir.is_write() && !self.copies[mconn].is_empty() {
            return Err(Error::Config {
                module: mname,
                inst: minst,
                msg: format!("write connector '{}' copied to more than one node", mcname),
            });
        }
        {
            let c = self.nodes.node_mut(node)?.conn_at(nconn)?;
            c.format = mfmt;
            c.roi = mroi;
        }
        self.copies[mconn].push((node, nconn));
        Ok(())
    }

    /// Wire two node connectors created by this module.
    pub fn connect(&mut self, n0: NodeId, c0: usize, n1: NodeId, c1: usize) -> Result<()> {
        self.nodes.connect(n0, c0, n1, c1)
    }

    /// Wire two node connectors of this module by name.
    pub fn connect_named(
        &mut self,
        n0: NodeId,
        conn0: Token,
        n1: NodeId,
        conn1: Token,
    ) -> Result<()> {
        self.nodes.connect_named(n0, conn0, n1, conn1)
    }

    /// Previous-iteration wiring between two node connectors of this module.
    pub fn feedback(&mut self, n0: NodeId, c0: usize, n1: NodeId, c1: usize) -> Result<()> {
        self.nodes.feedback(n0, c0, n1, c1)
    }

    /// Node ports each module connector was copied onto, indexed by module
    /// connector.
    pub fn into_copies(self) -> Vec<Vec<(NodeId, usize)>> {
        self.copies
    }
}
