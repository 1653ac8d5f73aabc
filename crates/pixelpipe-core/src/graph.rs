//! The persistent, user-editable module graph.
//!
//! Modules live in a `StableGraph` so module ids stay valid across add and
//! remove; connections are stored on the read-side connectors with a
//! matching petgraph edge for ordering. The graph is acyclic at the module
//! level except through explicitly marked feedback connections, which are
//! excluded from topological ordering.

use std::collections::HashMap;

use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};

use crate::connector::ConnLink;
use crate::format::Format;
use crate::module::Module;
use crate::registry::PluginRegistry;
use crate::token::Token;
use crate::{Error, Result};

/// Identifier of a module within a graph (stable across removals).
pub type ModuleId = NodeIndex;

/// Edge payload: whether this connection is a feedback edge.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnEdge {
    pub feedback: bool,
}

/// The full collection of modules for one pipeline.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    graph: StableGraph<Module, ConnEdge>,
    by_token: HashMap<(Token, Token), ModuleId>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Module access ──

    pub fn module(&self, mid: ModuleId) -> Result<&Module> {
        self.graph
            .node_weight(mid)
            .ok_or_else(|| Error::InvalidGraph(format!("module {:?} not found", mid)))
    }

    pub fn module_mut(&mut self, mid: ModuleId) -> Result<&mut Module> {
        self.graph
            .node_weight_mut(mid)
            .ok_or_else(|| Error::InvalidGraph(format!("module {:?} not found", mid)))
    }

    /// Look up a module by (type, instance) tokens.
    pub fn module_by_token(&self, name: Token, inst: Token) -> Option<ModuleId> {
        self.by_token.get(&(name, inst)).copied()
    }

    /// Iterate modules in id order (deterministic for a fixed edit history).
    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.graph
            .node_indices()
            .filter_map(|id| self.graph.node_weight(id).map(|m| (id, m)))
    }

    pub fn module_count(&self) -> usize {
        self.graph.node_count()
    }

    // ── Editing ──

    /// Add a module instance of a registered type.
    ///
    /// Resolving an unknown or unusable type fails with the load error and
    /// leaves the graph unmodified, as does a duplicate (name, inst) pair.
    pub fn add_module(
        &mut self,
        registry: &PluginRegistry,
        name: Token,
        inst: Token,
    ) -> Result<ModuleId> {
        let so = registry.resolve(name)?;
        if self.by_token.contains_key(&(name, inst)) {
            return Err(Error::Config {
                module: name,
                inst,
                msg: "duplicate module instance".into(),
            });
        }
        let mut module = Module::new(so.clone(), inst);
        if so.caps.init {
            so.plugin().init(&mut module)?;
        }
        let mid = self.graph.add_node(module);
        self.by_token.insert((name, inst), mid);
        Ok(mid)
    }

    /// Remove a module, dropping every connection through it.
    pub fn remove_module(&mut self, mid: ModuleId) -> Result<()> {
        let (name, inst) = {
            let m = self.module(mid)?;
            (m.name, m.inst)
        };
        // Unlink downstream read connectors that point at the victim.
        let downstream: Vec<ModuleId> = self.graph.node_indices().collect();
        for other in downstream {
            if other == mid {
                continue;
            }
            if let Some(m) = self.graph.node_weight_mut(other) {
                for c in &mut m.connectors {
                    if matches!(c.link, Some(l) if l.module == mid) {
                        c.link = None;
                        c.format = c.decl_format;
                    }
                }
            }
        }
        self.graph.remove_node(mid);
        self.by_token.remove(&(name, inst));
        Ok(())
    }

    /// Wire a write connector into a read connector by index.
    ///
    /// Performs format negotiation: a wildcard adopts the concrete peer
    /// value, two incompatible concrete values are a configuration error
    /// reported against this connection. Reconnecting a read connector
    /// replaces its previous link.
    pub fn connect(&mut self, m0: ModuleId, c0: usize, m1: ModuleId, c1: usize) -> Result<()> {
        self.connect_inner(m0, c0, m1, c1, false)
    }

    /// Like [`connect`](Self::connect), but marks the connection as
    /// feedback: the sink observes the previous iteration's value, and the
    /// edge does not constrain topological ordering.
    pub fn feedback(&mut self, m0: ModuleId, c0: usize, m1: ModuleId, c1: usize) -> Result<()> {
        self.connect_inner(m0, c0, m1, c1, true)
    }

    /// Wire by connector names instead of indices.
    pub fn connect_named(
        &mut self,
        m0: ModuleId,
        conn0: Token,
        m1: ModuleId,
        conn1: Token,
    ) -> Result<()> {
        let c0 = self.conn_index(m0, conn0)?;
        let c1 = self.conn_index(m1, conn1)?;
        self.connect(m0, c0, m1, c1)
    }

    fn conn_index(&self, mid: ModuleId, name: Token) -> Result<usize> {
        let m = self.module(mid)?;
        m.connector(name).ok_or_else(|| Error::Config {
            module: m.name,
            inst: m.inst,
            msg: format!("no connector '{}'", name),
        })
    }

    fn connect_inner(
        &mut self,
        m0: ModuleId,
        c0: usize,
        m1: ModuleId,
        c1: usize,
        feedback: bool,
    ) -> Result<()> {
        let (src_fmt, src_ident) = {
            let m = self.module(m0)?;
            let c = m.conn(c0)?;
            if !c.dir.is_write() {
                return Err(Error::Config {
                    module: m.name,
                    inst: m.inst,
                    msg: format!("connector '{}' is not a write connector", c.name),
                });
            }
            (c.format, (m.name, m.inst, c.name))
        };
        let (dst_fmt, dst_ident) = {
            let m = self.module(m1)?;
            let c = m.conn(c1)?;
            if !c.dir.is_read() {
                return Err(Error::Config {
                    module: m.name,
                    inst: m.inst,
                    msg: format!("connector '{}' is not a read connector", c.name),
                });
            }
            (c.decl_format, (m.name, m.inst, c.name))
        };

        let format = Format::negotiate(dst_fmt, src_fmt).map_err(|msg| Error::Config {
            module: dst_ident.0,
            inst: dst_ident.1,
            msg: format!(
                "cannot connect {}:{}:{} -> {}:{}:{}: {}",
                src_ident.0, src_ident.1, src_ident.2, dst_ident.0, dst_ident.1, dst_ident.2, msg
            ),
        })?;

        // Replace any previous link on the read side.
        if let Some(old) = self.module(m1)?.conn(c1)?.link {
            self.graph.remove_edge(old.edge);
        }
        let edge = self.graph.add_edge(m0, m1, ConnEdge { feedback });

        {
            let c = self.module_mut(m1)?.conn_mut(c1)?;
            c.link = Some(ConnLink {
                module: m0,
                conn: c0,
                feedback,
                edge,
            });
            c.format = format;
        }
        {
            let c = self.module_mut(m0)?.conn_mut(c0)?;
            c.format = format;
        }
        Ok(())
    }

    /// Drop the link into a read connector, restoring its declared format.
    pub fn disconnect(&mut self, m1: ModuleId, c1: usize) -> Result<()> {
        let old = self.module(m1)?.conn(c1)?.link;
        if let Some(link) = old {
            self.graph.remove_edge(link.edge);
            let c = self.module_mut(m1)?.conn_mut(c1)?;
            c.link = None;
            c.format = c.decl_format;
        }
        Ok(())
    }

    /// Modules consuming the given write connector (via non-feedback or
    /// feedback links alike), with the consuming connector index.
    pub fn consumers(&self, mid: ModuleId, conn: usize) -> Vec<(ModuleId, usize)> {
        let mut out = Vec::new();
        for (other, m) in self.modules() {
            for (ci, c) in m.connectors.iter().enumerate() {
                if matches!(c.link, Some(l) if l.module == mid && l.conn == conn) {
                    out.push((other, ci));
                }
            }
        }
        out
    }

    // ── Ordering ──

    /// Topological order over non-feedback connections.
    ///
    /// Ties between independently orderable modules are broken by module id,
    /// i.e. declaration order, so the result is stable for a fixed graph.
    /// A cycle through non-feedback connections is a configuration error.
    pub fn topological_order(&self) -> Result<Vec<ModuleId>> {
        let mut indegree: HashMap<ModuleId, usize> =
            self.graph.node_indices().map(|id| (id, 0)).collect();
        for edge in self.graph.edge_references() {
            if !edge.weight().feedback {
                *indegree.entry(edge.target()).or_default() += 1;
            }
        }

        let mut ready: Vec<ModuleId> = indegree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();
        ready.sort();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(&next) = ready.first() {
            ready.remove(0);
            order.push(next);
            let mut unlocked = Vec::new();
            for edge in self.graph.edges(next) {
                if edge.weight().feedback {
                    continue;
                }
                if let Some(d) = indegree.get_mut(&edge.target()) {
                    *d -= 1;
                    if *d == 0 {
                        unlocked.push(edge.target());
                    }
                }
            }
            unlocked.sort();
            for id in unlocked {
                let pos = ready.binary_search(&id).unwrap_or_else(|p| p);
                ready.insert(pos, id);
            }
        }

        if order.len() != self.graph.node_count() {
            return Err(Error::InvalidGraph(
                "module graph contains a non-feedback cycle".into(),
            ));
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::ConnectorDesc;
    use crate::node::NodeCtx;
    use crate::plugin::{Caps, ModuleDesc, ModulePlugin};
    use crate::registry::PluginRegistry;

    struct Pass {
        name: &'static str,
    }

    impl ModulePlugin for Pass {
        fn describe(&self) -> ModuleDesc {
            ModuleDesc::new(self.name)
                .connector(ConnectorDesc::read("input", "rgba", "*"))
                .connector(ConnectorDesc::write("output", "rgba", "f16"))
        }

        fn caps(&self) -> Caps {
            Caps::new().with_create_nodes()
        }

        fn create_nodes(&self, _ctx: &mut NodeCtx<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn registry() -> PluginRegistry {
        let mut r = PluginRegistry::new();
        r.register(Box::new(Pass { name: "a" })).unwrap();
        r.register(Box::new(Pass { name: "b" })).unwrap();
        r.register(Box::new(Pass { name: "c" })).unwrap();
        r
    }

    fn tok(s: &str) -> Token {
        Token::new(s)
    }

    #[test]
    fn test_add_and_lookup() {
        let reg = registry();
        let mut g = ModuleGraph::new();
        let a = g.add_module(&reg, tok("a"), tok("main")).unwrap();
        assert_eq!(g.module_by_token(tok("a"), tok("main")), Some(a));
        assert_eq!(g.module_count(), 1);
        // duplicate instance
        assert!(g.add_module(&reg, tok("a"), tok("main")).is_err());
        assert_eq!(g.module_count(), 1);
    }

    #[test]
    fn test_unusable_type_leaves_graph_unmodified() {
        struct NoNodes;

        impl ModulePlugin for NoNodes {
            fn describe(&self) -> ModuleDesc {
                ModuleDesc::new("broken").connector(ConnectorDesc::read("input", "rgba", "*"))
            }

            fn caps(&self) -> Caps {
                Caps::new()
            }
        }

        let mut reg = registry();
        assert!(reg.register(Box::new(NoNodes)).is_err());
        let mut g = ModuleGraph::new();
        let err = g.add_module(&reg, tok("broken"), tok("main")).unwrap_err();
        assert!(matches!(err, Error::Load(_)));
        assert_eq!(g.module_count(), 0);
        assert_eq!(g.module_by_token(tok("broken"), tok("main")), None);
    }

    #[test]
    fn test_connect_negotiates_format() {
        let reg = registry();
        let mut g = ModuleGraph::new();
        let a = g.add_module(&reg, tok("a"), tok("m")).unwrap();
        let b = g.add_module(&reg, tok("b"), tok("m")).unwrap();
        g.connect_named(a, tok("output"), b, tok("input")).unwrap();
        let c = g.module(b).unwrap().conn(0).unwrap();
        assert_eq!(c.format, Format::new("rgba", "f16"));
        assert!(c.link.is_some());
    }

    #[test]
    fn test_reconnect_replaces_link() {
        let reg = registry();
        let mut g = ModuleGraph::new();
        let a = g.add_module(&reg, tok("a"), tok("m")).unwrap();
        let b = g.add_module(&reg, tok("b"), tok("m")).unwrap();
        let c = g.add_module(&reg, tok("c"), tok("m")).unwrap();
        g.connect(a, 1, c, 0).unwrap();
        g.connect(b, 1, c, 0).unwrap();
        let link = g.module(c).unwrap().conn(0).unwrap().link.unwrap();
        assert_eq!(link.module, b);
        // only one edge left, so ordering sees b -> c but not a -> c
        let order = g.topological_order().unwrap();
        let pos = |id| order.iter().position(|&x| x == id).unwrap();
        assert!(pos(b) < pos(c));
    }

    #[test]
    fn test_topological_order_with_feedback() {
        let reg = registry();
        let mut g = ModuleGraph::new();
        let a = g.add_module(&reg, tok("a"), tok("m")).unwrap();
        let b = g.add_module(&reg, tok("b"), tok("m")).unwrap();
        g.connect(a, 1, b, 0).unwrap();
        // feedback back-edge must not create an ordering cycle
        g.feedback(b, 1, a, 0).unwrap();
        let order = g.topological_order().unwrap();
        assert_eq!(order, vec![a, b]);
    }

    #[test]
    fn test_non_feedback_cycle_rejected() {
        let reg = registry();
        let mut g = ModuleGraph::new();
        let a = g.add_module(&reg, tok("a"), tok("m")).unwrap();
        let b = g.add_module(&reg, tok("b"), tok("m")).unwrap();
        g.connect(a, 1, b, 0).unwrap();
        g.connect(b, 1, a, 0).unwrap();
        assert!(g.topological_order().is_err());
    }

    #[test]
    fn test_remove_module_unlinks_consumers() {
        let reg = registry();
        let mut g = ModuleGraph::new();
        let a = g.add_module(&reg, tok("a"), tok("m")).unwrap();
        let b = g.add_module(&reg, tok("b"), tok("m")).unwrap();
        g.connect(a, 1, b, 0).unwrap();
        g.remove_module(a).unwrap();
        assert!(g.module(b).unwrap().conn(0).unwrap().link.is_none());
        assert_eq!(g.module_count(), 1);
        assert_eq!(g.module_by_token(tok("a"), tok("m")), None);
    }

    #[test]
    fn test_connect_direction_checked() {
        let reg = registry();
        let mut g = ModuleGraph::new();
        let a = g.add_module(&reg, tok("a"), tok("m")).unwrap();
        let b = g.add_module(&reg, tok("b"), tok("m")).unwrap();
        // read -> read
        assert!(g.connect(a, 0, b, 0).is_err());
        // write -> write
        assert!(g.connect(a, 1, b, 1).is_err());
    }
}
