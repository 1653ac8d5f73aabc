//! Frame scheduling: execution order, buffer assignment and submit units.
//!
//! Ordering is a topological sort over non-feedback node links with ties
//! broken by node id, i.e. creation order, so a fixed graph always yields
//! the same schedule. Every write connector gets one buffer; a write read
//! through at least one feedback link gets a two-slot ring instead, whose
//! previous slot is what feedback consumers bind.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use pixelpipe_core::{Format, NodeGraph, NodeId, Roi, Token};

use crate::error::{CompileError, Result};

/// Which half of a feedback ring a binding addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackSlot {
    /// The slot written this frame.
    Current,
    /// The slot written one frame ago.
    Previous,
}

/// A buffer as seen by one binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRef {
    /// Plain per-frame buffer.
    Buffer(usize),
    /// One slot of a double-buffered feedback ring.
    Feedback { ring: usize, slot: FeedbackSlot },
    /// Placeholder bound for absent optional inputs.
    Dummy,
}

/// One bound connector of a submit unit, in connector declaration order.
#[derive(Debug, Clone)]
pub struct Binding {
    pub conn: Token,
    pub write: bool,
    pub buffer: BufferRef,
}

/// One dispatch in execution order.
#[derive(Debug, Clone)]
pub struct SubmitUnit {
    pub node: NodeId,
    pub module: Token,
    pub inst: Token,
    pub kernel: Token,
    /// Dispatch domain in threads.
    pub dispatch: [u32; 3],
    pub push_constants: Vec<u8>,
    pub bindings: Vec<Binding>,
}

/// Allocation request for one buffer or ring slot.
#[derive(Debug, Clone)]
pub struct BufferDesc {
    pub size: u64,
    pub format: Format,
    pub roi: Roi,
}

/// Everything the runtime needs to execute one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameSchedule {
    pub units: Vec<SubmitUnit>,
    pub buffers: Vec<BufferDesc>,
    /// Feedback rings; each is allocated twice and flipped between frames.
    pub rings: Vec<BufferDesc>,
}

/// Order the node graph and assign buffers.
pub fn build_schedule(nodes: &NodeGraph) -> Result<FrameSchedule> {
    let order = execution_order(nodes)?;
    let writes = assign_buffers(nodes, &order)?;

    let mut schedule = FrameSchedule {
        buffers: writes.buffers.clone(),
        rings: writes.rings.clone(),
        units: Vec::with_capacity(order.len()),
    };

    for &nid in &order {
        let node = nodes.node(nid)?;
        let mut bindings = Vec::with_capacity(node.connectors.len());
        for (ci, conn) in node.connectors.iter().enumerate() {
            let buffer = if conn.dir.is_write() {
                writes.lookup(nid, ci)
            } else {
                match conn.link {
                    Some(link) => match writes.lookup(link.node, link.conn) {
                        BufferRef::Feedback { ring, .. } if link.feedback => BufferRef::Feedback {
                            ring,
                            slot: FeedbackSlot::Previous,
                        },
                        other => other,
                    },
                    None => BufferRef::Dummy,
                }
            };
            bindings.push(Binding {
                conn: conn.name,
                write: conn.dir.is_write(),
                buffer,
            });
        }
        schedule.units.push(SubmitUnit {
            node: nid,
            module: node.module,
            inst: node.inst,
            kernel: node.name,
            dispatch: [node.wd, node.ht, node.dp],
            push_constants: node.push_constants.clone(),
            bindings,
        });
    }
    Ok(schedule)
}

/// Topological order over non-feedback links, node id breaking ties.
fn execution_order(nodes: &NodeGraph) -> Result<Vec<NodeId>> {
    let mut dep = DiGraph::<NodeId, ()>::new();
    let mut idx: Vec<NodeIndex> = Vec::with_capacity(nodes.len());
    for (nid, _) in nodes.nodes() {
        idx.push(dep.add_node(nid));
    }
    for (nid, node) in nodes.nodes() {
        for conn in &node.connectors {
            if let Some(link) = conn.link {
                if !link.feedback {
                    dep.add_edge(idx[link.node], idx[nid], ());
                }
            }
        }
    }

    if petgraph::algo::is_cyclic_directed(&dep) {
        return Err(CompileError::InvalidSchedule(
            "node graph contains a non-feedback cycle".to_string(),
        ));
    }

    let mut indegree: Vec<usize> = vec![0; nodes.len()];
    for edge in dep.edge_references() {
        indegree[dep[edge.target()]] += 1;
    }
    let mut ready: Vec<NodeId> = indegree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| i)
        .collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(&next) = ready.first() {
        ready.remove(0);
        order.push(next);
        let mut unlocked: Vec<NodeId> = Vec::new();
        for edge in dep.edges(idx[next]) {
            let t = dep[edge.target()];
            indegree[t] -= 1;
            if indegree[t] == 0 {
                unlocked.push(t);
            }
        }
        unlocked.sort_unstable();
        for id in unlocked {
            let pos = ready.binary_search(&id).unwrap_or_else(|p| p);
            ready.insert(pos, id);
        }
    }

    if order.len() != nodes.len() {
        return Err(CompileError::InvalidSchedule(
            "topological sort did not visit all nodes".to_string(),
        ));
    }
    Ok(order)
}

struct WriteBuffers {
    buffers: Vec<BufferDesc>,
    rings: Vec<BufferDesc>,
    by_port: HashMap<(NodeId, usize), BufferRef>,
}

impl WriteBuffers {
    fn lookup(&self, node: NodeId, conn: usize) -> BufferRef {
        self.by_port
            .get(&(node, conn))
            .copied()
            .unwrap_or(BufferRef::Dummy)
    }
}

/// One buffer per write connector, rings for feedback-consumed writes.
fn assign_buffers(nodes: &NodeGraph, order: &[NodeId]) -> Result<WriteBuffers> {
    // ports read through at least one feedback link
    let mut fed_back: HashMap<(NodeId, usize), bool> = HashMap::new();
    for (_, node) in nodes.nodes() {
        for conn in &node.connectors {
            if let Some(link) = conn.link {
                if link.feedback {
                    fed_back.insert((link.node, link.conn), true);
                }
            }
        }
    }

    let mut out = WriteBuffers {
        buffers: Vec::new(),
        rings: Vec::new(),
        by_port: HashMap::new(),
    };
    for &nid in order {
        let node = nodes.node(nid)?;
        for (ci, conn) in node.connectors.iter().enumerate() {
            if !conn.dir.is_write() {
                continue;
            }
            let size = conn.format.buffer_size(&conn.roi).ok_or_else(|| {
                CompileError::InvalidSchedule(format!(
                    "node '{}:{}:{}' connector '{}' has no concrete format or size",
                    node.module, node.inst, node.name, conn.name
                ))
            })?;
            let desc = BufferDesc {
                size,
                format: conn.format,
                roi: conn.roi,
            };
            let buffer = if fed_back.contains_key(&(nid, ci)) {
                out.rings.push(desc);
                BufferRef::Feedback {
                    ring: out.rings.len() - 1,
                    slot: FeedbackSlot::Current,
                }
            } else {
                out.buffers.push(desc);
                BufferRef::Buffer(out.buffers.len() - 1)
            };
            out.by_port.insert((nid, ci), buffer);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixelpipe_core::{ConnectorDesc, Node, NodeConnector, Roi};

    fn node(name: &str, inputs: usize) -> Node {
        let mut connectors = Vec::new();
        for i in 0..inputs {
            let desc = ConnectorDesc::read(&format!("in{}", i), "rgba", "f16");
            connectors.push(NodeConnector {
                name: desc.name,
                dir: desc.dir,
                format: desc.format,
                roi: Roi::full(16, 16),
                link: None,
            });
        }
        let desc = ConnectorDesc::write("output", "rgba", "f16");
        connectors.push(NodeConnector {
            name: desc.name,
            dir: desc.dir,
            format: desc.format,
            roi: Roi::full(16, 16),
            link: None,
        });
        Node {
            name: Token::new(name),
            module: Token::new("test"),
            inst: Token::new("main"),
            connectors,
            wd: 16,
            ht: 16,
            dp: 1,
            push_constants: Vec::new(),
        }
    }

    #[test]
    fn test_order_is_topological_with_stable_ties() {
        let mut g = NodeGraph::new();
        let a = g.add(node("a", 0));
        let b = g.add(node("b", 1));
        let c = g.add(node("c", 1));
        let d = g.add(node("d", 2));
        // a feeds b and c, both feed d; b and c are tied
        g.connect(a, 0, b, 0).unwrap();
        g.connect(a, 0, c, 0).unwrap();
        g.connect(b, 1, d, 0).unwrap();
        g.connect(c, 1, d, 1).unwrap();

        let schedule = build_schedule(&g).unwrap();
        let order: Vec<NodeId> = schedule.units.iter().map(|u| u.node).collect();
        assert_eq!(order, vec![a, b, c, d]);
    }

    #[test]
    fn test_feedback_gets_ring_and_previous_slot() {
        let mut g = NodeGraph::new();
        let a = g.add(node("a", 1));
        let b = g.add(node("b", 1));
        g.connect(a, 1, b, 0).unwrap();
        // b's output feeds back into a
        g.feedback(b, 1, a, 0).unwrap();

        let schedule = build_schedule(&g).unwrap();
        assert_eq!(schedule.rings.len(), 1);
        assert_eq!(schedule.buffers.len(), 1);

        let unit_a = schedule.units.iter().find(|u| u.node == a).unwrap();
        assert_eq!(
            unit_a.bindings[0].buffer,
            BufferRef::Feedback {
                ring: 0,
                slot: FeedbackSlot::Previous
            }
        );
        let unit_b = schedule.units.iter().find(|u| u.node == b).unwrap();
        assert_eq!(
            unit_b.bindings[1].buffer,
            BufferRef::Feedback {
                ring: 0,
                slot: FeedbackSlot::Current
            }
        );
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut g = NodeGraph::new();
        let a = g.add(node("a", 1));
        let b = g.add(node("b", 1));
        g.connect(a, 1, b, 0).unwrap();
        g.connect(b, 1, a, 0).unwrap();
        assert!(matches!(
            build_schedule(&g),
            Err(CompileError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn test_unlinked_optional_input_binds_dummy() {
        let mut g = NodeGraph::new();
        let a = g.add(node("a", 1));
        let schedule = build_schedule(&g).unwrap();
        assert_eq!(schedule.units[0].bindings[0].buffer, BufferRef::Dummy);
        let _ = a;
    }

    #[test]
    fn test_wildcard_format_fails_sizing() {
        let mut g = NodeGraph::new();
        let mut n = node("a", 0);
        n.connectors[0].format = Format::new("rgba", "*");
        g.add(n);
        assert!(matches!(
            build_schedule(&g),
            Err(CompileError::InvalidSchedule(_))
        ));
    }
}
