//! Lowering modules to compute nodes.
//!
//! Each module's `create_nodes` emits nodes into a shared [`NodeGraph`] and
//! records which node ports mirror which module connectors. Module-level
//! connections are then lowered onto those recorded ports: the producing
//! module's write connector maps to exactly one node port, the consuming
//! module's read connector may fan out to several.

use std::collections::HashMap;

use pixelpipe_core::{ModuleGraph, ModuleId, NodeCtx, NodeGraph, NodeId};

use crate::error::{CompileError, Result};

/// Run `create_nodes` for every module and wire the node graph.
pub fn create_nodes(graph: &ModuleGraph, order: &[ModuleId]) -> Result<NodeGraph> {
    let mut nodes = NodeGraph::new();
    let mut copies: HashMap<ModuleId, Vec<Vec<(NodeId, usize)>>> = HashMap::new();

    for &mid in order {
        let so = graph.module(mid)?.so.clone();
        let mut ctx = NodeCtx::new(graph, mid, &mut nodes)?;
        so.plugin().create_nodes(&mut ctx)?;
        copies.insert(mid, ctx.into_copies());
    }

    lower_connections(graph, order, &mut nodes, &copies)?;
    Ok(nodes)
}

fn lower_connections(
    graph: &ModuleGraph,
    order: &[ModuleId],
    nodes: &mut NodeGraph,
    copies: &HashMap<ModuleId, Vec<Vec<(NodeId, usize)>>>,
) -> Result<()> {
    for &mid in order {
        let m = graph.module(mid)?;
        for (ci, conn) in m.connectors.iter().enumerate() {
            let link = match conn.link {
                Some(link) => link,
                None => continue,
            };
            let sinks = &copies[&mid][ci];
            if sinks.is_empty() {
                // the module chose not to consume this input at node level
                continue;
            }
            let producer = graph.module(link.module)?;
            let sources = &copies[&link.module][link.conn];
            let &(src_node, src_conn) = match sources.as_slice() {
                [one] => one,
                [] => {
                    return Err(CompileError::Module {
                        module: producer.name,
                        inst: producer.inst,
                        msg: format!(
                            "write connector '{}' was not bound to any node",
                            producer.conn(link.conn)?.name
                        ),
                    })
                }
                _ => {
                    return Err(CompileError::Module {
                        module: producer.name,
                        inst: producer.inst,
                        msg: format!(
                            "write connector '{}' bound to more than one node",
                            producer.conn(link.conn)?.name
                        ),
                    })
                }
            };
            for &(dst_node, dst_conn) in sinks {
                if link.feedback {
                    nodes.feedback(src_node, src_conn, dst_node, dst_conn)?;
                } else {
                    nodes.connect(src_node, src_conn, dst_node, dst_conn)?;
                }
            }
        }
    }
    Ok(())
}
