//! Line-oriented text serialization of a module graph.
//!
//! One record per line, colon-separated tokens:
//!
//! ```text
//! module:<type>:<inst>
//! connect:<src type>:<src inst>:<src conn>:<dst type>:<dst inst>:<dst conn>
//! feedback:<src type>:<src inst>:<src conn>:<dst type>:<dst inst>:<dst conn>
//! param:<type>:<inst>:<name>:<v0>[:<v1>...]
//! ```
//!
//! Modules are emitted in id order and connections from the read side, so
//! the dump is deterministic for a fixed edit history.

use std::fmt::Write;

use crate::graph::{ModuleGraph, ModuleId};
use crate::module::Module;
use crate::params::ParamKind;
use crate::Result;

/// Serialize the whole graph: modules, then connections, then parameters.
pub fn write_graph_ascii(graph: &ModuleGraph) -> Result<String> {
    let mut out = String::new();
    for (_, module) in graph.modules() {
        write_module_ascii(&mut out, module);
    }
    for (mid, _) in graph.modules() {
        write_connection_ascii(&mut out, graph, mid)?;
    }
    for (_, module) in graph.modules() {
        write_param_ascii(&mut out, module)?;
    }
    Ok(out)
}

pub fn write_module_ascii(out: &mut String, module: &Module) {
    let _ = writeln!(out, "module:{}:{}", module.name, module.inst);
}

/// Emit one `connect:`/`feedback:` line per linked read connector of `mid`.
pub fn write_connection_ascii(out: &mut String, graph: &ModuleGraph, mid: ModuleId) -> Result<()> {
    let module = graph.module(mid)?;
    for conn in &module.connectors {
        let link = match conn.link {
            Some(link) => link,
            None => continue,
        };
        let src = graph.module(link.module)?;
        let src_conn = src.conn(link.conn)?;
        let kind = if link.feedback { "feedback" } else { "connect" };
        let _ = writeln!(
            out,
            "{}:{}:{}:{}:{}:{}:{}",
            kind, src.name, src.inst, src_conn.name, module.name, module.inst, conn.name
        );
    }
    Ok(())
}

/// Emit one `param:` line per parameter, values in declaration order.
pub fn write_param_ascii(out: &mut String, module: &Module) -> Result<()> {
    for desc in module.params.layout().descs().to_vec() {
        let _ = write!(out, "param:{}:{}:{}", module.name, module.inst, desc.name);
        match desc.kind {
            ParamKind::F32 => {
                for v in module.params.f32s(desc.name)? {
                    let _ = write!(out, ":{}", v);
                }
            }
            ParamKind::I32 => {
                for v in module.params.i32s(desc.name)? {
                    let _ = write!(out, ":{}", v);
                }
            }
            ParamKind::Str => {
                let _ = write!(out, ":{}", module.params.string(desc.name)?);
            }
        }
        let _ = writeln!(out);
    }
    Ok(())
}
