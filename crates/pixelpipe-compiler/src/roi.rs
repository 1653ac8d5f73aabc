//! Two-pass region-of-interest negotiation.
//!
//! The backward pass walks modules in reverse topological order and
//! propagates size *requests* from sinks toward sources; a request of 0
//! means "whatever is available". The forward pass walks in topological
//! order and resolves what each connector actually *delivers*: read
//! connectors adopt the upstream full size and scale and clamp their
//! request to what upstream produces. Requests are re-derived from scratch
//! on every run, so resolving an already-resolved graph is a no-op.

use pixelpipe_core::{ModuleGraph, ModuleId, Roi};

use crate::error::{CompileError, Result};

/// Run both negotiation passes and validate the outcome.
pub fn resolve_rois(graph: &mut ModuleGraph, order: &[ModuleId]) -> Result<()> {
    reset_requests(graph, order)?;
    backward_pass(graph, order)?;
    forward_pass(graph, order)?;
    validate(graph, order)
}

fn reset_requests(graph: &mut ModuleGraph, order: &[ModuleId]) -> Result<()> {
    for &mid in order {
        let m = graph.module_mut(mid)?;
        for c in &mut m.connectors {
            c.roi.wd = 0;
            c.roi.ht = 0;
            c.roi.scale = 1.0;
        }
    }
    Ok(())
}

/// Reverse topological walk: pull requests from consumers onto write
/// connectors, then let the module translate them onto its read connectors
/// (`modify_roi_out`, defaulting to a plain copy of the maximum request).
fn backward_pass(graph: &mut ModuleGraph, order: &[ModuleId]) -> Result<()> {
    for &mid in order.iter().rev() {
        let nconns = graph.module(mid)?.connectors.len();
        for ci in 0..nconns {
            if !graph.module(mid)?.conn(ci)?.dir.is_write() {
                continue;
            }
            let consumers = graph.consumers(mid, ci);
            // any consumer asking for "whatever is available" wins
            let mut open = consumers.is_empty();
            let (mut wd, mut ht) = (0u32, 0u32);
            for (cmid, cci) in consumers {
                let r = graph.module(cmid)?.conn(cci)?.roi;
                if r.wd == 0 || r.ht == 0 {
                    open = true;
                }
                wd = wd.max(r.wd);
                ht = ht.max(r.ht);
            }
            let c = graph.module_mut(mid)?.conn_mut(ci)?;
            if open {
                c.roi.wd = 0;
                c.roi.ht = 0;
            } else {
                c.roi.wd = wd;
                c.roi.ht = ht;
            }
        }

        let so = graph.module(mid)?.so.clone();
        if so.caps.modify_roi_out {
            so.plugin().modify_roi_out(graph, mid)?;
        } else {
            default_roi_out(graph, mid)?;
        }
    }
    Ok(())
}

/// Default backward behaviour: read connectors request what the write
/// connectors were asked for.
fn default_roi_out(graph: &mut ModuleGraph, mid: ModuleId) -> Result<()> {
    let mut open = false;
    let (mut wd, mut ht) = (0u32, 0u32);
    for c in &graph.module(mid)?.connectors {
        if c.dir.is_write() {
            if c.roi.wd == 0 || c.roi.ht == 0 {
                open = true;
            }
            wd = wd.max(c.roi.wd);
            ht = ht.max(c.roi.ht);
        }
    }
    let m = graph.module_mut(mid)?;
    for c in &mut m.connectors {
        if c.dir.is_read() {
            if open {
                c.roi.wd = 0;
                c.roi.ht = 0;
            } else {
                c.roi.wd = wd;
                c.roi.ht = ht;
            }
        }
    }
    Ok(())
}

/// Topological walk: resolve read connectors against what upstream
/// delivers, then let the module size its outputs (`modify_roi_in`,
/// defaulting to mirroring the first connected input). Feedback reads are
/// resolved afterwards, once their source is sized.
fn forward_pass(graph: &mut ModuleGraph, order: &[ModuleId]) -> Result<()> {
    for &mid in order {
        let nconns = graph.module(mid)?.connectors.len();
        for ci in 0..nconns {
            let (dir, link, optional, cname, mname, minst) = {
                let m = graph.module(mid)?;
                let c = m.conn(ci)?;
                (c.dir, c.link, c.optional, c.name, m.name, m.inst)
            };
            if !dir.is_read() {
                continue;
            }
            match link {
                Some(l) if !l.feedback => resolve_read(graph, mid, ci, l.module, l.conn)?,
                Some(_) => {} // feedback: resolved below
                None if optional => {}
                None => {
                    return Err(CompileError::Module {
                        module: mname,
                        inst: minst,
                        msg: format!("read connector '{}' is not connected", cname),
                    })
                }
            }
        }

        let so = graph.module(mid)?.so.clone();
        if so.caps.modify_roi_in {
            so.plugin().modify_roi_in(graph, mid)?;
        } else {
            default_roi_in(graph, mid)?;
        }
    }

    // Feedback reads observe the previous iteration of an already-sized
    // source, so they can be resolved after the main walk.
    for &mid in order {
        let nconns = graph.module(mid)?.connectors.len();
        for ci in 0..nconns {
            let link = graph.module(mid)?.conn(ci)?.link;
            match link {
                Some(l) if l.feedback => resolve_read(graph, mid, ci, l.module, l.conn)?,
                _ => {}
            }
        }
    }
    Ok(())
}

fn resolve_read(
    graph: &mut ModuleGraph,
    mid: ModuleId,
    ci: usize,
    up_mid: ModuleId,
    up_ci: usize,
) -> Result<()> {
    let up = graph.module(up_mid)?.conn(up_ci)?.roi;
    let c = graph.module_mut(mid)?.conn_mut(ci)?;
    c.roi.full_wd = up.full_wd;
    c.roi.full_ht = up.full_ht;
    c.roi.scale = up.scale;
    c.roi.clamp_request(up.wd, up.ht);
    Ok(())
}

/// Default forward behaviour: write connectors mirror the first connected
/// non-feedback input, their backward request clamped to its size.
fn default_roi_in(graph: &mut ModuleGraph, mid: ModuleId) -> Result<()> {
    let base: Option<Roi> = graph
        .module(mid)?
        .connectors
        .iter()
        .find(|c| c.dir.is_read() && matches!(c.link, Some(l) if !l.feedback))
        .map(|c| c.roi);
    let base = match base {
        Some(roi) => roi,
        None => return Ok(()), // source module, sized by its own callbacks
    };
    let m = graph.module_mut(mid)?;
    for c in &mut m.connectors {
        if c.dir.is_write() {
            c.roi.full_wd = base.full_wd;
            c.roi.full_ht = base.full_ht;
            c.roi.scale = base.scale;
            c.roi.clamp_request(base.wd, base.ht);
        }
    }
    Ok(())
}

/// Every connector that participates in a connection must end up with a
/// concrete, positive size and a valid scale.
fn validate(graph: &ModuleGraph, order: &[ModuleId]) -> Result<()> {
    for &mid in order {
        let m = graph.module(mid)?;
        for (ci, c) in m.connectors.iter().enumerate() {
            let in_use = if c.dir.is_read() {
                c.link.is_some()
            } else {
                !graph.consumers(mid, ci).is_empty()
            };
            if !in_use {
                continue;
            }
            if c.roi.wd == 0 || c.roi.ht == 0 {
                return Err(CompileError::Module {
                    module: m.name,
                    inst: m.inst,
                    msg: format!("connector '{}' resolved to an empty region", c.name),
                });
            }
            if let Err(msg) = c.roi.validate() {
                return Err(CompileError::Module {
                    module: m.name,
                    inst: m.inst,
                    msg: format!("connector '{}': {}", c.name, msg),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixelpipe_core::{
        Caps, ConnectorDesc, ModuleDesc, ModulePlugin, NodeCtx, ParamLayout, PluginRegistry, Token,
    };

    struct Source;

    impl ModulePlugin for Source {
        fn describe(&self) -> ModuleDesc {
            ModuleDesc::new("src").connector(ConnectorDesc::write("output", "rgba", "f16"))
        }

        fn caps(&self) -> Caps {
            Caps::new().with_create_nodes().with_modify_roi_out()
        }

        fn modify_roi_out(
            &self,
            graph: &mut ModuleGraph,
            mid: ModuleId,
        ) -> pixelpipe_core::Result<()> {
            let c = graph.module_mut(mid)?.conn_mut(0)?;
            c.roi.full_wd = 4000;
            c.roi.full_ht = 3000;
            c.roi.wd = 4000;
            c.roi.ht = 3000;
            Ok(())
        }

        fn create_nodes(&self, _ctx: &mut NodeCtx<'_>) -> pixelpipe_core::Result<()> {
            Ok(())
        }
    }

    struct Crop;

    impl ModulePlugin for Crop {
        fn describe(&self) -> ModuleDesc {
            ModuleDesc::new("crop")
                .connector(ConnectorDesc::read("input", "rgba", "*"))
                .connector(ConnectorDesc::write("output", "rgba", "f16"))
                .params(ParamLayout::builder().i32("size", 2, &[1000, 1000]).build())
        }

        fn caps(&self) -> Caps {
            Caps::new()
                .with_create_nodes()
                .with_modify_roi_out()
                .with_modify_roi_in()
        }

        fn modify_roi_out(
            &self,
            graph: &mut ModuleGraph,
            mid: ModuleId,
        ) -> pixelpipe_core::Result<()> {
            let size = graph.module(mid)?.committed.i32s(Token::new("size"))?;
            let c = graph.module_mut(mid)?.conn_mut(0)?;
            c.roi.wd = size[0] as u32;
            c.roi.ht = size[1] as u32;
            Ok(())
        }

        fn modify_roi_in(
            &self,
            graph: &mut ModuleGraph,
            mid: ModuleId,
        ) -> pixelpipe_core::Result<()> {
            let input = graph.module(mid)?.conn(0)?.roi;
            let c = graph.module_mut(mid)?.conn_mut(1)?;
            c.roi = Roi {
                full_wd: input.wd,
                full_ht: input.ht,
                ..input
            };
            Ok(())
        }

        fn create_nodes(&self, _ctx: &mut NodeCtx<'_>) -> pixelpipe_core::Result<()> {
            Ok(())
        }
    }

    struct Display;

    impl ModulePlugin for Display {
        fn describe(&self) -> ModuleDesc {
            ModuleDesc::new("display").connector(ConnectorDesc::read("input", "rgba", "*"))
        }

        fn caps(&self) -> Caps {
            Caps::new().with_create_nodes()
        }

        fn create_nodes(&self, _ctx: &mut NodeCtx<'_>) -> pixelpipe_core::Result<()> {
            Ok(())
        }
    }

    fn pipeline() -> (ModuleGraph, ModuleId, ModuleId, ModuleId) {
        let mut reg = PluginRegistry::new();
        reg.register(Box::new(Source)).unwrap();
        reg.register(Box::new(Crop)).unwrap();
        reg.register(Box::new(Display)).unwrap();

        let mut g = ModuleGraph::new();
        let s = g.add_module(&reg, Token::new("src"), Token::new("m")).unwrap();
        let c = g.add_module(&reg, Token::new("crop"), Token::new("m")).unwrap();
        let d = g.add_module(&reg, Token::new("display"), Token::new("m")).unwrap();
        g.connect(s, 0, c, 0).unwrap();
        g.connect(c, 1, d, 0).unwrap();
        // fixed-layout tests commit by hand
        crate::commit::commit_params(&mut g).unwrap();
        (g, s, c, d)
    }

    #[test]
    fn test_crop_pipeline_resolves() {
        let (mut g, s, c, d) = pipeline();
        let order = g.topological_order().unwrap();
        resolve_rois(&mut g, &order).unwrap();

        // source delivers its full size, the crop consumes all of it
        let src_out = g.module(s).unwrap().conn(0).unwrap().roi;
        assert_eq!((src_out.wd, src_out.ht), (4000, 3000));
        let crop_in = g.module(c).unwrap().conn(0).unwrap().roi;
        assert_eq!((crop_in.full_wd, crop_in.full_ht), (4000, 3000));

        // the crop's output is the requested window at native scale
        let crop_out = g.module(c).unwrap().conn(1).unwrap().roi;
        assert_eq!((crop_out.wd, crop_out.ht), (1000, 1000));
        assert_eq!(crop_out.scale, 1.0);

        let disp_in = g.module(d).unwrap().conn(0).unwrap().roi;
        assert_eq!((disp_in.wd, disp_in.ht), (1000, 1000));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let (mut g, _, _, _) = pipeline();
        let order = g.topological_order().unwrap();
        resolve_rois(&mut g, &order).unwrap();
        let first: Vec<Roi> = g
            .modules()
            .flat_map(|(_, m)| m.connectors.iter().map(|c| c.roi))
            .collect();
        resolve_rois(&mut g, &order).unwrap();
        let second: Vec<Roi> = g
            .modules()
            .flat_map(|(_, m)| m.connectors.iter().map(|c| c.roi))
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_overlarge_request_is_clamped() {
        let (mut g, _, c, _) = pipeline();
        g.module_mut(c)
            .unwrap()
            .params
            .set_i32s(Token::new("size"), &[9999, 9999])
            .unwrap();
        crate::commit::commit_params(&mut g).unwrap();
        let order = g.topological_order().unwrap();
        resolve_rois(&mut g, &order).unwrap();
        let crop_in = g.module(c).unwrap().conn(0).unwrap().roi;
        assert_eq!((crop_in.wd, crop_in.ht), (4000, 3000));
    }

    #[test]
    fn test_unconnected_input_fails() {
        let mut reg = PluginRegistry::new();
        reg.register(Box::new(Display)).unwrap();
        let mut g = ModuleGraph::new();
        g.add_module(&reg, Token::new("display"), Token::new("m")).unwrap();
        let order = g.topological_order().unwrap();
        assert!(matches!(
            resolve_rois(&mut g, &order),
            Err(CompileError::Module { .. })
        ));
    }
}
