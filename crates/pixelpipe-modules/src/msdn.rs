//! Multi-scale denoise. Builds a mip chain of the input, filters every
//! level, then reassembles fine to coarse. Each assembly stage is guided by
//! the previous frame's next-coarser result, which stabilizes the filter
//! over time without ordering the current frame's levels against each
//! other.

use pixelpipe_core::{
    Caps, ConnectorDesc, ModuleDesc, ModulePlugin, NodeCtx, NodeDesc, ParamLayout, Result, Token,
};

/// Mip levels including the native resolution.
const LEVELS: usize = 4;

/// Push constants shared by the filter and assemble kernels.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct MsdnPush {
    strength: f32,
    level: u32,
}

pub struct Msdn;

impl ModulePlugin for Msdn {
    fn describe(&self) -> ModuleDesc {
        ModuleDesc::new("msdn")
            .connector(ConnectorDesc::read("input", "rgba", "*"))
            .connector(ConnectorDesc::write("output", "rgba", "f16"))
            .params(ParamLayout::builder().f32("strength", 1, &[1.0]).build())
    }

    fn caps(&self) -> Caps {
        Caps::new().with_create_nodes()
    }

    fn create_nodes(&self, ctx: &mut NodeCtx<'_>) -> Result<()> {
        let strength = ctx.params()?.f32s(Token::new("strength"))?[0];
        let mut rois = vec![ctx.roi(0)?];
        for l in 1..LEVELS {
            rois.push(rois[l - 1].half());
        }
        let push = |level: usize| MsdnPush {
            strength,
            level: level as u32,
        };

        // mip chain: down[l] produces level l from level l-1
        let mut down = Vec::with_capacity(LEVELS);
        for l in 1..LEVELS {
            let n = ctx.add_node(
                NodeDesc::new("down")
                    .connector(ConnectorDesc::read("input", "rgba", "f16"))
                    .connector_roi(ConnectorDesc::write("output", "rgba", "f16"), rois[l])
                    .dispatch(rois[l].wd, rois[l].ht, 1)
                    .push_constants(bytemuck::bytes_of(&push(l))),
            )?;
            if let Some(&prev) = down.last() {
                ctx.connect(prev, 1, n, 0)?;
            }
            down.push(n);
        }

        // per-level filter
        let mut flt = Vec::with_capacity(LEVELS);
        for l in 0..LEVELS {
            let n = ctx.add_node(
                NodeDesc::new("flt")
                    .connector(ConnectorDesc::read("input", "rgba", "f16"))
                    .connector_roi(ConnectorDesc::write("output", "rgba", "f16"), rois[l])
                    .dispatch(rois[l].wd, rois[l].ht, 1)
                    .push_constants(bytemuck::bytes_of(&push(l))),
            )?;
            if l > 0 {
                ctx.connect(down[l - 1], 1, n, 0)?;
            }
            flt.push(n);
        }

        // assemble fine to coarse; the coarse guidance is last frame's
        // result one level down, so only feedback edges cross levels
        let mut coarse_src = (flt[LEVELS - 1], 1);
        let mut up = vec![0; LEVELS - 1];
        for l in (0..LEVELS - 1).rev() {
            let n = ctx.add_node(
                NodeDesc::new("up")
                    .connector(ConnectorDesc::read("fine", "rgba", "f16"))
                    .connector(ConnectorDesc::read("coarse", "rgba", "f16").optional())
                    .connector_roi(ConnectorDesc::write("output", "rgba", "f16"), rois[l])
                    .dispatch(rois[l].wd, rois[l].ht, 1)
                    .push_constants(bytemuck::bytes_of(&push(l))),
            )?;
            ctx.connect_named(flt[l], Token::new("output"), n, Token::new("fine"))?;
            ctx.feedback(coarse_src.0, coarse_src.1, n, 1)?;
            coarse_src = (n, 2);
            up[l] = n;
        }

        // the module input feeds both the finest filter and the mip chain
        ctx.connector_copy(0, flt[0], 0)?;
        ctx.connector_copy(0, down[0], 0)?;
        ctx.connector_copy(1, up[0], 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixelpipe_core::{ModuleGraph, NodeGraph, PluginRegistry, Roi};

    #[test]
    fn test_mip_chain_shape() {
        let mut reg = PluginRegistry::new();
        reg.register(Box::new(Msdn)).unwrap();
        let mut g = ModuleGraph::new();
        let mid = g
            .add_module(&reg, Token::new("msdn"), Token::new("main"))
            .unwrap();
        let bytes = g.module(mid).unwrap().params.bytes().to_vec();
        g.module_mut(mid).unwrap().committed.copy_from(&bytes).unwrap();
        for c in &mut g.module_mut(mid).unwrap().connectors {
            c.roi = Roi::full(64, 64);
        }

        let mut nodes = NodeGraph::new();
        let mut ctx = NodeCtx::new(&g, mid, &mut nodes).unwrap();
        Msdn.create_nodes(&mut ctx).unwrap();
        drop(ctx);

        // 3 downsamplers, 4 filters, 3 assemblers
        assert_eq!(nodes.len(), 10);

        // exactly one feedback edge per assembly stage
        let feedback = nodes
            .nodes()
            .flat_map(|(_, n)| n.connectors.iter())
            .filter(|c| matches!(c.link, Some(l) if l.feedback))
            .count();
        assert_eq!(feedback, 3);

        // the coarsest filter runs on the 8x8 mip
        let coarsest = nodes
            .nodes()
            .filter(|(_, n)| n.name == Token::new("flt"))
            .last()
            .unwrap()
            .1;
        assert_eq!((coarsest.wd, coarsest.ht), (8, 8));
    }
}
