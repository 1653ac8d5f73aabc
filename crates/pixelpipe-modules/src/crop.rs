//! Crop to a window of the input. The canonical "requests less than is
//! available" module: its output full size is the crop window itself.

use pixelpipe_core::{
    Caps, ConnectorDesc, ModuleDesc, ModuleGraph, ModuleId, ModulePlugin, NodeCtx, NodeDesc,
    ParamLayout, Result, Roi, Token,
};

/// Push constants of the crop kernel.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CropPush {
    ox: u32,
    oy: u32,
}

pub struct Crop;

impl Crop {
    fn window(graph: &ModuleGraph, mid: ModuleId) -> Result<(u32, u32, u32, u32)> {
        let p = &graph.module(mid)?.committed;
        let off = p.i32s(Token::new("offset"))?;
        let size = p.i32s(Token::new("size"))?;
        Ok((
            off[0].max(0) as u32,
            off[1].max(0) as u32,
            size[0].max(0) as u32,
            size[1].max(0) as u32,
        ))
    }
}

impl ModulePlugin for Crop {
    fn describe(&self) -> ModuleDesc {
        ModuleDesc::new("crop")
            .connector(ConnectorDesc::read("input", "rgba", "*"))
            .connector(ConnectorDesc::write("output", "rgba", "f16"))
            .params(
                ParamLayout::builder()
                    .i32("offset", 2, &[0, 0])
                    // 0 means "as large as the input allows"
                    .i32("size", 2, &[0, 0])
                    .build(),
            )
    }

    fn caps(&self) -> Caps {
        Caps::new()
            .with_create_nodes()
            .with_modify_roi_out()
            .with_modify_roi_in()
    }

    /// Request the crop window from upstream, plus the offset so the window
    /// is actually covered.
    fn modify_roi_out(&self, graph: &mut ModuleGraph, mid: ModuleId) -> Result<()> {
        let (ox, oy, wd, ht) = Self::window(graph, mid)?;
        let c = graph.module_mut(mid)?.conn_mut(0)?;
        c.roi.wd = if wd == 0 { 0 } else { wd + ox };
        c.roi.ht = if ht == 0 { 0 } else { ht + oy };
        Ok(())
    }

    /// The output's full size is the window: downstream sees a smaller
    /// image, not a windowed view of the original.
    fn modify_roi_in(&self, graph: &mut ModuleGraph, mid: ModuleId) -> Result<()> {
        let (ox, oy, wd, ht) = Self::window(graph, mid)?;
        let input = graph.module(mid)?.conn(0)?.roi;
        let out_wd = if wd == 0 { input.wd } else { wd.min(input.wd.saturating_sub(ox)) };
        let out_ht = if ht == 0 { input.ht } else { ht.min(input.ht.saturating_sub(oy)) };
        let c = graph.module_mut(mid)?.conn_mut(1)?;
        c.roi = Roi {
            full_wd: out_wd,
            full_ht: out_ht,
            wd: out_wd,
            ht: out_ht,
            scale: input.scale,
        };
        Ok(())
    }

    fn create_nodes(&self, ctx: &mut NodeCtx<'_>) -> Result<()> {
        let off = ctx.params()?.i32s(Token::new("offset"))?;
        let push = CropPush {
            ox: off[0].max(0) as u32,
            oy: off[1].max(0) as u32,
        };
        let roi = ctx.roi(1)?;
        let n = ctx.add_node(
            NodeDesc::new("crop")
                .connector(ConnectorDesc::read("input", "rgba", "*"))
                .connector(ConnectorDesc::write("output", "rgba", "f16"))
                .dispatch(roi.wd, roi.ht, 1)
                .push_constants(bytemuck::bytes_of(&push)),
        )?;
        ctx.connector_copy(0, n, 0)?;
        ctx.connector_copy(1, n, 1)
    }
}
