//! Display sink. Requests a view size (0 = whatever upstream delivers) and
//! lowers to a single present node.

use pixelpipe_core::{
    Caps, ConnectorDesc, ModuleDesc, ModuleGraph, ModuleId, ModulePlugin, NodeCtx, NodeDesc,
    ParamLayout, Result, Token,
};

pub struct Display;

impl ModulePlugin for Display {
    fn describe(&self) -> ModuleDesc {
        ModuleDesc::new("display")
            .connector(ConnectorDesc::read("input", "rgba", "*"))
            .params(
                ParamLayout::builder()
                    // 0 = native size of whatever arrives
                    .i32("wd", 1, &[0])
                    .i32("ht", 1, &[0])
                    .build(),
            )
    }

    fn caps(&self) -> Caps {
        Caps::new().with_create_nodes().with_modify_roi_out()
    }

    fn modify_roi_out(&self, graph: &mut ModuleGraph, mid: ModuleId) -> Result<()> {
        let wd = graph.module(mid)?.committed.i32s(Token::new("wd"))?[0].max(0) as u32;
        let ht = graph.module(mid)?.committed.i32s(Token::new("ht"))?[0].max(0) as u32;
        let c = graph.module_mut(mid)?.conn_mut(0)?;
        c.roi.wd = wd;
        c.roi.ht = ht;
        Ok(())
    }

    fn create_nodes(&self, ctx: &mut NodeCtx<'_>) -> Result<()> {
        let roi = ctx.roi(0)?;
        let n = ctx.add_node(
            NodeDesc::new("display")
                .connector(ConnectorDesc::read("input", "rgba", "*"))
                .dispatch(roi.wd, roi.ht, 1),
        )?;
        ctx.connector_copy(0, n, 0)
    }
}
