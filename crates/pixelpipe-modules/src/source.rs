//! Image source. Declares the full-resolution size of the pipeline input
//! and lowers to a single upload node.

use pixelpipe_core::{
    Caps, ConnectorDesc, ModuleDesc, ModuleGraph, ModuleId, ModulePlugin, NodeCtx, NodeDesc,
    ParamLayout, Result, Token,
};

pub struct Source;

impl ModulePlugin for Source {
    fn describe(&self) -> ModuleDesc {
        ModuleDesc::new("source")
            .connector(ConnectorDesc::write("output", "rgba", "f16"))
            .params(
                ParamLayout::builder()
                    .string("filename", 256, "")
                    .i32("wd", 1, &[4000])
                    .i32("ht", 1, &[3000])
                    .build(),
            )
    }

    fn caps(&self) -> Caps {
        Caps::new().with_create_nodes().with_modify_roi_out()
    }

    /// A source ignores downstream requests and offers its full size;
    /// consumers clamp against it in the forward pass.
    fn modify_roi_out(&self, graph: &mut ModuleGraph, mid: ModuleId) -> Result<()> {
        let wd = graph.module(mid)?.committed.i32s(Token::new("wd"))?[0] as u32;
        let ht = graph.module(mid)?.committed.i32s(Token::new("ht"))?[0] as u32;
        let c = graph.module_mut(mid)?.conn_mut(0)?;
        c.roi.full_wd = wd;
        c.roi.full_ht = ht;
        c.roi.wd = wd;
        c.roi.ht = ht;
        c.roi.scale = 1.0;
        Ok(())
    }

    fn create_nodes(&self, ctx: &mut NodeCtx<'_>) -> Result<()> {
        let roi = ctx.roi(0)?;
        let n = ctx.add_node(
            NodeDesc::new("read")
                .connector(ConnectorDesc::write("output", "rgba", "f16"))
                .dispatch(roi.wd, roi.ht, 1),
        )?;
        ctx.connector_copy(0, n, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixelpipe_core::{ModuleGraph, PluginRegistry};

    #[test]
    fn test_source_offers_param_size() {
        let mut reg = PluginRegistry::new();
        reg.register(Box::new(Source)).unwrap();
        let mut g = ModuleGraph::new();
        let mid = g
            .add_module(&reg, Token::new("source"), Token::new("main"))
            .unwrap();
        g.module_mut(mid)
            .unwrap()
            .params
            .set_i32s(Token::new("wd"), &[1920])
            .unwrap();
        let bytes = g.module(mid).unwrap().params.bytes().to_vec();
        g.module_mut(mid).unwrap().committed.copy_from(&bytes).unwrap();

        Source.modify_roi_out(&mut g, mid).unwrap();
        let roi = g.module(mid).unwrap().conn(0).unwrap().roi;
        assert_eq!((roi.full_wd, roi.full_ht), (1920, 3000));
        assert_eq!((roi.wd, roi.ht), (1920, 3000));
    }
}
