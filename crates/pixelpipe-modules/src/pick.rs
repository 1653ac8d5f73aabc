//! Colour picker. Averages small spots of the input into a readback
//! buffer; other modules (the colour corrector) read the picked values
//! through its parameters.

use pixelpipe_core::{
    Caps, ConnectorDesc, ModuleDesc, ModulePlugin, NodeCtx, NodeDesc, ParamLayout, Result, Roi,
    Token,
};

/// Maximum number of spots a picker instance can track.
pub const MAX_SPOTS: usize = 24;

pub struct Pick;

impl ModulePlugin for Pick {
    fn describe(&self) -> ModuleDesc {
        ModuleDesc::new("pick")
            .connector(ConnectorDesc::read("input", "rgba", "*"))
            .connector(ConnectorDesc::write("picked", "ssbo", "f32"))
            .params(
                ParamLayout::builder()
                    .i32("nspots", 1, &[0])
                    // normalized spot centers, xy pairs
                    .f32("spots", 2 * MAX_SPOTS, &[])
                    // mean rgb per spot, written back after a frame ran
                    .f32("picked", 3 * MAX_SPOTS, &[])
                    .build(),
            )
    }

    fn caps(&self) -> Caps {
        Caps::new().with_create_nodes().with_modify_roi_in()
    }

    /// The readback buffer is sized by the spot count, not the image.
    fn modify_roi_in(
        &self,
        graph: &mut pixelpipe_core::ModuleGraph,
        mid: pixelpipe_core::ModuleId,
    ) -> Result<()> {
        let nspots = graph.module(mid)?.committed.i32s(Token::new("nspots"))?[0].max(0) as u32;
        let nspots = nspots.min(MAX_SPOTS as u32);
        let c = graph.module_mut(mid)?.conn_mut(1)?;
        c.roi = Roi::full(3 * nspots.max(1), 1);
        Ok(())
    }

    fn create_nodes(&self, ctx: &mut NodeCtx<'_>) -> Result<()> {
        let nspots = ctx.params()?.i32s(Token::new("nspots"))?[0].max(0) as u32;
        let nspots = nspots.min(MAX_SPOTS as u32);
        let spots = ctx.params()?.f32s(Token::new("spots"))?;
        let n = ctx.add_node(
            NodeDesc::new("pick")
                .connector(ConnectorDesc::read("input", "rgba", "*"))
                .connector(ConnectorDesc::write("picked", "ssbo", "f32"))
                .dispatch(nspots, 1, 1)
                .push_constants(bytemuck::cast_slice(&spots[..2 * nspots as usize])),
        )?;
        ctx.connector_copy(0, n, 0)?;
        ctx.connector_copy(1, n, 1)
    }
}
