//! Temporal blend. Mixes the current input with the node's own output of
//! the previous frame, the standard building block for accumulation and
//! temporal smoothing.

use pixelpipe_core::{
    Caps, ConnectorDesc, ModuleDesc, ModulePlugin, NodeCtx, NodeDesc, ParamLayout, Result, Token,
};

/// Push constants of the blend kernel.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct BlendPush {
    opacity: f32,
}

pub struct Blend;

impl ModulePlugin for Blend {
    fn describe(&self) -> ModuleDesc {
        ModuleDesc::new("blend")
            .connector(ConnectorDesc::read("input", "rgba", "*"))
            .connector(ConnectorDesc::write("output", "rgba", "f16"))
            .params(ParamLayout::builder().f32("opacity", 1, &[0.5]).build())
    }

    fn caps(&self) -> Caps {
        Caps::new().with_create_nodes()
    }

    fn create_nodes(&self, ctx: &mut NodeCtx<'_>) -> Result<()> {
        let opacity = ctx.params()?.f32s(Token::new("opacity"))?[0];
        let push = BlendPush { opacity };
        let roi = ctx.roi(1)?;
        let n = ctx.add_node(
            NodeDesc::new("blend")
                .connector(ConnectorDesc::read("input", "rgba", "*"))
                // previous frame of this node's own output
                .connector(ConnectorDesc::read("prev", "rgba", "f16").optional())
                .connector(ConnectorDesc::write("output", "rgba", "f16"))
                .dispatch(roi.wd, roi.ht, 1)
                .push_constants(bytemuck::bytes_of(&push)),
        )?;
        ctx.feedback(n, 2, n, 1)?;
        ctx.connector_copy(0, n, 0)?;
        ctx.connector_copy(1, n, 2)
    }
}
