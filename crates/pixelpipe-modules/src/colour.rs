//! Colour correction. Fits an affine matrix mapping colours picked from
//! the image onto reference targets, then applies it as a single kernel.
//!
//! The fit runs at commit time from the live parameters of a named picker
//! instance, so dragging a picker spot re-fits on the next frame without
//! touching the graph structure.

use pixelpipe_core::{
    Caps, CommitCtx, ConnectorDesc, ModuleDesc, ModulePlugin, NodeCtx, NodeDesc, ParamBlock,
    ParamLayout, Result, Token,
};

use crate::pick::MAX_SPOTS;
use crate::solve::solve;

/// Row-major 3x4 affine colour matrix (last column is the offset).
const IDENTITY: [f32; 12] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0,
];

pub struct Colour;

impl Colour {
    /// Least-squares fit of a 3x4 affine map sending `src` to `dst`.
    /// `None` if there are too few patches or the system is singular.
    fn fit(src: &[f32], dst: &[f32], n: usize) -> Option<[f32; 12]> {
        if n < 4 {
            return None;
        }
        // normal equations over [r g b 1]
        let mut xtx = [0.0f64; 16];
        let mut xty = [[0.0f64; 4]; 3];
        for i in 0..n {
            let x = [
                src[3 * i] as f64,
                src[3 * i + 1] as f64,
                src[3 * i + 2] as f64,
                1.0,
            ];
            for r in 0..4 {
                for c in 0..4 {
                    xtx[r * 4 + c] += x[r] * x[c];
                }
                for ch in 0..3 {
                    xty[ch][r] += x[r] * dst[3 * i + ch] as f64;
                }
            }
        }

        let mut matrix = [0.0f32; 12];
        for ch in 0..3 {
            let mut a = xtx;
            let mut b = xty[ch];
            let row = solve(&mut a, &mut b, 4)?;
            for c in 0..4 {
                matrix[ch * 4 + c] = row[c] as f32;
            }
        }
        Some(matrix)
    }
}

impl ModulePlugin for Colour {
    fn describe(&self) -> ModuleDesc {
        ModuleDesc::new("colour")
            .connector(ConnectorDesc::read("input", "rgba", "*"))
            .connector(ConnectorDesc::write("output", "rgba", "f16"))
            .params(
                ParamLayout::builder()
                    .i32("npatches", 1, &[0])
                    // reference colours the picked patches should map to
                    .f32("target", 3 * MAX_SPOTS, &[])
                    // instance token of the pick module supplying sources
                    .string("picker", 8, "main")
                    .build(),
            )
            .commit(ParamLayout::builder().f32("matrix", 12, &IDENTITY).build())
    }

    fn caps(&self) -> Caps {
        Caps::new().with_create_nodes().with_commit_params()
    }

    fn commit_params(&self, ctx: &CommitCtx<'_>, out: &mut ParamBlock) -> Result<()> {
        let live = ctx.params()?;
        let n = live.i32s(Token::new("npatches"))?[0].max(0) as usize;
        let n = n.min(MAX_SPOTS);
        let target = live.f32s(Token::new("target"))?;
        let picker = live.string(Token::new("picker"))?;

        let picked = ctx
            .module_params(Token::new("pick"), Token::new(&picker))
            .map(|p| p.f32s(Token::new("picked")))
            .transpose()?;

        let matrix = picked
            .as_deref()
            .and_then(|src| Self::fit(src, &target, n))
            .unwrap_or_else(|| {
                tracing::warn!(
                    npatches = n,
                    picker = %picker,
                    "colour fit unavailable, falling back to identity"
                );
                IDENTITY
            });
        out.set_f32s(Token::new("matrix"), &matrix)
    }

    fn create_nodes(&self, ctx: &mut NodeCtx<'_>) -> Result<()> {
        let matrix = ctx.params()?.f32s(Token::new("matrix"))?;
        let roi = ctx.roi(1)?;
        let n = ctx.add_node(
            NodeDesc::new("colour")
                .connector(ConnectorDesc::read("input", "rgba", "*"))
                .connector(ConnectorDesc::write("output", "rgba", "f16"))
                .dispatch(roi.wd, roi.ht, 1)
                .push_constants(bytemuck::cast_slice(&matrix)),
        )?;
        ctx.connector_copy(0, n, 0)?;
        ctx.connector_copy(1, n, 1)
    }
}
