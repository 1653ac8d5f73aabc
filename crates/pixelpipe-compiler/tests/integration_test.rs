//! End-to-end compilation of pipelines built from the stock modules.

use anyhow::Result;
use pixelpipe_compiler::{compile, BufferRef, CompileError, FeedbackSlot};
use pixelpipe_core::{
    ascii, Caps, ConnectorDesc, ModuleDesc, ModuleGraph, ModulePlugin, PluginRegistry, Token,
};
use pixelpipe_modules::register_builtins;

fn registry() -> Result<PluginRegistry> {
    let mut reg = PluginRegistry::new();
    register_builtins(&mut reg)?;
    Ok(reg)
}

fn tok(s: &str) -> Token {
    Token::new(s)
}

/// source -> crop -> display with a 1000x1000 crop of a 4000x3000 image.
fn crop_pipeline(reg: &PluginRegistry) -> Result<ModuleGraph> {
    let mut g = ModuleGraph::new();
    let s = g.add_module(reg, tok("source"), tok("main"))?;
    let c = g.add_module(reg, tok("crop"), tok("main"))?;
    let d = g.add_module(reg, tok("display"), tok("main"))?;
    g.module_mut(c)?.params.set_i32s(tok("size"), &[1000, 1000])?;
    g.connect_named(s, tok("output"), c, tok("input"))?;
    g.connect_named(c, tok("output"), d, tok("input"))?;
    Ok(g)
}

#[test]
fn test_crop_pipeline_compiles() -> Result<()> {
    let reg = registry()?;
    let mut g = crop_pipeline(&reg)?;
    let compiled = compile(&mut g)?;

    // one node per module, executed source -> crop -> display
    assert_eq!(compiled.nodes.len(), 3);
    let kernels: Vec<Token> = compiled.schedule.units.iter().map(|u| u.kernel).collect();
    assert_eq!(kernels, vec![tok("read"), tok("crop"), tok("display")]);

    // the crop output buffer holds exactly the cropped window in rgba f16
    let crop_unit = &compiled.schedule.units[1];
    let out = crop_unit.bindings.iter().find(|b| b.write).unwrap();
    let buffer = match out.buffer {
        BufferRef::Buffer(i) => &compiled.schedule.buffers[i],
        other => panic!("expected a plain buffer, got {other:?}"),
    };
    assert_eq!(buffer.size, 1000 * 1000 * 4 * 2);
    assert_eq!((buffer.roi.wd, buffer.roi.ht), (1000, 1000));
    assert!(compiled.schedule.rings.is_empty());
    Ok(())
}

#[test]
fn test_recompile_is_stable() -> Result<()> {
    let reg = registry()?;
    let mut g = crop_pipeline(&reg)?;
    let first = compile(&mut g)?;
    let second = compile(&mut g)?;

    let sizes = |s: &pixelpipe_compiler::FrameSchedule| {
        s.buffers.iter().map(|b| b.size).collect::<Vec<_>>()
    };
    assert_eq!(sizes(&first.schedule), sizes(&second.schedule));
    let order = |c: &pixelpipe_compiler::CompiledGraph| {
        c.schedule.units.iter().map(|u| u.node).collect::<Vec<_>>()
    };
    assert_eq!(order(&first), order(&second));
    Ok(())
}

#[test]
fn test_msdn_pipeline_has_feedback_rings() -> Result<()> {
    let reg = registry()?;
    let mut g = ModuleGraph::new();
    let s = g.add_module(&reg, tok("source"), tok("main"))?;
    let m = g.add_module(&reg, tok("msdn"), tok("main"))?;
    let d = g.add_module(&reg, tok("display"), tok("main"))?;
    g.connect_named(s, tok("output"), m, tok("input"))?;
    g.connect_named(m, tok("output"), d, tok("input"))?;

    let compiled = compile(&mut g)?;
    // read + 10 msdn nodes + display
    assert_eq!(compiled.nodes.len(), 12);
    // one ring per assembly stage
    assert_eq!(compiled.schedule.rings.len(), 3);

    // every assemble unit reads its coarse guidance from the previous slot
    let previous_reads = compiled
        .schedule
        .units
        .iter()
        .filter(|u| u.kernel == tok("up"))
        .filter(|u| {
            u.bindings.iter().any(|b| {
                matches!(
                    b.buffer,
                    BufferRef::Feedback {
                        slot: FeedbackSlot::Previous,
                        ..
                    }
                ) && !b.write
            })
        })
        .count();
    assert_eq!(previous_reads, 3);
    Ok(())
}

#[test]
fn test_blend_self_feedback() -> Result<()> {
    let reg = registry()?;
    let mut g = ModuleGraph::new();
    let s = g.add_module(&reg, tok("source"), tok("main"))?;
    let b = g.add_module(&reg, tok("blend"), tok("main"))?;
    let d = g.add_module(&reg, tok("display"), tok("main"))?;
    g.connect_named(s, tok("output"), b, tok("input"))?;
    g.connect_named(b, tok("output"), d, tok("input"))?;

    let compiled = compile(&mut g)?;
    assert_eq!(compiled.schedule.rings.len(), 1);

    let blend = compiled
        .schedule
        .units
        .iter()
        .find(|u| u.kernel == tok("blend"))
        .unwrap();
    let prev = blend.bindings.iter().find(|b| b.conn == tok("prev")).unwrap();
    let out = blend.bindings.iter().find(|b| b.conn == tok("output")).unwrap();
    assert_eq!(
        prev.buffer,
        BufferRef::Feedback {
            ring: 0,
            slot: FeedbackSlot::Previous
        }
    );
    assert_eq!(
        out.buffer,
        BufferRef::Feedback {
            ring: 0,
            slot: FeedbackSlot::Current
        }
    );
    Ok(())
}

#[test]
fn test_colour_fit_falls_back_to_identity() -> Result<()> {
    let reg = registry()?;
    let mut g = ModuleGraph::new();
    let s = g.add_module(&reg, tok("source"), tok("main"))?;
    let c = g.add_module(&reg, tok("colour"), tok("main"))?;
    let d = g.add_module(&reg, tok("display"), tok("main"))?;
    g.connect_named(s, tok("output"), c, tok("input"))?;
    g.connect_named(c, tok("output"), d, tok("input"))?;

    // no picker instance exists, so the commit fits nothing
    let compiled = compile(&mut g)?;
    let matrix = g.module(c)?.committed.f32s(tok("matrix"))?;
    assert_eq!(matrix[0], 1.0);
    assert_eq!(matrix[1], 0.0);
    assert_eq!(matrix[5], 1.0);

    // the identity lands in the kernel's push constants
    let unit = compiled
        .schedule
        .units
        .iter()
        .find(|u| u.kernel == tok("colour"))
        .unwrap();
    assert_eq!(unit.push_constants.len(), 12 * 4);
    Ok(())
}

#[test]
fn test_incompatible_formats_fail_at_connect() -> Result<()> {
    struct Luma;

    impl ModulePlugin for Luma {
        fn describe(&self) -> ModuleDesc {
            ModuleDesc::new("luma").connector(ConnectorDesc::read("input", "y", "f32"))
        }

        fn caps(&self) -> Caps {
            Caps::new().with_create_nodes()
        }
    }

    let mut reg = registry()?;
    reg.register(Box::new(Luma))?;
    let mut g = ModuleGraph::new();
    let s = g.add_module(&reg, tok("source"), tok("main"))?;
    let l = g.add_module(&reg, tok("luma"), tok("main"))?;
    let err = g.connect_named(s, tok("output"), l, tok("input")).unwrap_err();
    assert!(err.to_string().contains("luma"));
    // the read side is still unconnected
    assert!(g.module(l)?.conn(0)?.link.is_none());
    Ok(())
}

#[test]
fn test_unconnected_input_fails_compile_cleanly() -> Result<()> {
    let reg = registry()?;
    let mut g = ModuleGraph::new();
    let s = g.add_module(&reg, tok("source"), tok("main"))?;
    g.add_module(&reg, tok("display"), tok("main"))?;
    let _ = s;

    match compile(&mut g) {
        Err(CompileError::Module { module, .. }) => assert_eq!(module, tok("display")),
        other => panic!("expected a module error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_ascii_dump_roundtrips_structure() -> Result<()> {
    let reg = registry()?;
    let g = crop_pipeline(&reg)?;
    let dump = ascii::write_graph_ascii(&g)?;
    assert!(dump.contains("module:source:main"));
    assert!(dump.contains("connect:source:main:output:crop:main:input"));
    assert!(dump.contains("connect:crop:main:output:display:main:input"));
    assert!(dump.contains("param:crop:main:size:1000:1000"));
    Ok(())
}
