//! Built-in module types.
//!
//! Each submodule implements one [`ModulePlugin`]; [`register_builtins`]
//! loads them all into a registry. The set covers the structural shapes the
//! compiler has to handle: sources and sinks, window-changing crops,
//! multi-node lowerings with internal mip chains, self-feedback, and
//! commit-time fitting against another module's parameters.
//!
//! [`ModulePlugin`]: pixelpipe_core::ModulePlugin

pub mod blend;
pub mod colour;
pub mod crop;
pub mod display;
pub mod msdn;
pub mod pick;
mod solve;
pub mod source;

use pixelpipe_core::PluginRegistry;

/// Load every built-in module type. Individual load failures are cached in
/// the registry; the first one is returned.
pub fn register_builtins(
    registry: &mut PluginRegistry,
) -> std::result::Result<(), pixelpipe_core::LoadError> {
    registry.register(Box::new(source::Source))?;
    registry.register(Box::new(crop::Crop))?;
    registry.register(Box::new(display::Display))?;
    registry.register(Box::new(blend::Blend))?;
    registry.register(Box::new(msdn::Msdn))?;
    registry.register(Box::new(pick::Pick))?;
    registry.register(Box::new(colour::Colour))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_builtins_load() {
        let mut reg = PluginRegistry::new();
        register_builtins(&mut reg).unwrap();
        assert_eq!(reg.types().count(), 7);
    }
}
