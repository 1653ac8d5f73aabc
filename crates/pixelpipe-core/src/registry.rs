//! Module type registry with cached load results.
//!
//! Types are registered once at startup; instantiation resolves through the
//! cache so a type that failed validation keeps failing with the same error
//! on every resolve instead of being retried.

use std::collections::HashMap;
use std::sync::Arc;

use crate::plugin::{LoadError, ModulePlugin, ModuleSo};
use crate::token::Token;

/// All loaded module types.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    loaded: HashMap<Token, std::result::Result<Arc<ModuleSo>, LoadError>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a module type.
    ///
    /// A failed validation is cached under the type's name so later
    /// [`resolve`](Self::resolve) calls report the load error rather than
    /// an unknown type. Returns the load error to the caller as well.
    pub fn register(
        &mut self,
        plugin: Box<dyn ModulePlugin>,
    ) -> std::result::Result<Arc<ModuleSo>, LoadError> {
        let name = plugin.describe().name;
        let result = ModuleSo::load(plugin).map(Arc::new);
        self.loaded.insert(name, result.clone());
        match result {
            Ok(so) => {
                tracing::debug!(ty = %so.name, "registered module type");
                Ok(so)
            }
            Err(err) => {
                tracing::warn!(ty = %name, error = %err, "module type failed to load");
                Err(err)
            }
        }
    }

    /// Resolve a type for instantiation.
    pub fn resolve(&self, name: Token) -> std::result::Result<Arc<ModuleSo>, LoadError> {
        match self.loaded.get(&name) {
            Some(Ok(so)) => Ok(so.clone()),
            Some(Err(err)) => Err(err.clone()),
            None => Err(LoadError::UnknownType(name)),
        }
    }

    /// Registered type names, including ones that failed to load.
    pub fn types(&self) -> impl Iterator<Item = Token> + '_ {
        self.loaded.keys().copied()
    }
}
