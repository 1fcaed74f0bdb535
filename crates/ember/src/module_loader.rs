//! Module loading for `use "name"` (`[AMBIENT-MOD]`).
//!
//! `original_source/include/chaiscript/language/chaiscript_engine.hpp`'s `use` loads a
//! `.chai` file or a native dynamically-linked module from a configured search path;
//! OS dynamic-linking is explicitly out of scope here (`spec.md`'s Non-goals rule out
//! native module loading), so [`ModuleLoader`] only ever resolves to script source
//! text. [`StaticModuleLoader`] covers the two remaining cases a host actually needs:
//! modules registered in-process (for embedding a fixed set of scripts into a binary)
//! and modules read from disk under an optional sandboxed root.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Resolves a `use`d module name to script source.
///
/// Implementations are free to search however they like (filesystem, embedded
/// bundle, network); `Engine` only needs the resulting source text, which it then
/// parses and evaluates exactly like a top-level script.
pub trait ModuleLoader: std::fmt::Debug {
    /// Resolves `name` to script source, or an error message explaining why it
    /// couldn't be (used verbatim in `EngineError::LoadModule`).
    ///
    /// `root`, when set, is the engine's configured `EngineOptions::module_root` — a
    /// loader is free to ignore it if it doesn't read from disk.
    fn load(&self, name: &str, root: Option<&Path>) -> Result<String, String>;
}

/// The default loader: checks an in-process name→source registry first (for modules
/// embedded into the host binary), then falls back to reading `<root>/<name>.ember`
/// from disk when a `module_root` is configured.
#[derive(Debug, Default)]
pub struct StaticModuleLoader {
    registered: HashMap<String, String>,
}

impl StaticModuleLoader {
    #[must_use]
    pub fn new() -> Self {
        Self { registered: HashMap::new() }
    }

    /// Embeds a module's source directly, so `use "name"` resolves without touching
    /// the filesystem — the way a host ships a fixed library of scripts in its binary.
    pub fn register(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.registered.insert(name.into(), source.into());
    }
}

impl ModuleLoader for StaticModuleLoader {
    fn load(&self, name: &str, root: Option<&Path>) -> Result<String, String> {
        if let Some(source) = self.registered.get(name) {
            return Ok(source.clone());
        }
        let Some(root) = root else {
            return Err(format!("no module named '{name}' is registered, and no module_root is configured"));
        };
        let path = root.join(format!("{name}.ember"));
        fs::read_to_string(&path).map_err(|e| format!("{}: {e}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::{ModuleLoader, StaticModuleLoader};

    #[test]
    fn resolves_an_in_process_registration_without_touching_disk() {
        let mut loader = StaticModuleLoader::new();
        loader.register("greet", "def greet() { \"hi\" }");
        let source = loader.load("greet", None).unwrap();
        assert!(source.contains("greet"));
    }

    #[test]
    fn unregistered_module_without_a_root_is_an_error() {
        let loader = StaticModuleLoader::new();
        assert!(loader.load("missing", None).is_err());
    }
}
