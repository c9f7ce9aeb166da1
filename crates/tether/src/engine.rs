//! Engine: the services compiled bindings share

use std::rc::Rc;

use tether_bytecode::Program;
use tether_compiler::{BindingCompiler, CompilerOptions};
use tether_object::{FastProperties, TypeRegistry};
use tether_vm::{Diagnostics, Interpreter, VmOptions};
use url::Url;

use crate::document::{Document, DocumentBuilder};
use crate::error::TetherResult;

/// Engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Compiler options.
    /// Default: [`CompilerOptions::default`]
    pub compiler: CompilerOptions,

    /// Runtime options.
    /// Default: [`VmOptions::default`]
    pub vm: VmOptions,
}

impl EngineConfig {
    /// Create config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiler and runtime options read from `TETHER_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            compiler: CompilerOptions::from_env(),
            vm: VmOptions::from_env(),
        }
    }

    /// Set compiler options.
    pub fn compiler(mut self, options: CompilerOptions) -> Self {
        self.compiler = options;
        self
    }

    /// Set runtime options.
    pub fn vm(mut self, options: VmOptions) -> Self {
        self.vm = options;
        self
    }
}

/// Owns the type registry, fast-accessor table and error sink, and hands
/// them to every compiler and manager it creates.
pub struct Engine {
    types: Rc<TypeRegistry>,
    fast: Rc<FastProperties>,
    diagnostics: Rc<Diagnostics>,
    config: EngineConfig,
    interpreter: Rc<Interpreter>,
}

impl Engine {
    /// Create an engine over a populated registry and accessor table
    pub fn new(types: TypeRegistry, fast: FastProperties, config: EngineConfig) -> Self {
        let types = Rc::new(types);
        let fast = Rc::new(fast);
        let diagnostics = Rc::new(if config.vm.collect_errors {
            Diagnostics::collecting()
        } else {
            Diagnostics::new()
        });
        let interpreter = Rc::new(Interpreter::new(
            Rc::clone(&types),
            Rc::clone(&fast),
            Rc::clone(&diagnostics),
            config.vm.clone(),
        ));
        tracing::debug!(
            target: "tether",
            dispatch = ?config.vm.dispatch,
            experimental = config.compiler.experimental,
            "engine created"
        );
        Self {
            types,
            fast,
            diagnostics,
            config,
            interpreter,
        }
    }

    /// Engine with no fast accessors and default options
    pub fn with_types(types: TypeRegistry) -> Self {
        Self::new(types, FastProperties::new(), EngineConfig::default())
    }

    /// Type registry
    pub fn types(&self) -> &Rc<TypeRegistry> {
        &self.types
    }

    /// Fast-accessor table
    pub fn fast_properties(&self) -> &Rc<FastProperties> {
        &self.fast
    }

    /// Runtime error sink
    pub fn diagnostics(&self) -> &Rc<Diagnostics> {
        &self.diagnostics
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start compiling the bindings of one document
    pub fn document(&self, url: Option<Url>) -> DocumentBuilder<'_> {
        let compiler = BindingCompiler::new(
            self.config.compiler.clone(),
            self.types.clone(),
            Rc::clone(&self.fast),
        );
        DocumentBuilder::new(self, compiler, url)
    }

    /// Load a program serialized by [`Document::to_bytes`] in this process
    pub fn load(&self, bytes: &[u8], url: Option<Url>) -> TetherResult<Document> {
        let program = Program::from_bytes(bytes)?;
        Ok(Document::new(Rc::new(program), url, self.interpreter()))
    }

    pub(crate) fn interpreter(&self) -> Rc<Interpreter> {
        Rc::clone(&self.interpreter)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("fast_properties", &self.fast.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_follows_options() {
        let quiet = Engine::with_types(TypeRegistry::new());
        assert!(!quiet.diagnostics().is_collecting());

        let config = EngineConfig::new().vm(VmOptions::new().collect_errors(true));
        let collecting = Engine::new(TypeRegistry::new(), FastProperties::new(), config);
        assert!(collecting.diagnostics().is_collecting());
    }
}
