//! Documents: one compiled program plus the instances created from it

use std::rc::Rc;

use tether_bytecode::Program;
use tether_compiler::{
    BindingCompiler, CompileResult, CompileScope, Committed, Destination, Node,
};
use tether_vm::{BindingManager, Context, Interpreter};
use url::Url;

use crate::engine::Engine;
use crate::error::TetherResult;

/// Compiles the bindings of one document into a single program.
///
/// Bindings are numbered in the order they are accepted. A rejected binding
/// leaves no trace in the program; the caller is expected to fall back to
/// a general-purpose evaluator for it.
pub struct DocumentBuilder<'e> {
    engine: &'e Engine,
    compiler: BindingCompiler,
    url: Option<Url>,
    rejected: usize,
}

impl<'e> DocumentBuilder<'e> {
    pub(crate) fn new(engine: &'e Engine, compiler: BindingCompiler, url: Option<Url>) -> Self {
        Self {
            engine,
            compiler,
            url,
            rejected: 0,
        }
    }

    /// Compile one binding, returning its index in the finished program
    pub fn compile(
        &mut self,
        expression: &Node,
        destination: Destination,
        scope: &CompileScope,
    ) -> CompileResult<u32> {
        let result = self.compiler.compile(expression, destination, scope);
        if result.is_err() {
            self.rejected += 1;
        }
        result
    }

    /// Bindings accepted so far
    pub fn binding_count(&self) -> u32 {
        self.compiler.binding_count()
    }

    /// Bindings rejected so far
    pub fn rejected_count(&self) -> usize {
        self.rejected
    }

    /// Committed compiler state
    pub fn committed(&self) -> &Committed {
        self.compiler.committed()
    }

    /// Assemble the program
    pub fn build(self) -> TetherResult<Document> {
        let program = self.compiler.program()?;
        tracing::debug!(
            target: "tether",
            url = self.url.as_ref().map(Url::as_str),
            bindings = program.binding_count(),
            rejected = self.rejected,
            instructions = program.instruction_count(),
            "document compiled"
        );
        Ok(Document::new(
            Rc::new(program),
            self.url,
            self.engine.interpreter(),
        ))
    }
}

/// A compiled document.
///
/// The program is immutable and shared by every instance; each call to
/// [`instantiate`](Document::instantiate) creates independent per-instance
/// state.
pub struct Document {
    program: Rc<Program>,
    url: Option<Url>,
    interpreter: Rc<Interpreter>,
}

impl Document {
    pub(crate) fn new(program: Rc<Program>, url: Option<Url>, interpreter: Rc<Interpreter>) -> Self {
        Self {
            program,
            url,
            interpreter,
        }
    }

    /// The shared program
    pub fn program(&self) -> &Rc<Program> {
        &self.program
    }

    /// Source URL
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Number of bindings in the program
    pub fn binding_count(&self) -> u32 {
        self.program.binding_count()
    }

    /// A fresh root context carrying this document's URL
    pub fn create_context(&self) -> Rc<Context> {
        Context::new(self.url.clone())
    }

    /// Create the per-instance binding state for one instantiation.
    ///
    /// Bindings are created unconfigured; see
    /// [`BindingManager::configure`].
    pub fn instantiate(&self, context: Rc<Context>) -> TetherResult<Rc<BindingManager>> {
        let manager = BindingManager::new(
            Rc::clone(&self.program),
            context,
            Rc::clone(&self.interpreter),
        )?;
        Ok(manager)
    }

    /// Serialize the program for reloading in this process
    pub fn to_bytes(&self) -> Vec<u8> {
        self.program.to_bytes()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("url", &self.url.as_ref().map(Url::as_str))
            .field("bindings", &self.program.binding_count())
            .finish()
    }
}
