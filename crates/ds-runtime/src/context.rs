use std::cell::RefCell;
use std::rc::Rc;

use ds_core::{
    ErrorKind, Program, RecordRef, ScriptError, StatementId, Value, VariableRef,
};

use crate::control_flow::ControlFlow;
use crate::evaluator::Evaluator;
use crate::natives::NativeRegistry;

/// Lines printed by every context of a process.
pub(crate) type OutputSink = Rc<RefCell<Vec<String>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// Runs the program of the process; its namespace is the global one.
    Base,
    /// Runs a script function called from another context.
    FunctionCall,
    /// Runs a script function the host invoked through `Process::call`.
    HostCall,
}

/// One execution environment: a statement graph walked through a stack of
/// control-flow frames, an expression evaluator, and a local namespace.
pub struct Context {
    kind: ContextKind,
    pub(crate) program: Rc<Program>,
    pub(crate) frames: Vec<ControlFlow>,
    pub(crate) evaluator: Evaluator,
    locals: RecordRef,
    globals: Option<RecordRef>,
    pub(crate) natives: Rc<NativeRegistry>,
    output: OutputSink,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("kind", &self.kind)
            .field("frames", &self.frames)
            .field("current", &self.current())
            .finish()
    }
}

impl Context {
    pub(crate) fn new(
        kind: ContextKind,
        program: Rc<Program>,
        locals: RecordRef,
        globals: Option<RecordRef>,
        natives: Rc<NativeRegistry>,
        output: OutputSink,
    ) -> Self {
        Self {
            kind,
            program,
            frames: Vec::new(),
            evaluator: Evaluator::default(),
            locals,
            globals,
            natives,
            output,
        }
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn program(&self) -> &Rc<Program> {
        &self.program
    }

    /// Statement that executes next, if any.
    pub fn current(&self) -> Option<StatementId> {
        self.frames.last().and_then(|frame| frame.current)
    }

    /// Number of control-flow frames on the stack.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Error handled by the innermost catch body still running, if any.
    pub(crate) fn caught(&self) -> Option<&ScriptError> {
        self.frames.iter().rev().find_map(|frame| frame.caught.as_ref())
    }

    /// Number of frames currently holding a `for` iteration.
    pub fn iterations(&self) -> usize {
        self.frames
            .iter()
            .filter(|frame| frame.iteration.is_some())
            .count()
    }

    pub fn locals(&self) -> &RecordRef {
        &self.locals
    }

    /// The namespace non-local names resolve in. The base context's locals
    /// are the globals.
    pub fn global_namespace(&self) -> RecordRef {
        match &self.globals {
            Some(globals) => Rc::clone(globals),
            None => Rc::clone(&self.locals),
        }
    }

    pub fn natives(&self) -> &NativeRegistry {
        &self.natives
    }

    pub fn print(&self, line: impl Into<String>) {
        self.output.borrow_mut().push(line.into());
    }

    /// Finds a variable by bare name: locals first, then globals.
    pub fn find_variable(&self, name: &str) -> Option<VariableRef> {
        if let Ok(variable) = self.locals.borrow().member(name) {
            return Some(variable);
        }
        let globals = self.globals.as_ref()?;
        let found = globals.borrow().member(name).ok();
        found
    }

    /// Value of a bare name: locals, globals, then the native registry.
    pub fn lookup(&self, name: &str) -> Result<Value, ScriptError> {
        if let Some(variable) = self.find_variable(name) {
            let value = variable.borrow().value().duplicate();
            return Ok(value);
        }
        if let Some(function) = self.natives.function(name) {
            return Ok(Value::Function(function));
        }
        Err(ScriptError::new(
            ErrorKind::NotFound,
            format!("Identifier \"{}\" not found.", name),
        ))
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.find_variable(name).is_some() || self.natives.function(name).is_some()
    }

    /// Resolves a dotted path to its variable. The first segment follows
    /// normal name lookup; the rest walks sub-records.
    pub fn resolve_variable(&self, path: &[String]) -> Result<VariableRef, ScriptError> {
        let (head, rest) = split_path(path)?;
        let variable = self.find_variable(head).ok_or_else(|| {
            ScriptError::new(
                ErrorKind::NotFound,
                format!("Identifier \"{}\" not found.", head),
            )
        })?;
        if rest.is_empty() {
            return Ok(variable);
        }
        let record = variable.borrow().value().as_record()?;
        let found = record.borrow().variable(&rest.join("."));
        found
    }

    /// Record that holds the last segment of `path`, with that segment.
    /// A bare name targets the local namespace.
    pub(crate) fn owner_of<'p>(&self, path: &'p [String]) -> Result<(RecordRef, &'p str), ScriptError> {
        let Some((name, parents)) = path.split_last() else {
            return Err(empty_path());
        };
        if parents.is_empty() {
            return Ok((Rc::clone(&self.locals), name));
        }
        let holder = self.resolve_variable(parents)?;
        let record = holder.borrow().value().as_record()?;
        Ok((record, name))
    }

    /// Record holding the existing variable `path`, searching locals then
    /// globals for a bare name.
    pub(crate) fn existing_owner_of<'p>(
        &self,
        path: &'p [String],
    ) -> Result<(RecordRef, &'p str), ScriptError> {
        if let [name] = path {
            if self.locals.borrow().has_member(name) {
                return Ok((Rc::clone(&self.locals), name));
            }
            if let Some(globals) = &self.globals {
                if globals.borrow().has_member(name) {
                    return Ok((Rc::clone(globals), name));
                }
            }
            return Err(ScriptError::new(
                ErrorKind::NotFound,
                format!("Identifier \"{}\" not found.", name),
            ));
        }
        self.owner_of(path)
    }
}

fn split_path(path: &[String]) -> Result<(&str, &[String]), ScriptError> {
    match path.split_first() {
        Some((head, rest)) => Ok((head.as_str(), rest)),
        None => Err(empty_path()),
    }
}

fn empty_path() -> ScriptError {
    ScriptError::new(ErrorKind::Name, "Empty identifier path.")
}
