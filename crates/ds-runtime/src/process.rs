use std::cell::RefCell;
use std::rc::Rc;

use ds_core::{
    ErrorKind, Function, FunctionBody, Program, Record, RecordRef, ScriptError, Value,
    VariableMode,
};
use tracing::debug;

use crate::context::{Context, ContextKind, OutputSink};
use crate::evaluator::CallRequest;
use crate::natives::NativeRegistry;
use crate::step::Outcome;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;
pub const DEFAULT_MAX_STEPS: usize = 1_000_000;

/// Host configuration of a process. Unset fields take the defaults.
#[derive(Default)]
pub struct ProcessOptions {
    pub natives: Option<NativeRegistry>,
    /// Global namespace to run in; a fresh record when unset.
    pub globals: Option<RecordRef>,
    pub max_call_depth: Option<usize>,
    /// Statements the process may execute over its lifetime.
    pub max_steps: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Finished,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Executed,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Finished,
    /// The step budget ran out first; call `execute` again to continue.
    Yielded,
}

/// The unit a host embeds: a base context running the program plus one
/// context per active script function call.
pub struct Process {
    contexts: Vec<Context>,
    globals: RecordRef,
    natives: Rc<NativeRegistry>,
    output: OutputSink,
    state: ProcessState,
    max_call_depth: usize,
    max_steps: usize,
    steps: usize,
    host_result: Option<Value>,
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("state", &self.state)
            .field("contexts", &self.contexts)
            .field("steps", &self.steps)
            .finish()
    }
}

impl Process {
    pub fn new(program: Program, options: ProcessOptions) -> Self {
        Self::with_program(Rc::new(program), options)
    }

    pub fn with_program(program: Rc<Program>, options: ProcessOptions) -> Self {
        let globals = options
            .globals
            .unwrap_or_else(|| Record::new().into_ref());
        let natives = Rc::new(options.natives.unwrap_or_default());
        let output: OutputSink = Rc::new(RefCell::new(Vec::new()));
        let entry = program.entry;
        let mut base = Context::new(
            ContextKind::Base,
            program,
            Rc::clone(&globals),
            None,
            Rc::clone(&natives),
            Rc::clone(&output),
        );
        base.start(entry, None, None, None);
        Self {
            contexts: vec![base],
            globals,
            natives,
            output,
            state: ProcessState::Running,
            max_call_depth: options.max_call_depth.unwrap_or(DEFAULT_MAX_CALL_DEPTH),
            max_steps: options.max_steps.unwrap_or(DEFAULT_MAX_STEPS),
            steps: 0,
            host_result: None,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn globals(&self) -> &RecordRef {
        &self.globals
    }

    pub fn natives(&self) -> &NativeRegistry {
        &self.natives
    }

    /// The innermost context.
    pub fn context(&self) -> &Context {
        // The base context is never popped.
        &self.contexts[self.contexts.len() - 1]
    }

    /// Number of stacked contexts, the base one included.
    pub fn depth(&self) -> usize {
        self.contexts.len()
    }

    /// Printed lines so far; the buffer is emptied.
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut *self.output.borrow_mut())
    }

    /// Executes one statement. Contexts that ran out of statements are
    /// finished first.
    pub fn step(&mut self) -> Result<StepOutcome, ScriptError> {
        while self.state == ProcessState::Running {
            if self.advance()? {
                return Ok(StepOutcome::Executed);
            }
        }
        Ok(StepOutcome::Finished)
    }

    /// Runs at most `budget` statements.
    pub fn execute(&mut self, budget: usize) -> Result<RunStatus, ScriptError> {
        for _ in 0..budget {
            if self.step()? == StepOutcome::Finished {
                return Ok(RunStatus::Finished);
            }
        }
        if self.state == ProcessState::Running {
            Ok(RunStatus::Yielded)
        } else {
            Ok(RunStatus::Finished)
        }
    }

    /// Runs until the program ends; `max_steps` bounds the run.
    pub fn run_to_completion(&mut self) -> Result<(), ScriptError> {
        while self.step()? == StepOutcome::Executed {}
        Ok(())
    }

    /// Stops the process by draining every context's frames.
    pub fn abort(&mut self) {
        self.contexts.truncate(1);
        if let Some(base) = self.contexts.first_mut() {
            base.abort();
        }
        if self.state == ProcessState::Running {
            self.state = ProcessState::Stopped;
        }
        debug!("process aborted");
    }

    /// Calls `function` from the host and runs it to completion. Script
    /// functions run in a context of their own on top of the current stack.
    pub fn call(&mut self, function: &Rc<Function>, args: &[Value]) -> Result<Value, ScriptError> {
        let arguments = function.map_argument_values(args, None)?;
        if function.is_native() {
            let depth = self.contexts.len() - 1;
            return self.contexts[depth].call_native(function, &arguments);
        }
        let depth = self.contexts.len();
        self.push_context(ContextKind::HostCall, function, arguments)?;
        while self.contexts.len() > depth {
            if let Err(error) = self.advance() {
                self.contexts.truncate(depth);
                debug!(depth, kind = %error.kind, "host call failed");
                return Err(error);
            }
        }
        Ok(self.host_result.take().unwrap_or_default())
    }

    /// Executes the current statement of the innermost context. Returns
    /// false when instead that context had nothing left and was finished.
    fn advance(&mut self) -> Result<bool, ScriptError> {
        let top = self.contexts.len() - 1;
        if self.contexts[top].current().is_none() {
            self.finish_context(Value::None);
            return Ok(false);
        }

        if self.steps >= self.max_steps {
            self.state = ProcessState::Failed;
            return Err(ScriptError::new(
                ErrorKind::Guard,
                format!("Step limit of {} statements exceeded.", self.max_steps),
            ));
        }
        self.steps += 1;

        match self.contexts[top].execute() {
            Ok(Outcome::Continue) => {}
            Ok(Outcome::Return(value)) => {
                self.contexts[top].abort();
                self.finish_context(value);
            }
            Ok(Outcome::Call(request)) => {
                if let Err(error) = self.push_call(request) {
                    self.handle_error(error)?;
                }
            }
            Err(error) => self.handle_error(error)?,
        }
        Ok(true)
    }

    fn push_call(&mut self, request: CallRequest) -> Result<(), ScriptError> {
        let CallRequest {
            function,
            positional,
            labeled,
        } = request;
        let arguments = function.map_argument_values(&positional, labeled.as_ref())?;
        self.push_context(ContextKind::FunctionCall, &function, arguments)
    }

    fn push_context(
        &mut self,
        kind: ContextKind,
        function: &Rc<Function>,
        arguments: Vec<Value>,
    ) -> Result<(), ScriptError> {
        if self.contexts.len() >= self.max_call_depth {
            return Err(ScriptError::new(
                ErrorKind::Guard,
                format!("Call depth limit of {} exceeded.", self.max_call_depth),
            ));
        }
        let FunctionBody::Script { program, entry } = function.body() else {
            return Err(ScriptError::new(
                ErrorKind::Type,
                "Native functions do not run in a context.",
            ));
        };
        let mut locals = Record::new();
        for (param, value) in function.params().iter().zip(arguments) {
            locals.add_value(param, value, VariableMode::empty())?;
        }
        let globals = function
            .globals()
            .unwrap_or_else(|| Rc::clone(&self.globals));
        let mut context = Context::new(
            kind,
            Rc::clone(program),
            locals.into_ref(),
            Some(globals),
            Rc::clone(&self.natives),
            Rc::clone(&self.output),
        );
        context.start(*entry, None, None, None);
        self.contexts.push(context);
        debug!(
            depth = self.contexts.len(),
            function = function.name().unwrap_or("(anonymous)"),
            "push context"
        );
        Ok(())
    }

    /// Ends the innermost context with `value` as its result.
    fn finish_context(&mut self, value: Value) {
        let top = self.contexts.len() - 1;
        match self.contexts[top].kind() {
            ContextKind::Base => {
                if self.state == ProcessState::Running {
                    self.state = ProcessState::Finished;
                }
                debug!(steps = self.steps, "process finished");
            }
            ContextKind::FunctionCall => {
                self.contexts.pop();
                debug!(depth = self.contexts.len(), "pop context");
                let caller = self.contexts.len() - 1;
                self.contexts[caller].evaluator.deliver(value);
            }
            ContextKind::HostCall => {
                self.contexts.pop();
                debug!(depth = self.contexts.len(), "pop host call context");
                self.host_result = Some(value);
            }
        }
    }

    /// Passes `error` to the innermost handler, unwinding function calls.
    /// An error raised while entering a catch replaces the one being
    /// handled and keeps unwinding from there.
    fn handle_error(&mut self, mut error: ScriptError) -> Result<(), ScriptError> {
        loop {
            let top = self.contexts.len() - 1;
            match self.contexts[top].jump_into_catch(&error) {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(raised) => {
                    debug!(kind = %raised.kind, "error while entering catch");
                    error = raised;
                    continue;
                }
            }
            match self.contexts[top].kind() {
                ContextKind::FunctionCall => {
                    self.contexts.pop();
                    debug!(depth = self.contexts.len(), kind = %error.kind, "error leaves function");
                }
                ContextKind::HostCall => {
                    self.contexts.pop();
                    return Err(error);
                }
                ContextKind::Base => {
                    self.state = ProcessState::Failed;
                    debug!(kind = %error.kind, message = %error.message, "uncaught error");
                    return Err(error);
                }
            }
        }
    }
}
