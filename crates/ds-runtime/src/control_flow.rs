use std::rc::Rc;

use ds_core::{Array, ErrorKind, ScriptError, StatementId, StatementKind, Value};
use tracing::trace;

use crate::context::Context;

/// Items of a `for` loop. Owned by the frame in which the loop statement is
/// current; `owner` is that loop statement.
#[derive(Debug)]
pub(crate) struct Iteration {
    pub(crate) owner: StatementId,
    pub(crate) items: Array,
}

/// One nested compound activation.
#[derive(Debug, Default)]
pub(crate) struct ControlFlow {
    pub(crate) current: Option<StatementId>,
    /// Where execution continues once this frame's chain runs out.
    pub(crate) flow: Option<StatementId>,
    pub(crate) jump_continue: Option<StatementId>,
    pub(crate) jump_break: Option<StatementId>,
    /// First catch of the try that pushed this frame.
    pub(crate) handler: Option<StatementId>,
    pub(crate) iteration: Option<Iteration>,
    /// Set on a catch body's frame; a bare `throw` rethrows it.
    pub(crate) caught: Option<ScriptError>,
}

impl Context {
    /// Enters a compound. With no first statement, control falls straight
    /// through to `fallback`.
    pub fn start(
        &mut self,
        statement: Option<StatementId>,
        fallback: Option<StatementId>,
        jump_continue: Option<StatementId>,
        jump_break: Option<StatementId>,
    ) {
        self.push_frame(ControlFlow {
            current: statement,
            flow: fallback,
            jump_continue,
            jump_break,
            ..ControlFlow::default()
        });
    }

    /// Enters a try block whose catch chain begins at `handler`.
    pub(crate) fn start_try(&mut self, statement: Option<StatementId>, handler: StatementId) {
        self.push_frame(ControlFlow {
            current: statement,
            flow: Some(handler),
            handler: Some(handler),
            ..ControlFlow::default()
        });
    }

    fn push_frame(&mut self, frame: ControlFlow) {
        self.evaluator.reset();
        self.frames.push(frame);
        if self.current().is_none() {
            self.proceed();
        }
    }

    fn pop_frame(&mut self) -> Option<ControlFlow> {
        let frame = self.frames.pop();
        trace!(depth = self.frames.len(), "pop frame");
        frame
    }

    /// Moves to the successor of the current statement, falling back through
    /// popped frames when a chain ends.
    pub fn proceed(&mut self) {
        let mut next = match self.current() {
            Some(current) => self
                .program
                .statements
                .get(current)
                .and_then(|statement| statement.next),
            None => None,
        };
        while next.is_none() {
            let Some(frame) = self.pop_frame() else {
                break;
            };
            next = frame.flow;
        }
        self.set_current(next);
    }

    /// Makes `statement` current in the top frame. The top frame's loop
    /// items are dropped unless they belong to `statement`.
    pub fn set_current(&mut self, statement: Option<StatementId>) {
        self.evaluator.reset();
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        frame.current = statement;
        let owned = frame
            .iteration
            .as_ref()
            .is_some_and(|iteration| Some(iteration.owner) == statement);
        if !owned {
            frame.iteration = None;
        }
    }

    pub fn jump_continue(&mut self) -> Result<(), ScriptError> {
        let Some(position) = self
            .frames
            .iter()
            .rposition(|frame| frame.jump_continue.is_some())
        else {
            return Err(ScriptError::new(
                ErrorKind::Jump,
                "'continue' used outside of a loop.",
            ));
        };
        let target = self.frames[position].jump_continue;
        self.frames.truncate(position);
        self.set_current(target);
        Ok(())
    }

    /// Pops frames until `count` frames with a break target are gone, then
    /// continues after the last target.
    pub fn jump_break(&mut self, count: usize) -> Result<(), ScriptError> {
        if count < 1 {
            return Err(ScriptError::new(
                ErrorKind::Jump,
                "Invalid number of nested breaks.",
            ));
        }
        let available = self
            .frames
            .iter()
            .filter(|frame| frame.jump_break.is_some())
            .count();
        if available < count {
            return Err(ScriptError::new(
                ErrorKind::Jump,
                if available == 0 {
                    "'break' used outside of a loop.".to_string()
                } else {
                    format!(
                        "Cannot break out of {} loops, only {} enclosing.",
                        count, available
                    )
                },
            ));
        }

        let mut remaining = count;
        let mut target = None;
        while remaining > 0 {
            let Some(frame) = self.pop_frame() else {
                break;
            };
            if frame.jump_break.is_some() {
                target = frame.jump_break;
                remaining -= 1;
            }
        }
        self.set_current(target);
        self.proceed();
        Ok(())
    }

    /// Drains every frame.
    pub fn abort(&mut self) {
        self.frames.clear();
        self.evaluator.reset();
    }

    /// Unwinds to the innermost try frame whose catch chain accepts `error`
    /// and starts that catch. Returns false when no handler in this context
    /// accepts it; the frames are then all gone.
    pub(crate) fn jump_into_catch(&mut self, error: &ScriptError) -> Result<bool, ScriptError> {
        let program = Rc::clone(&self.program);
        loop {
            let Some(position) = self
                .frames
                .iter()
                .rposition(|frame| frame.handler.is_some())
            else {
                self.abort();
                return Ok(false);
            };
            let mut candidate = self.frames[position].handler;
            self.frames.truncate(position);
            self.evaluator.reset();

            while let Some(id) = candidate {
                let statement = program.statement(id)?;
                let StatementKind::Catch {
                    error_kind,
                    variable,
                    body,
                    chain_end,
                } = &statement.kind
                else {
                    break;
                };
                if catches(error_kind.as_deref(), error) {
                    if let Some(variable) = variable {
                        self.locals()
                            .borrow_mut()
                            .set(variable, Value::text(error.message.clone()))?;
                    }
                    self.set_current(Some(id));
                    self.push_frame(ControlFlow {
                        current: *body,
                        flow: Some(*chain_end),
                        caught: Some(error.clone()),
                        ..ControlFlow::default()
                    });
                    return Ok(true);
                }
                if id == *chain_end {
                    break;
                }
                candidate = statement.next;
            }
        }
    }
}

fn catches(kind: Option<&str>, error: &ScriptError) -> bool {
    match kind {
        None | Some("Error") => true,
        Some(name) => error.kind.name() == name,
    }
}
