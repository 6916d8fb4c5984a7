use std::rc::Rc;

use ds_core::{
    Array, AssignOperator, BinaryOperator, Dictionary, ErrorKind, Function, ScriptError,
    StatementId, StatementKind, Value, Variable, VariableMode,
};
use indexmap::IndexMap;
use tracing::trace;

use crate::context::Context;
use crate::control_flow::Iteration;
use crate::evaluator::{binary, CallRequest, Evaluation};

/// What the process has to do after a statement ran.
#[derive(Debug)]
pub(crate) enum Outcome {
    Continue,
    Call(CallRequest),
    Return(Value),
}

/// Evaluates an expression inside a statement body; a pending script call
/// leaves the statement unfinished.
macro_rules! evaluate {
    ($context:expr, $id:expr, $expression:expr) => {
        match $context.evaluate($id, $expression)? {
            Evaluation::Done(value) => value,
            Evaluation::Call(request) => return Ok(Outcome::Call(request)),
        }
    };
}

impl Context {
    /// Executes the current statement. Errors carry the statement's span.
    pub(crate) fn execute(&mut self) -> Result<Outcome, ScriptError> {
        let Some(id) = self.current() else {
            return Ok(Outcome::Continue);
        };
        let program = Rc::clone(&self.program);
        let statement = program.statement(id)?;
        trace!(statement = id, line = statement.location.start.line, "execute");
        self.execute_statement(id, &statement.kind, statement.next)
            .map_err(|error| error.or_span(&statement.location))
    }

    fn execute_statement(
        &mut self,
        id: StatementId,
        kind: &StatementKind,
        next: Option<StatementId>,
    ) -> Result<Outcome, ScriptError> {
        match kind {
            StatementKind::Expression { expr } => {
                evaluate!(self, id, expr);
                self.proceed();
            }
            StatementKind::Assign {
                path,
                operator,
                indices,
                value,
                constant,
            } => {
                let value = evaluate!(self, id, value);
                if *indices > 0 {
                    self.assign_element(path, *operator, value)?;
                } else {
                    self.assign(path, *operator, value, *constant)?;
                }
                self.proceed();
            }
            StatementKind::Print { args } => {
                let values = evaluate!(self, id, args);
                let line = match values {
                    Value::Array(array) => array
                        .elements()
                        .iter()
                        .map(Value::as_text)
                        .collect::<Vec<_>>()
                        .join(" "),
                    other => other.as_text(),
                };
                self.print(line);
                self.proceed();
            }
            StatementKind::If {
                condition,
                then_body,
                else_body,
            } => {
                if evaluate!(self, id, condition).is_true() {
                    self.start(*then_body, next, None, None);
                } else if else_body.is_some() {
                    self.start(*else_body, next, None, None);
                } else {
                    self.proceed();
                }
            }
            StatementKind::While { condition, body } => {
                if evaluate!(self, id, condition).is_true() {
                    self.start(*body, Some(id), Some(id), Some(id));
                } else {
                    self.proceed();
                }
            }
            StatementKind::For {
                variable,
                iterable,
                body,
            } => {
                if !self.owns_iteration(id) {
                    let items = evaluate!(self, id, iterable).iteration_array()?;
                    self.begin_iteration(id, items);
                }
                match self.next_item() {
                    Some(item) => {
                        self.assign(&[variable.clone()], AssignOperator::Set, item, false)?;
                        self.start(*body, Some(id), Some(id), Some(id));
                    }
                    None => {
                        if let Some(frame) = self.frames.last_mut() {
                            frame.iteration = None;
                        }
                        self.proceed();
                    }
                }
            }
            StatementKind::Break { count } => self.jump_break(*count)?,
            StatementKind::Continue => self.jump_continue()?,
            StatementKind::Pass => self.proceed(),
            StatementKind::Return { value } => {
                let value = match value {
                    Some(expression) => evaluate!(self, id, expression),
                    None => Value::None,
                };
                return Ok(Outcome::Return(value));
            }
            StatementKind::Throw { value } => {
                let error = match value {
                    Some(expression) => {
                        let value = evaluate!(self, id, expression);
                        ScriptError::new(ErrorKind::Thrown, value.as_text())
                    }
                    None => self.caught().cloned().ok_or_else(|| {
                        ScriptError::new(ErrorKind::Thrown, "Nothing to rethrow.")
                    })?,
                };
                return Err(error);
            }
            StatementKind::Try { body } => {
                let handler = next.ok_or_else(|| {
                    ScriptError::new(ErrorKind::Syntax, "'try' has no catch clause.")
                })?;
                self.start_try(*body, handler);
            }
            StatementKind::Catch { chain_end, .. } => {
                self.set_current(Some(*chain_end));
                self.proceed();
            }
            StatementKind::Def {
                name,
                params,
                defaults,
                body,
            } => {
                let defaults = match evaluate!(self, id, defaults) {
                    Value::Dictionary(dictionary) => default_map(params, &dictionary),
                    _ => IndexMap::new(),
                };
                let function = Function::script(
                    Some(name.clone()),
                    params.clone(),
                    defaults,
                    Rc::clone(&self.program),
                    *body,
                )
                .with_globals(&self.global_namespace());
                self.locals()
                    .borrow_mut()
                    .set(name, Value::Function(Rc::new(function)))?;
                self.proceed();
            }
            StatementKind::Record { path } => {
                let (owner, name) = self.owner_of(path)?;
                owner.borrow_mut().add_record(name)?;
                self.proceed();
            }
            StatementKind::Delete { paths } => {
                for path in paths {
                    let (owner, name) = self.existing_owner_of(path)?;
                    let removed = owner.borrow_mut().remove(name)?;
                    drop(removed);
                }
                self.proceed();
            }
        }
        Ok(Outcome::Continue)
    }

    fn owns_iteration(&self, id: StatementId) -> bool {
        self.frames
            .last()
            .and_then(|frame| frame.iteration.as_ref())
            .is_some_and(|iteration| iteration.owner == id)
    }

    fn begin_iteration(&mut self, owner: StatementId, mut items: Array) {
        items.begin();
        if let Some(frame) = self.frames.last_mut() {
            frame.iteration = Some(Iteration { owner, items });
        }
    }

    fn next_item(&mut self) -> Option<Value> {
        self.frames
            .last_mut()
            .and_then(|frame| frame.iteration.as_mut())
            .and_then(|iteration| iteration.items.next())
    }

    /// Plain and compound assignment to a variable path.
    pub(crate) fn assign(
        &mut self,
        path: &[String],
        operator: AssignOperator,
        value: Value,
        constant: bool,
    ) -> Result<(), ScriptError> {
        let (owner, name) = match operator {
            AssignOperator::Local => self.owner_of(path)?,
            AssignOperator::Weak => {
                let defined = match path {
                    [name] => self.is_defined(name),
                    _ => self.resolve_variable(path).is_ok(),
                };
                if defined {
                    return Ok(());
                }
                self.owner_of(path)?
            }
            AssignOperator::Set => match self.existing_owner_of(path) {
                Ok(found) => found,
                Err(error) if error.is(ErrorKind::NotFound) && path.len() == 1 => {
                    self.owner_of(path)?
                }
                Err(error) => return Err(error),
            },
            _ => self.existing_owner_of(path)?,
        };

        let existing = owner.borrow().member(name).ok();
        match existing {
            Some(variable) => {
                let value = match compound_operator(operator) {
                    Some(binary_operator) => {
                        let current = variable.borrow().value().duplicate();
                        binary(binary_operator, &current, &value)?
                    }
                    None => value,
                };
                let mut variable = variable.borrow_mut();
                variable.set(value)?;
                if constant {
                    variable.set_read_only(true);
                }
            }
            None => {
                if compound_operator(operator).is_some() {
                    return Err(ScriptError::new(
                        ErrorKind::NotFound,
                        format!("Variable \"{}\" not found.", name),
                    ));
                }
                let mode = if constant {
                    VariableMode::READ_ONLY
                } else {
                    VariableMode::empty()
                };
                owner
                    .borrow_mut()
                    .add(Variable::new(name, Some(value), mode)?)?;
            }
        }
        Ok(())
    }

    /// `path[i]..[j] op rhs`, where `packed` is `[i, .., j, rhs]`.
    fn assign_element(
        &mut self,
        path: &[String],
        operator: AssignOperator,
        packed: Value,
    ) -> Result<(), ScriptError> {
        let Value::Array(packed) = packed else {
            return Err(ScriptError::new(ErrorKind::Syntax, "Malformed element assignment."));
        };
        let mut values = packed.into_values();
        let rhs = values.pop().ok_or_else(|| {
            ScriptError::new(ErrorKind::Syntax, "Malformed element assignment.")
        })?;
        let operator = compound_operator(operator);
        let variable = self.resolve_variable(path)?;
        variable.borrow().check_writable()?;

        // The store may read or assign this same variable, so it must not
        // stay borrowed while the store runs.
        if matches!(variable.borrow().value(), Value::Record(_) | Value::Ref(_)) {
            let mut target = variable.borrow().value().duplicate();
            return store_element(&mut target, &values, operator, rhs);
        }
        let mut target = variable.borrow_mut().take();
        let stored = store_element(&mut target, &values, operator, rhs);
        variable.borrow_mut().put_back(target);
        stored
    }
}

fn compound_operator(operator: AssignOperator) -> Option<BinaryOperator> {
    match operator {
        AssignOperator::Add => Some(BinaryOperator::Add),
        AssignOperator::Subtract => Some(BinaryOperator::Subtract),
        AssignOperator::Multiply => Some(BinaryOperator::Multiply),
        AssignOperator::Divide => Some(BinaryOperator::Divide),
        AssignOperator::Modulo => Some(BinaryOperator::Modulo),
        AssignOperator::Set | AssignOperator::Local | AssignOperator::Weak => None,
    }
}

/// Writes through a chain of indices. Intermediate records and references
/// are written through in place and never replaced by their copies.
fn store_element(
    target: &mut Value,
    indices: &[Value],
    operator: Option<BinaryOperator>,
    rhs: Value,
) -> Result<(), ScriptError> {
    let Some((index, rest)) = indices.split_first() else {
        return Err(ScriptError::new(ErrorKind::Syntax, "Malformed element assignment."));
    };
    if rest.is_empty() {
        let value = match operator {
            Some(operator) => binary(operator, &target.element(index)?, &rhs)?,
            None => rhs,
        };
        return target.set_element(index, value);
    }
    let mut inner = target.element(index)?;
    store_element(&mut inner, rest, operator, rhs)?;
    if matches!(inner, Value::Record(_) | Value::Ref(_)) {
        return Ok(());
    }
    target.set_element(index, inner)
}

fn default_map(params: &[String], dictionary: &Dictionary) -> IndexMap<String, Value> {
    params
        .iter()
        .filter_map(|param| {
            dictionary
                .get_text(param)
                .map(|value| (param.clone(), value.duplicate()))
        })
        .collect()
}
