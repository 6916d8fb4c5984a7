use std::rc::Rc;

use ds_core::{
    BinaryOperator, Constant, Dictionary, ErrorKind, ExprOp, Expression, Function, FunctionBody,
    RefValue, ScriptError, StatementId, UnaryOperator, Value,
};

use crate::context::Context;

/// A script function call an expression is waiting on.
#[derive(Debug)]
pub struct CallRequest {
    pub function: Rc<Function>,
    pub positional: Vec<Value>,
    pub labeled: Option<Dictionary>,
}

#[derive(Debug)]
pub(crate) enum Evaluation {
    Done(Value),
    Call(CallRequest),
}

#[derive(Debug, Default)]
struct PendingState {
    pc: usize,
    stack: Vec<Value>,
    awaiting: bool,
}

/// Keeps the partial state of the one expression that is suspended on a
/// script call, so the statement can re-execute and pick up where it was.
#[derive(Debug, Default)]
pub(crate) struct Evaluator {
    pending: Option<(StatementId, PendingState)>,
    returned: Option<Value>,
}

impl Evaluator {
    pub(crate) fn reset(&mut self) {
        self.pending = None;
        self.returned = None;
    }

    /// Hands the callee's return value to the suspended expression.
    pub(crate) fn deliver(&mut self, value: Value) {
        self.returned = Some(value);
    }

    fn resume(&mut self, statement: StatementId) -> Result<PendingState, ScriptError> {
        let Some((owner, mut state)) = self.pending.take() else {
            return Ok(PendingState::default());
        };
        if owner != statement {
            self.returned = None;
            return Ok(PendingState::default());
        }
        if state.awaiting {
            let value = self.returned.take().ok_or_else(|| {
                ScriptError::new(ErrorKind::Guard, "Expression resumed before its call returned.")
            })?;
            state.stack.push(value);
            state.awaiting = false;
        }
        Ok(state)
    }
}

impl Context {
    /// Evaluates `expression` for `statement`, stopping at the first script
    /// function call. Calling again after the call returned continues it.
    pub(crate) fn evaluate(
        &mut self,
        statement: StatementId,
        expression: &Expression,
    ) -> Result<Evaluation, ScriptError> {
        let mut state = self.evaluator.resume(statement)?;
        let ops = &expression.ops;
        while let Some(op) = ops.get(state.pc) {
            state.pc += 1;
            match op {
                ExprOp::Push { value } => state.stack.push(constant_value(value)),
                ExprOp::Load { name } => {
                    let value = self.lookup(name)?;
                    state.stack.push(value);
                }
                ExprOp::LoadRef { path } => {
                    let variable = self.resolve_variable(path)?;
                    state.stack.push(Value::Ref(RefValue::observing(&variable)));
                }
                ExprOp::Member { name } => {
                    let holder = pop(&mut state.stack)?;
                    let record = holder.as_record()?;
                    let member = record.borrow().member(name)?;
                    let value = member.borrow().value().duplicate();
                    state.stack.push(value);
                }
                ExprOp::Index => {
                    let index = pop(&mut state.stack)?;
                    let container = pop(&mut state.stack)?;
                    state.stack.push(container.element(&index)?);
                }
                ExprOp::Unary { operator } => {
                    let operand = pop(&mut state.stack)?;
                    state.stack.push(unary(*operator, &operand)?);
                }
                ExprOp::Binary { operator } => {
                    let right = pop(&mut state.stack)?;
                    let left = pop(&mut state.stack)?;
                    state.stack.push(binary(*operator, &left, &right)?);
                }
                ExprOp::JumpIfFalse { target } => {
                    if peek(&state.stack)?.is_true() {
                        state.stack.pop();
                    } else {
                        state.pc = *target;
                    }
                }
                ExprOp::JumpIfTrue { target } => {
                    if peek(&state.stack)?.is_true() {
                        state.pc = *target;
                    } else {
                        state.stack.pop();
                    }
                }
                ExprOp::MakeArray { count } => {
                    let values = pop_many(&mut state.stack, *count)?;
                    state.stack.push(Value::array(values));
                }
                ExprOp::MakeDictionary { count } => {
                    let values = pop_many(&mut state.stack, count * 2)?;
                    let mut dictionary = Dictionary::new();
                    let mut pairs = values.into_iter();
                    while let (Some(key), Some(value)) = (pairs.next(), pairs.next()) {
                        dictionary.insert(key, value);
                    }
                    state.stack.push(Value::Dictionary(dictionary));
                }
                ExprOp::Call { positional, labels } => {
                    let labeled_values = pop_many(&mut state.stack, labels.len())?;
                    let positional = pop_many(&mut state.stack, *positional)?;
                    let function = pop(&mut state.stack)?.as_function()?;
                    let labeled = if labels.is_empty() {
                        None
                    } else {
                        Some(
                            labels
                                .iter()
                                .map(|label| Value::text(label.clone()))
                                .zip(labeled_values)
                                .collect::<Dictionary>(),
                        )
                    };
                    if function.is_native() {
                        let arguments = function.map_argument_values(&positional, labeled.as_ref())?;
                        let result = self.call_native(&function, &arguments)?;
                        state.stack.push(result);
                    } else {
                        state.awaiting = true;
                        self.evaluator.pending = Some((statement, state));
                        return Ok(Evaluation::Call(CallRequest {
                            function,
                            positional,
                            labeled,
                        }));
                    }
                }
            }
        }
        let result = pop(&mut state.stack)?;
        Ok(Evaluation::Done(result))
    }

    /// Runs the host callback behind a native function with already bound
    /// arguments.
    pub fn call_native(
        &mut self,
        function: &Function,
        arguments: &[Value],
    ) -> Result<Value, ScriptError> {
        let FunctionBody::Native(name) = function.body() else {
            return Err(ScriptError::new(
                ErrorKind::Type,
                "Script functions cannot be called natively.",
            ));
        };
        let callback = self.natives.callback(name).ok_or_else(|| {
            ScriptError::new(
                ErrorKind::NotFound,
                format!("Native function \"{}\" is not registered.", name),
            )
        })?;
        callback(self, arguments)
    }
}

fn constant_value(constant: &Constant) -> Value {
    match constant {
        Constant::None => Value::None,
        Constant::Number(number) => Value::number(*number),
        Constant::Boolean(flag) => Value::boolean(*flag),
        Constant::Text(text) => Value::text(text.clone()),
    }
}

fn unary(operator: UnaryOperator, operand: &Value) -> Result<Value, ScriptError> {
    match operator {
        UnaryOperator::Negate => operand.negate(),
        UnaryOperator::Plus => match operand.resolved()?.as_ref() {
            Value::Number(number, _) => Ok(Value::number(*number)),
            other => Err(ScriptError::new(
                ErrorKind::Arithmetic,
                format!("Unary '+' needs a Number, got {}.", other.type_name()),
            )),
        },
        UnaryOperator::Not => Ok(Value::boolean(!operand.is_true())),
    }
}

pub(crate) fn binary(
    operator: BinaryOperator,
    left: &Value,
    right: &Value,
) -> Result<Value, ScriptError> {
    use std::cmp::Ordering;

    let ordering = || left.compare(right);
    Ok(match operator {
        BinaryOperator::Add => left.sum(right)?,
        BinaryOperator::Subtract => left.subtract(right)?,
        BinaryOperator::Multiply => left.multiply(right)?,
        BinaryOperator::Divide => left.divide(right)?,
        BinaryOperator::Modulo => left.modulo(right)?,
        BinaryOperator::Equal => Value::boolean(ordering() == Ordering::Equal),
        BinaryOperator::NotEqual => Value::boolean(ordering() != Ordering::Equal),
        BinaryOperator::Less => Value::boolean(ordering() == Ordering::Less),
        BinaryOperator::LessOrEqual => Value::boolean(ordering() != Ordering::Greater),
        BinaryOperator::Greater => Value::boolean(ordering() == Ordering::Greater),
        BinaryOperator::GreaterOrEqual => Value::boolean(ordering() != Ordering::Less),
        BinaryOperator::In => Value::boolean(right.contains(left)?),
    })
}

fn malformed() -> ScriptError {
    ScriptError::new(ErrorKind::Syntax, "Malformed expression.")
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, ScriptError> {
    stack.pop().ok_or_else(malformed)
}

fn peek(stack: &[Value]) -> Result<&Value, ScriptError> {
    stack.last().ok_or_else(malformed)
}

fn pop_many(stack: &mut Vec<Value>, count: usize) -> Result<Vec<Value>, ScriptError> {
    if stack.len() < count {
        return Err(malformed());
    }
    Ok(stack.split_off(stack.len() - count))
}
