use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::dictionary::Dictionary;
use crate::error::{ErrorKind, ScriptError};
use crate::record::{Record, RecordRef};
use crate::types::{Program, StatementId};
use crate::value::Value;

/// Where a function's behavior lives.
#[derive(Debug, Clone)]
pub enum FunctionBody {
    /// Host callback registered under this name.
    Native(String),
    /// Statements of `program` starting at `entry`; an empty body has no entry.
    Script {
        program: Rc<Program>,
        entry: Option<StatementId>,
    },
}

#[derive(Debug)]
pub struct Function {
    name: Option<String>,
    params: Vec<String>,
    defaults: IndexMap<String, Value>,
    body: FunctionBody,
    globals: Option<Weak<RefCell<Record>>>,
}

impl Function {
    pub fn native(
        name: impl Into<String>,
        params: Vec<String>,
        defaults: IndexMap<String, Value>,
    ) -> Self {
        let name = name.into();
        Self {
            name: Some(name.clone()),
            params,
            defaults,
            body: FunctionBody::Native(name),
            globals: None,
        }
    }

    pub fn script(
        name: Option<String>,
        params: Vec<String>,
        defaults: IndexMap<String, Value>,
        program: Rc<Program>,
        entry: Option<StatementId>,
    ) -> Self {
        Self {
            name,
            params,
            defaults,
            body: FunctionBody::Script { program, entry },
            globals: None,
        }
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Namespace the body resolves non-local names in; held weakly.
    pub fn with_globals(mut self, globals: &RecordRef) -> Self {
        self.globals = Some(Rc::downgrade(globals));
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn defaults(&self) -> &IndexMap<String, Value> {
        &self.defaults
    }

    pub fn body(&self) -> &FunctionBody {
        &self.body
    }

    pub fn is_native(&self) -> bool {
        matches!(self.body, FunctionBody::Native(_))
    }

    pub fn globals(&self) -> Option<RecordRef> {
        self.globals.as_ref().and_then(Weak::upgrade)
    }

    /// Binds actual arguments to the declared parameters, in parameter order.
    ///
    /// Positional arguments fill parameters left to right, then labeled
    /// arguments, then defaults. Extra positional arguments and unknown labels
    /// count toward the total that must equal the parameter count.
    pub fn map_argument_values(
        &self,
        positional: &[Value],
        labeled: Option<&Dictionary>,
    ) -> Result<Vec<Value>, ScriptError> {
        let mut bound: Vec<Option<Value>> = vec![None; self.params.len()];
        let mut total = 0;

        for (position, argument) in positional.iter().enumerate() {
            total += 1;
            let Some(param) = self.params.get(position) else {
                continue;
            };
            if labeled.is_some_and(|labels| labels.get_text(param).is_some()) {
                return Err(ScriptError::new(
                    ErrorKind::DuplicateArgument,
                    format!(
                        "Argument \"{}\" of {} was given both positionally and by label.",
                        param,
                        self.describe()
                    ),
                ));
            }
            bound[position] = Some(argument.duplicate());
        }

        if let Some(labels) = labeled {
            for (label, value) in labels.iter() {
                let Value::Text(label) = label else {
                    return Err(ScriptError::new(
                        ErrorKind::Type,
                        format!(
                            "Argument labels must be Text, got {}.",
                            label.type_name()
                        ),
                    ));
                };
                total += 1;
                if let Some(position) = self.params.iter().position(|param| param == label) {
                    bound[position] = Some(value.duplicate());
                }
            }
        }

        let mut values = Vec::with_capacity(bound.len());
        for (param, slot) in self.params.iter().zip(bound) {
            match slot {
                Some(value) => values.push(value),
                None => {
                    let default = self.defaults.get(param).ok_or_else(|| {
                        ScriptError::new(
                            ErrorKind::MissingArgument,
                            format!(
                                "Missing argument \"{}\" in call to {}.",
                                param,
                                self.describe()
                            ),
                        )
                    })?;
                    total += 1;
                    values.push(default.duplicate());
                }
            }
        }

        if total != self.params.len() {
            return Err(ScriptError::new(
                ErrorKind::ArgumentCount,
                format!(
                    "Wrong number of arguments for {}: expected {}, got {}.",
                    self.describe(),
                    self.params.len(),
                    total
                ),
            ));
        }
        Ok(values)
    }

    /// Structural order: parameters, then defaults, then body.
    pub fn compare(&self, other: &Function) -> Ordering {
        self.params
            .cmp(&other.params)
            .then_with(|| compare_defaults(&self.defaults, &other.defaults))
            .then_with(|| compare_bodies(&self.body, &other.body))
    }

    pub fn as_text(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|param| match self.defaults.get(param) {
                Some(default) => format!("{}={}", param, default.as_literal_text()),
                None => param.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("(function {}({}))", self.name.as_deref().unwrap_or(""), params)
    }

    fn describe(&self) -> String {
        match &self.name {
            Some(name) => format!("\"{}\"", name),
            None => "anonymous function".to_string(),
        }
    }
}

fn compare_defaults(left: &IndexMap<String, Value>, right: &IndexMap<String, Value>) -> Ordering {
    for ((left_name, left_value), (right_name, right_value)) in left.iter().zip(right) {
        let ordering = left_name
            .cmp(right_name)
            .then_with(|| left_value.compare(right_value));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    left.len().cmp(&right.len())
}

fn compare_bodies(left: &FunctionBody, right: &FunctionBody) -> Ordering {
    match (left, right) {
        (FunctionBody::Native(left), FunctionBody::Native(right)) => left.cmp(right),
        (FunctionBody::Native(_), FunctionBody::Script { .. }) => Ordering::Less,
        (FunctionBody::Script { .. }, FunctionBody::Native(_)) => Ordering::Greater,
        (
            FunctionBody::Script {
                program: left_program,
                entry: left_entry,
            },
            FunctionBody::Script {
                program: right_program,
                entry: right_entry,
            },
        ) => (Rc::as_ptr(left_program) as usize)
            .cmp(&(Rc::as_ptr(right_program) as usize))
            .then_with(|| left_entry.cmp(right_entry)),
    }
}

#[cfg(test)]
mod function_tests {
    use super::*;

    fn abc() -> Function {
        let mut defaults = IndexMap::new();
        defaults.insert("c".to_string(), Value::number(0.0));
        Function::native(
            "f",
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            defaults,
        )
    }

    fn labels(entries: &[(&str, f64)]) -> Dictionary {
        entries
            .iter()
            .map(|(name, value)| (Value::text(*name), Value::number(*value)))
            .collect()
    }

    fn numbers(values: &[f64]) -> Vec<Value> {
        values.iter().map(|value| Value::number(*value)).collect()
    }

    #[test]
    fn positional_arguments_fall_back_to_defaults() {
        let bound = abc()
            .map_argument_values(&numbers(&[1.0, 2.0]), None)
            .expect("bind");
        assert_eq!(bound, numbers(&[1.0, 2.0, 0.0]));
    }

    #[test]
    fn labeled_arguments_fill_remaining_parameters() {
        let bound = abc()
            .map_argument_values(&numbers(&[1.0]), Some(&labels(&[("b", 2.0)])))
            .expect("bind");
        assert_eq!(bound, numbers(&[1.0, 2.0, 0.0]));

        let bound = abc()
            .map_argument_values(&[], Some(&labels(&[("c", 3.0), ("a", 1.0), ("b", 2.0)])))
            .expect("all labeled");
        assert_eq!(bound, numbers(&[1.0, 2.0, 3.0]));
    }

    #[test]
    fn positional_and_labeled_duplicate_fails() {
        let error = abc()
            .map_argument_values(&numbers(&[1.0, 2.0]), Some(&labels(&[("b", 3.0)])))
            .expect_err("duplicate");
        assert_eq!(error.kind, ErrorKind::DuplicateArgument);
    }

    #[test]
    fn missing_argument_names_the_parameter() {
        let error = abc()
            .map_argument_values(&numbers(&[1.0]), None)
            .expect_err("missing");
        assert_eq!(error.kind, ErrorKind::MissingArgument);
        assert!(error.message.contains("\"b\""), "{}", error.message);
    }

    #[test]
    fn extra_arguments_report_expected_and_actual() {
        let error = abc()
            .map_argument_values(&numbers(&[1.0, 2.0, 3.0, 4.0]), None)
            .expect_err("too many");
        assert_eq!(error.kind, ErrorKind::ArgumentCount);
        assert!(error.message.contains("expected 3, got 4"), "{}", error.message);

        let error = abc()
            .map_argument_values(&numbers(&[1.0, 2.0]), Some(&labels(&[("zz", 1.0)])))
            .expect_err("unknown label");
        assert_eq!(error.kind, ErrorKind::ArgumentCount);
    }

    #[test]
    fn labels_must_be_text() {
        let mut dictionary = Dictionary::new();
        dictionary.insert(Value::number(1.0), Value::number(1.0));
        let error = abc()
            .map_argument_values(&numbers(&[1.0, 2.0]), Some(&dictionary))
            .expect_err("numeric label");
        assert_eq!(error.kind, ErrorKind::Type);
    }

    #[test]
    fn text_lists_defaults() {
        assert_eq!(abc().as_text(), "(function f(a, b, c=0))");
    }
}
