use std::borrow::Cow;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::{Rc, Weak};

use crate::array::{index_position, Array};
use crate::dictionary::Dictionary;
use crate::error::{ErrorKind, ScriptError};
use crate::function::Function;
use crate::record::{Record, RecordRef};
use crate::variable::{Variable, VariableRef};

/// Longest chain of references followed before giving up.
pub const MAX_REFERENCE_DEPTH: usize = 64;

/// Rendering hint for numbers. Never affects arithmetic or comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumberHint {
    #[default]
    Generic,
    Boolean,
}

/// Dynamically typed script value over a closed set of variants.
#[derive(Debug)]
pub enum Value {
    None,
    Number(f64, NumberHint),
    Text(String),
    Array(Array),
    Dictionary(Dictionary),
    Block(Vec<u8>),
    Record(RecordValue),
    Ref(RefValue),
    Function(Rc<Function>),
}

impl Value {
    pub fn number(value: f64) -> Self {
        Self::Number(value, NumberHint::Generic)
    }

    pub fn boolean(value: bool) -> Self {
        Self::Number(if value { 1.0 } else { 0.0 }, NumberHint::Boolean)
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn array(values: Vec<Value>) -> Self {
        Self::Array(Array::from_values(values))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Number(..) => "Number",
            Self::Text(_) => "Text",
            Self::Array(_) => "Array",
            Self::Dictionary(_) => "Dictionary",
            Self::Block(_) => "Block",
            Self::Record(_) => "Record",
            Self::Ref(_) => "Ref",
            Self::Function(_) => "Function",
        }
    }

    /// Position of the variant in the cross-variant ordering; also the
    /// serialization tag.
    pub fn tag(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Number(..) => 1,
            Self::Text(_) => 2,
            Self::Array(_) => 3,
            Self::Dictionary(_) => 4,
            Self::Block(_) => 5,
            Self::Function(_) => 6,
            Self::Record(_) => 7,
            Self::Ref(_) => 8,
        }
    }

    /// Independent copy. Record and variable references copy the reference
    /// (as an observer), never the referent.
    pub fn duplicate(&self) -> Value {
        match self {
            Self::None => Self::None,
            Self::Number(value, hint) => Self::Number(*value, *hint),
            Self::Text(text) => Self::Text(text.clone()),
            Self::Array(array) => Self::Array(array.clone()),
            Self::Dictionary(dictionary) => Self::Dictionary(dictionary.clone()),
            Self::Block(bytes) => Self::Block(bytes.clone()),
            Self::Record(record) => Self::Record(record.duplicate()),
            Self::Ref(reference) => Self::Ref(reference.duplicate()),
            Self::Function(function) => Self::Function(Rc::clone(function)),
        }
    }

    /// A copy of the referenced value for references; `self` otherwise.
    pub fn resolved(&self) -> Result<Cow<'_, Value>, ScriptError> {
        match self {
            Self::Ref(reference) => Ok(Cow::Owned(reference.value()?)),
            other => Ok(Cow::Borrowed(other)),
        }
    }

    pub fn is_true(&self) -> bool {
        match self {
            Self::None => false,
            Self::Number(value, _) => *value != 0.0,
            Self::Text(text) => !text.is_empty(),
            Self::Array(array) => !array.is_empty(),
            Self::Dictionary(dictionary) => !dictionary.is_empty(),
            Self::Block(bytes) => !bytes.is_empty(),
            Self::Record(record) => record
                .record()
                .map(|record| !record.borrow().is_empty())
                .unwrap_or(false),
            Self::Ref(reference) => reference
                .value()
                .map(|value| value.is_true())
                .unwrap_or(false),
            Self::Function(_) => true,
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Self::None => "None".to_string(),
            Self::Number(value, NumberHint::Boolean) => {
                if *value != 0.0 { "True" } else { "False" }.to_string()
            }
            Self::Number(value, NumberHint::Generic) => format_number(*value),
            Self::Text(text) => text.clone(),
            Self::Array(array) => array.as_text(),
            Self::Dictionary(dictionary) => dictionary.as_text(),
            Self::Block(bytes) => format!("(block of {} bytes)", bytes.len()),
            Self::Record(record) => match record.record() {
                Ok(record) => record.borrow().as_text(),
                Err(_) => "(deleted record)".to_string(),
            },
            Self::Ref(reference) => match reference.value() {
                Ok(value) => value.as_text(),
                Err(error) if error.kind == ErrorKind::Guard => "(reference cycle)".to_string(),
                Err(_) => "(deleted variable)".to_string(),
            },
            Self::Function(function) => function.as_text(),
        }
    }

    /// Text form used inside containers: text is quoted and escaped.
    pub fn as_literal_text(&self) -> String {
        match self {
            Self::Text(text) => quote_text(text),
            other => other.as_text(),
        }
    }

    pub fn as_number(&self) -> Result<f64, ScriptError> {
        match self.resolved()?.as_ref() {
            Self::Number(value, _) => Ok(*value),
            other => Err(ScriptError::new(
                ErrorKind::Type,
                format!("Expected a Number, got {}.", other.type_name()),
            )),
        }
    }

    pub fn as_record(&self) -> Result<RecordRef, ScriptError> {
        match self {
            Self::Record(record) => record.record(),
            Self::Ref(reference) => reference.value()?.as_record(),
            other => Err(ScriptError::new(
                ErrorKind::Type,
                format!("Expected a Record, got {}.", other.type_name()),
            )),
        }
    }

    pub fn as_function(&self) -> Result<Rc<Function>, ScriptError> {
        match self.resolved()?.as_ref() {
            Self::Function(function) => Ok(Rc::clone(function)),
            other => Err(ScriptError::new(
                ErrorKind::Type,
                format!("{} is not callable.", other.type_name()),
            )),
        }
    }

    /// Total order used for dictionary keys and script comparisons.
    pub fn compare(&self, other: &Value) -> Ordering {
        if let Self::Ref(reference) = self {
            if let Ok(value) = reference.value() {
                return value.compare(other);
            }
        }
        if let Self::Ref(reference) = other {
            if let Ok(value) = reference.value() {
                return self.compare(&value);
            }
        }

        match (self, other) {
            (Self::None, Self::None) => Ordering::Equal,
            (Self::Number(left, _), Self::Number(right, _)) => left.total_cmp(right),
            (Self::Text(left), Self::Text(right)) => left.cmp(right),
            (Self::Array(left), Self::Array(right)) => left.compare(right),
            (Self::Dictionary(left), Self::Dictionary(right)) => left.compare(right),
            (Self::Block(left), Self::Block(right)) => left.cmp(right),
            (Self::Record(left), Self::Record(right)) => left.address().cmp(&right.address()),
            (Self::Ref(left), Self::Ref(right)) => left.address().cmp(&right.address()),
            (Self::Function(left), Self::Function(right)) => left.compare(right),
            _ => self.tag().cmp(&other.tag()),
        }
    }

    pub fn sum(&self, other: &Value) -> Result<Value, ScriptError> {
        let (left, right) = (self.resolved()?, other.resolved()?);
        match (left.as_ref(), right.as_ref()) {
            (Self::Number(a, _), Self::Number(b, _)) => Ok(Value::number(a + b)),
            (Self::Text(a), Self::Text(b)) => Ok(Value::Text(format!("{}{}", a, b))),
            (Self::Array(a), Self::Array(b)) => {
                let mut joined = a.clone();
                for element in b.elements() {
                    joined.push(element.duplicate());
                }
                Ok(Value::Array(joined))
            }
            (a, b) => Err(arithmetic_error("add", a, b)),
        }
    }

    pub fn subtract(&self, other: &Value) -> Result<Value, ScriptError> {
        let (a, b) = numeric_operands("subtract", self, other)?;
        Ok(Value::number(a - b))
    }

    pub fn multiply(&self, other: &Value) -> Result<Value, ScriptError> {
        let (a, b) = numeric_operands("multiply", self, other)?;
        Ok(Value::number(a * b))
    }

    /// Division follows IEEE semantics: dividing by zero yields an infinity.
    pub fn divide(&self, other: &Value) -> Result<Value, ScriptError> {
        let (a, b) = numeric_operands("divide", self, other)?;
        Ok(Value::number(a / b))
    }

    pub fn modulo(&self, other: &Value) -> Result<Value, ScriptError> {
        let (a, b) = numeric_operands("take modulo of", self, other)?;
        if b == 0.0 {
            return Err(ScriptError::new(ErrorKind::Arithmetic, "Modulo by zero."));
        }
        Ok(Value::number(a % b))
    }

    pub fn negate(&self) -> Result<Value, ScriptError> {
        match self.resolved()?.as_ref() {
            Self::Number(value, _) => Ok(Value::number(-value)),
            other => Err(ScriptError::new(
                ErrorKind::Arithmetic,
                format!("Cannot negate {}.", other.type_name()),
            )),
        }
    }

    /// Membership test behind the `in` operator.
    pub fn contains(&self, item: &Value) -> Result<bool, ScriptError> {
        match self.resolved()?.as_ref() {
            Self::Array(array) => Ok(array.contains(item)),
            Self::Dictionary(dictionary) => Ok(dictionary.contains_key(item)),
            Self::Text(text) => match item.resolved()?.as_ref() {
                Self::Text(needle) => Ok(text.contains(needle.as_str())),
                other => Err(ScriptError::new(
                    ErrorKind::Type,
                    format!("Cannot search Text for {}.", other.type_name()),
                )),
            },
            Self::Record(record) => match item.resolved()?.as_ref() {
                Self::Text(name) => Ok(record.record()?.borrow().has_member(name)),
                other => Err(ScriptError::new(
                    ErrorKind::Type,
                    format!("Record member names are Text, got {}.", other.type_name()),
                )),
            },
            other => Err(ScriptError::new(
                ErrorKind::Type,
                format!("{} does not support 'in'.", other.type_name()),
            )),
        }
    }

    pub fn size(&self) -> Result<usize, ScriptError> {
        match self.resolved()?.as_ref() {
            Self::Text(text) => Ok(text.chars().count()),
            Self::Array(array) => Ok(array.len()),
            Self::Dictionary(dictionary) => Ok(dictionary.len()),
            Self::Block(bytes) => Ok(bytes.len()),
            Self::Record(record) => Ok(record.record()?.borrow().len()),
            other => Err(ScriptError::new(
                ErrorKind::Type,
                format!("{} has no size.", other.type_name()),
            )),
        }
    }

    /// Reads `self[index]` as an independent copy.
    pub fn element(&self, index: &Value) -> Result<Value, ScriptError> {
        let index = index.resolved()?;
        match self {
            Self::Array(array) => Ok(array.get(&index)?.duplicate()),
            Self::Dictionary(dictionary) => Ok(dictionary.element(&index)?.duplicate()),
            Self::Text(text) => {
                let chars = text.chars().collect::<Vec<_>>();
                let position = index_position(&index)?;
                let len = chars.len() as i64;
                let resolved = if position < 0 { len + position } else { position };
                if resolved < 0 || resolved >= len {
                    return Err(ScriptError::new(
                        ErrorKind::OutOfBounds,
                        format!("Index {} is out of bounds for text of length {}.", position, len),
                    ));
                }
                Ok(Value::text(chars[resolved as usize].to_string()))
            }
            Self::Record(record) => {
                let name = member_name(&index)?;
                record.record()?.borrow().value(name)
            }
            Self::Ref(reference) => reference.value()?.element(&index),
            other => Err(ScriptError::new(
                ErrorKind::Type,
                format!("{} cannot be indexed.", other.type_name()),
            )),
        }
    }

    /// Writes `self[index] = value`.
    pub fn set_element(&mut self, index: &Value, value: Value) -> Result<(), ScriptError> {
        let index = index.resolved()?;
        match self {
            Self::Array(array) => array.set(&index, value),
            Self::Dictionary(dictionary) => {
                dictionary.insert(index.into_owned(), value);
                Ok(())
            }
            Self::Record(record) => {
                let name = member_name(&index)?;
                let record = record.record()?;
                let mut record = record.try_borrow_mut().map_err(|_| busy_variable())?;
                record.set(name, value)?;
                Ok(())
            }
            Self::Ref(reference) => {
                let variable = reference.target()?;
                let held = variable.try_borrow().map_err(|_| busy_variable())?;
                held.check_writable()?;
                let record = match held.value() {
                    Self::Record(record) => Some(record.duplicate()),
                    _ => None,
                };
                drop(held);
                if let Some(record) = record {
                    return Self::Record(record).set_element(&index, value);
                }
                let mut held = variable.try_borrow_mut().map_err(|_| busy_variable())?.take();
                let stored = held.set_element(&index, value);
                variable.borrow_mut().put_back(held);
                stored
            }
            other => Err(ScriptError::new(
                ErrorKind::Type,
                format!("{} does not support element assignment.", other.type_name()),
            )),
        }
    }

    /// Array of the items a `for` loop visits: elements, dictionary keys, or
    /// characters.
    pub fn iteration_array(&self) -> Result<Array, ScriptError> {
        match self.resolved()?.as_ref() {
            Self::Array(array) => Ok(array.clone()),
            Self::Dictionary(dictionary) => Ok(dictionary.keys()),
            Self::Text(text) => Ok(text
                .chars()
                .map(|character| Value::text(character.to_string()))
                .collect()),
            other => Err(ScriptError::new(
                ErrorKind::Type,
                format!("{} is not iterable.", other.type_name()),
            )),
        }
    }
}

impl Clone for Value {
    fn clone(&self) -> Self {
        self.duplicate()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::None
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::text(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Array> for Value {
    fn from(value: Array) -> Self {
        Value::Array(value)
    }
}

impl From<Dictionary> for Value {
    fn from(value: Dictionary) -> Self {
        Value::Dictionary(value)
    }
}

fn busy_variable() -> ScriptError {
    ScriptError::new(
        ErrorKind::Guard,
        "Variable is being modified and cannot be accessed through itself.",
    )
}

fn member_name(index: &Value) -> Result<&str, ScriptError> {
    match index {
        Value::Text(name) => Ok(name.as_str()),
        other => Err(ScriptError::new(
            ErrorKind::Type,
            format!("Record members are indexed by Text, got {}.", other.type_name()),
        )),
    }
}

fn arithmetic_error(verb: &str, left: &Value, right: &Value) -> ScriptError {
    ScriptError::new(
        ErrorKind::Arithmetic,
        format!(
            "Cannot {} {} and {}.",
            verb,
            left.type_name(),
            right.type_name()
        ),
    )
}

fn numeric_operands(verb: &str, left: &Value, right: &Value) -> Result<(f64, f64), ScriptError> {
    let (left, right) = (left.resolved()?, right.resolved()?);
    match (left.as_ref(), right.as_ref()) {
        (Value::Number(a, _), Value::Number(b, _)) => Ok((*a, *b)),
        (a, b) => Err(arithmetic_error(verb, a, b)),
    }
}

pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Inf" } else { "-Inf" }.to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    format!("{}", value)
}

pub fn quote_text(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for character in text.chars() {
        match character {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            '\r' => quoted.push_str("\\r"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

#[derive(Debug)]
enum RecordLink {
    Owned(RecordRef),
    Observed(Weak<RefCell<Record>>),
}

/// Reference to a record that either owns it or merely observes it. An
/// observer whose record has been deleted reports `NotFound` on access.
#[derive(Debug)]
pub struct RecordValue {
    link: RecordLink,
}

impl RecordValue {
    pub fn owned(record: Record) -> Self {
        Self::owning(Rc::new(RefCell::new(record)))
    }

    pub fn owning(record: RecordRef) -> Self {
        Self {
            link: RecordLink::Owned(record),
        }
    }

    pub fn observing(record: &RecordRef) -> Self {
        Self {
            link: RecordLink::Observed(Rc::downgrade(record)),
        }
    }

    pub fn is_owner(&self) -> bool {
        matches!(self.link, RecordLink::Owned(_))
    }

    pub fn is_valid(&self) -> bool {
        match &self.link {
            RecordLink::Owned(_) => true,
            RecordLink::Observed(weak) => weak.strong_count() > 0,
        }
    }

    pub fn record(&self) -> Result<RecordRef, ScriptError> {
        match &self.link {
            RecordLink::Owned(record) => Ok(Rc::clone(record)),
            RecordLink::Observed(weak) => weak.upgrade().ok_or_else(|| {
                ScriptError::new(ErrorKind::NotFound, "Referenced record has been deleted.")
            }),
        }
    }

    pub fn duplicate(&self) -> Self {
        match &self.link {
            RecordLink::Owned(record) => Self::observing(record),
            RecordLink::Observed(weak) => Self {
                link: RecordLink::Observed(weak.clone()),
            },
        }
    }

    fn address(&self) -> usize {
        match &self.link {
            RecordLink::Owned(record) => Rc::as_ptr(record) as *const () as usize,
            RecordLink::Observed(weak) => weak.as_ptr() as *const () as usize,
        }
    }
}

#[derive(Debug)]
enum VariableLink {
    Owned(VariableRef),
    Observed(Weak<RefCell<Variable>>),
}

/// Reference to a variable, with the same own-or-observe contract as
/// [`RecordValue`].
#[derive(Debug)]
pub struct RefValue {
    link: VariableLink,
}

impl RefValue {
    pub fn owned(variable: Variable) -> Self {
        Self {
            link: VariableLink::Owned(Rc::new(RefCell::new(variable))),
        }
    }

    pub fn observing(variable: &VariableRef) -> Self {
        Self {
            link: VariableLink::Observed(Rc::downgrade(variable)),
        }
    }

    pub fn is_owner(&self) -> bool {
        matches!(self.link, VariableLink::Owned(_))
    }

    pub fn is_valid(&self) -> bool {
        match &self.link {
            VariableLink::Owned(_) => true,
            VariableLink::Observed(weak) => weak.strong_count() > 0,
        }
    }

    pub fn variable(&self) -> Result<VariableRef, ScriptError> {
        match &self.link {
            VariableLink::Owned(variable) => Ok(Rc::clone(variable)),
            VariableLink::Observed(weak) => weak.upgrade().ok_or_else(|| {
                ScriptError::new(
                    ErrorKind::NotFound,
                    "Referenced variable has been deleted.",
                )
            }),
        }
    }

    /// The variable at the end of a reference chain: the first one that does
    /// not itself hold a reference. Chains longer than
    /// [`MAX_REFERENCE_DEPTH`] are taken to be cyclic.
    pub fn target(&self) -> Result<VariableRef, ScriptError> {
        let mut variable = self.variable()?;
        for _ in 0..MAX_REFERENCE_DEPTH {
            let next = match variable.try_borrow().map_err(|_| busy_variable())?.value() {
                Value::Ref(reference) => Some(reference.variable()?),
                _ => None,
            };
            match next {
                Some(next) => variable = next,
                None => return Ok(variable),
            }
        }
        Err(ScriptError::new(
            ErrorKind::Guard,
            format!(
                "Reference chain is cyclic or deeper than {} links.",
                MAX_REFERENCE_DEPTH
            ),
        ))
    }

    /// Copy of the value at the end of the reference chain.
    pub fn value(&self) -> Result<Value, ScriptError> {
        let variable = self.target()?;
        let value = variable.try_borrow().map_err(|_| busy_variable())?.value().duplicate();
        Ok(value)
    }

    pub fn duplicate(&self) -> Self {
        match &self.link {
            VariableLink::Owned(variable) => Self::observing(variable),
            VariableLink::Observed(weak) => Self {
                link: VariableLink::Observed(weak.clone()),
            },
        }
    }

    fn address(&self) -> usize {
        match &self.link {
            VariableLink::Owned(variable) => Rc::as_ptr(variable) as *const () as usize,
            VariableLink::Observed(weak) => weak.as_ptr() as *const () as usize,
        }
    }
}

#[cfg(test)]
mod value_tests {
    use super::*;
    use crate::variable::VariableMode;

    #[test]
    fn truthiness_follows_variant_rules() {
        assert!(!Value::None.is_true());
        assert!(!Value::number(0.0).is_true());
        assert!(Value::number(-0.5).is_true());
        assert!(!Value::text("").is_true());
        assert!(Value::text("x").is_true());
        assert!(!Value::array(vec![]).is_true());
        assert!(!Value::Dictionary(Dictionary::new()).is_true());
        assert!(!Value::Block(Vec::new()).is_true());
        assert!(!Value::Record(RecordValue::owned(Record::new())).is_true());
    }

    #[test]
    fn boolean_hint_only_changes_text() {
        let truth = Value::boolean(true);
        assert_eq!(truth.as_text(), "True");
        assert_eq!(Value::boolean(false).as_text(), "False");
        assert_eq!(truth.compare(&Value::number(1.0)), Ordering::Equal);
        assert_eq!(truth.sum(&Value::number(1.0)).expect("sum").as_text(), "2");
    }

    #[test]
    fn numbers_render_without_trailing_zeroes() {
        assert_eq!(Value::number(5.0).as_text(), "5");
        assert_eq!(Value::number(-2.5).as_text(), "-2.5");
        assert_eq!(Value::number(1.0 / 0.0).as_text(), "Inf");
    }

    #[test]
    fn cross_variant_order_is_stable() {
        let ordered = [
            Value::None,
            Value::number(100.0),
            Value::text("a"),
            Value::array(vec![]),
            Value::Dictionary(Dictionary::new()),
            Value::Block(vec![1]),
        ];
        for pair in ordered.windows(2) {
            assert_eq!(pair[0].compare(&pair[1]), Ordering::Less);
            assert_eq!(pair[1].compare(&pair[0]), Ordering::Greater);
        }
    }

    #[test]
    fn arithmetic_rejects_incompatible_variants() {
        assert_eq!(
            Value::text("a").sum(&Value::text("b")).expect("concat"),
            Value::text("ab")
        );
        let joined = Value::array(vec![Value::number(1.0)])
            .sum(&Value::array(vec![Value::number(2.0)]))
            .expect("concat arrays");
        assert_eq!(joined.as_text(), "[1, 2]");

        let error = Value::text("a").sum(&Value::number(1.0)).expect_err("mixed");
        assert_eq!(error.kind, ErrorKind::Arithmetic);
        let error = Value::text("a").multiply(&Value::number(2.0)).expect_err("text");
        assert_eq!(error.kind, ErrorKind::Arithmetic);
        let error = Value::None.negate().expect_err("none");
        assert_eq!(error.kind, ErrorKind::Arithmetic);
        let error = Value::number(1.0).modulo(&Value::number(0.0)).expect_err("zero");
        assert_eq!(error.kind, ErrorKind::Arithmetic);
        assert_eq!(
            Value::number(7.0).modulo(&Value::number(3.0)).expect("mod"),
            Value::number(1.0)
        );
    }

    #[test]
    fn duplicate_is_deep_for_containers() {
        let original = Value::array(vec![Value::array(vec![Value::number(1.0)])]);
        let mut copy = original.duplicate();
        copy.set_element(&Value::number(0.0), Value::text("changed"))
            .expect("set");
        assert_eq!(original.as_text(), "[[1]]");
        assert_eq!(copy.as_text(), "[\"changed\"]");
    }

    #[test]
    fn record_duplicate_observes_instead_of_copying() {
        let owner = Value::Record(RecordValue::owned(Record::new()));
        let observer = owner.duplicate();
        let Value::Record(observed) = &observer else {
            panic!("expected record");
        };
        assert!(!observed.is_owner());
        owner
            .as_record()
            .expect("record")
            .borrow_mut()
            .add_number("x", 1.0)
            .expect("add");
        assert_eq!(observer.element(&Value::text("x")).expect("x"), Value::number(1.0));

        drop(owner);
        let error = observer.as_record().expect_err("deleted");
        assert_eq!(error.kind, ErrorKind::NotFound);
        assert_eq!(observer.as_text(), "(deleted record)");
    }

    #[test]
    fn ref_forwards_operations_to_the_variable() {
        let variable =
            Variable::new_ref("x", Some(Value::number(2.0)), VariableMode::empty()).expect("var");
        let reference = Value::Ref(RefValue::observing(&variable));
        assert_eq!(reference.sum(&Value::number(3.0)).expect("sum"), Value::number(5.0));
        assert_eq!(reference.as_text(), "2");
        assert!(reference.is_true());

        drop(variable);
        assert!(!reference.is_true());
        assert_eq!(reference.sum(&Value::number(1.0)).expect_err("gone").kind, ErrorKind::NotFound);
    }

    #[test]
    fn cyclic_references_fail_with_a_guard_error() {
        let variable =
            Variable::new_ref("r", Some(Value::number(0.0)), VariableMode::empty()).expect("var");
        let itself = Value::Ref(RefValue::observing(&variable));
        variable.borrow_mut().set(itself.duplicate()).expect("self reference");

        assert_eq!(itself.resolved().expect_err("cycle").kind, ErrorKind::Guard);
        assert_eq!(itself.as_text(), "(reference cycle)");
        assert!(!itself.is_true());
        assert_ne!(itself, Value::number(1.0));

        let mode = VariableMode::empty();
        let a = Variable::new_ref("a", Some(Value::number(0.0)), mode).expect("a");
        let b = Variable::new_ref("b", Some(Value::Ref(RefValue::observing(&a))), mode).expect("b");
        a.borrow_mut()
            .set(Value::Ref(RefValue::observing(&b)))
            .expect("close the loop");
        let through_b = Value::Ref(RefValue::observing(&b));
        assert_eq!(through_b.as_number().expect_err("cycle").kind, ErrorKind::Guard);
        let mut through_b = through_b;
        assert_eq!(
            through_b
                .set_element(&Value::number(0.0), Value::None)
                .expect_err("cycle")
                .kind,
            ErrorKind::Guard
        );
    }

    #[test]
    fn reference_chains_read_through_to_the_end() {
        let mode = VariableMode::empty();
        let x = Variable::new_ref("x", Some(Value::number(7.0)), mode).expect("x");
        let y = Variable::new_ref("y", Some(Value::Ref(RefValue::observing(&x))), mode).expect("y");
        let reference = Value::Ref(RefValue::observing(&y));
        assert_eq!(reference.resolved().expect("chain").into_owned(), Value::number(7.0));
        assert_eq!(reference.as_text(), "7");
    }

    #[test]
    fn nan_is_not_equal_to_ordinary_numbers() {
        let nan = Value::number(f64::NAN);
        assert_ne!(nan, Value::number(5.0));
        assert_ne!(nan, Value::number(1.0));
        assert_eq!(Value::number(2.0).compare(&Value::number(3.0)), Ordering::Less);

        let mut dictionary = Value::Dictionary(Dictionary::new());
        dictionary
            .set_element(&Value::number(1.0), Value::text("one"))
            .expect("insert");
        assert!(dictionary.element(&nan).is_err());
        assert!(!dictionary.contains(&nan).expect("contains"));
    }

    #[test]
    fn element_access_covers_text_and_dictionary() {
        assert_eq!(
            Value::text("héllo").element(&Value::number(1.0)).expect("char"),
            Value::text("é")
        );
        let mut dictionary = Value::Dictionary(Dictionary::new());
        dictionary
            .set_element(&Value::text("k"), Value::number(3.0))
            .expect("insert");
        assert_eq!(dictionary.element(&Value::text("k")).expect("k"), Value::number(3.0));
        assert!(dictionary.contains(&Value::text("k")).expect("in"));
        assert_eq!(
            Value::number(1.0).element(&Value::number(0.0)).expect_err("number").kind,
            ErrorKind::Type
        );
    }

    #[test]
    fn containers_quote_text() {
        let value = Value::array(vec![Value::text("a\"b"), Value::None, Value::boolean(true)]);
        assert_eq!(value.as_text(), "[\"a\\\"b\", None, True]");
    }
}
