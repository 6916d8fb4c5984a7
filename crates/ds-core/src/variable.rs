use std::cell::RefCell;
use std::rc::Rc;

use bitflags::bitflags;

use crate::audience::{Audience, VariableObserver};
use crate::error::{ErrorKind, ScriptError};
use crate::record::SEPARATOR;
use crate::value::Value;

bitflags! {
    /// Access flags plus the set of value variants a variable may hold. A
    /// mode without any `ALLOW_*` bit accepts every variant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VariableMode: u32 {
        const READ_ONLY = 0x1;
        const NO_SERIALIZE = 0x2;
        const ALLOW_NONE = 0x4;
        const ALLOW_NUMBER = 0x8;
        const ALLOW_TEXT = 0x10;
        const ALLOW_ARRAY = 0x20;
        const ALLOW_DICTIONARY = 0x40;
        const ALLOW_BLOCK = 0x80;
        const ALLOW_FUNCTION = 0x100;
        const ALLOW_RECORD = 0x200;
        const ALLOW_REF = 0x400;
    }
}

impl VariableMode {
    pub const TYPE_MASK: VariableMode = VariableMode::ALLOW_NONE
        .union(VariableMode::ALLOW_NUMBER)
        .union(VariableMode::ALLOW_TEXT)
        .union(VariableMode::ALLOW_ARRAY)
        .union(VariableMode::ALLOW_DICTIONARY)
        .union(VariableMode::ALLOW_BLOCK)
        .union(VariableMode::ALLOW_FUNCTION)
        .union(VariableMode::ALLOW_RECORD)
        .union(VariableMode::ALLOW_REF);

    pub fn allow_bit(value: &Value) -> VariableMode {
        match value {
            Value::None => Self::ALLOW_NONE,
            Value::Number(..) => Self::ALLOW_NUMBER,
            Value::Text(_) => Self::ALLOW_TEXT,
            Value::Array(_) => Self::ALLOW_ARRAY,
            Value::Dictionary(_) => Self::ALLOW_DICTIONARY,
            Value::Block(_) => Self::ALLOW_BLOCK,
            Value::Function(_) => Self::ALLOW_FUNCTION,
            Value::Record(_) => Self::ALLOW_RECORD,
            Value::Ref(_) => Self::ALLOW_REF,
        }
    }

    pub fn accepts(self, value: &Value) -> bool {
        let allowed = self.intersection(Self::TYPE_MASK);
        allowed.is_empty() || allowed.contains(Self::allow_bit(value))
    }
}

pub type VariableRef = Rc<RefCell<Variable>>;

/// A named storage cell holding exactly one value.
#[derive(Debug)]
pub struct Variable {
    name: String,
    value: Value,
    mode: VariableMode,
    change_audience: Audience<dyn VariableObserver>,
    deletion_audience: Audience<dyn VariableObserver>,
}

impl Variable {
    /// Creates a variable; `None` as the initial value means [`Value::None`].
    /// The read-only flag does not prevent the initial value.
    pub fn new(
        name: impl Into<String>,
        value: Option<Value>,
        mode: VariableMode,
    ) -> Result<Self, ScriptError> {
        let name = name.into();
        validate_name(&name)?;
        let value = value.unwrap_or_default();
        check_mode(&name, mode, &value)?;
        Ok(Self {
            name,
            value,
            mode,
            change_audience: Audience::new(),
            deletion_audience: Audience::new(),
        })
    }

    pub fn new_ref(
        name: impl Into<String>,
        value: Option<Value>,
        mode: VariableMode,
    ) -> Result<VariableRef, ScriptError> {
        Ok(Rc::new(RefCell::new(Self::new(name, value, mode)?)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn mode(&self) -> VariableMode {
        self.mode
    }

    /// Replaces the access flags. The held value must satisfy the new mode.
    pub fn set_mode(&mut self, mode: VariableMode) -> Result<(), ScriptError> {
        check_mode(&self.name, mode, &self.value)?;
        self.mode = mode;
        Ok(())
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.mode.set(VariableMode::READ_ONLY, read_only);
    }

    pub fn is_read_only(&self) -> bool {
        self.mode.contains(VariableMode::READ_ONLY)
    }

    pub fn is_serialized(&self) -> bool {
        !self.mode.contains(VariableMode::NO_SERIALIZE)
    }

    pub fn set(&mut self, value: Value) -> Result<(), ScriptError> {
        self.check_writable()?;
        check_mode(&self.name, self.mode, &value)?;
        self.value = value;
        self.notify_change();
        Ok(())
    }

    /// Mutates the held value in place (element assignment, compound
    /// operators on containers).
    pub fn update(
        &mut self,
        change: impl FnOnce(&mut Value) -> Result<(), ScriptError>,
    ) -> Result<(), ScriptError> {
        self.check_writable()?;
        change(&mut self.value)?;
        self.notify_change();
        Ok(())
    }

    /// Takes the value out, leaving None behind. Used when a variable is
    /// about to be discarded, or with [`Variable::put_back`] to edit the
    /// value without holding the variable borrowed.
    pub fn take(&mut self) -> Value {
        std::mem::take(&mut self.value)
    }

    /// Returns a value removed by [`Variable::take`] and reports the change.
    pub fn put_back(&mut self, value: Value) {
        self.value = value;
        self.notify_change();
    }

    pub fn audience_for_change(&self) -> &Audience<dyn VariableObserver> {
        &self.change_audience
    }

    pub fn audience_for_deletion(&self) -> &Audience<dyn VariableObserver> {
        &self.deletion_audience
    }

    pub fn check_writable(&self) -> Result<(), ScriptError> {
        if self.is_read_only() {
            return Err(ScriptError::new(
                ErrorKind::ReadOnly,
                format!("Variable \"{}\" is read-only.", self.name),
            ));
        }
        Ok(())
    }

    fn notify_change(&self) {
        let (name, value) = (&self.name, &self.value);
        self.change_audience
            .notify(|observer| observer.variable_value_changed(name, value));
    }
}

impl Drop for Variable {
    fn drop(&mut self) {
        let name = &self.name;
        self.deletion_audience
            .notify(|observer| observer.variable_being_deleted(name));
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), ScriptError> {
    if name.is_empty() {
        return Err(ScriptError::new(ErrorKind::Name, "Names cannot be empty."));
    }
    if name.contains(SEPARATOR) {
        return Err(ScriptError::new(
            ErrorKind::Name,
            format!("Name \"{}\" contains the separator '{}'.", name, SEPARATOR),
        ));
    }
    Ok(())
}

fn check_mode(name: &str, mode: VariableMode, value: &Value) -> Result<(), ScriptError> {
    if mode.accepts(value) {
        return Ok(());
    }
    Err(ScriptError::new(
        ErrorKind::ModeViolation,
        format!(
            "Variable \"{}\" does not accept {} values.",
            name,
            value.type_name()
        ),
    ))
}

#[cfg(test)]
mod variable_tests {
    use super::*;
    use std::cell::{Cell, RefCell as StdRefCell};

    #[derive(Default)]
    struct Recorder {
        seen: StdRefCell<Vec<String>>,
        deleted: Cell<bool>,
    }

    impl VariableObserver for Recorder {
        fn variable_value_changed(&self, name: &str, value: &Value) {
            self.seen
                .borrow_mut()
                .push(format!("{}={}", name, value.as_text()));
        }

        fn variable_being_deleted(&self, _name: &str) {
            self.deleted.set(true);
        }
    }

    #[test]
    fn mode_rejects_excluded_variants_and_keeps_value() {
        let mode = VariableMode::ALLOW_NUMBER | VariableMode::ALLOW_TEXT;
        let mut variable = Variable::new("x", Some(Value::number(1.0)), mode).expect("create");
        for rejected in [
            Value::None,
            Value::array(vec![]),
            Value::Block(vec![0]),
        ] {
            let error = variable.set(rejected).expect_err("excluded variant");
            assert_eq!(error.kind, ErrorKind::ModeViolation);
            assert_eq!(variable.value(), &Value::number(1.0));
        }
        variable.set(Value::text("ok")).expect("text allowed");
        assert_eq!(variable.value(), &Value::text("ok"));
    }

    #[test]
    fn initial_value_must_match_mode() {
        let error = Variable::new("x", None, VariableMode::ALLOW_NUMBER).expect_err("none");
        assert_eq!(error.kind, ErrorKind::ModeViolation);
    }

    #[test]
    fn read_only_blocks_assignment() {
        let mut variable =
            Variable::new("k", Some(Value::number(3.0)), VariableMode::READ_ONLY).expect("create");
        let error = variable.set(Value::number(4.0)).expect_err("read only");
        assert_eq!(error.kind, ErrorKind::ReadOnly);
        let error = variable
            .update(|value| {
                *value = Value::None;
                Ok(())
            })
            .expect_err("read only update");
        assert_eq!(error.kind, ErrorKind::ReadOnly);
        assert_eq!(variable.value(), &Value::number(3.0));
    }

    #[test]
    fn names_cannot_contain_separator() {
        assert_eq!(
            Variable::new("a.b", None, VariableMode::empty())
                .expect_err("dotted")
                .kind,
            ErrorKind::Name
        );
        assert_eq!(
            Variable::new("", None, VariableMode::empty())
                .expect_err("empty")
                .kind,
            ErrorKind::Name
        );
    }

    #[test]
    fn audiences_see_new_values_and_deletion() {
        let recorder = Rc::new(Recorder::default());
        let observer: Rc<dyn VariableObserver> = recorder.clone();
        let mut variable = Variable::new("v", None, VariableMode::empty()).expect("create");
        variable.audience_for_change().add(&observer);
        variable.audience_for_deletion().add(&observer);

        variable.set(Value::number(2.0)).expect("set");
        variable.set(Value::number(3.0)).expect("set again");
        assert_eq!(*recorder.seen.borrow(), vec!["v=2", "v=3"]);

        assert!(!recorder.deleted.get());
        drop(variable);
        assert!(recorder.deleted.get());
    }
}
