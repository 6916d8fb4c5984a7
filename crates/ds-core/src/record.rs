use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::array::Array;
use crate::audience::{Audience, RecordObserver};
use crate::dictionary::Dictionary;
use crate::error::{ErrorKind, ScriptError};
use crate::function::Function;
use crate::value::{RecordValue, Value};
use crate::variable::{Variable, VariableMode, VariableRef};

/// Separates the segments of a member path such as `a.b.c`.
pub const SEPARATOR: char = '.';

pub type RecordRef = Rc<RefCell<Record>>;

/// Ordered namespace of variables. A sub-record is a member whose value owns
/// a record, so deleting a record deletes its whole subtree.
#[derive(Debug, Default)]
pub struct Record {
    members: IndexMap<String, VariableRef>,
    member_audience: Audience<dyn RecordObserver>,
    deletion_audience: Audience<dyn RecordObserver>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_ref(self) -> RecordRef {
        Rc::new(RefCell::new(self))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, &VariableRef)> {
        self.members
            .iter()
            .map(|(name, variable)| (name.as_str(), variable))
    }

    /// Inserts a new member. Fails if the name is taken.
    pub fn add(&mut self, variable: Variable) -> Result<VariableRef, ScriptError> {
        let name = variable.name().to_string();
        if self.members.contains_key(&name) {
            return Err(ScriptError::new(
                ErrorKind::Name,
                format!("Record already has a member named \"{}\".", name),
            ));
        }
        let variable = Rc::new(RefCell::new(variable));
        self.members.insert(name.clone(), Rc::clone(&variable));
        self.member_audience
            .notify(|observer| observer.record_member_added(&name));
        Ok(variable)
    }

    pub fn add_value(
        &mut self,
        name: &str,
        value: Value,
        mode: VariableMode,
    ) -> Result<VariableRef, ScriptError> {
        self.add(Variable::new(name, Some(value), mode)?)
    }

    pub fn add_number(&mut self, name: &str, number: f64) -> Result<VariableRef, ScriptError> {
        self.add_value(name, Value::number(number), VariableMode::ALLOW_NUMBER)
    }

    pub fn add_boolean(&mut self, name: &str, value: bool) -> Result<VariableRef, ScriptError> {
        self.add_value(name, Value::boolean(value), VariableMode::ALLOW_NUMBER)
    }

    pub fn add_text(&mut self, name: &str, text: &str) -> Result<VariableRef, ScriptError> {
        self.add_value(name, Value::text(text), VariableMode::ALLOW_TEXT)
    }

    pub fn add_array(&mut self, name: &str, array: Array) -> Result<VariableRef, ScriptError> {
        self.add_value(name, Value::Array(array), VariableMode::ALLOW_ARRAY)
    }

    pub fn add_dictionary(
        &mut self,
        name: &str,
        dictionary: Dictionary,
    ) -> Result<VariableRef, ScriptError> {
        self.add_value(
            name,
            Value::Dictionary(dictionary),
            VariableMode::ALLOW_DICTIONARY,
        )
    }

    pub fn add_function(
        &mut self,
        name: &str,
        function: Rc<Function>,
    ) -> Result<VariableRef, ScriptError> {
        self.add_value(name, Value::Function(function), VariableMode::ALLOW_FUNCTION)
    }

    /// Adds an empty owned sub-record and returns it.
    pub fn add_record(&mut self, name: &str) -> Result<RecordRef, ScriptError> {
        self.add_subrecord(name, Record::new())
    }

    pub fn add_subrecord(&mut self, name: &str, record: Record) -> Result<RecordRef, ScriptError> {
        let record = record.into_ref();
        self.add_value(
            name,
            Value::Record(RecordValue::owning(Rc::clone(&record))),
            VariableMode::ALLOW_RECORD,
        )?;
        Ok(record)
    }

    /// Direct member lookup, no path walking.
    pub fn member(&self, name: &str) -> Result<VariableRef, ScriptError> {
        self.members.get(name).cloned().ok_or_else(|| {
            ScriptError::new(
                ErrorKind::NotFound,
                format!("Variable \"{}\" not found.", name),
            )
        })
    }

    /// Resolves a dotted path by walking sub-records.
    pub fn variable(&self, path: &str) -> Result<VariableRef, ScriptError> {
        match path.split_once(SEPARATOR) {
            None => self.member(path),
            Some((head, rest)) => {
                let record = self.member_record(head)?;
                let found = record.borrow().variable(rest);
                found
            }
        }
    }

    /// Copy of the value at `path`.
    pub fn value(&self, path: &str) -> Result<Value, ScriptError> {
        Ok(self.variable(path)?.borrow().value().duplicate())
    }

    pub fn subrecord(&self, path: &str) -> Result<RecordRef, ScriptError> {
        match path.split_once(SEPARATOR) {
            None => self.member_record(path),
            Some((head, rest)) => {
                let record = self.member_record(head)?;
                let found = record.borrow().subrecord(rest);
                found
            }
        }
    }

    pub fn has(&self, path: &str) -> bool {
        self.variable(path).is_ok()
    }

    pub fn has_subrecord(&self, path: &str) -> bool {
        self.subrecord(path).is_ok()
    }

    /// Assigns to an existing member or creates an unrestricted one.
    pub fn set(&mut self, name: &str, value: Value) -> Result<VariableRef, ScriptError> {
        if let Some(variable) = self.members.get(name) {
            variable.borrow_mut().set(value)?;
            return Ok(Rc::clone(variable));
        }
        self.add_value(name, value, VariableMode::empty())
    }

    pub fn remove(&mut self, name: &str) -> Result<VariableRef, ScriptError> {
        let removed = self.members.shift_remove(name).ok_or_else(|| {
            ScriptError::new(
                ErrorKind::NotFound,
                format!("Variable \"{}\" not found.", name),
            )
        })?;
        self.member_audience
            .notify(|observer| observer.record_member_removed(name));
        Ok(removed)
    }

    pub fn clear(&mut self) {
        let names = self.names();
        self.members.clear();
        for name in names {
            self.member_audience
                .notify(|observer| observer.record_member_removed(&name));
        }
    }

    /// Members whose value owns a record, in declaration order.
    /// Owned sub-records with the mode of the member holding each one.
    pub fn subrecords(&self) -> Vec<(String, VariableMode, RecordRef)> {
        self.members
            .iter()
            .filter_map(|(name, variable)| {
                let variable = variable.borrow();
                let record = match variable.value() {
                    Value::Record(record) if record.is_owner() => record.record().ok(),
                    _ => None,
                };
                record.map(|record| (name.clone(), variable.mode(), record))
            })
            .collect()
    }

    pub fn as_text(&self) -> String {
        if self.members.is_empty() {
            return "(record)".to_string();
        }
        let names = self.members.keys().cloned().collect::<Vec<_>>();
        format!("(record {})", names.join(", "))
    }

    pub fn audience_for_members(&self) -> &Audience<dyn RecordObserver> {
        &self.member_audience
    }

    pub fn audience_for_deletion(&self) -> &Audience<dyn RecordObserver> {
        &self.deletion_audience
    }

    fn member_record(&self, name: &str) -> Result<RecordRef, ScriptError> {
        let variable = self.member(name)?;
        let variable = variable.borrow();
        match variable.value() {
            Value::Record(record) => record.record(),
            other => Err(ScriptError::new(
                ErrorKind::NotFound,
                format!("\"{}\" is a {}, not a record.", name, other.type_name()),
            )),
        }
    }
}

impl Drop for Record {
    fn drop(&mut self) {
        self.deletion_audience
            .notify(|observer| observer.record_being_deleted());
    }
}

#[cfg(test)]
mod record_tests {
    use super::*;
    use std::cell::Cell;

    fn sample() -> Record {
        let mut root = Record::new();
        let a = root.add_record("a").expect("subrecord");
        a.borrow_mut().add_number("b", 5.0).expect("b");
        root
    }

    #[test]
    fn dotted_paths_walk_subrecords() {
        let root = sample();
        assert_eq!(root.value("a.b").expect("a.b"), Value::number(5.0));
        assert_eq!(
            root.value("a.missing").expect_err("missing leaf").kind,
            ErrorKind::NotFound
        );
        assert_eq!(
            root.value("missing.b").expect_err("missing record").kind,
            ErrorKind::NotFound
        );
        assert_eq!(
            root.value("a.b.c").expect_err("number is not a record").kind,
            ErrorKind::NotFound
        );
        assert!(root.has_subrecord("a"));
        assert!(!root.has_subrecord("a.b"));
    }

    #[test]
    fn add_rejects_duplicate_and_dotted_names() {
        let mut root = sample();
        assert_eq!(root.add_number("a", 1.0).expect_err("taken").kind, ErrorKind::Name);
        assert_eq!(root.add_number("x.y", 1.0).expect_err("dotted").kind, ErrorKind::Name);
        assert_eq!(root.len(), 1);
    }

    #[test]
    fn set_creates_then_updates_in_order() {
        let mut record = Record::new();
        record.set("z", Value::number(1.0)).expect("create z");
        record.set("y", Value::number(2.0)).expect("create y");
        record.set("z", Value::text("again")).expect("update z");
        assert_eq!(record.names(), vec!["z", "y"]);
        assert_eq!(record.as_text(), "(record z, y)");
        assert_eq!(record.value("z").expect("z"), Value::text("again"));
    }

    #[test]
    fn removing_a_subrecord_invalidates_observers() {
        let mut root = sample();
        let observer = RecordValue::observing(&root.subrecord("a").expect("a"));
        assert!(observer.is_valid());
        drop(root.remove("a").expect("remove"));
        assert!(!observer.is_valid());
        assert_eq!(observer.record().expect_err("deleted").kind, ErrorKind::NotFound);
    }

    struct DeletionFlag(Cell<bool>);

    impl RecordObserver for DeletionFlag {
        fn record_being_deleted(&self) {
            self.0.set(true);
        }
    }

    #[test]
    fn dropping_a_record_notifies_deletion() {
        let flag = Rc::new(DeletionFlag(Cell::new(false)));
        let observer: Rc<dyn RecordObserver> = flag.clone();
        let record = Record::new();
        record.audience_for_deletion().add(&observer);
        drop(record);
        assert!(flag.0.get());
    }
}
