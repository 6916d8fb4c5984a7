use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::value::Value;

/// Receives notifications about a single variable.
pub trait VariableObserver {
    fn variable_value_changed(&self, _name: &str, _value: &Value) {}
    fn variable_being_deleted(&self, _name: &str) {}
}

/// Receives notifications about a record's lifetime and membership.
pub trait RecordObserver {
    fn record_member_added(&self, _name: &str) {}
    fn record_member_removed(&self, _name: &str) {}
    fn record_being_deleted(&self) {}
}

/// Weakly held observer list. Observers that have been dropped are skipped
/// and pruned on the next notification.
pub struct Audience<T: ?Sized> {
    members: RefCell<Vec<Weak<T>>>,
}

impl<T: ?Sized> Audience<T> {
    pub fn new() -> Self {
        Self {
            members: RefCell::new(Vec::new()),
        }
    }

    pub fn add(&self, observer: &Rc<T>) {
        self.members.borrow_mut().push(Rc::downgrade(observer));
    }

    pub fn remove(&self, observer: &Rc<T>) {
        let target = Rc::downgrade(observer);
        self.members
            .borrow_mut()
            .retain(|member| !Weak::ptr_eq(member, &target));
    }

    pub fn len(&self) -> usize {
        self.members
            .borrow()
            .iter()
            .filter(|member| member.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&self, mut each: impl FnMut(&T)) {
        let live = {
            let mut members = self.members.borrow_mut();
            members.retain(|member| member.strong_count() > 0);
            members.iter().filter_map(Weak::upgrade).collect::<Vec<_>>()
        };
        for observer in live {
            each(&observer);
        }
    }
}

impl<T: ?Sized> Default for Audience<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Audience<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Audience").field("len", &self.len()).finish()
    }
}
