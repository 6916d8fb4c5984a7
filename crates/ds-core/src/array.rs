use std::cmp::Ordering;

use crate::error::{ErrorKind, ScriptError};
use crate::value::Value;

/// Ordered sequence of owned values with a single restartable cursor.
///
/// The cursor is reset to the beginning by every structural mutation
/// (push, pop, insert, remove, clear); replacing an element in place keeps it.
#[derive(Debug, Default)]
pub struct Array {
    elements: Vec<Value>,
    cursor: usize,
}

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(elements: Vec<Value>) -> Self {
        Self {
            elements,
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[Value] {
        &self.elements
    }

    pub fn into_values(self) -> Vec<Value> {
        self.elements
    }

    pub fn at(&self, position: usize) -> Option<&Value> {
        self.elements.get(position)
    }

    pub fn push(&mut self, value: Value) {
        self.elements.push(value);
        self.cursor = 0;
    }

    pub fn pop(&mut self) -> Result<Value, ScriptError> {
        let value = self.elements.pop().ok_or_else(|| {
            ScriptError::new(ErrorKind::OutOfBounds, "Cannot pop from an empty array.")
        })?;
        self.cursor = 0;
        Ok(value)
    }

    pub fn get(&self, index: &Value) -> Result<&Value, ScriptError> {
        let position = self.resolve_index(index, false)?;
        Ok(&self.elements[position])
    }

    /// Replaces an existing element. Not a structural change.
    pub fn set(&mut self, index: &Value, value: Value) -> Result<(), ScriptError> {
        let position = self.resolve_index(index, false)?;
        self.elements[position] = value;
        Ok(())
    }

    /// Inserts before `index`; an index equal to the length appends.
    pub fn insert(&mut self, index: &Value, value: Value) -> Result<(), ScriptError> {
        let position = self.resolve_index(index, true)?;
        self.elements.insert(position, value);
        self.cursor = 0;
        Ok(())
    }

    pub fn remove(&mut self, index: &Value) -> Result<Value, ScriptError> {
        let position = self.resolve_index(index, false)?;
        let removed = self.elements.remove(position);
        self.cursor = 0;
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.elements.clear();
        self.cursor = 0;
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.elements
            .iter()
            .any(|element| element.compare(value) == Ordering::Equal)
    }

    /// Restarts iteration from the first element.
    pub fn begin(&mut self) {
        self.cursor = 0;
    }

    /// Returns a copy of the element under the cursor and advances, or `None`
    /// once the end has been reached.
    pub fn next(&mut self) -> Option<Value> {
        let value = self.elements.get(self.cursor)?.duplicate();
        self.cursor += 1;
        Some(value)
    }

    pub fn compare(&self, other: &Array) -> Ordering {
        for (left, right) in self.elements.iter().zip(&other.elements) {
            let ordering = left.compare(right);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        self.len().cmp(&other.len())
    }

    pub fn as_text(&self) -> String {
        let parts = self
            .elements
            .iter()
            .map(Value::as_literal_text)
            .collect::<Vec<_>>();
        format!("[{}]", parts.join(", "))
    }

    fn resolve_index(&self, index: &Value, allow_end: bool) -> Result<usize, ScriptError> {
        let position = index_position(index)?;
        let len = self.elements.len() as i64;
        let resolved = if position < 0 { len + position } else { position };
        let limit = if allow_end { len } else { len - 1 };
        if resolved < 0 || resolved > limit {
            return Err(ScriptError::new(
                ErrorKind::OutOfBounds,
                format!(
                    "Index {} is out of bounds for array of length {}.",
                    position, len
                ),
            ));
        }
        Ok(resolved as usize)
    }
}

/// Validates that `index` is an integral number; negative values count from
/// the end.
pub(crate) fn index_position(index: &Value) -> Result<i64, ScriptError> {
    let Value::Number(number, _) = index else {
        return Err(ScriptError::new(
            ErrorKind::Type,
            format!("Index must be a number, got {}.", index.type_name()),
        ));
    };
    if !number.is_finite() || number.fract() != 0.0 {
        return Err(ScriptError::new(
            ErrorKind::IllegalIndex,
            format!("Index {} is not an integer.", number),
        ));
    }
    Ok(*number as i64)
}

impl Clone for Array {
    fn clone(&self) -> Self {
        Self::from_values(self.elements.iter().map(Value::duplicate).collect())
    }
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from_values(iter.into_iter().collect())
    }
}
