use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::array::Array;
use crate::error::{ErrorKind, ScriptError};
use crate::value::Value;

/// Dictionary key ordered by [`Value::compare`].
#[derive(Debug, Clone)]
pub struct DictionaryKey(Value);

impl DictionaryKey {
    pub fn value(&self) -> &Value {
        &self.0
    }
}

impl PartialEq for DictionaryKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DictionaryKey {}

impl PartialOrd for DictionaryKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DictionaryKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.compare(&other.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    entries: BTreeMap<DictionaryKey, Value>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, key: Value, value: Value) -> Option<Value> {
        self.entries.insert(DictionaryKey(key), value)
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.get(&DictionaryKey(key.duplicate()))
    }

    pub fn get_text(&self, key: &str) -> Option<&Value> {
        self.get(&Value::text(key))
    }

    pub fn element(&self, key: &Value) -> Result<&Value, ScriptError> {
        self.get(key).ok_or_else(|| {
            ScriptError::new(
                ErrorKind::IllegalIndex,
                format!("Key {} not found in dictionary.", key.as_literal_text()),
            )
        })
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &Value) -> Result<Value, ScriptError> {
        let removed = self.entries.remove(&DictionaryKey(key.duplicate()));
        removed.ok_or_else(|| {
            ScriptError::new(
                ErrorKind::IllegalIndex,
                format!("Key {} not found in dictionary.", key.as_literal_text()),
            )
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(key, value)| (&key.0, value))
    }

    pub fn keys(&self) -> Array {
        self.entries.keys().map(|key| key.0.duplicate()).collect()
    }

    pub fn values(&self) -> Array {
        self.entries.values().map(Value::duplicate).collect()
    }

    pub fn compare(&self, other: &Dictionary) -> Ordering {
        for ((left_key, left), (right_key, right)) in self.entries.iter().zip(&other.entries) {
            let ordering = left_key.cmp(right_key).then_with(|| left.compare(right));
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        self.len().cmp(&other.len())
    }

    pub fn as_text(&self) -> String {
        let parts = self
            .iter()
            .map(|(key, value)| format!("{}: {}", key.as_literal_text(), value.as_literal_text()))
            .collect::<Vec<_>>();
        format!("{{{}}}", parts.join(", "))
    }
}

impl FromIterator<(Value, Value)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (Value, Value)>>(iter: I) -> Self {
        let mut dictionary = Dictionary::new();
        for (key, value) in iter {
            dictionary.insert(key, value);
        }
        dictionary
    }
}
