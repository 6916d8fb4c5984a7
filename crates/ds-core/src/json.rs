use serde_json::{Map, Number};

use crate::array::Array;
use crate::dictionary::Dictionary;
use crate::error::{ErrorKind, ScriptError};
use crate::record::Record;
use crate::value::{NumberHint, Value};
use crate::variable::VariableMode;

impl Value {
    /// Converts to JSON for host interop. Dictionary keys become their text
    /// form; records become objects of their members.
    pub fn to_json(&self) -> Result<serde_json::Value, ScriptError> {
        Ok(match self {
            Value::None => serde_json::Value::Null,
            Value::Number(number, NumberHint::Boolean) => serde_json::Value::Bool(*number != 0.0),
            Value::Number(number, NumberHint::Generic) => number_to_json(*number)?,
            Value::Text(text) => serde_json::Value::String(text.clone()),
            Value::Array(array) => serde_json::Value::Array(
                array
                    .elements()
                    .iter()
                    .map(Value::to_json)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Value::Dictionary(dictionary) => {
                let mut object = Map::new();
                for (key, element) in dictionary.iter() {
                    object.insert(key.as_text(), element.to_json()?);
                }
                serde_json::Value::Object(object)
            }
            Value::Block(bytes) => serde_json::Value::Array(
                bytes
                    .iter()
                    .map(|byte| serde_json::Value::Number(Number::from(*byte)))
                    .collect(),
            ),
            Value::Record(record) => record.record()?.borrow().to_json()?,
            Value::Ref(reference) => reference.value()?.to_json()?,
            Value::Function(function) => {
                return Err(ScriptError::new(
                    ErrorKind::Type,
                    format!("{} cannot be converted to JSON.", function.as_text()),
                ))
            }
        })
    }

    /// Objects become dictionaries keyed by text.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(flag) => Value::boolean(*flag),
            serde_json::Value::Number(number) => Value::number(number.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(text) => Value::text(text.as_str()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect::<Array>())
            }
            serde_json::Value::Object(object) => Value::Dictionary(
                object
                    .iter()
                    .map(|(key, item)| (Value::text(key.as_str()), Value::from_json(item)))
                    .collect::<Dictionary>(),
            ),
        }
    }
}

impl Record {
    /// Builds a namespace from a JSON object; nested objects become owned
    /// sub-records.
    pub fn from_json(json: &serde_json::Value) -> Result<Record, ScriptError> {
        let serde_json::Value::Object(object) = json else {
            return Err(ScriptError::new(
                ErrorKind::Type,
                "A record can only be built from a JSON object.",
            ));
        };
        let mut record = Record::new();
        for (name, item) in object {
            match item {
                serde_json::Value::Object(_) => {
                    record.add_subrecord(name, Record::from_json(item)?)?;
                }
                other => {
                    record.add_value(name, Value::from_json(other), VariableMode::empty())?;
                }
            }
        }
        Ok(record)
    }

    pub fn to_json(&self) -> Result<serde_json::Value, ScriptError> {
        let mut object = Map::new();
        for (name, variable) in self.variables() {
            object.insert(name.to_string(), variable.borrow().value().to_json()?);
        }
        Ok(serde_json::Value::Object(object))
    }
}

fn number_to_json(number: f64) -> Result<serde_json::Value, ScriptError> {
    if number.fract() == 0.0 && number.abs() < 9.0e15 {
        return Ok(serde_json::Value::Number(Number::from(number as i64)));
    }
    Number::from_f64(number)
        .map(serde_json::Value::Number)
        .ok_or_else(|| {
            ScriptError::new(
                ErrorKind::Type,
                format!("{} has no JSON representation.", number),
            )
        })
}
