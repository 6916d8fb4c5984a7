//! Binary save format: every value is a one-byte variant tag followed by its
//! payload. Integers and floats are little-endian; text is a `u32` byte
//! length followed by UTF-8.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::array::Array;
use crate::dictionary::Dictionary;
use crate::error::{ErrorKind, ScriptError};
use crate::function::{Function, FunctionBody};
use crate::record::Record;
use crate::types::Program;
use crate::value::{NumberHint, RecordValue, RefValue, Value};
use crate::variable::{Variable, VariableMode};

pub const TAG_NONE: u8 = 0;
pub const TAG_NUMBER: u8 = 1;
pub const TAG_TEXT: u8 = 2;
pub const TAG_ARRAY: u8 = 3;
pub const TAG_DICTIONARY: u8 = 4;
pub const TAG_BLOCK: u8 = 5;
pub const TAG_FUNCTION: u8 = 6;
pub const TAG_RECORD: u8 = 7;
pub const TAG_REF: u8 = 8;

const MAX_DEPTH: usize = 128;

const BODY_NATIVE: u8 = 0;
const BODY_SCRIPT: u8 = 1;

pub fn to_bytes(value: &Value) -> Result<Vec<u8>, ScriptError> {
    let mut writer = Writer::new();
    writer.write_value(value)?;
    Ok(writer.into_bytes())
}

/// Decodes exactly one value; trailing bytes are rejected.
pub fn from_bytes(bytes: &[u8]) -> Result<Value, ScriptError> {
    let mut reader = Reader::new(bytes);
    let value = reader.read_value()?;
    if !reader.is_at_end() {
        return Err(deserialization_error(format!(
            "{} unexpected trailing bytes.",
            reader.remaining()
        )));
    }
    Ok(value)
}

#[derive(Debug, Default)]
pub struct Writer {
    bytes: Vec<u8>,
    depth: usize,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn write_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_len(&mut self, len: usize) -> Result<(), ScriptError> {
        let len = u32::try_from(len).map_err(|_| {
            ScriptError::new(ErrorKind::OutOfBounds, "Length does not fit the save format.")
        })?;
        self.write_u32(len);
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ScriptError> {
        self.write_len(bytes.len())?;
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }

    pub fn write_text(&mut self, text: &str) -> Result<(), ScriptError> {
        self.write_bytes(text.as_bytes())
    }

    pub fn write_value(&mut self, value: &Value) -> Result<(), ScriptError> {
        self.enter()?;
        self.write_u8(value.tag());
        match value {
            Value::None => {}
            Value::Number(number, hint) => {
                self.write_f64(*number);
                self.write_u8(match hint {
                    NumberHint::Generic => 0,
                    NumberHint::Boolean => 1,
                });
            }
            Value::Text(text) => self.write_text(text)?,
            Value::Array(array) => {
                self.write_len(array.len())?;
                for element in array.elements() {
                    self.write_value(element)?;
                }
            }
            Value::Dictionary(dictionary) => {
                self.write_len(dictionary.len())?;
                for (key, element) in dictionary.iter() {
                    self.write_value(key)?;
                    self.write_value(element)?;
                }
            }
            Value::Block(bytes) => self.write_bytes(bytes)?,
            Value::Function(function) => self.write_function(function)?,
            Value::Record(record) => {
                let record = record.record()?;
                let record = record.borrow();
                self.write_record(&record)?;
            }
            Value::Ref(reference) => {
                let variable = reference.variable()?;
                let variable = variable.borrow();
                self.write_variable(&variable)?;
            }
        }
        self.depth -= 1;
        Ok(())
    }

    /// Writes `[name][mode][value]`.
    pub fn write_variable(&mut self, variable: &Variable) -> Result<(), ScriptError> {
        self.write_text(variable.name())?;
        self.write_u32(variable.mode().bits());
        self.write_value(variable.value())
    }

    /// Writes the serialized variables, then the owned sub-records as
    /// `[name][mode][record]`. Members flagged `NO_SERIALIZE` are left out
    /// entirely, sub-records included.
    pub fn write_record(&mut self, record: &Record) -> Result<(), ScriptError> {
        self.enter()?;
        let mut variables = Vec::new();
        for (_, variable) in record.variables() {
            let held = variable.borrow();
            let owns_record = matches!(held.value(), Value::Record(value) if value.is_owner());
            if held.is_serialized() && !owns_record {
                variables.push(Rc::clone(variable));
            }
        }
        self.write_len(variables.len())?;
        for variable in &variables {
            self.write_variable(&variable.borrow())?;
        }

        let subrecords = record
            .subrecords()
            .into_iter()
            .filter(|(_, mode, _)| !mode.contains(VariableMode::NO_SERIALIZE))
            .collect::<Vec<_>>();
        self.write_len(subrecords.len())?;
        for (name, mode, subrecord) in &subrecords {
            self.write_text(name)?;
            self.write_u32(mode.bits());
            self.write_record(&subrecord.borrow())?;
        }
        self.depth -= 1;
        Ok(())
    }

    fn write_function(&mut self, function: &Function) -> Result<(), ScriptError> {
        match function.name() {
            Some(name) => {
                self.write_u8(1);
                self.write_text(name)?;
            }
            None => self.write_u8(0),
        }
        self.write_len(function.params().len())?;
        for param in function.params() {
            self.write_text(param)?;
        }
        self.write_len(function.defaults().len())?;
        for (name, value) in function.defaults() {
            self.write_text(name)?;
            self.write_value(value)?;
        }
        match function.body() {
            FunctionBody::Native(name) => {
                self.write_u8(BODY_NATIVE);
                self.write_text(name)?;
            }
            FunctionBody::Script { program, entry } => {
                self.write_u8(BODY_SCRIPT);
                match entry {
                    Some(entry) => {
                        self.write_u8(1);
                        self.write_len(*entry)?;
                    }
                    None => self.write_u8(0),
                }
                let json = serde_json::to_string(program.as_ref()).map_err(|error| {
                    ScriptError::new(
                        ErrorKind::Type,
                        format!("Function body cannot be saved: {}", error),
                    )
                })?;
                self.write_text(&json)?;
            }
        }
        Ok(())
    }

    fn enter(&mut self) -> Result<(), ScriptError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ScriptError::new(
                ErrorKind::Guard,
                "Value is nested too deeply to be saved.",
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            position: 0,
            depth: 0,
        }
    }

    pub fn is_at_end(&self) -> bool {
        self.position >= self.bytes.len()
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.position)
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], ScriptError> {
        if self.remaining() < count {
            return Err(deserialization_error(format!(
                "Unexpected end of data at offset {}.",
                self.position
            )));
        }
        let slice = &self.bytes[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, ScriptError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, ScriptError> {
        let mut buffer = [0u8; 4];
        buffer.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buffer))
    }

    pub fn read_f64(&mut self) -> Result<f64, ScriptError> {
        let mut buffer = [0u8; 8];
        buffer.copy_from_slice(self.take(8)?);
        Ok(f64::from_le_bytes(buffer))
    }

    pub fn read_len(&mut self) -> Result<usize, ScriptError> {
        Ok(self.read_u32()? as usize)
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, ScriptError> {
        let len = self.read_len()?;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_text(&mut self) -> Result<String, ScriptError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|_| deserialization_error("Text is not valid UTF-8."))
    }

    pub fn read_value(&mut self) -> Result<Value, ScriptError> {
        self.enter()?;
        let value = match self.read_u8()? {
            TAG_NONE => Value::None,
            TAG_NUMBER => {
                let number = self.read_f64()?;
                let hint = match self.read_u8()? {
                    0 => NumberHint::Generic,
                    1 => NumberHint::Boolean,
                    other => {
                        return Err(deserialization_error(format!(
                            "Unknown number hint {}.",
                            other
                        )))
                    }
                };
                Value::Number(number, hint)
            }
            TAG_TEXT => Value::Text(self.read_text()?),
            TAG_ARRAY => {
                let count = self.read_len()?;
                let mut array = Array::new();
                for _ in 0..count {
                    array.push(self.read_value()?);
                }
                Value::Array(array)
            }
            TAG_DICTIONARY => {
                let count = self.read_len()?;
                let mut dictionary = Dictionary::new();
                for _ in 0..count {
                    let key = self.read_value()?;
                    let element = self.read_value()?;
                    dictionary.insert(key, element);
                }
                Value::Dictionary(dictionary)
            }
            TAG_BLOCK => Value::Block(self.read_bytes()?),
            TAG_FUNCTION => Value::Function(Rc::new(self.read_function()?)),
            TAG_RECORD => Value::Record(RecordValue::owned(self.read_record()?)),
            TAG_REF => Value::Ref(RefValue::owned(self.read_variable()?)),
            other => {
                return Err(deserialization_error(format!(
                    "Unknown value tag {}.",
                    other
                )))
            }
        };
        self.depth -= 1;
        Ok(value)
    }

    /// Restores mode flags before the value so type restrictions still apply.
    pub fn read_variable(&mut self) -> Result<Variable, ScriptError> {
        let name = self.read_text()?;
        let mode = self.read_mode()?;
        let value = self.read_value()?;
        Variable::new(name, Some(value), mode)
    }

    fn read_mode(&mut self) -> Result<VariableMode, ScriptError> {
        let bits = self.read_u32()?;
        VariableMode::from_bits(bits)
            .ok_or_else(|| deserialization_error(format!("Unknown mode flags {:#x}.", bits)))
    }

    pub fn read_record(&mut self) -> Result<Record, ScriptError> {
        self.enter()?;
        let mut record = Record::new();
        let count = self.read_len()?;
        for _ in 0..count {
            let variable = self.read_variable()?;
            record.add(variable).map_err(into_deserialization)?;
        }
        let count = self.read_len()?;
        for _ in 0..count {
            let name = self.read_text()?;
            let mode = self.read_mode()?;
            let subrecord = self.read_record()?;
            record
                .add_subrecord(&name, subrecord)
                .map_err(into_deserialization)?;
            record
                .member(&name)?
                .borrow_mut()
                .set_mode(mode)
                .map_err(into_deserialization)?;
        }
        self.depth -= 1;
        Ok(record)
    }

    fn read_function(&mut self) -> Result<Function, ScriptError> {
        let name = match self.read_u8()? {
            0 => None,
            _ => Some(self.read_text()?),
        };
        let count = self.read_len()?;
        let mut params = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            params.push(self.read_text()?);
        }
        let count = self.read_len()?;
        let mut defaults = IndexMap::new();
        for _ in 0..count {
            let param = self.read_text()?;
            let value = self.read_value()?;
            defaults.insert(param, value);
        }
        match self.read_u8()? {
            BODY_NATIVE => {
                let native = self.read_text()?;
                let mut function = Function::native(native, params, defaults);
                if let Some(name) = name {
                    function = function.renamed(name);
                }
                Ok(function)
            }
            BODY_SCRIPT => {
                let entry = match self.read_u8()? {
                    0 => None,
                    _ => Some(self.read_len()?),
                };
                let json = self.read_text()?;
                let program: Program = serde_json::from_str(&json).map_err(|error| {
                    deserialization_error(format!("Function body is invalid: {}", error))
                })?;
                Ok(Function::script(name, params, defaults, Rc::new(program), entry))
            }
            other => Err(deserialization_error(format!(
                "Unknown function body kind {}.",
                other
            ))),
        }
    }

    fn enter(&mut self) -> Result<(), ScriptError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(deserialization_error("Data is nested too deeply."));
        }
        Ok(())
    }
}

fn deserialization_error(message: impl Into<String>) -> ScriptError {
    ScriptError::new(ErrorKind::Deserialization, message)
}

fn into_deserialization(error: ScriptError) -> ScriptError {
    deserialization_error(error.message)
}

#[cfg(test)]
mod serial_tests {
    use super::*;
    use crate::types::{SourceSpan, Statement, StatementKind};

    fn round_trip(value: &Value) -> Value {
        from_bytes(&to_bytes(value).expect("serialize")).expect("deserialize")
    }

    #[test]
    fn plain_values_round_trip() {
        let mut dictionary = Dictionary::new();
        dictionary.insert(Value::text("k"), Value::array(vec![Value::None]));
        dictionary.insert(Value::number(2.0), Value::Block(vec![1, 2, 3]));
        let samples = [
            Value::None,
            Value::number(-12.25),
            Value::boolean(true),
            Value::text("unicodé"),
            Value::array(vec![Value::number(1.0), Value::text("x")]),
            Value::Dictionary(dictionary),
            Value::Block(vec![0, 255]),
        ];
        for value in &samples {
            let back = round_trip(value);
            assert_eq!(&back, value, "{}", value.as_text());
            assert_eq!(back.as_text(), value.as_text());
        }
    }

    #[test]
    fn functions_round_trip_structurally() {
        let program = Rc::new(Program {
            statements: vec![Statement {
                kind: StatementKind::Pass,
                next: None,
                location: SourceSpan::synthetic(),
            }],
            entry: Some(0),
        });
        let mut defaults = IndexMap::new();
        defaults.insert("b".to_string(), Value::number(1.0));
        let function = Function::script(
            Some("f".to_string()),
            vec!["a".to_string(), "b".to_string()],
            defaults,
            program,
            Some(0),
        );
        let value = Value::Function(Rc::new(function));
        let back = round_trip(&value);
        let Value::Function(restored) = &back else {
            panic!("expected a function");
        };
        assert_eq!(restored.name(), Some("f"));
        assert_eq!(restored.params(), ["a".to_string(), "b".to_string()]);
        assert_eq!(back.as_text(), value.as_text());

        let native = Value::Function(Rc::new(Function::native("len", vec!["v".into()], IndexMap::new())));
        assert_eq!(round_trip(&native), native);
    }

    #[test]
    fn records_skip_unserialized_variables_and_keep_modes() {
        let mut record = Record::new();
        record.add_number("n", 3.0).expect("n");
        record
            .add_value("hidden", Value::text("x"), VariableMode::NO_SERIALIZE)
            .expect("hidden");
        record
            .add_value(
                "k",
                Value::text("const"),
                VariableMode::READ_ONLY | VariableMode::ALLOW_TEXT,
            )
            .expect("k");
        let child = record.add_record("child").expect("child");
        child.borrow_mut().add_text("t", "deep").expect("t");

        let back = round_trip(&Value::Record(RecordValue::owned(record)));
        let restored = back.as_record().expect("record");
        let restored = restored.borrow();
        assert_eq!(restored.names(), vec!["n", "k", "child"]);
        assert_eq!(restored.value("child.t").expect("child.t"), Value::text("deep"));
        let k = restored.member("k").expect("k");
        assert!(k.borrow().is_read_only());
        assert_eq!(
            k.borrow_mut().set(Value::text("changed")).expect_err("read only").kind,
            ErrorKind::ReadOnly
        );
        assert!(!restored.has_member("hidden"));
    }

    #[test]
    fn subrecords_honour_their_member_modes() {
        let mut record = Record::new();
        record
            .add_subrecord("scratch", Record::new())
            .expect("scratch");
        record
            .member("scratch")
            .expect("scratch member")
            .borrow_mut()
            .set_mode(VariableMode::ALLOW_RECORD | VariableMode::NO_SERIALIZE)
            .expect("no serialize");
        let locked = record.add_record("locked").expect("locked");
        locked.borrow_mut().add_number("n", 1.0).expect("n");
        record
            .member("locked")
            .expect("locked member")
            .borrow_mut()
            .set_read_only(true);

        let back = round_trip(&Value::Record(RecordValue::owned(record)));
        let restored = back.as_record().expect("record");
        let restored = restored.borrow();
        assert_eq!(restored.names(), vec!["locked"]);
        let member = restored.member("locked").expect("locked");
        assert!(member.borrow().is_read_only());
        assert_eq!(
            member.borrow_mut().set(Value::None).expect_err("read only").kind,
            ErrorKind::ReadOnly
        );
        assert_eq!(restored.value("locked.n").expect("locked.n"), Value::number(1.0));
    }

    #[test]
    fn refs_round_trip_as_owned_variables() {
        let variable = Variable::new_ref("v", Some(Value::number(7.0)), VariableMode::empty())
            .expect("variable");
        let reference = Value::Ref(RefValue::observing(&variable));
        let back = round_trip(&reference);
        let Value::Ref(restored) = &back else {
            panic!("expected a ref");
        };
        assert!(restored.is_owner());
        assert_eq!(restored.value().expect("value"), Value::number(7.0));

        drop(variable);
        assert_eq!(to_bytes(&reference).expect_err("dead").kind, ErrorKind::NotFound);
    }

    #[test]
    fn malformed_data_is_rejected() {
        assert_eq!(from_bytes(&[42]).expect_err("tag").kind, ErrorKind::Deserialization);
        assert_eq!(from_bytes(&[TAG_NUMBER, 0, 0]).expect_err("short").kind, ErrorKind::Deserialization);
        assert_eq!(from_bytes(&[TAG_NONE, 0]).expect_err("trailing").kind, ErrorKind::Deserialization);
        assert_eq!(from_bytes(&[]).expect_err("empty").kind, ErrorKind::Deserialization);
    }

    #[test]
    fn load_still_validates_modes() {
        let mut writer = Writer::new();
        writer.write_u8(TAG_REF);
        writer.write_text("n").expect("name");
        writer.write_u32(VariableMode::ALLOW_NUMBER.bits());
        writer.write_value(&Value::text("not a number")).expect("value");
        let error = from_bytes(&writer.into_bytes()).expect_err("mode");
        assert_eq!(error.kind, ErrorKind::ModeViolation);
    }
}
