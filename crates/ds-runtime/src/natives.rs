use std::rc::Rc;

use ds_core::{
    from_bytes, to_bytes, ErrorKind, Function, RecordValue, ScriptError, Value,
};
use indexmap::IndexMap;

use crate::context::Context;

/// Host implementation of a native function. Receives the calling context
/// and the bound arguments in parameter order.
pub type NativeCallback = Rc<dyn Fn(&mut Context, &[Value]) -> Result<Value, ScriptError>>;

struct NativeEntry {
    function: Rc<Function>,
    callback: NativeCallback,
}

/// Native functions visible to scripts by name. Always contains the
/// built-ins; hosts add their own with [`NativeRegistry::register`].
pub struct NativeRegistry {
    entries: IndexMap<String, NativeEntry>,
}

impl std::fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}

impl Default for NativeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            entries: IndexMap::new(),
        };
        registry.install_builtins();
        registry
    }

    pub fn register(
        &mut self,
        name: &str,
        params: &[&str],
        callback: impl Fn(&mut Context, &[Value]) -> Result<Value, ScriptError> + 'static,
    ) -> Result<(), ScriptError> {
        self.register_with_defaults(name, params, IndexMap::new(), callback)
    }

    /// Registers `name`. Fails if the name is already taken, which includes
    /// every built-in.
    pub fn register_with_defaults(
        &mut self,
        name: &str,
        params: &[&str],
        defaults: IndexMap<String, Value>,
        callback: impl Fn(&mut Context, &[Value]) -> Result<Value, ScriptError> + 'static,
    ) -> Result<(), ScriptError> {
        if name.is_empty() || name.contains('.') {
            return Err(ScriptError::new(
                ErrorKind::Name,
                format!("\"{}\" is not a valid native function name.", name),
            ));
        }
        if self.entries.contains_key(name) {
            return Err(ScriptError::new(
                ErrorKind::Name,
                format!("Native function \"{}\" is already registered.", name),
            ));
        }
        let params = params.iter().map(|param| param.to_string()).collect();
        self.entries.insert(
            name.to_string(),
            NativeEntry {
                function: Rc::new(Function::native(name, params, defaults)),
                callback: Rc::new(callback),
            },
        );
        Ok(())
    }

    pub fn function(&self, name: &str) -> Option<Rc<Function>> {
        self.entries
            .get(name)
            .map(|entry| Rc::clone(&entry.function))
    }

    pub fn callback(&self, name: &str) -> Option<NativeCallback> {
        self.entries
            .get(name)
            .map(|entry| Rc::clone(&entry.callback))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn builtin(
        &mut self,
        name: &str,
        params: &[&str],
        callback: fn(&mut Context, &[Value]) -> Result<Value, ScriptError>,
    ) {
        let params = params.iter().map(|param| param.to_string()).collect();
        self.entries.insert(
            name.to_string(),
            NativeEntry {
                function: Rc::new(Function::native(name, params, IndexMap::new())),
                callback: Rc::new(callback),
            },
        );
    }

    fn install_builtins(&mut self) {
        self.builtin("len", &["value"], |_, args| {
            Ok(Value::number(argument(args, 0)?.size()? as f64))
        });
        self.builtin("Text", &["value"], |_, args| {
            Ok(Value::text(argument(args, 0)?.as_text()))
        });
        self.builtin("Number", &["value"], |_, args| to_number(argument(args, 0)?));
        self.builtin("typeof", &["value"], |_, args| {
            let value = argument(args, 0)?.resolved()?;
            Ok(Value::text(value.type_name()))
        });
        self.builtin("dictkeys", &["dict"], |_, args| {
            match argument(args, 0)?.resolved()?.as_ref() {
                Value::Dictionary(dictionary) => Ok(Value::Array(dictionary.keys())),
                other => Err(expected("dictkeys", "a Dictionary", other)),
            }
        });
        self.builtin("dictvalues", &["dict"], |_, args| {
            match argument(args, 0)?.resolved()?.as_ref() {
                Value::Dictionary(dictionary) => Ok(Value::Array(dictionary.values())),
                other => Err(expected("dictvalues", "a Dictionary", other)),
            }
        });
        self.builtin("serialize", &["value"], |_, args| {
            Ok(Value::Block(to_bytes(argument(args, 0)?)?))
        });
        self.builtin("deserialize", &["block"], |_, args| {
            match argument(args, 0)?.resolved()?.as_ref() {
                Value::Block(bytes) => from_bytes(bytes),
                other => Err(expected("deserialize", "a Block", other)),
            }
        });
        self.builtin("locals", &[], |context, _| {
            Ok(Value::Record(RecordValue::observing(context.locals())))
        });
        self.builtin("floor", &["value"], |_, args| {
            Ok(Value::number(argument(args, 0)?.as_number()?.floor()))
        });
    }
}

fn argument(args: &[Value], position: usize) -> Result<&Value, ScriptError> {
    args.get(position).ok_or_else(|| {
        ScriptError::new(
            ErrorKind::ArgumentCount,
            format!("Missing argument #{}.", position + 1),
        )
    })
}

fn expected(function: &str, wanted: &str, got: &Value) -> ScriptError {
    ScriptError::new(
        ErrorKind::Type,
        format!("{}() expects {}, got {}.", function, wanted, got.type_name()),
    )
}

fn to_number(value: &Value) -> Result<Value, ScriptError> {
    match value.resolved()?.as_ref() {
        Value::Number(number, _) => Ok(Value::number(*number)),
        Value::Text(text) => {
            let trimmed = text.trim();
            let parsed = match trimmed
                .strip_prefix("0x")
                .or_else(|| trimmed.strip_prefix("0X"))
            {
                Some(hex) => i64::from_str_radix(hex, 16).ok().map(|number| number as f64),
                None => trimmed.parse::<f64>().ok(),
            };
            parsed.map(Value::number).ok_or_else(|| {
                ScriptError::new(
                    ErrorKind::Type,
                    format!("Cannot convert \"{}\" to a Number.", text),
                )
            })
        }
        other => Err(expected("Number", "Text or a Number", other)),
    }
}
