pub mod array;
pub mod audience;
pub mod dictionary;
pub mod error;
pub mod function;
pub mod json;
pub mod record;
pub mod serial;
pub mod types;
pub mod value;
pub mod variable;

pub use array::Array;
pub use audience::{Audience, RecordObserver, VariableObserver};
pub use dictionary::{Dictionary, DictionaryKey};
pub use error::{ErrorKind, ScriptError};
pub use function::{Function, FunctionBody};
pub use record::{Record, RecordRef, SEPARATOR};
pub use serial::{from_bytes, to_bytes, Reader, Writer};
pub use types::*;
pub use value::{
    format_number, quote_text, NumberHint, RecordValue, RefValue, Value, MAX_REFERENCE_DEPTH,
};
pub use variable::{Variable, VariableMode, VariableRef};
