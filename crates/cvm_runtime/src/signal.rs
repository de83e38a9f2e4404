//! Exceptional outcomes of evaluation.
//!
//! Signals are ordinary results of running untrusted code. They travel up
//! through enclosing ops as the `Err` side of evaluation and end up in the
//! context's outcome, never as a [`RuntimeError`](crate::error::RuntimeError).

use cvm_data::{Cell, Keyword, Value, MAX_EMBEDDED_LENGTH};
use once_cell::sync::Lazy;

/// Longest printed form `describe` will inline.
const DESCRIBE_LENGTH: usize = 64;

/// Error codes raised by the interpreter and core functions.
pub mod codes {
    use super::*;

    pub static ARITY: Lazy<Keyword> = Lazy::new(|| Keyword::from_static("ARITY"));
    pub static CAST: Lazy<Keyword> = Lazy::new(|| Keyword::from_static("CAST"));
    pub static BOUNDS: Lazy<Keyword> = Lazy::new(|| Keyword::from_static("BOUNDS"));
    pub static UNDECLARED: Lazy<Keyword> = Lazy::new(|| Keyword::from_static("UNDECLARED"));
    pub static ASSERT: Lazy<Keyword> = Lazy::new(|| Keyword::from_static("ASSERT"));
    pub static ARGUMENT: Lazy<Keyword> = Lazy::new(|| Keyword::from_static("ARGUMENT"));
    pub static DEPTH: Lazy<Keyword> = Lazy::new(|| Keyword::from_static("DEPTH"));
    pub static JUICE: Lazy<Keyword> = Lazy::new(|| Keyword::from_static("JUICE"));
}

/// A user-level error: code, message value and the functions it passed
/// through, innermost first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorValue {
    pub code: Keyword,
    pub message: Cell,
    pub trace: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signal {
    Error(ErrorValue),
    OutOfJuice,
    /// Stops the whole execution with a value.
    Halt(Cell),
    /// Leaves the innermost function call with a value.
    Return(Cell),
}

impl Signal {
    /// Error with a string message, truncated to the string size limit.
    pub fn error(code: &Keyword, message: impl AsRef<str>) -> Signal {
        Signal::with_value(code.clone(), Cell::string_lossy(message.as_ref()))
    }

    /// Error carrying an arbitrary message value.
    pub fn with_value(code: Keyword, message: Cell) -> Signal {
        Signal::Error(ErrorValue { code, message, trace: Vec::new() })
    }

    /// Error-class signals roll back environment changes; halt and return
    /// keep them.
    pub fn is_error(&self) -> bool {
        matches!(self, Signal::Error(_) | Signal::OutOfJuice)
    }

    /// The code reported in a result for this signal, if it is an error.
    pub fn code(&self) -> Option<Keyword> {
        match self {
            Signal::Error(e) => Some(e.code.clone()),
            Signal::OutOfJuice => Some(codes::JUICE.clone()),
            Signal::Halt(_) | Signal::Return(_) => None,
        }
    }
}

/// Renders a value for an error message at a cost bounded independently of
/// its size: small self-contained values print in full, anything else as
/// kind, size and hash prefix.
pub fn describe(cell: &Cell) -> String {
    if is_inline(cell) {
        let printed = cell.to_string();
        if printed.len() <= DESCRIBE_LENGTH {
            return printed;
        }
    }
    let size = match cell.value() {
        Value::Vector(_) => cell.as_vector().map(|v| format!(" of {} elements", v.count())),
        Value::Map(_) => cell.as_map().map(|m| format!(" of {} entries", m.count())),
        Value::String(s) => Some(format!(" of {} bytes", s.len())),
        Value::Blob(b) => Some(format!(" of {} bytes", b.len())),
        _ => None,
    };
    format!("#<{}{} {}>", kind(cell), size.unwrap_or_default(), &cell.hash().to_hex()[..8])
}

fn kind(cell: &Cell) -> &'static str {
    match cell.value() {
        Value::Nil => "nil",
        Value::Bool(_) => "boolean",
        Value::Long(_) => "long",
        Value::String(_) => "string",
        Value::Blob(_) => "blob",
        Value::Symbol(_) => "symbol",
        Value::Keyword(_) => "keyword",
        Value::Vector(_) => "vector",
        Value::Map(_) => "map",
        Value::Record(_) => "record",
        Value::Op(_) => "op",
        Value::Core(_) => "core function",
        Value::Fn(_) => "function",
    }
}

/// Embedded all the way down, so printing touches at most
/// `MAX_EMBEDDED_LENGTH` bytes of encoding.
fn is_inline(cell: &Cell) -> bool {
    cell.encoding_length() <= MAX_EMBEDDED_LENGTH
        && cell.refs().iter().all(|r| r.is_embedded() && r.cell().is_ok_and(|c| is_inline(&c)))
}
