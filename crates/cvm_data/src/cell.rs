//! Immutable values and the shared `Cell` handle.
//!
//! A `Cell` computes its canonical encoding and hash once, when it is built
//! (or reuses the bytes it was decoded from). Nothing about a cell changes
//! after construction, so clones are just reference count bumps and equality
//! is hash equality.

use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;

use crate::blob::Blob;
use crate::error::{invalid, CoreError, Result};
use crate::format::{self, MAX_BLOB_LENGTH, MAX_EMBEDDED_LENGTH, MAX_NAME_LENGTH, MAX_STRING_LENGTH};
use crate::hash::Hash;
use crate::map::{Map, MapNode};
use crate::op::{Closure, CoreFn, Op};
use crate::record::{Record, RecordNode};
use crate::refs::Ref;
use crate::store::Store;
use crate::tag;
use crate::vector::{Vector, VectorNode};

static NIL: Lazy<Cell> = Lazy::new(|| Cell::from_value(Value::Nil));
static TRUE: Lazy<Cell> = Lazy::new(|| Cell::from_value(Value::Bool(true)));
static FALSE: Lazy<Cell> = Lazy::new(|| Cell::from_value(Value::Bool(false)));

/// The closed set of value kinds.
#[derive(Clone, Debug)]
pub enum Value {
    Nil,
    Bool(bool),
    Long(i64),
    String(Arc<str>),
    Blob(Blob),
    Symbol(Symbol),
    Keyword(Keyword),
    Vector(VectorNode),
    Map(MapNode),
    Record(RecordNode),
    Op(Op),
    Core(CoreFn),
    Fn(Closure),
}

impl Value {
    pub fn tag(&self) -> u8 {
        match self {
            Value::Nil => tag::NIL,
            Value::Bool(true) => tag::TRUE,
            Value::Bool(false) => tag::FALSE,
            Value::Long(_) => tag::LONG,
            Value::String(_) => tag::STRING,
            Value::Blob(_) => tag::BLOB,
            Value::Symbol(_) => tag::SYMBOL,
            Value::Keyword(_) => tag::KEYWORD,
            Value::Vector(_) => tag::VECTOR,
            Value::Map(_) => tag::MAP,
            Value::Record(r) => r.format.tag,
            Value::Op(_) => tag::OP,
            Value::Core(_) => tag::CORE_FN,
            Value::Fn(_) => tag::FN,
        }
    }

    /// Child references, in encoding order.
    pub fn refs(&self) -> Vec<&Ref> {
        match self {
            Value::Vector(VectorNode::Leaf { prefix, items, .. }) => items.iter().chain(prefix.iter()).collect(),
            Value::Vector(VectorNode::Tree { children, .. }) => children.iter().collect(),
            Value::Map(m) => m.entries.iter().flat_map(|(k, v)| [k, v]).collect(),
            Value::Record(r) => r.fields.iter().collect(),
            Value::Op(op) => op.refs(),
            Value::Fn(c) => vec![&c.params, &c.body, &c.env],
            _ => Vec::new(),
        }
    }

    /// Rebuilds this value with every child reference passed through `f`.
    pub(crate) fn map_refs(&self, f: &mut dyn FnMut(&Ref) -> Result<Ref>) -> Result<Value> {
        Ok(match self {
            Value::Vector(VectorNode::Leaf { count, prefix, items }) => Value::Vector(VectorNode::Leaf {
                count: *count,
                prefix: prefix.as_ref().map(&mut *f).transpose()?,
                items: items.iter().map(&mut *f).collect::<Result<_>>()?,
            }),
            Value::Vector(VectorNode::Tree { count, children }) => Value::Vector(VectorNode::Tree {
                count: *count,
                children: children.iter().map(&mut *f).collect::<Result<_>>()?,
            }),
            Value::Map(m) => Value::Map(MapNode {
                entries: m
                    .entries
                    .iter()
                    .map(|(k, v)| -> Result<(Ref, Ref)> { Ok((f(k)?, f(v)?)) })
                    .collect::<Result<_>>()?,
            }),
            Value::Record(r) => Value::Record(RecordNode {
                format: r.format,
                fields: r.fields.iter().map(&mut *f).collect::<Result<_>>()?,
            }),
            Value::Op(op) => Value::Op(op.map_refs(f)?),
            Value::Fn(c) => Value::Fn(Closure {
                params: f(&c.params)?,
                body: f(&c.body)?,
                env: f(&c.env)?,
                name: c.name.clone(),
            }),
            other => other.clone(),
        })
    }

    /// Structural checks on whichever children are present in memory.
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            Value::Vector(node) => crate::vector::validate_node(node),
            Value::Op(op) => op.validate(),
            Value::Fn(c) => c.validate(),
            _ => Ok(()),
        }
    }
}

struct CellInner {
    value: Value,
    encoding: Blob,
    hash: Hash,
    loaded: bool,
}

#[derive(Clone)]
pub struct Cell(Arc<CellInner>);

impl Cell {
    pub(crate) fn from_value(value: Value) -> Cell {
        let mut buf = Vec::new();
        format::write_value(&value, &mut buf);
        Cell::with_encoding(value, Blob::from_vec(buf))
    }

    pub(crate) fn with_encoding(value: Value, encoding: Blob) -> Cell {
        let hash = Hash::digest(&encoding);
        Cell::from_parts(value, encoding, hash)
    }

    fn from_parts(value: Value, encoding: Blob, hash: Hash) -> Cell {
        let loaded = value.refs().iter().all(|r| r.is_loaded());
        Cell(Arc::new(CellInner { value, encoding, hash, loaded }))
    }

    pub fn nil() -> Cell {
        NIL.clone()
    }

    pub fn bool(b: bool) -> Cell {
        if b { TRUE.clone() } else { FALSE.clone() }
    }

    pub fn long(x: i64) -> Cell {
        Cell::from_value(Value::Long(x))
    }

    pub fn string(s: &str) -> Result<Cell> {
        if s.len() > MAX_STRING_LENGTH {
            return Err(CoreError::Validation(format!("string of {} bytes exceeds {MAX_STRING_LENGTH}", s.len())));
        }
        Ok(Cell::from_value(Value::String(s.into())))
    }

    /// String cell holding at most `MAX_STRING_LENGTH` bytes of `s`, cut at
    /// a char boundary.
    pub fn string_lossy(s: &str) -> Cell {
        let mut end = s.len().min(MAX_STRING_LENGTH);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        Cell::from_value(Value::String(s[..end].into()))
    }

    pub fn blob(bytes: &[u8]) -> Result<Cell> {
        if bytes.len() > MAX_BLOB_LENGTH {
            return Err(CoreError::Validation(format!("blob of {} bytes exceeds {MAX_BLOB_LENGTH}", bytes.len())));
        }
        Ok(Cell::from_value(Value::Blob(Blob::from(bytes))))
    }

    pub fn symbol(name: &str) -> Result<Cell> {
        Ok(Symbol::new(name)?.to_cell())
    }

    pub fn keyword(name: &str) -> Result<Cell> {
        Ok(Keyword::new(name)?.to_cell())
    }

    pub fn core(f: CoreFn) -> Cell {
        Cell::from_value(Value::Core(f))
    }

    pub fn value(&self) -> &Value {
        &self.0.value
    }

    pub fn tag(&self) -> u8 {
        self.0.value.tag()
    }

    /// Canonical encoding, cached at construction.
    pub fn encoding(&self) -> &Blob {
        &self.0.encoding
    }

    pub fn encoding_length(&self) -> usize {
        self.0.encoding.len()
    }

    pub fn hash(&self) -> Hash {
        self.0.hash
    }

    pub fn is_embedded(&self) -> bool {
        self.encoding_length() <= MAX_EMBEDDED_LENGTH
    }

    /// True when every transitive child is held in memory.
    pub fn is_loaded(&self) -> bool {
        self.0.loaded
    }

    pub fn refs(&self) -> Vec<&Ref> {
        self.0.value.refs()
    }

    /// Resolves every unloaded child against `store`. The encoding and hash
    /// are unchanged; a cell that is already loaded is returned as is.
    pub fn load(&self, store: &dyn Store) -> Result<Cell> {
        if self.is_loaded() {
            return Ok(self.clone());
        }
        let value = self.value().map_refs(&mut |r| r.load(store))?;
        value.validate()?;
        Ok(Cell::from_parts(value, self.encoding().clone(), self.hash()))
    }

    pub fn ptr_eq(&self, other: &Cell) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_nil(&self) -> bool {
        matches!(self.value(), Value::Nil)
    }

    /// Everything except `nil` and `false` counts as true.
    pub fn is_truthy(&self) -> bool {
        !matches!(self.value(), Value::Nil | Value::Bool(false))
    }

    pub fn as_long(&self) -> Option<i64> {
        match self.value() {
            Value::Long(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.value() {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self.value() {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self.value() {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_keyword(&self) -> Option<&Keyword> {
        match self.value() {
            Value::Keyword(k) => Some(k),
            _ => None,
        }
    }

    pub fn as_op(&self) -> Option<&Op> {
        match self.value() {
            Value::Op(op) => Some(op),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<Vector> {
        Vector::from_cell(self.clone()).ok()
    }

    pub fn as_map(&self) -> Option<Map> {
        Map::from_cell(self.clone()).ok()
    }

    pub fn as_record(&self) -> Option<Record> {
        Record::from_cell(self.clone()).ok()
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.hash() == other.hash()
    }
}

impl Eq for Cell {}

impl std::hash::Hash for Cell {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash().hash(state)
    }
}

impl From<i64> for Cell {
    fn from(x: i64) -> Self {
        Cell::long(x)
    }
}

impl From<bool> for Cell {
    fn from(b: bool) -> Self {
        Cell::bool(b)
    }
}

// ── Names ────────────────────────────────────────────────────────

fn check_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LENGTH {
        return Err(CoreError::Validation(format!(
            "{kind} name must be 1..={MAX_NAME_LENGTH} bytes, got {}",
            name.len()
        )));
    }
    Ok(())
}

/// Identifier bound in environments.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Symbol(Arc<str>);

impl Symbol {
    pub fn new(name: &str) -> Result<Symbol> {
        check_name("symbol", name)?;
        Ok(Symbol(name.into()))
    }

    /// For names known at compile time. Panics on an empty or over-long name.
    pub fn from_static(name: &'static str) -> Symbol {
        assert!(!name.is_empty() && name.len() <= MAX_NAME_LENGTH, "bad symbol {name:?}");
        Symbol(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn to_cell(&self) -> Cell {
        Cell::from_value(Value::Symbol(self.clone()))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Self-evaluating name, printed with a leading colon.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Keyword(Arc<str>);

impl Keyword {
    pub fn new(name: &str) -> Result<Keyword> {
        check_name("keyword", name)?;
        Ok(Keyword(name.into()))
    }

    /// For names known at compile time. Panics on an empty or over-long name.
    pub fn from_static(name: &'static str) -> Keyword {
        assert!(!name.is_empty() && name.len() <= MAX_NAME_LENGTH, "bad keyword {name:?}");
        Keyword(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn to_cell(&self) -> Cell {
        Cell::from_value(Value::Keyword(self.clone()))
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.0)
    }
}

pub(crate) fn expect_symbol(cell: &Cell) -> Result<Symbol> {
    cell.as_symbol().cloned().ok_or_else(|| invalid(format!("expected symbol, got {cell}")))
}

// ── Printing ─────────────────────────────────────────────────────

pub(crate) fn write_ref(f: &mut fmt::Formatter<'_>, r: &Ref) -> fmt::Result {
    match r.cell() {
        Ok(c) => fmt::Display::fmt(&c, f),
        Err(_) => write!(f, "#<{}>", &r.hash().to_hex()[..8]),
    }
}

pub(crate) fn write_seq<'a>(f: &mut fmt::Formatter<'_>, refs: impl IntoIterator<Item = &'a Ref>) -> fmt::Result {
    for (i, r) in refs.into_iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write_ref(f, r)?;
    }
    Ok(())
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value() {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Long(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Blob(b) => write!(f, "0x{}", b.to_hex()),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::Keyword(k) => write!(f, "{k}"),
            Value::Vector(_) => {
                f.write_str("[")?;
                match Vector::from_cell(self.clone()).and_then(|v| v.to_vec()) {
                    Ok(items) => {
                        for (i, c) in items.iter().enumerate() {
                            if i > 0 {
                                f.write_str(" ")?;
                            }
                            write!(f, "{c}")?;
                        }
                    }
                    Err(_) => write!(f, "#<{}>", &self.hash().to_hex()[..8])?,
                }
                f.write_str("]")
            }
            Value::Map(m) => {
                f.write_str("{")?;
                for (i, (k, v)) in m.entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_ref(f, k)?;
                    f.write_str(" ")?;
                    write_ref(f, v)?;
                }
                f.write_str("}")
            }
            Value::Record(r) => {
                write!(f, "#{} {{", r.format.name)?;
                for (i, (key, v)) in r.format.keys.iter().zip(&r.fields).enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, ":{key} ")?;
                    write_ref(f, v)?;
                }
                f.write_str("}")
            }
            Value::Op(op) => crate::op::write_op(f, op),
            Value::Core(c) => f.write_str(c.name()),
            Value::Fn(c) => {
                f.write_str("(fn ")?;
                write_ref(f, &c.params)?;
                f.write_str(" ")?;
                write_ref(f, &c.body)?;
                f.write_str(")")
            }
        }
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cell({self})")
    }
}
