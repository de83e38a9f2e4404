//! Canonical binary encoding.
//!
//! Every encoding starts with a tag byte. Children whose own encoding is at
//! most [`MAX_EMBEDDED_LENGTH`] bytes are written inline; larger children are
//! written as [`tag::REF`] followed by their 32-byte hash. The decoder accepts
//! exactly the bytes the encoder produces and nothing else.

use std::sync::Arc;

use crate::blob::Blob;
use crate::cell::{Cell, Keyword, Symbol, Value};
use crate::error::{FormatError, Result};
use crate::hash::{Hash, HASH_LENGTH};
use crate::map::MapNode;
use crate::op::{Closure, CoreFn, Op};
use crate::record::{RecordFormat, RecordNode};
use crate::refs::Ref;
use crate::tag;
use crate::vector::{self, VectorNode, CHUNK_SIZE};
use crate::vlc::{read_vlc_count, read_vlc_long, write_vlc_long};

/// Largest encoding that is inlined into its parent.
pub const MAX_EMBEDDED_LENGTH: usize = 140;
/// Largest encoding of any single cell.
pub const LIMIT_ENCODING_LENGTH: usize = 0x1FFF;
pub const MAX_BLOB_LENGTH: usize = 4096;
pub const MAX_STRING_LENGTH: usize = 4096;
pub const MAX_NAME_LENGTH: usize = 64;

pub fn encode(cell: &Cell) -> Blob {
    cell.encoding().clone()
}

/// Decodes exactly one cell spanning all of `bytes`. The result and any
/// inline children keep views into `bytes` as their encodings.
pub fn decode(bytes: &Blob) -> Result<Cell> {
    if bytes.len() > LIMIT_ENCODING_LENGTH {
        return Err(FormatError::TooLong { len: bytes.len(), limit: LIMIT_ENCODING_LENGTH }.into());
    }
    let mut d = Decoder { blob: bytes, pos: 0 };
    if bytes.first() == Some(&tag::REF) {
        return Err(FormatError::Invalid("reference outside a parent".into()).into());
    }
    let cell = d.read_cell()?;
    if d.pos != bytes.len() {
        return Err(FormatError::TrailingBytes(bytes.len() - d.pos).into());
    }
    Ok(cell)
}

pub fn decode_bytes(bytes: &[u8]) -> Result<Cell> {
    decode(&Blob::from(bytes))
}

// ── Message framing ──────────────────────────────────────────────

/// Length prefix followed by the encoding.
pub fn write_message(cell: &Cell) -> Blob {
    let enc = cell.encoding();
    let mut out = Vec::with_capacity(enc.len() + 2);
    write_vlc_long(&mut out, enc.len() as i64);
    out.extend_from_slice(enc);
    Blob::from_vec(out)
}

/// Reads the length prefix at the start of `bytes`. Returns the payload
/// length and the number of prefix bytes.
pub fn peek_message_length(bytes: &[u8]) -> std::result::Result<(usize, usize), FormatError> {
    let mut pos = 0;
    let len = read_vlc_long(bytes, &mut pos)?;
    if len <= 0 {
        return Err(FormatError::BadMessageLength(len));
    }
    let len = len as usize;
    if len > LIMIT_ENCODING_LENGTH {
        return Err(FormatError::TooLong { len, limit: LIMIT_ENCODING_LENGTH });
    }
    Ok((len, pos))
}

/// Decodes one framed message from the front of `bytes`, returning the cell
/// and the total number of bytes consumed.
pub fn read_message(bytes: &Blob) -> Result<(Cell, usize)> {
    let (len, prefix) = peek_message_length(bytes)?;
    let end = prefix + len;
    if bytes.len() < end {
        return Err(FormatError::Truncated.into());
    }
    let cell = decode(&bytes.slice(prefix..end))?;
    Ok((cell, end))
}

// ── Encoding ─────────────────────────────────────────────────────

pub(crate) fn write_ref(r: &Ref, out: &mut Vec<u8>) {
    match r.cell() {
        Ok(c) if r.is_embedded() => out.extend_from_slice(c.encoding()),
        _ => {
            out.push(tag::REF);
            out.extend_from_slice(r.hash().as_bytes());
        }
    }
}

fn write_name(t: u8, name: &str, out: &mut Vec<u8>) {
    out.push(t);
    out.push(name.len() as u8);
    out.extend_from_slice(name.as_bytes());
}

fn write_bytes(t: u8, bytes: &[u8], out: &mut Vec<u8>) {
    out.push(t);
    write_vlc_long(out, bytes.len() as i64);
    out.extend_from_slice(bytes);
}

pub(crate) fn write_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Nil | Value::Bool(_) => out.push(value.tag()),
        Value::Long(x) => {
            out.push(tag::LONG);
            write_vlc_long(out, *x);
        }
        Value::String(s) => write_bytes(tag::STRING, s.as_bytes(), out),
        Value::Blob(b) => write_bytes(tag::BLOB, b, out),
        Value::Symbol(s) => write_name(tag::SYMBOL, s.name(), out),
        Value::Keyword(k) => write_name(tag::KEYWORD, k.name(), out),
        Value::Vector(node) => {
            out.push(tag::VECTOR);
            write_vlc_long(out, node.count() as i64);
            match node {
                VectorNode::Leaf { prefix, items, .. } => {
                    items.iter().for_each(|r| write_ref(r, out));
                    if let Some(p) = prefix {
                        write_ref(p, out);
                    }
                }
                VectorNode::Tree { children, .. } => children.iter().for_each(|r| write_ref(r, out)),
            }
        }
        Value::Map(m) => {
            out.push(tag::MAP);
            write_vlc_long(out, m.entries.len() as i64);
            for (k, v) in &m.entries {
                write_ref(k, out);
                write_ref(v, out);
            }
        }
        Value::Record(r) => {
            out.push(r.format.tag);
            write_vlc_long(out, r.fields.len() as i64);
            r.fields.iter().for_each(|f| write_ref(f, out));
        }
        Value::Op(op) => {
            out.push(tag::OP);
            out.push(op.op_type());
            match op {
                Op::Constant(r) | Op::Do(r) | Op::Cond(r) | Op::Invoke(r) => write_ref(r, out),
                Op::Def { symbol, value } => {
                    write_name(tag::SYMBOL, symbol.name(), out);
                    write_ref(value, out);
                }
                Op::Let { symbols, ops } => {
                    write_ref(symbols, out);
                    write_ref(ops, out);
                }
                Op::Lambda { params, body } => {
                    write_ref(params, out);
                    write_ref(body, out);
                }
                Op::Lookup(symbol) => write_name(tag::SYMBOL, symbol.name(), out),
            }
        }
        Value::Core(f) => {
            out.push(tag::CORE_FN);
            out.push(f.id());
        }
        Value::Fn(c) => {
            out.push(tag::FN);
            write_ref(&c.params, out);
            write_ref(&c.body, out);
            write_ref(&c.env, out);
            match &c.name {
                Some(s) => write_name(tag::SYMBOL, s.name(), out),
                None => out.push(tag::NIL),
            }
        }
    }
}

// ── Decoding ─────────────────────────────────────────────────────

struct Decoder<'a> {
    blob: &'a Blob,
    pos: usize,
}

impl Decoder<'_> {
    fn byte(&mut self) -> Result<u8> {
        let b = *self.blob.get(self.pos).ok_or(FormatError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<Blob> {
        let end = self.pos.checked_add(n).filter(|e| *e <= self.blob.len()).ok_or(FormatError::Truncated)?;
        let out = self.blob.slice(self.pos..end);
        self.pos = end;
        Ok(out)
    }

    fn long(&mut self) -> Result<i64> {
        Ok(read_vlc_long(self.blob, &mut self.pos)?)
    }

    fn count(&mut self, max: u64) -> Result<u64> {
        Ok(read_vlc_count(self.blob, &mut self.pos, max)?)
    }

    fn text(&mut self, n: usize) -> Result<Arc<str>> {
        let bytes = self.take(n)?;
        let s = std::str::from_utf8(&bytes).map_err(|_| FormatError::InvalidUtf8)?;
        Ok(s.into())
    }

    fn name(&mut self) -> Result<Arc<str>> {
        let n = self.byte()? as usize;
        if n == 0 || n > MAX_NAME_LENGTH {
            return Err(FormatError::Invalid(format!("name length {n}")).into());
        }
        self.text(n)
    }

    fn symbol(&mut self) -> Result<Symbol> {
        match self.byte()? {
            tag::SYMBOL => Ok(Symbol::new(&self.name()?)?),
            t => Err(FormatError::Invalid(format!("expected symbol, found tag 0x{t:02x}")).into()),
        }
    }

    fn child(&mut self) -> Result<Ref> {
        if self.blob.get(self.pos) == Some(&tag::REF) {
            self.pos += 1;
            let bytes = self.take(HASH_LENGTH)?;
            let mut h = [0u8; HASH_LENGTH];
            h.copy_from_slice(&bytes);
            return Ok(Ref::soft(Hash::from_bytes(h)));
        }
        let cell = self.read_cell()?;
        if !cell.is_embedded() {
            return Err(FormatError::NonCanonical("oversized child written inline").into());
        }
        Ok(Ref::of(cell))
    }

    fn children(&mut self, n: usize) -> Result<Vec<Ref>> {
        (0..n).map(|_| self.child()).collect()
    }

    fn read_cell(&mut self) -> Result<Cell> {
        let start = self.pos;
        let t = self.byte()?;
        let value = match t {
            tag::NIL => Value::Nil,
            tag::TRUE => Value::Bool(true),
            tag::FALSE => Value::Bool(false),
            tag::LONG => Value::Long(self.long()?),
            tag::STRING => {
                let n = self.count(MAX_STRING_LENGTH as u64)? as usize;
                Value::String(self.text(n)?)
            }
            tag::BLOB => {
                let n = self.count(MAX_BLOB_LENGTH as u64)? as usize;
                Value::Blob(self.take(n)?)
            }
            tag::SYMBOL => Value::Symbol(Symbol::new(&self.name()?)?),
            tag::KEYWORD => Value::Keyword(Keyword::new(&self.name()?)?),
            tag::VECTOR => Value::Vector(self.vector()?),
            tag::MAP => Value::Map(self.map()?),
            tag::OP => Value::Op(self.op()?),
            tag::CORE_FN => {
                let id = self.byte()?;
                Value::Core(CoreFn::from_id(id).ok_or(FormatError::UnknownCoreFn(id))?)
            }
            tag::FN => Value::Fn(Closure {
                params: self.child()?,
                body: self.child()?,
                env: self.child()?,
                name: match self.byte()? {
                    tag::NIL => None,
                    tag::SYMBOL => Some(Symbol::new(&self.name()?)?),
                    t => return Err(FormatError::Invalid(format!("closure name tag 0x{t:02x}")).into()),
                },
            }),
            tag::REF => return Err(FormatError::Invalid("reference outside a parent".into()).into()),
            t => match RecordFormat::for_tag(t) {
                Some(format) => Value::Record(self.record(format)?),
                None => return Err(FormatError::UnknownTag(t).into()),
            },
        };
        value.validate()?;
        let encoding = self.blob.slice(start..self.pos);
        debug_assert!({
            let mut again = Vec::new();
            write_value(&value, &mut again);
            again == encoding.as_slice()
        });
        Ok(Cell::with_encoding(value, encoding))
    }

    fn vector(&mut self) -> Result<VectorNode> {
        let count = self.count(i64::MAX as u64)?;
        if vector::is_tree_count(count) {
            let n = vector::tree_child_count(count);
            return Ok(VectorNode::Tree { count, children: self.children(n)? });
        }
        let tail = vector::tail_length(count);
        let items = self.children(tail)?;
        let prefix = if count > tail as u64 { Some(self.child()?) } else { None };
        debug_assert!(tail <= CHUNK_SIZE);
        Ok(VectorNode::Leaf { count, prefix, items })
    }

    fn map(&mut self) -> Result<MapNode> {
        let n = self.count(LIMIT_ENCODING_LENGTH as u64)? as usize;
        let mut entries: Vec<(Ref, Ref)> = Vec::with_capacity(n);
        for _ in 0..n {
            let k = self.child()?;
            if let Some((prev, _)) = entries.last() {
                if prev.hash() >= k.hash() {
                    return Err(FormatError::NonCanonical("map keys out of order").into());
                }
            }
            let v = self.child()?;
            entries.push((k, v));
        }
        Ok(MapNode { entries })
    }

    fn record(&mut self, format: &'static RecordFormat) -> Result<RecordNode> {
        let n = self.count(LIMIT_ENCODING_LENGTH as u64)? as usize;
        if n != format.arity() {
            return Err(FormatError::Invalid(format!(
                "{} record needs {} fields, got {n}",
                format.name,
                format.arity()
            ))
            .into());
        }
        Ok(RecordNode { format, fields: self.children(n)? })
    }

    fn op(&mut self) -> Result<Op> {
        Ok(match self.byte()? {
            tag::op::CONSTANT => Op::Constant(self.child()?),
            tag::op::DEF => Op::Def { symbol: self.symbol()?, value: self.child()? },
            tag::op::DO => Op::Do(self.child()?),
            tag::op::LET => Op::Let { symbols: self.child()?, ops: self.child()? },
            tag::op::COND => Op::Cond(self.child()?),
            tag::op::LOOKUP => Op::Lookup(self.symbol()?),
            tag::op::INVOKE => Op::Invoke(self.child()?),
            tag::op::LAMBDA => Op::Lambda { params: self.child()?, body: self.child()? },
            t => return Err(FormatError::UnknownOpType(t).into()),
        })
    }
}
