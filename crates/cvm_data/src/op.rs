//! Executable op trees, closures and core function identities.
//!
//! These are plain cells: they encode, hash and persist like any other value.
//! Evaluation lives in the runtime crate.

use std::fmt;

use crate::cell::{expect_symbol, write_ref, write_seq, Cell, Symbol, Value};
use crate::error::{invalid, CoreError, Result};
use crate::map::Map;
use crate::refs::Ref;
use crate::tag;
use crate::vector::Vector;

#[derive(Clone, Debug)]
pub enum Op {
    /// Yields its value.
    Constant(Ref),
    /// Evaluates the op and binds the result in the environment.
    Def { symbol: Symbol, value: Ref },
    /// Evaluates a vector of ops in order, yielding the last result.
    Do(Ref),
    /// Binds `symbols` to the first ops of `ops`, then evaluates the rest.
    Let { symbols: Ref, ops: Ref },
    /// Test/branch pairs with an optional trailing default.
    Cond(Ref),
    Lookup(Symbol),
    /// Function op followed by argument ops.
    Invoke(Ref),
    Lambda { params: Ref, body: Ref },
}

fn make(op: Op) -> Cell {
    Cell::from_value(Value::Op(op))
}

fn expect_op(cell: &Cell) -> Result<()> {
    match cell.value() {
        Value::Op(_) => Ok(()),
        _ => Err(CoreError::Validation(format!("expected op, got {cell}"))),
    }
}

fn op_vector(ops: Vec<Cell>) -> Result<Ref> {
    ops.iter().try_for_each(expect_op)?;
    Ok(Ref::of(Vector::of(ops).into_cell()))
}

fn symbol_vector(symbols: Vec<Symbol>) -> Ref {
    Ref::of(Vector::of(symbols.iter().map(Symbol::to_cell)).into_cell())
}

/// Fails if `r` is in memory and does not satisfy `ok`.
fn check_child(r: &Ref, what: &str, ok: impl Fn(&Value) -> bool) -> Result<()> {
    match r.cell() {
        Ok(c) if !ok(c.value()) => Err(invalid(format!("expected {what}, got {c}"))),
        _ => Ok(()),
    }
}

fn is_vector(v: &Value) -> bool {
    matches!(v, Value::Vector(_))
}

fn is_op(v: &Value) -> bool {
    matches!(v, Value::Op(_))
}

impl Op {
    pub fn constant(value: Cell) -> Cell {
        make(Op::Constant(Ref::of(value)))
    }

    pub fn def(symbol: Symbol, op: Cell) -> Result<Cell> {
        expect_op(&op)?;
        Ok(make(Op::Def { symbol, value: Ref::of(op) }))
    }

    pub fn do_ops(ops: Vec<Cell>) -> Result<Cell> {
        Ok(make(Op::Do(op_vector(ops)?)))
    }

    /// `ops` holds one initialiser per symbol followed by the body.
    pub fn let_ops(symbols: Vec<Symbol>, ops: Vec<Cell>) -> Result<Cell> {
        if ops.len() < symbols.len() {
            return Err(CoreError::Validation(format!(
                "let binds {} symbols but has {} ops",
                symbols.len(),
                ops.len()
            )));
        }
        Ok(make(Op::Let { symbols: symbol_vector(symbols), ops: op_vector(ops)? }))
    }

    pub fn cond(ops: Vec<Cell>) -> Result<Cell> {
        Ok(make(Op::Cond(op_vector(ops)?)))
    }

    pub fn lookup(symbol: Symbol) -> Cell {
        make(Op::Lookup(symbol))
    }

    /// `ops[0]` yields the function, the rest its arguments.
    pub fn invoke(ops: Vec<Cell>) -> Result<Cell> {
        if ops.is_empty() {
            return Err(CoreError::Validation("invoke needs a function op".into()));
        }
        Ok(make(Op::Invoke(op_vector(ops)?)))
    }

    pub fn lambda(params: Vec<Symbol>, body: Cell) -> Result<Cell> {
        expect_op(&body)?;
        Ok(make(Op::Lambda { params: symbol_vector(params), body: Ref::of(body) }))
    }

    pub fn op_type(&self) -> u8 {
        match self {
            Op::Constant(_) => tag::op::CONSTANT,
            Op::Def { .. } => tag::op::DEF,
            Op::Do(_) => tag::op::DO,
            Op::Let { .. } => tag::op::LET,
            Op::Cond(_) => tag::op::COND,
            Op::Lookup(_) => tag::op::LOOKUP,
            Op::Invoke(_) => tag::op::INVOKE,
            Op::Lambda { .. } => tag::op::LAMBDA,
        }
    }

    pub(crate) fn refs(&self) -> Vec<&Ref> {
        match self {
            Op::Constant(r) | Op::Do(r) | Op::Cond(r) | Op::Invoke(r) => vec![r],
            Op::Def { value, .. } => vec![value],
            Op::Let { symbols, ops } => vec![symbols, ops],
            Op::Lambda { params, body } => vec![params, body],
            Op::Lookup(_) => Vec::new(),
        }
    }

    pub(crate) fn map_refs(&self, f: &mut dyn FnMut(&Ref) -> Result<Ref>) -> Result<Op> {
        Ok(match self {
            Op::Constant(r) => Op::Constant(f(r)?),
            Op::Def { symbol, value } => Op::Def { symbol: symbol.clone(), value: f(value)? },
            Op::Do(r) => Op::Do(f(r)?),
            Op::Let { symbols, ops } => Op::Let { symbols: f(symbols)?, ops: f(ops)? },
            Op::Cond(r) => Op::Cond(f(r)?),
            Op::Lookup(s) => Op::Lookup(s.clone()),
            Op::Invoke(r) => Op::Invoke(f(r)?),
            Op::Lambda { params, body } => Op::Lambda { params: f(params)?, body: f(body)? },
        })
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            Op::Constant(_) | Op::Lookup(_) => Ok(()),
            Op::Def { value, .. } => check_child(value, "op", is_op),
            Op::Do(r) | Op::Cond(r) | Op::Invoke(r) => check_child(r, "vector of ops", is_vector),
            Op::Let { symbols, ops } => {
                check_child(symbols, "vector of symbols", is_vector)?;
                check_child(ops, "vector of ops", is_vector)
            }
            Op::Lambda { params, body } => {
                check_child(params, "vector of symbols", is_vector)?;
                check_child(body, "op", is_op)
            }
        }
    }
}

// ── Closures ─────────────────────────────────────────────────────

/// A function value: parameters, body op, the lexical bindings captured when
/// it was created, and an optional name bound to itself during calls.
#[derive(Clone, Debug)]
pub struct Closure {
    pub(crate) params: Ref,
    pub(crate) body: Ref,
    pub(crate) env: Ref,
    pub(crate) name: Option<Symbol>,
}

impl Closure {
    pub fn create(params: Vector, body: Cell, env: Map, name: Option<Symbol>) -> Result<Cell> {
        expect_op(&body)?;
        for p in params.iter() {
            expect_symbol(&p?)?;
        }
        Ok(Cell::from_value(Value::Fn(Closure {
            params: Ref::of(params.into_cell()),
            body: Ref::of(body),
            env: Ref::of(env.into_cell()),
            name,
        })))
    }

    pub fn params(&self) -> Result<Vector> {
        Vector::from_cell(self.params.cell()?)
    }

    pub fn param_symbols(&self) -> Result<Vec<Symbol>> {
        self.params()?.iter().map(|c| expect_symbol(&c?)).collect()
    }

    pub fn body(&self) -> Result<Cell> {
        self.body.cell()
    }

    pub fn env(&self) -> Result<Map> {
        Map::from_cell(self.env.cell()?)
    }

    pub fn name(&self) -> Option<&Symbol> {
        self.name.as_ref()
    }

    pub fn arity(&self) -> Result<u64> {
        Ok(self.params()?.count())
    }

    pub fn has_arity(&self, n: u64) -> Result<bool> {
        Ok(self.arity()? == n)
    }

    /// The same closure carrying `name`, so its body can refer to itself.
    pub fn with_name(&self, name: Symbol) -> Cell {
        Cell::from_value(Value::Fn(Closure { name: Some(name), ..self.clone() }))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        check_child(&self.params, "vector of symbols", is_vector)?;
        check_child(&self.body, "op", is_op)?;
        check_child(&self.env, "map", |v| matches!(v, Value::Map(_)))
    }
}

// ── Core functions ───────────────────────────────────────────────

/// Built-in functions, encoded by id. Behaviour is defined by the runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CoreFn {
    Add = 0,
    Sub,
    Mul,
    Eq,
    Lt,
    Gt,
    Not,
    Vector,
    Count,
    Nth,
    Conj,
    Concat,
    Fail,
    Halt,
    Return,
    Hash,
    Encoding,
}

impl CoreFn {
    pub const ALL: [CoreFn; 17] = [
        CoreFn::Add,
        CoreFn::Sub,
        CoreFn::Mul,
        CoreFn::Eq,
        CoreFn::Lt,
        CoreFn::Gt,
        CoreFn::Not,
        CoreFn::Vector,
        CoreFn::Count,
        CoreFn::Nth,
        CoreFn::Conj,
        CoreFn::Concat,
        CoreFn::Fail,
        CoreFn::Halt,
        CoreFn::Return,
        CoreFn::Hash,
        CoreFn::Encoding,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<CoreFn> {
        CoreFn::ALL.get(id as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            CoreFn::Add => "+",
            CoreFn::Sub => "-",
            CoreFn::Mul => "*",
            CoreFn::Eq => "=",
            CoreFn::Lt => "<",
            CoreFn::Gt => ">",
            CoreFn::Not => "not",
            CoreFn::Vector => "vector",
            CoreFn::Count => "count",
            CoreFn::Nth => "nth",
            CoreFn::Conj => "conj",
            CoreFn::Concat => "concat",
            CoreFn::Fail => "fail",
            CoreFn::Halt => "halt",
            CoreFn::Return => "return",
            CoreFn::Hash => "hash",
            CoreFn::Encoding => "encoding",
        }
    }

    pub fn from_name(name: &str) -> Option<CoreFn> {
        CoreFn::ALL.iter().copied().find(|f| f.name() == name)
    }
}

// ── Printing ─────────────────────────────────────────────────────

fn write_items(f: &mut fmt::Formatter<'_>, r: &Ref) -> fmt::Result {
    match r.cell().and_then(Vector::from_cell) {
        Ok(v) => match v.to_vec() {
            Ok(items) => {
                for (i, c) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{c}")?;
                }
                Ok(())
            }
            Err(_) => write_ref(f, r),
        },
        Err(_) => write_ref(f, r),
    }
}

pub(crate) fn write_op(f: &mut fmt::Formatter<'_>, op: &Op) -> fmt::Result {
    match op {
        Op::Constant(r) => write_ref(f, r),
        Op::Lookup(s) => write!(f, "{s}"),
        Op::Def { symbol, value } => {
            write!(f, "(def {symbol} ")?;
            write_ref(f, value)?;
            f.write_str(")")
        }
        Op::Do(r) => {
            f.write_str("(do ")?;
            write_items(f, r)?;
            f.write_str(")")
        }
        Op::Cond(r) => {
            f.write_str("(cond ")?;
            write_items(f, r)?;
            f.write_str(")")
        }
        Op::Invoke(r) => {
            f.write_str("(")?;
            write_items(f, r)?;
            f.write_str(")")
        }
        Op::Let { symbols, ops } => {
            f.write_str("(let [")?;
            write_items(f, symbols)?;
            f.write_str("] ")?;
            write_items(f, ops)?;
            f.write_str(")")
        }
        Op::Lambda { params, body } => {
            f.write_str("(fn ")?;
            write_seq(f, [params, body])?;
            f.write_str(")")
        }
    }
}
