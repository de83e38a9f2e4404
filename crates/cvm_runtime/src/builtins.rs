//! Behaviour of the built-in functions.
//!
//! Every function pays its juice first, then checks its arguments. Integer
//! arithmetic wraps, so results are identical on every platform.

use cvm_data::{Cell, CoreError, CoreFn, Keyword, Value, Vector};
use once_cell::sync::Lazy;

use crate::context::{Context, Exit, Flow};
use crate::juice;
use crate::signal::{codes, describe, Signal};

pub(crate) fn apply(ctx: &mut Context, f: CoreFn, args: Vec<Cell>) -> Flow<Cell> {
    ctx.charge(cost(f, &args))?;
    match f {
        CoreFn::Add => Ok(Cell::long(longs(f, &args)?.into_iter().fold(0i64, i64::wrapping_add))),
        CoreFn::Mul => Ok(Cell::long(longs(f, &args)?.into_iter().fold(1i64, i64::wrapping_mul))),
        CoreFn::Sub => {
            let xs = longs(f, &args)?;
            match xs.split_first() {
                None => Err(arity(f, "at least 1", 0)),
                Some((x, [])) => Ok(Cell::long(x.wrapping_neg())),
                Some((x, rest)) => Ok(Cell::long(rest.iter().fold(*x, |a, b| a.wrapping_sub(*b)))),
            }
        }
        CoreFn::Eq => Ok(Cell::bool(args.windows(2).all(|w| w[0] == w[1]))),
        CoreFn::Lt => {
            let xs = longs(f, &args)?;
            Ok(Cell::bool(xs.windows(2).all(|w| w[0] < w[1])))
        }
        CoreFn::Gt => {
            let xs = longs(f, &args)?;
            Ok(Cell::bool(xs.windows(2).all(|w| w[0] > w[1])))
        }
        CoreFn::Not => {
            let [x] = exactly::<1>(f, args)?;
            Ok(Cell::bool(!x.is_truthy()))
        }
        CoreFn::Vector => Ok(Vector::of(args).into_cell()),
        CoreFn::Count => {
            let [x] = exactly::<1>(f, args)?;
            let n = match x.value() {
                Value::Nil => 0,
                Value::Vector(_) => vector(f, &x)?.count(),
                Value::String(s) => s.len() as u64,
                Value::Blob(b) => b.len() as u64,
                Value::Map(_) => x.as_map().map_or(0, |m| m.count() as u64),
                _ => return Err(cast(f, &x)),
            };
            Ok(Cell::long(n as i64))
        }
        CoreFn::Nth => {
            let [coll, index] = exactly::<2>(f, args)?;
            let v = vector(f, &coll)?;
            let i = index.as_long().ok_or_else(|| cast(f, &index))?;
            if i < 0 || i as u64 >= v.count() {
                return Err(error(&codes::BOUNDS, format!("index {i} out of bounds for count {}", v.count())));
            }
            Ok(v.get(i as u64)?)
        }
        CoreFn::Conj => {
            let (coll, items) = args.split_first().ok_or_else(|| arity(f, "at least 1", 0))?;
            let mut v = vector(f, coll)?;
            for x in items {
                v = v.append(x.clone())?;
            }
            Ok(v.into_cell())
        }
        CoreFn::Concat => {
            let mut acc = Vector::empty();
            for x in &args {
                acc = acc.concat(&vector(f, x)?)?;
            }
            Ok(acc.into_cell())
        }
        CoreFn::Fail => match args.as_slice() {
            [] => Err(Signal::with_value(codes::ASSERT.clone(), Cell::nil()).into()),
            [message] => Err(Signal::with_value(codes::ASSERT.clone(), message.clone()).into()),
            [code, message] => {
                let code = code.as_keyword().ok_or_else(|| cast(f, code))?;
                Err(Signal::with_value(code.clone(), message.clone()).into())
            }
            _ => Err(arity(f, "0 to 2", args.len())),
        },
        CoreFn::Halt => Err(Signal::Halt(optional(f, args)?).into()),
        CoreFn::Return => Err(Signal::Return(optional(f, args)?).into()),
        CoreFn::Hash => {
            let [x] = exactly::<1>(f, args)?;
            blob(f, x.hash().as_bytes())
        }
        CoreFn::Encoding => {
            let [x] = exactly::<1>(f, args)?;
            blob(f, x.encoding())
        }
    }
}

/// Juice for one call. Data-building functions pay per element they add,
/// hashing functions per byte they read.
fn cost(f: CoreFn, args: &[Cell]) -> juice::Juice {
    match f {
        CoreFn::Vector => juice::build_cost(args.len() as u64),
        CoreFn::Conj => juice::build_cost(args.len().saturating_sub(1) as u64),
        CoreFn::Concat => juice::build_cost(args.iter().skip(1).map(element_count).sum()),
        CoreFn::Hash | CoreFn::Encoding => juice::hash_cost(args.iter().map(Cell::encoding_length).sum()),
        _ => juice::SIMPLE_FN,
    }
}

fn element_count(c: &Cell) -> u64 {
    c.as_vector().map_or(0, |v| v.count())
}

fn error(code: &Lazy<Keyword>, message: String) -> Exit {
    Signal::error(code, message).into()
}

fn arity(f: CoreFn, expected: &str, got: usize) -> Exit {
    error(&codes::ARITY, format!("{} expects {expected} arguments, got {got}", f.name()))
}

fn cast(f: CoreFn, arg: &Cell) -> Exit {
    error(&codes::CAST, format!("{} cannot use {}", f.name(), describe(arg)))
}

fn exactly<const N: usize>(f: CoreFn, args: Vec<Cell>) -> Flow<[Cell; N]> {
    let n = args.len();
    args.try_into().map_err(|_| arity(f, &N.to_string(), n))
}

fn optional(f: CoreFn, args: Vec<Cell>) -> Flow<Cell> {
    match args.len() {
        0 => Ok(Cell::nil()),
        1 => Ok(args.into_iter().next().unwrap_or_else(Cell::nil)),
        n => Err(arity(f, "0 or 1", n)),
    }
}

fn longs(f: CoreFn, args: &[Cell]) -> Flow<Vec<i64>> {
    args.iter().map(|a| a.as_long().ok_or_else(|| cast(f, a))).collect()
}

/// `nil` counts as the empty vector.
fn vector(f: CoreFn, c: &Cell) -> Flow<Vector> {
    if c.is_nil() {
        return Ok(Vector::empty());
    }
    c.as_vector().ok_or_else(|| cast(f, c))
}

fn blob(f: CoreFn, bytes: &[u8]) -> Flow<Cell> {
    match Cell::blob(bytes) {
        Ok(b) => Ok(b),
        Err(CoreError::Validation(msg)) => Err(error(&codes::ARGUMENT, format!("{}: {msg}", f.name()))),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use cvm_data::MemoryStore;

    use crate::config::RuntimeConfig;

    fn call(f: CoreFn, args: Vec<Cell>) -> Result<Cell, Signal> {
        let mut ctx = Context::new(RuntimeConfig::default(), Arc::new(MemoryStore::new()));
        match apply(&mut ctx, f, args) {
            Ok(v) => Ok(v),
            Err(Exit::Signal(s)) => Err(s),
            Err(Exit::Fatal(e)) => panic!("fatal: {e}"),
        }
    }

    fn code(r: Result<Cell, Signal>) -> String {
        match r {
            Err(Signal::Error(e)) => e.code.name().to_string(),
            other => panic!("expected error, got {other:?}"),
        }
    }

    fn longs(xs: &[i64]) -> Vec<Cell> {
        xs.iter().copied().map(Cell::long).collect()
    }

    #[test]
    fn arithmetic() {
        assert_eq!(call(CoreFn::Add, longs(&[1, 2, 3])), Ok(Cell::long(6)));
        assert_eq!(call(CoreFn::Add, vec![]), Ok(Cell::long(0)));
        assert_eq!(call(CoreFn::Mul, longs(&[2, 3, 4])), Ok(Cell::long(24)));
        assert_eq!(call(CoreFn::Sub, longs(&[10, 3, 2])), Ok(Cell::long(5)));
        assert_eq!(call(CoreFn::Sub, longs(&[4])), Ok(Cell::long(-4)));
        assert_eq!(call(CoreFn::Add, longs(&[i64::MAX, 1])), Ok(Cell::long(i64::MIN)));
        assert_eq!(code(call(CoreFn::Sub, vec![])), "ARITY");
        assert_eq!(code(call(CoreFn::Add, vec![Cell::long(1), Cell::nil()])), "CAST");
    }

    #[test]
    fn comparisons() {
        assert_eq!(call(CoreFn::Lt, longs(&[1, 2, 3])), Ok(Cell::bool(true)));
        assert_eq!(call(CoreFn::Gt, longs(&[3, 3])), Ok(Cell::bool(false)));
        assert_eq!(call(CoreFn::Eq, vec![Cell::nil(), Cell::nil()]), Ok(Cell::bool(true)));
        assert_eq!(call(CoreFn::Not, vec![Cell::bool(false)]), Ok(Cell::bool(true)));
        assert_eq!(code(call(CoreFn::Not, vec![])), "ARITY");
    }

    #[test]
    fn vectors() {
        let v = call(CoreFn::Vector, longs(&[1, 2])).unwrap();
        assert_eq!(call(CoreFn::Count, vec![v.clone()]), Ok(Cell::long(2)));
        assert_eq!(call(CoreFn::Nth, vec![v.clone(), Cell::long(1)]), Ok(Cell::long(2)));
        assert_eq!(code(call(CoreFn::Nth, vec![v.clone(), Cell::long(2)])), "BOUNDS");
        assert_eq!(code(call(CoreFn::Nth, vec![v.clone(), Cell::long(-1)])), "BOUNDS");
        let w = call(CoreFn::Conj, vec![v.clone(), Cell::long(3)]).unwrap();
        assert_eq!(w, Vector::of(longs(&[1, 2, 3])).into_cell());
        let joined = call(CoreFn::Concat, vec![v.clone(), Cell::nil(), w]).unwrap();
        assert_eq!(joined, Vector::of(longs(&[1, 2, 1, 2, 3])).into_cell());
        assert_eq!(call(CoreFn::Count, vec![Cell::nil()]), Ok(Cell::long(0)));
        assert_eq!(code(call(CoreFn::Count, vec![Cell::long(1)])), "CAST");
    }

    #[test]
    fn control() {
        assert_eq!(call(CoreFn::Halt, vec![Cell::long(1)]), Err(Signal::Halt(Cell::long(1))));
        assert_eq!(call(CoreFn::Return, vec![]), Err(Signal::Return(Cell::nil())));
        let custom = Cell::keyword("NOPE").unwrap();
        assert_eq!(code(call(CoreFn::Fail, vec![custom, Cell::nil()])), "NOPE");
        assert_eq!(code(call(CoreFn::Fail, vec![])), "ASSERT");
        assert_eq!(code(call(CoreFn::Fail, vec![Cell::long(1), Cell::nil()])), "CAST");
    }

    #[test]
    fn hashing() {
        let x = Cell::long(42);
        let h = call(CoreFn::Hash, vec![x.clone()]).unwrap();
        assert_eq!(h.as_blob().map(|b| b.to_vec()), Some(x.hash().as_bytes().to_vec()));
        let e = call(CoreFn::Encoding, vec![x.clone()]).unwrap();
        assert_eq!(e.as_blob().map(|b| b.to_vec()), Some(x.encoding().to_vec()));
    }

    #[test]
    fn costs() {
        assert_eq!(cost(CoreFn::Add, &longs(&[1, 2])), juice::SIMPLE_FN);
        assert_eq!(cost(CoreFn::Vector, &longs(&[1, 2, 3])), 80);
        let x = Cell::long(1);
        assert_eq!(cost(CoreFn::Hash, &[x.clone()]), juice::HASH + x.encoding_length() as u64);
    }
}
