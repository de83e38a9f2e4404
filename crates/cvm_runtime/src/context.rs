//! Execution context and the op-tree interpreter.
//!
//! Evaluation returns `Flow<Cell>`: a value, or an [`Exit`] that is either a
//! signal travelling up to its handler or a fatal error. Each op pays its own
//! juice before any child runs, so juice only ever goes down and is never
//! refunded by a failing branch.

use std::sync::Arc;

use cvm_data::{Cell, Closure, CoreError, CoreFn, Map, Op, Ref, Store, Symbol, Value, Vector};
use im::OrdMap;

use crate::builtins;
use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::juice::{self, Juice};
use crate::signal::{codes, describe, Signal};

pub type Bindings = OrdMap<Symbol, Cell>;

/// What the last execution produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Value(Cell),
    Exceptional(Signal),
}

pub(crate) enum Exit {
    Signal(Signal),
    Fatal(RuntimeError),
}

impl From<Signal> for Exit {
    fn from(s: Signal) -> Self {
        Exit::Signal(s)
    }
}

impl From<RuntimeError> for Exit {
    fn from(e: RuntimeError) -> Self {
        Exit::Fatal(e)
    }
}

impl From<CoreError> for Exit {
    fn from(e: CoreError) -> Self {
        Exit::Fatal(RuntimeError::Data(e))
    }
}

pub(crate) type Flow<T> = std::result::Result<T, Exit>;

/// Private execution state. A context is moved into [`Context::execute`] and
/// comes back as the next state; it is never shared between executions.
pub struct Context {
    config: RuntimeConfig,
    store: Arc<dyn Store>,
    /// `def` bindings, kept for the rest of the transaction.
    env: Bindings,
    /// `let` and parameter bindings of the current scope.
    locals: Bindings,
    juice: Juice,
    depth: usize,
    outcome: Outcome,
}

impl Context {
    pub fn new(config: RuntimeConfig, store: Arc<dyn Store>) -> Context {
        Context {
            juice: config.juice_limit,
            config,
            store,
            env: Bindings::new(),
            locals: Bindings::new(),
            depth: 0,
            outcome: Outcome::Value(Cell::nil()),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn juice(&self) -> Juice {
        self.juice
    }

    pub fn juice_used(&self) -> Juice {
        self.config.juice_limit.saturating_sub(self.juice)
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    /// The result value, or `None` if the last execution ended in a signal.
    pub fn value(&self) -> Option<&Cell> {
        match &self.outcome {
            Outcome::Value(v) => Some(v),
            Outcome::Exceptional(_) => None,
        }
    }

    pub fn signal(&self) -> Option<&Signal> {
        match &self.outcome {
            Outcome::Exceptional(s) => Some(s),
            Outcome::Value(_) => None,
        }
    }

    pub fn is_exceptional(&self) -> bool {
        self.signal().is_some()
    }

    pub fn env(&self) -> &Bindings {
        &self.env
    }

    /// Value bound by `def`, if any.
    pub fn lookup_env(&self, symbol: &Symbol) -> Option<&Cell> {
        self.env.get(symbol)
    }

    /// Runs `op` and returns the next context. Signals end up in the outcome
    /// (halt and return become plain values); only fatal errors are returned
    /// as `Err`, and the context is consumed with them.
    pub fn execute(mut self, op: &Cell) -> Result<Context> {
        let start = self.juice;
        let op = match op.load(&*self.store) {
            Ok(op) => op,
            Err(e) => {
                tracing::warn!(error = %e, op = %op.hash(), "cannot load op tree");
                return Err(e.into());
            }
        };
        let outcome = match self.eval(&op) {
            Ok(v) => Outcome::Value(v),
            Err(Exit::Signal(Signal::Halt(v) | Signal::Return(v))) => Outcome::Value(v),
            Err(Exit::Signal(s)) => Outcome::Exceptional(s),
            Err(Exit::Fatal(e)) => {
                tracing::warn!(error = %e, op = %op.hash(), "execution aborted");
                return Err(e);
            }
        };
        self.locals = Bindings::new();
        self.depth = 0;
        tracing::debug!(
            juice_used = start - self.juice,
            juice_left = self.juice,
            exceptional = matches!(outcome, Outcome::Exceptional(_)),
            "execution complete"
        );
        self.outcome = outcome;
        Ok(self)
    }

    pub(crate) fn charge(&mut self, cost: Juice) -> Flow<()> {
        if cost > self.juice {
            self.juice = 0;
            return Err(Signal::OutOfJuice.into());
        }
        self.juice -= cost;
        Ok(())
    }

    fn eval(&mut self, cell: &Cell) -> Flow<Cell> {
        let op = cell
            .as_op()
            .ok_or_else(|| RuntimeError::Validation(format!("not an op: {}", describe(cell))))?;
        if self.depth >= self.config.max_depth {
            return Err(Signal::error(&codes::DEPTH, format!("depth limit {} reached", self.config.max_depth)).into());
        }
        let env = self.env.clone();
        self.depth += 1;
        let result = self.eval_op(op);
        self.depth -= 1;
        if let Err(Exit::Signal(s)) = &result {
            if s.is_error() {
                self.env = env;
            }
        }
        result
    }

    fn eval_op(&mut self, op: &Op) -> Flow<Cell> {
        match op {
            Op::Constant(value) => {
                self.charge(juice::CONSTANT)?;
                Ok(value.cell()?)
            }
            Op::Lookup(symbol) => {
                self.charge(juice::LOOKUP)?;
                self.lookup(symbol)
            }
            Op::Do(ops) => {
                self.charge(juice::DO)?;
                let mut last = Cell::nil();
                for op in op_list(ops)? {
                    last = self.eval(&op)?;
                }
                Ok(last)
            }
            Op::Def { symbol, value } => {
                self.charge(juice::DEF)?;
                let v = named(self.eval(&value.cell()?)?, symbol);
                self.env.insert(symbol.clone(), v.clone());
                Ok(v)
            }
            Op::Let { symbols, ops } => {
                self.charge(juice::LET)?;
                let symbols = symbol_list(symbols)?;
                let ops = op_list(ops)?;
                if ops.len() < symbols.len() {
                    return Err(RuntimeError::Validation(format!(
                        "let binds {} symbols with {} ops",
                        symbols.len(),
                        ops.len()
                    ))
                    .into());
                }
                let saved = self.locals.clone();
                let result = self.eval_let(&symbols, &ops);
                self.locals = saved;
                result
            }
            Op::Cond(ops) => {
                self.charge(juice::COND)?;
                let ops = op_list(ops)?;
                let mut pairs = ops.chunks_exact(2);
                for pair in &mut pairs {
                    if self.eval(&pair[0])?.is_truthy() {
                        return self.eval(&pair[1]);
                    }
                }
                match pairs.remainder() {
                    [default] => self.eval(default),
                    _ => Ok(Cell::nil()),
                }
            }
            Op::Invoke(ops) => {
                self.charge(juice::INVOKE)?;
                let ops = op_list(ops)?;
                let (f, args) = ops
                    .split_first()
                    .ok_or_else(|| RuntimeError::Validation("invoke without a function op".into()))?;
                let f = self.eval(f)?;
                let mut values = Vec::with_capacity(args.len());
                for a in args {
                    values.push(self.eval(a)?);
                }
                self.apply(&f, values)
            }
            Op::Lambda { params, body } => {
                self.charge(juice::LAMBDA)?;
                let params = Vector::from_cell(params.cell()?)?;
                let captured = Map::from_entries(self.locals.iter().map(|(k, v)| (k.to_cell(), v.clone())));
                let captured = match captured {
                    Ok(m) => m,
                    Err(CoreError::Validation(msg)) => return Err(Signal::error(&codes::ARGUMENT, msg).into()),
                    Err(e) => return Err(e.into()),
                };
                Ok(Closure::create(params, body.cell()?, captured, None)?)
            }
        }
    }

    fn eval_let(&mut self, symbols: &[Symbol], ops: &[Cell]) -> Flow<Cell> {
        let (inits, body) = ops.split_at(symbols.len());
        for (symbol, op) in symbols.iter().zip(inits) {
            let v = named(self.eval(op)?, symbol);
            self.locals.insert(symbol.clone(), v);
        }
        let mut last = Cell::nil();
        for op in body {
            last = self.eval(op)?;
        }
        Ok(last)
    }

    fn lookup(&self, symbol: &Symbol) -> Flow<Cell> {
        if let Some(v) = self.locals.get(symbol).or_else(|| self.env.get(symbol)) {
            return Ok(v.clone());
        }
        match CoreFn::from_name(symbol.name()) {
            Some(f) => Ok(Cell::core(f)),
            None => Err(Signal::error(&codes::UNDECLARED, symbol.name()).into()),
        }
    }

    fn apply(&mut self, f: &Cell, args: Vec<Cell>) -> Flow<Cell> {
        match f.value() {
            Value::Core(core_fn) => builtins::apply(self, *core_fn, args),
            Value::Fn(closure) => self.call(f, closure, args),
            _ => Err(Signal::error(&codes::CAST, format!("{} is not a function", describe(f))).into()),
        }
    }

    fn call(&mut self, f: &Cell, closure: &Closure, args: Vec<Cell>) -> Flow<Cell> {
        let params = closure.param_symbols()?;
        if params.len() != args.len() {
            return Err(Signal::error(
                &codes::ARITY,
                format!("expected {} arguments, got {}", params.len(), args.len()),
            )
            .into());
        }
        let mut frame = Bindings::new();
        for (k, v) in closure.env()?.entries()? {
            let k = k
                .as_symbol()
                .cloned()
                .ok_or_else(|| RuntimeError::Validation(format!("closure binds non-symbol {}", describe(&k))))?;
            frame.insert(k, v);
        }
        if let Some(name) = closure.name() {
            frame.insert(name.clone(), f.clone());
        }
        frame.extend(params.into_iter().zip(args));

        let body = closure.body()?;
        let saved = std::mem::replace(&mut self.locals, frame);
        let result = self.eval(&body);
        self.locals = saved;
        match result {
            Err(Exit::Signal(Signal::Return(v))) => Ok(v),
            Err(Exit::Signal(Signal::Error(mut e))) => {
                if self.config.record_trace {
                    let name = closure.name().map_or("<anonymous>", Symbol::name);
                    e.trace.push(format!("In function: {name}"));
                }
                Err(Signal::Error(e).into())
            }
            other => other,
        }
    }
}

/// Gives an unnamed closure the name it is being bound to.
fn named(v: Cell, symbol: &Symbol) -> Cell {
    match v.value() {
        Value::Fn(c) if c.name().is_none() => c.with_name(symbol.clone()),
        _ => v,
    }
}

fn op_list(r: &Ref) -> Flow<Vec<Cell>> {
    Ok(Vector::from_cell(r.cell()?)?.to_vec()?)
}

fn symbol_list(r: &Ref) -> Flow<Vec<Symbol>> {
    op_list(r)?
        .into_iter()
        .map(|c| {
            c.as_symbol()
                .cloned()
                .ok_or_else(|| Exit::Fatal(RuntimeError::Validation(format!("expected symbol, got {}", describe(&c)))))
        })
        .collect()
}
