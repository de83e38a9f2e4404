use std::sync::Arc;
use std::thread;

use cvm_data::store::{self, MemoryStore};
use cvm_data::{Cell, CoreError, Op, Store, Symbol, Vector};
use cvm_runtime::juice;
use cvm_runtime::{codes, execute_query, Context, ExecutionResult, RuntimeConfig, RuntimeError, Signal};

const J: u64 = 10_000;

fn sym(s: &str) -> Symbol {
    Symbol::new(s).unwrap()
}

fn konst(c: impl Into<Cell>) -> Cell {
    Op::constant(c.into())
}

fn lookup(s: &str) -> Cell {
    Op::lookup(sym(s))
}

fn call(f: &str, args: Vec<Cell>) -> Cell {
    let mut ops = vec![lookup(f)];
    ops.extend(args);
    Op::invoke(ops).unwrap()
}

fn fresh(juice: u64) -> Context {
    Context::new(RuntimeConfig::default().with_juice(juice), Arc::new(MemoryStore::new()))
}

fn run(op: &Cell) -> Context {
    fresh(J).execute(op).unwrap()
}

fn error_code(ctx: &Context) -> String {
    match ctx.signal() {
        Some(Signal::Error(e)) => e.code.name().to_string(),
        other => panic!("expected an error signal, got {other:?}"),
    }
}

#[test]
fn def_then_lookup() {
    let op = Op::do_ops(vec![Op::def(sym("foo"), konst(Cell::string("bar").unwrap())).unwrap(), lookup("foo")]).unwrap();
    let ctx = run(&op);
    assert_eq!(ctx.value(), Some(&Cell::string("bar").unwrap()));
    assert_eq!(ctx.juice(), J - juice::CONSTANT - juice::DEF - juice::LOOKUP - juice::DO);
    assert_eq!(ctx.lookup_env(&sym("foo")), Some(&Cell::string("bar").unwrap()));
}

#[test]
fn constant_without_enough_juice() {
    let ctx = fresh(juice::CONSTANT - 1).execute(&konst(10)).unwrap();
    assert_eq!(ctx.signal(), Some(&Signal::OutOfJuice));
    assert_eq!(ctx.value(), None);
    assert_eq!(ctx.juice(), 0);
}

#[test]
fn cond_branches_and_juice() {
    let ctx = run(&Op::cond(vec![konst(true), konst(1), konst(2)]).unwrap());
    assert_eq!(ctx.value(), Some(&Cell::long(1)));
    assert_eq!(ctx.juice(), J - juice::COND - 2 * juice::CONSTANT);

    let ctx = run(&Op::cond(vec![konst(false), konst(1), konst(2)]).unwrap());
    assert_eq!(ctx.value(), Some(&Cell::long(2)));
    assert_eq!(ctx.juice(), J - juice::COND - 2 * juice::CONSTANT);

    let ctx = run(&Op::cond(vec![konst(Cell::nil()), konst(1)]).unwrap());
    assert_eq!(ctx.value(), Some(&Cell::nil()));
    assert_eq!(ctx.juice(), J - juice::COND - juice::CONSTANT);

    let ctx = run(&Op::cond(vec![]).unwrap());
    assert_eq!(ctx.value(), Some(&Cell::nil()));
}

#[test]
fn cond_tests_can_change_the_environment() {
    let op = Op::cond(vec![
        Op::def(sym("seen"), konst(false)).unwrap(),
        konst(1),
        Op::def(sym("other"), konst(2)).unwrap(),
    ])
    .unwrap();
    let ctx = run(&op);
    assert_eq!(ctx.value(), Some(&Cell::long(2)));
    assert_eq!(ctx.lookup_env(&sym("seen")), Some(&Cell::bool(false)));
    assert_eq!(ctx.lookup_env(&sym("other")), Some(&Cell::long(2)));
}

#[test]
fn let_binds_in_order() {
    let op = Op::let_ops(
        vec![sym("a"), sym("b")],
        vec![konst(1), call("+", vec![lookup("a"), konst(1)]), call("+", vec![lookup("a"), lookup("b")])],
    )
    .unwrap();
    let ctx = run(&op);
    assert_eq!(ctx.value(), Some(&Cell::long(3)));
    assert!(ctx.env().is_empty());
}

#[test]
fn invoke_lambda() {
    let square = Op::lambda(vec![sym("x")], call("*", vec![lookup("x"), lookup("x")])).unwrap();
    let ctx = run(&Op::invoke(vec![square, konst(7)]).unwrap());
    assert_eq!(ctx.value(), Some(&Cell::long(49)));
}

#[test]
fn lambda_arity_is_checked() {
    let id = Op::lambda(vec![sym("x")], lookup("x")).unwrap();
    let ctx = run(&Op::invoke(vec![id.clone()]).unwrap());
    assert_eq!(error_code(&ctx), "ARITY");
    let ctx = run(&Op::invoke(vec![id, konst(1), konst(2)]).unwrap());
    assert_eq!(error_code(&ctx), "ARITY");
}

#[test]
fn non_function_cannot_be_invoked() {
    let ctx = run(&Op::invoke(vec![konst(1)]).unwrap());
    assert_eq!(error_code(&ctx), "CAST");
}

#[test]
fn closures_capture_locals() {
    let make = Op::let_ops(
        vec![sym("k")],
        vec![konst(10), Op::def(sym("addk"), Op::lambda(vec![sym("x")], call("+", vec![lookup("x"), lookup("k")])).unwrap()).unwrap()],
    )
    .unwrap();
    let ctx = run(&make);
    let f = ctx.lookup_env(&sym("addk")).unwrap().clone();
    assert_eq!(f.to_string(), "(fn [x] (+ x k))");

    // the closure outlives the let, and the context carries it to the next execution
    let ctx = ctx.execute(&call("addk", vec![konst(5)])).unwrap();
    assert_eq!(ctx.value(), Some(&Cell::long(15)));
    let ctx = ctx.execute(&lookup("k")).unwrap();
    assert_eq!(error_code(&ctx), "UNDECLARED");
}

fn fact() -> Cell {
    let body = Op::cond(vec![
        call("<", vec![lookup("n"), konst(2)]),
        konst(1),
        call("*", vec![lookup("n"), call("fact", vec![call("-", vec![lookup("n"), konst(1)])])]),
    ])
    .unwrap();
    Op::def(sym("fact"), Op::lambda(vec![sym("n")], body).unwrap()).unwrap()
}

#[test]
fn recursion_through_self_name() {
    let op = Op::do_ops(vec![fact(), call("fact", vec![konst(10)])]).unwrap();
    let ctx = fresh(1_000_000).execute(&op).unwrap();
    assert_eq!(ctx.value(), Some(&Cell::long(3_628_800)));
}

#[test]
fn recursion_is_bounded_by_depth() {
    let op = Op::do_ops(vec![
        Op::def(sym("spin"), Op::lambda(vec![], call("spin", vec![])).unwrap()).unwrap(),
        call("spin", vec![]),
    ])
    .unwrap();
    let ctx = fresh(1_000_000).execute(&op).unwrap();
    assert_eq!(error_code(&ctx), "DEPTH");
    // rolled back with the error
    assert_eq!(ctx.lookup_env(&sym("spin")), None);
    match ctx.signal() {
        Some(Signal::Error(e)) => assert_eq!(e.trace.first().map(String::as_str), Some("In function: spin")),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn undeclared_symbol() {
    let ctx = run(&lookup("nope"));
    assert_eq!(error_code(&ctx), "UNDECLARED");
    assert_eq!(ctx.juice(), J - juice::LOOKUP);
}

#[test]
fn fail_records_trace() {
    let op = Op::do_ops(vec![
        Op::def(sym("f"), Op::lambda(vec![], call("fail", vec![konst(Cell::keyword("NOPE").unwrap()), konst(Cell::string("boom").unwrap())])).unwrap()).unwrap(),
        call("f", vec![]),
    ])
    .unwrap();
    let ctx = run(&op);
    match ctx.signal() {
        Some(Signal::Error(e)) => {
            assert_eq!(e.code.name(), "NOPE");
            assert_eq!(e.message.as_str(), Some("boom"));
            assert_eq!(e.trace, vec!["In function: f".to_string()]);
        }
        other => panic!("unexpected {other:?}"),
    }

    let quiet = RuntimeConfig { record_trace: false, ..RuntimeConfig::default() };
    let ctx = Context::new(quiet, Arc::new(MemoryStore::new())).execute(&op).unwrap();
    match ctx.signal() {
        Some(Signal::Error(e)) => assert!(e.trace.is_empty()),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn return_leaves_the_function() {
    let body = Op::do_ops(vec![call("return", vec![konst(1)]), konst(2)]).unwrap();
    let op = Op::do_ops(vec![
        Op::def(sym("f"), Op::lambda(vec![], body).unwrap()).unwrap(),
        call("+", vec![call("f", vec![]), konst(10)]),
    ])
    .unwrap();
    assert_eq!(run(&op).value(), Some(&Cell::long(11)));
}

#[test]
fn halt_ends_execution_normally() {
    let op = Op::do_ops(vec![call("halt", vec![konst(3)]), konst(4)]).unwrap();
    let ctx = run(&op);
    assert_eq!(ctx.value(), Some(&Cell::long(3)));
    assert!(!ctx.is_exceptional());
}

#[test]
fn results_from_execution() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let ok = execute_query(&konst(5), Some(1), RuntimeConfig::default(), store.clone()).unwrap();
    assert_eq!(ok.value(), &Cell::long(5));
    assert!(!ok.is_error());
    assert_eq!(ok.id(), Some(1));

    let anon = execute_query(&konst(5), None, RuntimeConfig::default(), store.clone()).unwrap();
    assert_eq!(anon.id(), None);
    assert_eq!(anon.value(), ok.value());

    let starved = execute_query(&konst(5), Some(2), RuntimeConfig::default().with_juice(1), store.clone()).unwrap();
    assert!(starved.is_error());
    assert_eq!(starved.error_code(), Some(&*codes::JUICE));
    assert_eq!(starved.id(), Some(2));

    let fail = call("fail", vec![konst(Cell::string("x").unwrap())]);
    let failed = execute_query(&fail, Some(3), RuntimeConfig::default(), store).unwrap();
    assert_eq!(failed.error_code(), Some(&*codes::ASSERT));
    assert_eq!(failed.value().as_str(), Some("x"));
    let back = ExecutionResult::from_cell(failed.cell().clone()).unwrap();
    assert_eq!(back, failed);
}

#[test]
fn cast_errors_on_large_values_keep_a_short_message() {
    let big = Vector::of((0..5000).map(Cell::long)).into_cell();
    for op in [call("+", vec![konst(1), konst(big.clone())]), Op::invoke(vec![konst(big)]).unwrap()] {
        let ctx = run(&op);
        assert_eq!(error_code(&ctx), "CAST");
        let Some(Signal::Error(e)) = ctx.signal() else { unreachable!() };
        let message = e.message.as_str().expect("message is a string");
        assert!(message.contains("vector of 5000 elements"), "{message}");
        assert!(message.len() < 100);
    }
}

#[test]
fn op_trees_load_from_the_store() {
    let big = Cell::blob(&[7u8; 600]).unwrap();
    let op = Op::do_ops(vec![
        Op::def(sym("payload"), konst(big.clone())).unwrap(),
        call("count", vec![lookup("payload")]),
    ])
    .unwrap();
    let store = Arc::new(MemoryStore::new());
    let root = store::persist(&op, &*store);

    let stored = store::fetch(root, &*store).unwrap();
    assert!(!stored.is_loaded());
    let ctx = Context::new(RuntimeConfig::default(), store).execute(&stored).unwrap();
    assert_eq!(ctx.value(), Some(&Cell::long(600)));
    assert_eq!(ctx.lookup_env(&sym("payload")), Some(&big));
}

#[test]
fn missing_data_is_fatal() {
    let op = Op::do_ops(vec![konst(Cell::blob(&[1u8; 600]).unwrap())]).unwrap();
    let full = Arc::new(MemoryStore::new());
    let root = store::persist(&op, &*full);
    let stored = store::fetch(root, &*full).unwrap();

    let empty = Arc::new(MemoryStore::new());
    match Context::new(RuntimeConfig::default(), empty).execute(&stored) {
        Err(RuntimeError::Data(CoreError::MissingData(_))) => {}
        Err(e) => panic!("unexpected error {e}"),
        Ok(_) => panic!("executed without its data"),
    }
}

#[test]
fn contexts_run_on_separate_threads() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let op = Op::do_ops(vec![fact(), call("fact", vec![konst(12)])]).unwrap();
    store::persist(&op, &*store);
    let expected = run(&op).juice();

    thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                let op = op.clone();
                s.spawn(move || Context::new(RuntimeConfig::default().with_juice(J), store).execute(&op).unwrap())
            })
            .collect();
        for h in handles {
            let ctx = h.join().unwrap();
            assert_eq!(ctx.value(), Some(&Cell::long(479_001_600)));
            assert_eq!(ctx.juice(), expected);
        }
    });
}
