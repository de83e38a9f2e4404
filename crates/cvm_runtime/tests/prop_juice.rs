use std::sync::Arc;

use cvm_data::{Cell, MemoryStore, Op, Symbol};
use cvm_runtime::{Context, Outcome, RuntimeConfig, Signal};
use proptest::prelude::*;

fn core(name: &'static str) -> Cell {
    Op::lookup(Symbol::from_static(name))
}

fn op_tree() -> impl Strategy<Value = Cell> {
    let leaf = prop_oneof![
        (-50i64..50).prop_map(|x| Op::constant(Cell::long(x))),
        any::<bool>().prop_map(|b| Op::constant(Cell::bool(b))),
        Just(Op::constant(Cell::nil())),
    ];
    leaf.prop_recursive(4, 64, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(|ops| Op::do_ops(ops).unwrap()),
            prop::collection::vec(inner.clone(), 0..5).prop_map(|ops| Op::cond(ops).unwrap()),
            (prop::sample::select(vec!["+", "-", "*", "<", "=", "vector", "count", "not"]), prop::collection::vec(inner, 0..3))
                .prop_map(|(f, args)| {
                    let mut ops = vec![core(f)];
                    ops.extend(args);
                    Op::invoke(ops).unwrap()
                }),
        ]
    })
}

fn exec(op: &Cell, juice: u64) -> Context {
    Context::new(RuntimeConfig::default().with_juice(juice), Arc::new(MemoryStore::new()))
        .execute(op)
        .unwrap()
}

proptest! {
    #[test]
    fn execution_is_deterministic(op in op_tree()) {
        let a = exec(&op, 100_000);
        let b = exec(&op, 100_000);
        prop_assert_eq!(a.outcome(), b.outcome());
        prop_assert_eq!(a.juice(), b.juice());
        prop_assert!(a.juice() <= 100_000);
    }

    /// Juice used is a property of the tree: any budget at least that large
    /// gives the same outcome, any smaller one runs out with nothing left.
    #[test]
    fn juice_threshold(op in op_tree(), cut in 0u64..1000) {
        let full = exec(&op, 100_000);
        let used = full.juice_used();
        prop_assert!(used > 0);

        let exact = exec(&op, used);
        prop_assert_eq!(exact.outcome(), full.outcome());
        prop_assert_eq!(exact.juice(), 0);

        let short = used.saturating_sub(1 + cut % used);
        let starved = exec(&op, short);
        prop_assert_eq!(starved.outcome(), &Outcome::Exceptional(Signal::OutOfJuice));
        prop_assert_eq!(starved.juice(), 0);
    }
}
