//! cvm_runtime: deterministic, juice-metered evaluation of op trees.
//!
//! - `Context`: private execution state threaded through `execute`
//! - `Signal`: error, out-of-juice, halt and return outcomes
//! - `ExecutionResult`: the `#Result` envelope reported to callers

mod builtins;
pub mod config;
pub mod context;
pub mod error;
pub mod juice;
pub mod result;
pub mod signal;

use std::sync::Arc;

use cvm_data::{Cell, Store};

pub use config::RuntimeConfig;
pub use context::{Bindings, Context, Outcome};
pub use error::{Result, RuntimeError};
pub use result::{ExecutionResult, ResultSummary};
pub use signal::{codes, ErrorValue, Signal};

/// Runs `op` in a fresh context and wraps the outcome. Signals become error
/// results; only fatal failures such as missing store data are returned as
/// `Err`. A `None` id leaves the result's id field absent.
pub fn execute_query(
    op: &Cell,
    id: Option<i64>,
    config: RuntimeConfig,
    store: Arc<dyn Store>,
) -> Result<ExecutionResult> {
    let ctx = Context::new(config, store).execute(op)?;
    ExecutionResult::from_execution(id.map_or_else(Cell::nil, Cell::long), &ctx)
}
