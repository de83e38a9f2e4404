//! cvm_data: immutable, content-addressed values for the CVM ledger core.
//!
//! - Cells with a canonical binary encoding and BLAKE3 identity
//! - Refs that embed small children and point to larger ones by hash
//! - A persistent vector of 32-element chunks
//! - Op trees, closures and result records as ordinary cells
//! - A put/get-by-hash store contract with an in-memory implementation

pub mod blob;
pub mod cell;
pub mod error;
pub mod format;
pub mod hash;
pub mod map;
pub mod op;
pub mod record;
pub mod refs;
pub mod store;
pub mod tag;
pub mod vector;
pub mod vlc;

pub use blob::Blob;
pub use cell::{Cell, Keyword, Symbol, Value};
pub use error::{CoreError, FormatError, Result};
pub use format::{decode, encode, LIMIT_ENCODING_LENGTH, MAX_EMBEDDED_LENGTH};
pub use hash::Hash;
pub use map::Map;
pub use op::{Closure, CoreFn, Op};
pub use record::{Record, RecordFormat, RESULT_FORMAT};
pub use refs::Ref;
pub use store::{MemoryStore, Store};
pub use vector::{Vector, CHUNK_SIZE};
