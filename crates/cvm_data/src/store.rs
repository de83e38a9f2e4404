//! Content store contract and the in-memory reference store.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::blob::Blob;
use crate::cell::Cell;
use crate::error::{CoreError, FormatError, Result};
use crate::format;
use crate::hash::Hash;
use crate::refs;

/// Put/get by hash. Implementations must be safe to share between threads;
/// `put` of a hash already present is a no-op and `get` only ever returns
/// complete encodings.
pub trait Store: Send + Sync {
    fn get(&self, hash: &Hash) -> Option<Blob>;
    fn put(&self, hash: Hash, encoding: Blob);
}

#[derive(Default)]
pub struct MemoryStore {
    cells: RwLock<HashMap<Hash, Blob>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cells.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.cells.read().unwrap_or_else(|e| e.into_inner()).contains_key(hash)
    }
}

impl Store for MemoryStore {
    fn get(&self, hash: &Hash) -> Option<Blob> {
        self.cells.read().unwrap_or_else(|e| e.into_inner()).get(hash).cloned()
    }

    fn put(&self, hash: Hash, encoding: Blob) {
        let mut cells = self.cells.write().unwrap_or_else(|e| e.into_inner());
        cells.entry(hash).or_insert_with(|| {
            tracing::trace!(%hash, len = encoding.len(), "store put");
            encoding
        });
    }
}

/// Writes `cell` and every non-embedded descendant, returning its hash.
/// Unlike [`refs::Ref::persist`] the root is stored even when small, so it
/// can be fetched back by hash.
pub fn persist(cell: &Cell, store: &dyn Store) -> Hash {
    refs::persist_children(cell, store);
    store.put(cell.hash(), cell.encoding().clone());
    cell.hash()
}

/// Fetches and decodes one cell, checking the bytes against `hash`.
/// Children stay unresolved.
pub fn fetch(hash: Hash, store: &dyn Store) -> Result<Cell> {
    let encoding = store.get(&hash).ok_or(CoreError::MissingData(hash))?;
    let actual = Hash::digest(&encoding);
    if actual != hash {
        return Err(FormatError::HashMismatch { expected: hash, actual }.into());
    }
    format::decode(&encoding)
}

/// Fetches a cell and everything reachable from it.
pub fn load(hash: Hash, store: &dyn Store) -> Result<Cell> {
    fetch(hash, store)?.load(store)
}
