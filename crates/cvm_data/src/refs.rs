//! Handles from a parent cell to its children.

use std::fmt;

use crate::cell::Cell;
use crate::error::{CoreError, FormatError, Result};
use crate::hash::Hash;
use crate::store::{self, Store};

#[derive(Clone)]
enum Repr {
    /// Small enough to be written inline in the parent.
    Embedded(Cell),
    /// In memory, written by hash, not known to be stored.
    Direct(Cell),
    /// Identified by hash; the value is a cache that may be absent.
    Soft { hash: Hash, value: Option<Cell> },
}

/// Reference to a child cell. Equality is by hash, whatever the state.
#[derive(Clone)]
pub struct Ref(Repr);

impl Ref {
    /// Embeds `cell` if its encoding fits, otherwise refers to it directly.
    pub fn of(cell: Cell) -> Ref {
        if cell.is_embedded() {
            Ref(Repr::Embedded(cell))
        } else {
            Ref(Repr::Direct(cell))
        }
    }

    /// A reference known only by hash.
    pub fn soft(hash: Hash) -> Ref {
        Ref(Repr::Soft { hash, value: None })
    }

    pub fn hash(&self) -> Hash {
        match &self.0 {
            Repr::Embedded(c) | Repr::Direct(c) => c.hash(),
            Repr::Soft { hash, .. } => *hash,
        }
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self.0, Repr::Embedded(_))
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.0, Repr::Embedded(_) | Repr::Direct(_))
    }

    pub fn is_soft(&self) -> bool {
        matches!(self.0, Repr::Soft { .. })
    }

    /// True if the referenced cell and all of its children are in memory.
    pub fn is_loaded(&self) -> bool {
        match &self.0 {
            Repr::Embedded(c) | Repr::Direct(c) => c.is_loaded(),
            Repr::Soft { value: Some(c), .. } => c.is_loaded(),
            Repr::Soft { value: None, .. } => false,
        }
    }

    /// The referenced cell if it is held in memory.
    pub fn cell(&self) -> Result<Cell> {
        match &self.0 {
            Repr::Embedded(c) | Repr::Direct(c) => Ok(c.clone()),
            Repr::Soft { value: Some(c), .. } => Ok(c.clone()),
            Repr::Soft { hash, value: None } => Err(CoreError::MissingData(*hash)),
        }
    }

    /// The referenced cell, fetched from `store` if only the hash is known.
    pub fn resolve(&self, store: &dyn Store) -> Result<Cell> {
        match &self.0 {
            Repr::Soft { hash, value: None } => {
                let cell = store::fetch(*hash, store)?;
                if cell.is_embedded() {
                    return Err(FormatError::NonCanonical("embeddable value referenced by hash").into());
                }
                Ok(cell)
            }
            _ => self.cell(),
        }
    }

    /// Deep resolution: the returned ref has every transitive child in memory.
    pub fn load(&self, store: &dyn Store) -> Result<Ref> {
        if self.is_loaded() {
            return Ok(self.clone());
        }
        Ok(match &self.0 {
            Repr::Embedded(c) => Ref(Repr::Embedded(c.load(store)?)),
            Repr::Direct(c) => Ref(Repr::Direct(c.load(store)?)),
            Repr::Soft { hash, value } => {
                let cell = match value {
                    Some(c) => c.clone(),
                    None => self.resolve(store)?,
                };
                Ref(Repr::Soft { hash: *hash, value: Some(cell.load(store)?) })
            }
        })
    }

    /// Writes the referenced cell, children first, to `store`. Embedded
    /// values live inside their parent, so only their children are written.
    /// Returns a soft ref that still caches the value.
    pub fn persist(&self, store: &dyn Store) -> Ref {
        match &self.0 {
            Repr::Embedded(c) => {
                persist_children(c, store);
                self.clone()
            }
            Repr::Direct(c) => {
                persist_children(c, store);
                store.put(c.hash(), c.encoding().clone());
                Ref(Repr::Soft { hash: c.hash(), value: Some(c.clone()) })
            }
            Repr::Soft { .. } => self.clone(),
        }
    }

    /// Drops the cached value of a soft ref. Other states are returned as is.
    pub fn evict(&self) -> Ref {
        match &self.0 {
            Repr::Soft { hash, .. } => Ref::soft(*hash),
            _ => self.clone(),
        }
    }
}

pub(crate) fn persist_children(cell: &Cell, store: &dyn Store) {
    for child in cell.refs() {
        child.persist(store);
    }
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Ref {}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Repr::Embedded(c) => write!(f, "Ref::Embedded({c})"),
            Repr::Direct(c) => write!(f, "Ref::Direct({:?})", c.hash()),
            Repr::Soft { hash, value } => write!(f, "Ref::Soft({hash:?}, loaded={})", value.is_some()),
        }
    }
}
