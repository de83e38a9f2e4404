//! Small immutable hash-ordered map.
//!
//! Entries are kept sorted by key hash, which gives every map a single
//! canonical encoding. The whole map must fit in one cell encoding; larger
//! maps are a validation error.

use once_cell::sync::Lazy;

use crate::cell::{Cell, Value};
use crate::error::{invalid, CoreError, Result};
use crate::format::LIMIT_ENCODING_LENGTH;
use crate::refs::Ref;

static EMPTY: Lazy<Map> = Lazy::new(|| Map(Cell::from_value(Value::Map(MapNode { entries: Vec::new() }))));

#[derive(Clone, Debug)]
pub struct MapNode {
    pub(crate) entries: Vec<(Ref, Ref)>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Map(Cell);

impl Map {
    pub fn empty() -> Map {
        EMPTY.clone()
    }

    /// Builds a map; for repeated keys the last value wins.
    pub fn from_entries<I: IntoIterator<Item = (Cell, Cell)>>(entries: I) -> Result<Map> {
        let mut sorted: Vec<(Ref, Ref)> = Vec::new();
        for (k, v) in entries {
            insert(&mut sorted, Ref::of(k), Ref::of(v));
        }
        build(sorted)
    }

    pub fn from_cell(cell: Cell) -> Result<Map> {
        match cell.value() {
            Value::Map(_) => Ok(Map(cell)),
            _ => Err(invalid(format!("expected map, got tag 0x{:02x}", cell.tag()))),
        }
    }

    fn node(&self) -> &MapNode {
        match self.0.value() {
            Value::Map(m) => m,
            _ => unreachable!("Map always wraps a map cell"),
        }
    }

    pub fn cell(&self) -> &Cell {
        &self.0
    }

    pub fn into_cell(self) -> Cell {
        self.0
    }

    pub fn count(&self) -> usize {
        self.node().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn get(&self, key: &Cell) -> Result<Option<Cell>> {
        let entries = &self.node().entries;
        match entries.binary_search_by(|(k, _)| k.hash().cmp(&key.hash())) {
            Ok(i) => entries[i].1.cell().map(Some),
            Err(_) => Ok(None),
        }
    }

    pub fn contains_key(&self, key: &Cell) -> bool {
        let h = key.hash();
        self.node().entries.binary_search_by(|(k, _)| k.hash().cmp(&h)).is_ok()
    }

    pub fn assoc(&self, key: Cell, value: Cell) -> Result<Map> {
        let mut entries = self.node().entries.clone();
        insert(&mut entries, Ref::of(key), Ref::of(value));
        build(entries)
    }

    pub fn dissoc(&self, key: &Cell) -> Result<Map> {
        let h = key.hash();
        let mut entries = self.node().entries.clone();
        match entries.binary_search_by(|(k, _)| k.hash().cmp(&h)) {
            Ok(i) => {
                entries.remove(i);
                build(entries)
            }
            Err(_) => Ok(self.clone()),
        }
    }

    /// Entries in canonical (key hash) order.
    pub fn entries(&self) -> Result<Vec<(Cell, Cell)>> {
        self.node()
            .entries
            .iter()
            .map(|(k, v)| -> Result<(Cell, Cell)> { Ok((k.cell()?, v.cell()?)) })
            .collect()
    }
}

fn insert(entries: &mut Vec<(Ref, Ref)>, key: Ref, value: Ref) {
    let h = key.hash();
    match entries.binary_search_by(|(k, _)| k.hash().cmp(&h)) {
        Ok(i) => entries[i].1 = value,
        Err(i) => entries.insert(i, (key, value)),
    }
}

fn build(entries: Vec<(Ref, Ref)>) -> Result<Map> {
    let cell = Cell::from_value(Value::Map(MapNode { entries }));
    if cell.encoding_length() > LIMIT_ENCODING_LENGTH {
        return Err(CoreError::Validation(format!(
            "map encoding of {} bytes exceeds {LIMIT_ENCODING_LENGTH}",
            cell.encoding_length()
        )));
    }
    Ok(Map(cell))
}

impl From<Map> for Cell {
    fn from(m: Map) -> Cell {
        m.0
    }
}
