//! Persistent vector built from 32-element chunks.
//!
//! The shape is a pure function of the element count `n`:
//!
//! * `n <= 32`: a single leaf holding the items.
//! * `n > 32` and a multiple of 32: a packed tree whose children are packed
//!   vectors of the largest power of 32 below `n`, the last possibly smaller.
//! * otherwise: a leaf holding the last `n % 32` items plus a prefix ref to
//!   the packed vector of everything before them.
//!
//! Every chunk except the tail is full, appends copy at most one leaf plus the
//! right spine, and whole chunks are shared between vectors with a common
//! prefix, which is what makes [`Vector::common_prefix_length`] cheap.

use std::ops::Range;

use once_cell::sync::Lazy;

use crate::cell::{Cell, Value};
use crate::error::{invalid, CoreError, Result};
use crate::hash::Hash;
use crate::refs::Ref;

pub const CHUNK_SIZE: usize = 32;
const CHUNK: u64 = CHUNK_SIZE as u64;

static EMPTY: Lazy<Vector> = Lazy::new(|| leaf(0, None, Vec::new()));

/// Node layout of a vector cell.
#[derive(Clone, Debug)]
pub enum VectorNode {
    Leaf { count: u64, prefix: Option<Ref>, items: Vec<Ref> },
    Tree { count: u64, children: Vec<Ref> },
}

impl VectorNode {
    pub fn count(&self) -> u64 {
        match self {
            VectorNode::Leaf { count, .. } | VectorNode::Tree { count, .. } => *count,
        }
    }
}

pub(crate) fn is_tree_count(count: u64) -> bool {
    count > CHUNK && count % CHUNK == 0
}

/// Items held directly by the leaf of a non-tree vector.
pub(crate) fn tail_length(count: u64) -> usize {
    match count {
        0 => 0,
        n if n <= CHUNK => n as usize,
        n => (n % CHUNK) as usize,
    }
}

/// Element count of each full child of a packed tree of `count` elements.
pub(crate) fn tree_child_size(count: u64) -> u64 {
    let mut size = CHUNK;
    while let Some(next) = size.checked_mul(CHUNK) {
        if next >= count {
            break;
        }
        size = next;
    }
    size
}

pub(crate) fn tree_child_count(count: u64) -> usize {
    count.div_ceil(tree_child_size(count)) as usize
}

fn node(cell: &Cell) -> Result<&VectorNode> {
    match cell.value() {
        Value::Vector(n) => Ok(n),
        _ => Err(invalid(format!("expected vector, got tag 0x{:02x}", cell.tag()))),
    }
}

fn leaf(count: u64, prefix: Option<Ref>, items: Vec<Ref>) -> Vector {
    Vector(Cell::from_value(Value::Vector(VectorNode::Leaf { count, prefix, items })))
}

fn tree(count: u64, children: Vec<Ref>) -> Cell {
    Cell::from_value(Value::Vector(VectorNode::Tree { count, children }))
}

/// Packs full chunks (leaves of 32 items) into a single packed vector.
fn pack(chunks: &[Cell]) -> Cell {
    if let [only] = chunks {
        return only.clone();
    }
    let count = chunks.len() as u64 * CHUNK;
    let per_child = (tree_child_size(count) / CHUNK) as usize;
    let children = chunks.chunks(per_child).map(|group| Ref::of(pack(group))).collect();
    tree(count, children)
}

/// Appends a full chunk to a packed vector.
fn append_chunk(packed: &Cell, chunk: Cell) -> Result<Cell> {
    match node(packed)? {
        VectorNode::Leaf { .. } => Ok(tree(2 * CHUNK, vec![Ref::of(packed.clone()), Ref::of(chunk)])),
        VectorNode::Tree { count, children } => {
            let new_count = count + CHUNK;
            let size = tree_child_size(*count);
            if tree_child_size(new_count) != size {
                // full tree: it becomes the first child of a taller one
                return Ok(tree(new_count, vec![Ref::of(packed.clone()), Ref::of(chunk)]));
            }
            let mut children = children.clone();
            let last = children.len() - 1;
            let last_count = count - size * last as u64;
            if last_count < size {
                children[last] = Ref::of(append_chunk(&children[last].cell()?, chunk)?);
            } else {
                children.push(Ref::of(chunk));
            }
            Ok(tree(new_count, children))
        }
    }
}

/// Splits the final chunk off a packed vector.
fn split_last_chunk(packed: &Cell) -> Result<(Option<Cell>, Cell)> {
    match node(packed)? {
        VectorNode::Leaf { .. } => Ok((None, packed.clone())),
        VectorNode::Tree { count, children } => {
            let (last, init) = children.split_last().ok_or_else(|| invalid("empty vector tree"))?;
            let (rest, chunk) = split_last_chunk(&last.cell()?)?;
            let mut children = init.to_vec();
            children.extend(rest.map(Ref::of));
            let rest = match children.as_slice() {
                [only] => only.cell()?,
                _ => tree(count - CHUNK, children),
            };
            Ok((Some(rest), chunk))
        }
    }
}

/// Ref to the packed chunk starting at `offset`, a multiple of 32 inside the
/// packed part of the vector.
fn chunk_ref(cell: &Cell, offset: u64) -> Result<Ref> {
    match node(cell)? {
        VectorNode::Leaf { count, prefix, items } => {
            let prefix_count = count - items.len() as u64;
            match prefix {
                Some(p) if offset < prefix_count => chunk_ref(&p.cell()?, offset),
                _ if offset == 0 && items.len() == CHUNK_SIZE => Ok(Ref::of(cell.clone())),
                _ => Err(CoreError::IndexOutOfBounds { index: offset, count: *count }),
            }
        }
        VectorNode::Tree { count, children } => {
            let size = tree_child_size(*count);
            let child = children
                .get((offset / size) as usize)
                .ok_or(CoreError::IndexOutOfBounds { index: offset, count: *count })?;
            if size == CHUNK {
                Ok(child.clone())
            } else {
                chunk_ref(&child.cell()?, offset % size)
            }
        }
    }
}

fn get_in(cell: &Cell, index: u64) -> Result<Cell> {
    match node(cell)? {
        VectorNode::Leaf { count, prefix, items } => {
            let prefix_count = count - items.len() as u64;
            if index < prefix_count {
                let p = prefix.as_ref().ok_or_else(|| invalid("vector leaf without prefix"))?;
                get_in(&p.cell()?, index)
            } else {
                items
                    .get((index - prefix_count) as usize)
                    .ok_or(CoreError::IndexOutOfBounds { index, count: *count })?
                    .cell()
            }
        }
        VectorNode::Tree { count, children } => {
            let size = tree_child_size(*count);
            let child = children
                .get((index / size) as usize)
                .ok_or(CoreError::IndexOutOfBounds { index, count: *count })?;
            get_in(&child.cell()?, index % size)
        }
    }
}

/// Copy of `cell` with element `index` replaced, rebuilding only the nodes
/// on the path to it.
fn assoc_in(cell: &Cell, index: u64, value: Ref) -> Result<Cell> {
    match node(cell)? {
        VectorNode::Leaf { count, prefix, items } => {
            let prefix_count = count - items.len() as u64;
            if index < prefix_count {
                let p = prefix.as_ref().ok_or_else(|| invalid("vector leaf without prefix"))?;
                let packed = assoc_in(&p.cell()?, index, value)?;
                return Ok(leaf(*count, Some(Ref::of(packed)), items.clone()).0);
            }
            let mut items = items.clone();
            let slot = items
                .get_mut((index - prefix_count) as usize)
                .ok_or(CoreError::IndexOutOfBounds { index, count: *count })?;
            *slot = value;
            Ok(leaf(*count, prefix.clone(), items).0)
        }
        VectorNode::Tree { count, children } => {
            let size = tree_child_size(*count);
            let at = (index / size) as usize;
            let child = children.get(at).ok_or(CoreError::IndexOutOfBounds { index, count: *count })?;
            let child = assoc_in(&child.cell()?, index % size, value)?;
            let mut children = children.clone();
            children[at] = Ref::of(child);
            Ok(tree(*count, children))
        }
    }
}

/// Appends `src[range]` to `out`. While `out` is packed and the source
/// position is chunk aligned, whole chunks are appended by reference.
fn extend_from(mut out: Vector, src: &Vector, range: Range<u64>) -> Result<Vector> {
    let Range { start: mut i, end } = range;
    while i < end {
        if out.is_packed() && i % CHUNK == 0 && i + CHUNK <= end {
            let chunk = chunk_ref(&src.0, i)?.cell()?;
            out = if out.is_empty() { Vector(chunk) } else { Vector(append_chunk(&out.0, chunk)?) };
            i += CHUNK;
        } else {
            out = out.append(src.get(i)?)?;
            i += 1;
        }
    }
    Ok(out)
}

fn expect_child(r: &Ref, count: u64) -> Result<()> {
    if let Ok(c) = r.cell() {
        let n = node(&c)?.count();
        if n != count {
            return Err(invalid(format!("vector child has {n} elements, expected {count}")));
        }
    }
    Ok(())
}

/// Checks the counts of children that are in memory.
pub(crate) fn validate_node(n: &VectorNode) -> Result<()> {
    match n {
        VectorNode::Leaf { count, prefix, items } => {
            if is_tree_count(*count) || items.len() != tail_length(*count) {
                return Err(invalid(format!("leaf shape does not match count {count}")));
            }
            match prefix {
                Some(_) if *count <= CHUNK => Err(invalid("short vector with a prefix")),
                Some(p) => expect_child(p, count - items.len() as u64),
                None if *count == items.len() as u64 => Ok(()),
                None => Err(invalid("vector leaf without prefix")),
            }
        }
        VectorNode::Tree { count, children } => {
            if !is_tree_count(*count) || children.len() != tree_child_count(*count) {
                return Err(invalid(format!("tree shape does not match count {count}")));
            }
            let size = tree_child_size(*count);
            for (i, child) in children.iter().enumerate() {
                let expected = (count - size * i as u64).min(size);
                expect_child(child, expected)?;
            }
            Ok(())
        }
    }
}

/// An immutable vector of cells.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Vector(Cell);

impl Vector {
    pub fn empty() -> Vector {
        EMPTY.clone()
    }

    pub fn of<I: IntoIterator<Item = Cell>>(items: I) -> Vector {
        let refs: Vec<Ref> = items.into_iter().map(Ref::of).collect();
        let n = refs.len() as u64;
        if n <= CHUNK {
            return leaf(n, None, refs);
        }
        let tail = if n % CHUNK == 0 { 0 } else { tail_length(n) };
        let full = refs.len() - tail;
        let chunks: Vec<Cell> = refs[..full]
            .chunks(CHUNK_SIZE)
            .map(|c| leaf(CHUNK, None, c.to_vec()).0)
            .collect();
        let packed = pack(&chunks);
        if tail == 0 {
            Vector(packed)
        } else {
            leaf(n, Some(Ref::of(packed)), refs[full..].to_vec())
        }
    }

    pub fn from_cell(cell: Cell) -> Result<Vector> {
        node(&cell)?;
        Ok(Vector(cell))
    }

    pub fn cell(&self) -> &Cell {
        &self.0
    }

    pub fn into_cell(self) -> Cell {
        self.0
    }

    pub fn hash(&self) -> Hash {
        self.0.hash()
    }

    fn node(&self) -> &VectorNode {
        match self.0.value() {
            Value::Vector(n) => n,
            _ => unreachable!("Vector always wraps a vector cell"),
        }
    }

    pub fn count(&self) -> u64 {
        self.node().count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// True if the vector is made of full chunks only.
    pub fn is_packed(&self) -> bool {
        self.count() % CHUNK == 0
    }

    pub fn get(&self, index: u64) -> Result<Cell> {
        if index >= self.count() {
            return Err(CoreError::IndexOutOfBounds { index, count: self.count() });
        }
        get_in(&self.0, index)
    }

    pub fn append(&self, value: Cell) -> Result<Vector> {
        let r = Ref::of(value);
        match self.node() {
            VectorNode::Leaf { count, prefix, items } if items.len() < CHUNK_SIZE => {
                let mut items = items.clone();
                items.push(r);
                match prefix {
                    Some(p) if items.len() == CHUNK_SIZE => {
                        let chunk = leaf(CHUNK, None, items).0;
                        Ok(Vector(append_chunk(&p.cell()?, chunk)?))
                    }
                    _ => Ok(leaf(count + 1, prefix.clone(), items)),
                }
            }
            node => Ok(leaf(node.count() + 1, Some(Ref::of(self.0.clone())), vec![r])),
        }
    }

    /// Replaces the element at `index`. Only the chunk holding it and the
    /// nodes above that chunk are copied.
    pub fn assoc(&self, index: u64, value: Cell) -> Result<Vector> {
        if index >= self.count() {
            return Err(CoreError::IndexOutOfBounds { index, count: self.count() });
        }
        Ok(Vector(assoc_in(&self.0, index, Ref::of(value))?))
    }

    /// The `length` elements starting at `start`. A chunk-aligned `start`
    /// shares every whole chunk with this vector.
    pub fn slice(&self, start: u64, length: u64) -> Result<Vector> {
        let count = self.count();
        let end = start.checked_add(length).filter(|&end| end <= count).ok_or(CoreError::IndexOutOfBounds {
            index: start.saturating_add(length),
            count,
        })?;
        extend_from(Vector::empty(), self, start..end)
    }

    /// Drops the last element.
    pub fn pop(&self) -> Result<Vector> {
        match self.node() {
            VectorNode::Leaf { count: 0, .. } => Err(CoreError::IndexOutOfBounds { index: 0, count: 0 }),
            VectorNode::Leaf { count, prefix, items } if items.len() > 1 => {
                Ok(leaf(count - 1, prefix.clone(), items[..items.len() - 1].to_vec()))
            }
            VectorNode::Leaf { prefix: Some(p), .. } => Ok(Vector(p.cell()?)),
            VectorNode::Leaf { prefix: None, .. } => Ok(Vector::empty()),
            VectorNode::Tree { count, .. } => {
                let (rest, chunk) = split_last_chunk(&self.0)?;
                let items = match node(&chunk)? {
                    VectorNode::Leaf { items, .. } => items[..CHUNK_SIZE - 1].to_vec(),
                    VectorNode::Tree { .. } => return Err(invalid("vector chunk is a tree")),
                };
                Ok(leaf(count - 1, rest.map(Ref::of), items))
            }
        }
    }

    /// Appends every element of `other`. While this vector is packed, whole
    /// chunks of `other` are appended by reference.
    pub fn concat(&self, other: &Vector) -> Result<Vector> {
        extend_from(self.clone(), other, 0..other.count())
    }

    /// Number of leading elements equal in both vectors. Full chunks are
    /// compared by hash; elements are only compared inside the first chunk
    /// that differs.
    pub fn common_prefix_length(&self, other: &Vector) -> Result<u64> {
        let limit = self.count().min(other.count());
        if self.hash() == other.hash() {
            return Ok(limit);
        }
        let mut i = 0;
        while i + CHUNK <= limit {
            if chunk_ref(&self.0, i)?.hash() != chunk_ref(&other.0, i)?.hash() {
                break;
            }
            i += CHUNK;
        }
        while i < limit && self.get(i)? == other.get(i)? {
            i += 1;
        }
        Ok(i)
    }

    pub fn iter(&self) -> Iter {
        Iter { vector: self.clone(), index: 0, chunk_start: 0, chunk: Vec::new() }
    }

    pub fn to_vec(&self) -> Result<Vec<Cell>> {
        self.iter().collect()
    }

    /// Items of the chunk holding `index`, with the chunk's first index.
    fn chunk_items(&self, index: u64) -> Result<(u64, Vec<Ref>)> {
        let start = index - index % CHUNK;
        let chunk = if start + CHUNK <= self.count() {
            chunk_ref(&self.0, start)?.cell()?
        } else {
            self.0.clone()
        };
        match node(&chunk)? {
            VectorNode::Leaf { items, .. } => Ok((start, items.clone())),
            VectorNode::Tree { .. } => Err(invalid("vector chunk is a tree")),
        }
    }
}

pub struct Iter {
    vector: Vector,
    index: u64,
    chunk_start: u64,
    chunk: Vec<Ref>,
}

impl Iterator for Iter {
    type Item = Result<Cell>;

    fn next(&mut self) -> Option<Result<Cell>> {
        let count = self.vector.count();
        if self.index >= count {
            return None;
        }
        let offset = self.index.wrapping_sub(self.chunk_start);
        if self.index < self.chunk_start || offset >= self.chunk.len() as u64 {
            match self.vector.chunk_items(self.index) {
                Ok((start, items)) => {
                    self.chunk_start = start;
                    self.chunk = items;
                }
                Err(e) => {
                    self.index = count;
                    return Some(Err(e));
                }
            }
        }
        let item = self.chunk.get((self.index - self.chunk_start) as usize).map(Ref::cell);
        self.index += 1;
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.vector.count() - self.index) as usize;
        (left, Some(left))
    }
}

impl From<Vector> for Cell {
    fn from(v: Vector) -> Cell {
        v.0
    }
}
