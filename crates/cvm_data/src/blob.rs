use std::fmt;
use std::ops::{Deref, Range};
use std::sync::Arc;

/// Immutable byte string backed by a shared buffer.
///
/// Slicing never copies: a cell decoded out of a larger message keeps a view
/// into the message buffer as its cached encoding.
#[derive(Clone)]
pub struct Blob {
    data: Arc<[u8]>,
    start: usize,
    end: usize,
}

impl Blob {
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let end = bytes.len();
        Blob { data: bytes.into(), start: 0, end }
    }

    pub fn empty() -> Self {
        Blob::from_vec(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    /// Sub-range view sharing this blob's buffer. Panics if out of range,
    /// like slice indexing.
    pub fn slice(&self, range: Range<usize>) -> Blob {
        assert!(range.start <= range.end && range.end <= self.len());
        Blob {
            data: Arc::clone(&self.data),
            start: self.start + range.start,
            end: self.start + range.end,
        }
    }

    /// True if both blobs view the same bytes of the same buffer.
    pub fn same_buffer(&self, other: &Blob) -> bool {
        Arc::ptr_eq(&self.data, &other.data) && self.start == other.start && self.end == other.end
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.as_slice())
    }

    pub fn from_hex(s: &str) -> Option<Blob> {
        hex::decode(s).ok().map(Blob::from_vec)
    }
}

impl Deref for Blob {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for Blob {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for Blob {}

impl From<&[u8]> for Blob {
    fn from(bytes: &[u8]) -> Self {
        Blob::from_vec(bytes.to_vec())
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blob(0x{})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_share_buffer() {
        let b = Blob::from_vec(vec![1, 2, 3, 4, 5]);
        let s = b.slice(1..4);
        assert_eq!(&*s, &[2, 3, 4]);
        let t = s.slice(1..2);
        assert_eq!(&*t, &[3]);
        assert!(s.same_buffer(&b.slice(1..4)));
        assert!(!s.same_buffer(&Blob::from_vec(vec![2, 3, 4])));
        assert_eq!(s, Blob::from_vec(vec![2, 3, 4]));
    }
}
