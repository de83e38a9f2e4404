//! Fixed-arity records identified by their tag.

use crate::cell::{Cell, Value};
use crate::error::{invalid, CoreError, Result};
use crate::refs::Ref;
use crate::tag;

#[derive(Debug, PartialEq, Eq)]
pub struct RecordFormat {
    pub tag: u8,
    pub name: &'static str,
    pub keys: &'static [&'static str],
}

pub static RESULT_FORMAT: RecordFormat = RecordFormat {
    tag: tag::RESULT,
    name: "Result",
    keys: &["id", "result", "error-code", "trace"],
};

static FORMATS: [&RecordFormat; 1] = [&RESULT_FORMAT];

impl RecordFormat {
    pub fn for_tag(t: u8) -> Option<&'static RecordFormat> {
        FORMATS.iter().copied().find(|f| f.tag == t)
    }

    pub fn arity(&self) -> usize {
        self.keys.len()
    }

    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.keys.iter().position(|k| *k == key)
    }
}

#[derive(Clone, Debug)]
pub struct RecordNode {
    pub(crate) format: &'static RecordFormat,
    pub(crate) fields: Vec<Ref>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Record(Cell);

impl Record {
    pub fn create(format: &'static RecordFormat, fields: Vec<Cell>) -> Result<Record> {
        if fields.len() != format.arity() {
            return Err(CoreError::Validation(format!(
                "{} record needs {} fields, got {}",
                format.name,
                format.arity(),
                fields.len()
            )));
        }
        let fields = fields.into_iter().map(Ref::of).collect();
        Ok(Record(Cell::from_value(Value::Record(RecordNode { format, fields }))))
    }

    pub fn from_cell(cell: Cell) -> Result<Record> {
        match cell.value() {
            Value::Record(_) => Ok(Record(cell)),
            _ => Err(invalid(format!("expected record, got tag 0x{:02x}", cell.tag()))),
        }
    }

    fn node(&self) -> &RecordNode {
        match self.0.value() {
            Value::Record(r) => r,
            _ => unreachable!("Record always wraps a record cell"),
        }
    }

    pub fn format(&self) -> &'static RecordFormat {
        self.node().format
    }

    pub fn get(&self, index: usize) -> Result<Cell> {
        let fields = &self.node().fields;
        fields
            .get(index)
            .ok_or(CoreError::IndexOutOfBounds { index: index as u64, count: fields.len() as u64 })?
            .cell()
    }

    pub fn get_field(&self, key: &str) -> Result<Option<Cell>> {
        self.format().index_of(key).map(|i| self.get(i)).transpose()
    }

    pub fn cell(&self) -> &Cell {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormatError;
    use crate::format::decode_bytes;

    #[test]
    fn arity_is_checked_on_create() {
        assert!(Record::create(&RESULT_FORMAT, vec![Cell::nil(); 3]).is_err());
        let r = Record::create(&RESULT_FORMAT, vec![Cell::long(1), Cell::nil(), Cell::nil(), Cell::nil()]).unwrap();
        assert_eq!(r.get_field("id").unwrap(), Some(Cell::long(1)));
        assert_eq!(r.get_field("nope").unwrap(), None);
        assert_eq!(r.cell().encoding().as_slice(), &[0xad, 0x04, 0x09, 0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn arity_is_checked_on_decode() {
        let err = decode_bytes(&[0xad, 0x03, 0x00, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, CoreError::Format(FormatError::Invalid(_))));
    }
}
