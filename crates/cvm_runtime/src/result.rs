//! The Result envelope reported for every transaction or query.

use cvm_data::{Cell, Hash, Keyword, Record, Vector, RESULT_FORMAT};
use serde::Serialize;

use crate::context::{Context, Outcome};
use crate::error::{Result, RuntimeError};
use crate::signal::{describe, Signal};

/// `#Result {:id :result :error-code :trace}` as a cell, with its fields
/// checked once on construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionResult {
    record: Record,
    id: Option<i64>,
    value: Cell,
    error_code: Option<Keyword>,
    trace: Option<Vector>,
}

/// Plain view of a result for diagnostics and JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultSummary {
    pub id: Option<i64>,
    pub hash: Hash,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<String>,
}

impl ExecutionResult {
    /// `id` is a long, or nil when absent. A present `error_code` marks the
    /// result as an error; `value` is then the error message, and only an
    /// error may carry a trace.
    pub fn create(id: Cell, value: Cell, error_code: Option<Keyword>, trace: Option<Vector>) -> Result<Self> {
        let id_long = match id.as_long() {
            Some(n) => Some(n),
            None if id.is_nil() => None,
            None => return Err(RuntimeError::Validation(format!("result id must be a long, got {}", describe(&id)))),
        };
        if trace.is_some() && error_code.is_none() {
            return Err(RuntimeError::Validation("result trace requires an error code".into()));
        }
        let fields = vec![
            id,
            value.clone(),
            error_code.as_ref().map_or_else(Cell::nil, Keyword::to_cell),
            trace.as_ref().map_or_else(Cell::nil, |t| t.cell().clone()),
        ];
        let record = Record::create(&RESULT_FORMAT, fields)?;
        Ok(Self { record, id: id_long, value, error_code, trace })
    }

    /// Validates a decoded result record.
    pub fn from_cell(cell: Cell) -> Result<Self> {
        let record = Record::from_cell(cell)?;
        if record.format() != &RESULT_FORMAT {
            return Err(RuntimeError::Validation(format!("not a result record: {}", describe(record.cell()))));
        }
        let id = record.get(0)?;
        let value = record.get(1)?;
        let code = record.get(2)?;
        let error_code = match code.as_keyword() {
            Some(k) => Some(k.clone()),
            None if code.is_nil() => None,
            None => {
                return Err(RuntimeError::Validation(format!("error code must be a keyword, got {}", describe(&code))))
            }
        };
        let trace = record.get(3)?;
        let trace = if trace.is_nil() {
            None
        } else {
            Some(
                trace
                    .as_vector()
                    .ok_or_else(|| {
                        RuntimeError::Validation(format!("trace must be a vector, got {}", describe(&trace)))
                    })?,
            )
        };
        let created = Self::create(id, value, error_code, trace)?;
        Ok(Self { record, ..created })
    }

    /// Result of the last execution of `ctx`.
    pub fn from_execution(id: Cell, ctx: &Context) -> Result<Self> {
        match ctx.outcome() {
            Outcome::Value(v) => Self::create(id, v.clone(), None, None),
            Outcome::Exceptional(Signal::Error(e)) => {
                let trace = if e.trace.is_empty() {
                    None
                } else {
                    Some(Vector::of(e.trace.iter().filter_map(|line| Cell::string(line).ok())))
                };
                Self::create(id, e.message.clone(), Some(e.code.clone()), trace)
            }
            Outcome::Exceptional(s @ Signal::OutOfJuice) => Self::create(id, Cell::nil(), s.code(), None),
            Outcome::Exceptional(Signal::Halt(v) | Signal::Return(v)) => Self::create(id, v.clone(), None, None),
        }
    }

    pub fn with_id(&self, id: Cell) -> Result<Self> {
        Self::create(id, self.value.clone(), self.error_code.clone(), self.trace.clone())
    }

    pub fn cell(&self) -> &Cell {
        self.record.cell()
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn value(&self) -> &Cell {
        &self.value
    }

    pub fn error_code(&self) -> Option<&Keyword> {
        self.error_code.as_ref()
    }

    pub fn trace(&self) -> Option<&Vector> {
        self.trace.as_ref()
    }

    pub fn is_error(&self) -> bool {
        self.error_code.is_some()
    }

    pub fn summary(&self) -> ResultSummary {
        let trace = self
            .trace
            .as_ref()
            .and_then(|t| t.to_vec().ok())
            .unwrap_or_default()
            .iter()
            .map(|c| c.as_str().map_or_else(|| c.to_string(), str::to_string))
            .collect();
        ResultSummary {
            id: self.id,
            hash: self.cell().hash(),
            value: self.value.to_string(),
            error_code: self.error_code.as_ref().map(ToString::to_string),
            trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvm_data::decode;

    #[test]
    fn id_is_long_or_absent() {
        let r = ExecutionResult::create(Cell::long(3), Cell::long(4), None, None).unwrap();
        assert_eq!(r.id(), Some(3));
        assert!(!r.is_error());

        let anon = ExecutionResult::create(Cell::nil(), Cell::long(4), None, None).unwrap();
        assert_eq!(anon.id(), None);
        assert_eq!(anon.cell().as_record().unwrap().get(0).unwrap(), Cell::nil());
        let back = ExecutionResult::from_cell(decode(anon.cell().encoding()).unwrap()).unwrap();
        assert_eq!(back.id(), None);

        let named = ExecutionResult::create(Cell::string("3").unwrap(), Cell::long(4), None, None);
        assert!(matches!(named, Err(RuntimeError::Validation(_))));
    }

    #[test]
    fn trace_only_on_error() {
        let trace = Vector::of([Cell::string("In function: f").unwrap()]);
        let ok = ExecutionResult::create(Cell::long(1), Cell::long(2), None, Some(trace.clone()));
        assert!(matches!(ok, Err(RuntimeError::Validation(_))));

        let code = Keyword::new("ASSERT").unwrap();
        let err = ExecutionResult::create(Cell::long(1), Cell::nil(), Some(code), Some(trace)).unwrap();
        assert!(err.trace().is_some());

        let stray =
            Record::create(&RESULT_FORMAT, vec![Cell::long(1), Cell::nil(), Cell::nil(), Vector::empty().into_cell()])
                .unwrap();
        assert!(ExecutionResult::from_cell(stray.cell().clone()).is_err());
    }

    #[test]
    fn decodes_back() {
        let code = Keyword::new("ASSERT").unwrap();
        let trace = Vector::of([Cell::string("In function: f").unwrap()]);
        let r = ExecutionResult::create(Cell::long(1), Cell::string("boom").unwrap(), Some(code.clone()), Some(trace))
            .unwrap();
        let back = ExecutionResult::from_cell(decode(r.cell().encoding()).unwrap()).unwrap();
        assert_eq!(back, r);
        assert_eq!(back.error_code(), Some(&code));
        assert!(back.is_error());
    }

    #[test]
    fn rejects_bad_fields() {
        let bad_code = Record::create(&RESULT_FORMAT, vec![Cell::long(1), Cell::nil(), Cell::long(2), Cell::nil()])
            .unwrap();
        assert!(ExecutionResult::from_cell(bad_code.cell().clone()).is_err());
        let bad_id = Record::create(&RESULT_FORMAT, vec![Cell::bool(true), Cell::nil(), Cell::nil(), Cell::nil()])
            .unwrap();
        assert!(ExecutionResult::from_cell(bad_id.cell().clone()).is_err());
        assert!(ExecutionResult::from_cell(Cell::long(1)).is_err());
    }

    #[test]
    fn with_id_changes_only_the_id() {
        let r = ExecutionResult::create(Cell::long(1), Cell::long(9), None, None).unwrap();
        let s = r.with_id(Cell::long(2)).unwrap();
        assert_eq!(s.id(), Some(2));
        assert_eq!(r.with_id(Cell::nil()).unwrap().id(), None);
        assert_eq!(s.value(), r.value());
        assert_ne!(s.cell(), r.cell());
    }

    #[test]
    fn summary_json() {
        let code = Keyword::new("CAST").unwrap();
        let r = ExecutionResult::create(Cell::long(5), Cell::string("bad").unwrap(), Some(code), None).unwrap();
        let json = serde_json::to_value(r.summary()).unwrap();
        assert_eq!(json["id"], 5);
        assert_eq!(json["hash"], r.cell().hash().to_hex());
        assert_eq!(json["error_code"], ":CAST");
        assert_eq!(json["value"], "\"bad\"");
        assert!(json.get("trace").is_none());

        let anon = ExecutionResult::create(Cell::nil(), Cell::long(1), None, None).unwrap();
        assert!(serde_json::to_value(anon.summary()).unwrap()["id"].is_null());
    }
}
