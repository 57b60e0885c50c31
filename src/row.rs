use crate::error::{CalcResult, CalculationError};
use crate::value::Value;
use std::collections::BTreeSet;
use std::ops::Deref;
use std::sync::Arc;

pub type RowId = u64;

/// Name of the identifier field in imported records.
pub const ID_FIELD: &str = "__ID";

#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub id: RowId,
    fields: Vec<(String, Value)>,
}

impl Row {
    pub fn new(id: RowId, fields: Vec<(String, Value)>) -> Self {
        let fields = fields
            .into_iter()
            .filter(|(name, _)| name != ID_FIELD)
            .collect();
        Row { id, fields }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Fields in import order, never including the id.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// Read-only rows shared between the import layer and every calculation manager.
#[derive(Clone, Debug, Default)]
pub struct RowStore {
    rows: Arc<[Row]>,
}

impl RowStore {
    /// Fails when two rows share an id.
    pub fn new(rows: Vec<Row>) -> CalcResult<Self> {
        let mut seen = BTreeSet::new();
        for row in &rows {
            if !seen.insert(row.id) {
                return Err(CalculationError::InvalidRows(format!(
                    "duplicate row id {}",
                    row.id
                )));
            }
        }
        Ok(RowStore { rows: rows.into() })
    }

    /// Builds rows from field lists, assigning ids 1, 2, 3, ... in order.
    pub fn from_records<I, F>(records: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: IntoIterator<Item = (String, Value)>,
    {
        let rows: Vec<Row> = records
            .into_iter()
            .zip(1..)
            .map(|(fields, id)| Row::new(id, fields.into_iter().collect()))
            .collect();
        RowStore { rows: rows.into() }
    }

    /// Parses a JSON array of objects. A numeric `__ID` is honoured, otherwise the
    /// row gets its 1-based position.
    pub fn from_json_str(json: &str) -> CalcResult<Self> {
        let records: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(json)?;
        let mut rows = Vec::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            let id = match record.get(ID_FIELD) {
                Some(raw) => raw.as_u64().ok_or_else(|| {
                    CalculationError::InvalidRows(format!(
                        "record {} has a non-integer {}",
                        position, ID_FIELD
                    ))
                })?,
                None => position as RowId + 1,
            };
            let fields = record
                .iter()
                .map(|(name, value)| (name.clone(), Value::from(value)))
                .collect();
            rows.push(Row::new(id, fields));
        }
        RowStore::new(rows)
    }

    /// Union of field names across all rows.
    pub fn field_names(&self) -> BTreeSet<&str> {
        self.rows
            .iter()
            .flat_map(|row| row.fields().map(|(name, _)| name))
            .collect()
    }
}

impl Deref for RowStore {
    type Target = [Row];

    fn deref(&self) -> &[Row] {
        &self.rows
    }
}
