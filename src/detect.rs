//! Dynamic table detection.
//!
//! Detection is structural first: an ordered list of [`Detector`]s decides
//! whether a value is tabular. Field-name hints never force or veto a table;
//! they are recorded on accepted tables as a confidence marker only.

use std::collections::BTreeMap;

use log::{debug, warn};
use regex::Regex;
use serde_json::{Map, Value};

use crate::{
    classify::FlatMap,
    table::{ColumnType, TableColumn, TableDefinition, TableOrigin, TableRow},
};

const DEFAULT_HINT_WORDS: &[&str] = &["table", "list", "items", "rows", "specifications"];

pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Builds a table when `value` passes this detector's structural test.
    fn detect(&self, value: &Value) -> Option<TableDefinition>;
}

/// Accepts a non-empty sequence of records where each record has at least
/// two keys. Columns follow the first record's key order.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordSequenceDetector;

impl Detector for RecordSequenceDetector {
    fn name(&self) -> &'static str {
        "record-sequence"
    }

    fn detect(&self, value: &Value) -> Option<TableDefinition> {
        let records = value.as_array()?;
        let first = records.first()?.as_object()?;
        let rows = records
            .iter()
            .map(|record| record.as_object().filter(|row| row.len() >= 2).cloned())
            .collect::<Option<Vec<TableRow>>>()?;
        let columns = first
            .iter()
            .map(|(id, sample)| TableColumn::new(id, Some(sample)))
            .collect();
        Some(TableDefinition::new(columns, rows, TableOrigin::Records))
    }
}

/// Accepts an object that carries both `rows` (a sequence of records) and
/// `columns` (ids, or objects with an `id`).
#[derive(Debug, Default, Clone, Copy)]
pub struct ExplicitTableDetector;

impl Detector for ExplicitTableDetector {
    fn name(&self) -> &'static str {
        "explicit"
    }

    fn detect(&self, value: &Value) -> Option<TableDefinition> {
        let object = value.as_object()?;
        let raw_rows = object.get("rows")?.as_array()?;
        let raw_columns = object.get("columns")?;
        let rows = raw_rows
            .iter()
            .map(|row| row.as_object().cloned())
            .collect::<Option<Vec<TableRow>>>()?;
        let first_row = rows.first();
        let columns = raw_columns
            .as_array()?
            .iter()
            .map(|column| explicit_column(column, first_row))
            .collect::<Option<Vec<_>>>()?;
        let extra = object
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), "rows" | "columns"))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect::<Map<String, Value>>();
        Some(TableDefinition::new(
            columns,
            rows,
            TableOrigin::Explicit {
                columns: raw_columns.clone(),
                extra,
            },
        ))
    }
}

fn explicit_column(column: &Value, first_row: Option<&TableRow>) -> Option<TableColumn> {
    match column {
        Value::String(id) if !id.is_empty() => {
            Some(TableColumn::new(id, first_row.and_then(|row| row.get(id))))
        }
        Value::Object(definition) => {
            let id = definition.get("id")?.as_str().filter(|id| !id.is_empty())?;
            let mut built = TableColumn::new(id, first_row.and_then(|row| row.get(id)));
            if let Some(name) = definition
                .get("name")
                .or_else(|| definition.get("label"))
                .and_then(Value::as_str)
            {
                built.name = name.to_string();
            }
            if let Some(declared) = definition
                .get("type")
                .and_then(Value::as_str)
                .and_then(ColumnType::parse)
            {
                built.column_type = declared;
            }
            Some(built)
        }
        _ => None,
    }
}

/// Case-insensitive field-id words that suggest a table.
#[derive(Debug, Clone)]
pub struct NameHints {
    pattern: Option<Regex>,
}

impl NameHints {
    pub fn from_words(words: &[&str]) -> Result<Self, regex::Error> {
        let alternation = words
            .iter()
            .filter(|word| !word.is_empty())
            .map(|word| regex::escape(word))
            .collect::<Vec<_>>()
            .join("|");
        if alternation.is_empty() {
            return Ok(NameHints { pattern: None });
        }
        let pattern = Regex::new(&format!("(?i)({alternation})"))?;
        Ok(NameHints {
            pattern: Some(pattern),
        })
    }

    pub fn matches(&self, field_id: &str) -> bool {
        self.pattern
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(field_id))
    }
}

impl Default for NameHints {
    fn default() -> Self {
        NameHints::from_words(DEFAULT_HINT_WORDS).unwrap_or_else(|err| {
            warn!("Table name hints disabled: {err}");
            NameHints { pattern: None }
        })
    }
}

pub struct TableDetector {
    detectors: Vec<Box<dyn Detector>>,
    hints: NameHints,
}

impl Default for TableDetector {
    fn default() -> Self {
        TableDetector::new(NameHints::default())
            .with_detector(Box::new(RecordSequenceDetector))
            .with_detector(Box::new(ExplicitTableDetector))
    }
}

impl TableDetector {
    /// A detector with no structural checks; add them with [`with_detector`].
    ///
    /// [`with_detector`]: TableDetector::with_detector
    pub fn new(hints: NameHints) -> Self {
        TableDetector {
            detectors: Vec::new(),
            hints,
        }
    }

    /// Appends a structural check, evaluated after those already registered.
    pub fn with_detector(mut self, detector: Box<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|detector| detector.name()).collect()
    }

    /// Runs the structural checks in order. `schema_hint` marks fields the
    /// template declares as dynamic tables.
    pub fn inspect(&self, field_id: &str, value: &Value, schema_hint: bool) -> Option<TableDefinition> {
        let name_hint = schema_hint || self.hints.matches(field_id);
        for detector in &self.detectors {
            if let Some(mut table) = detector.detect(value) {
                table.metadata.detector = detector.name().to_string();
                table.metadata.name_hint = name_hint;
                debug!(
                    "'{field_id}' accepted as a {}x{} table by {}",
                    table.metadata.row_count,
                    table.metadata.column_count,
                    detector.name()
                );
                return Some(table);
            }
        }
        if name_hint {
            debug!("'{field_id}' is named like a table but failed every structural check");
        }
        None
    }

    /// Splits unclassified values into accepted tables and the untouched rest.
    pub fn detect_tables(&self, unclassified: FlatMap) -> (BTreeMap<String, TableDefinition>, FlatMap) {
        let mut tables = BTreeMap::new();
        let mut remaining = FlatMap::new();
        for (field_id, value) in unclassified {
            match self.inspect(&field_id, &value, false) {
                Some(table) => {
                    tables.insert(field_id, table);
                }
                None => {
                    remaining.insert(field_id, value);
                }
            }
        }
        (tables, remaining)
    }
}
