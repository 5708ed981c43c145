//! Dynamic table definitions and their text rendering.

use std::fmt::Write as _;

use chrono::NaiveDate;
use heck::ToTitleCase;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type TableRow = Map<String, Value>;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Number,
    Boolean,
    Date,
}

impl ColumnType {
    /// Infers a column type from a sample cell.
    pub fn infer(cell: &Value) -> Self {
        match cell {
            Value::Number(_) => ColumnType::Number,
            Value::Bool(_) => ColumnType::Boolean,
            Value::String(text) if looks_like_date(text) => ColumnType::Date,
            _ => ColumnType::Text,
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "text" | "string" => Some(ColumnType::Text),
            "number" | "integer" | "float" | "decimal" => Some(ColumnType::Number),
            "boolean" | "bool" => Some(ColumnType::Boolean),
            "date" => Some(ColumnType::Date),
            _ => None,
        }
    }
}

fn looks_like_date(value: &str) -> bool {
    let trimmed = value.trim();
    DATE_FORMATS
        .iter()
        .any(|fmt| NaiveDate::parse_from_str(trimmed, fmt).is_ok())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableColumn {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl TableColumn {
    pub fn new(id: &str, sample: Option<&Value>) -> Self {
        TableColumn {
            id: id.to_string(),
            name: id.to_title_case(),
            column_type: sample.map(ColumnType::infer).unwrap_or(ColumnType::Text),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableStructure {
    pub columns: Vec<TableColumn>,
}

/// Shape the table value had when it was submitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "shape", rename_all = "kebab-case")]
pub enum TableOrigin {
    /// A plain sequence of records.
    Records,
    /// An object carrying `rows` and `columns`; other keys are kept aside.
    Explicit {
        columns: Value,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        extra: Map<String, Value>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableMetadata {
    pub row_count: usize,
    pub column_count: usize,
    pub editable: bool,
    pub insertable: bool,
    pub deletable: bool,
    pub detector: String,
    pub name_hint: bool,
    /// Also stored under `data` at the field's template location.
    pub located: bool,
    pub origin: TableOrigin,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableDefinition {
    pub structure: TableStructure,
    pub rows: Vec<TableRow>,
    pub metadata: TableMetadata,
}

impl TableDefinition {
    pub fn new(columns: Vec<TableColumn>, rows: Vec<TableRow>, origin: TableOrigin) -> Self {
        TableDefinition {
            metadata: TableMetadata {
                row_count: rows.len(),
                column_count: columns.len(),
                editable: true,
                insertable: true,
                deletable: true,
                detector: String::new(),
                name_hint: false,
                located: false,
                origin,
            },
            structure: TableStructure { columns },
            rows,
        }
    }

    pub fn columns(&self) -> &[TableColumn] {
        &self.structure.columns
    }

    /// Rebuilds the value exactly as it was submitted.
    pub fn to_value(&self) -> Value {
        let rows = Value::Array(self.rows.iter().cloned().map(Value::Object).collect());
        match &self.metadata.origin {
            TableOrigin::Records => rows,
            TableOrigin::Explicit { columns, extra } => {
                let mut object = extra.clone();
                object.insert("columns".to_string(), columns.clone());
                object.insert("rows".to_string(), rows);
                Value::Object(object)
            }
        }
    }

    /// Row cells as display strings, one entry per declared column.
    pub fn grid(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns()
                    .iter()
                    .map(|column| row.get(&column.id).map(cell_text).unwrap_or_default())
                    .collect()
            })
            .collect()
    }
}

pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Renders a table as an aligned text grid headed by the column names.
pub fn render_table(table: &TableDefinition) -> String {
    let headers = table
        .columns()
        .iter()
        .map(|column| column.name.clone())
        .collect::<Vec<_>>();
    render_grid(&headers, &table.grid())
}

pub fn render_grid(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(display_width(cell));
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", render_line(headers, &widths));
    let rule_widths = widths.iter().map(|width| (*width).max(3)).collect::<Vec<_>>();
    let rule = rule_widths
        .iter()
        .map(|width| "-".repeat(*width))
        .collect::<Vec<_>>();
    let _ = writeln!(output, "{}", render_line(&rule, &rule_widths));
    for row in rows {
        let _ = writeln!(output, "{}", render_line(row, &widths));
    }
    output
}

fn render_line(cells: &[String], widths: &[usize]) -> String {
    let mut line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let flat = cell.replace(['\n', '\r', '\t'], " ");
            let pad = width.saturating_sub(display_width(&flat));
            format!("{flat}{}", " ".repeat(pad))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.truncate(line.trim_end().len());
    line
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}
