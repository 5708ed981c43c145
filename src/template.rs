//! Template schema model, loading, and fingerprinting.
//!
//! A [`TemplateSchema`] describes one bank's form for one property template:
//! an ordered tree of tabs, sections, and fields. Fields are either scalars,
//! groups carrying an ordered list of sub-fields, or dynamic table hints.
//!
//! ## Responsibilities
//!
//! - YAML (`serde_yaml`) and JSON (`serde_json`) loading, chosen by extension
//! - Structural validation on load (ids, group/sub-field consistency)
//! - Rejecting ambiguous templates through the location index
//! - A stable SHA-256 fingerprint tying persisted indexes to their template

use std::{
    fmt,
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::index::FieldLocationIndex;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    #[default]
    Scalar,
    Group,
    DynamicTableHint,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Scalar => "scalar",
            FieldKind::Group => "group",
            FieldKind::DynamicTableHint => "dynamic-table-hint",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubField {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Field {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_fields: Vec<SubField>,
}

impl Field {
    pub fn scalar(id: &str) -> Self {
        Field {
            id: id.to_string(),
            label: None,
            kind: FieldKind::Scalar,
            sub_fields: Vec::new(),
        }
    }

    pub fn table_hint(id: &str) -> Self {
        Field {
            kind: FieldKind::DynamicTableHint,
            ..Field::scalar(id)
        }
    }

    pub fn group(id: &str, sub_fields: &[&str]) -> Self {
        Field {
            id: id.to_string(),
            label: None,
            kind: FieldKind::Group,
            sub_fields: sub_fields
                .iter()
                .map(|sub| SubField {
                    id: sub.to_string(),
                    label: None,
                })
                .collect(),
        }
    }

    pub fn is_group(&self) -> bool {
        self.kind == FieldKind::Group
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Section {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tab {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub sections: Vec<Section>,
}

/// Identity of a template independent of its version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaKey {
    pub bank_code: String,
    pub template_id: String,
}

impl fmt::Display for SchemaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bank_code, self.template_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateSchema {
    pub bank_code: String,
    pub template_id: String,
    pub version: String,
    #[serde(default)]
    pub tabs: Vec<Tab>,
}

impl TemplateSchema {
    pub fn key(&self) -> SchemaKey {
        SchemaKey {
            bank_code: self.bank_code.clone(),
            template_id: self.template_id.clone(),
        }
    }

    /// Iterates every top-level field together with its tab and section.
    pub fn fields(&self) -> impl Iterator<Item = (&Tab, &Section, &Field)> {
        self.tabs.iter().flat_map(|tab| {
            tab.sections
                .iter()
                .flat_map(move |section| section.fields.iter().map(move |field| (tab, section, field)))
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening template file {path:?}"))?;
        let reader = BufReader::new(file);
        let schema: TemplateSchema = if is_json_path(path) {
            serde_json::from_reader(reader).context("Parsing template JSON")?
        } else {
            serde_yaml::from_reader(reader).context("Parsing template YAML")?
        };
        schema
            .validate()
            .with_context(|| format!("Validating template {path:?}"))?;
        Ok(schema)
    }

    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let schema: TemplateSchema =
            serde_yaml::from_str(input).context("Parsing template YAML")?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file =
            File::create(path).with_context(|| format!("Creating template file {path:?}"))?;
        let writer = BufWriter::new(file);
        if is_json_path(path) {
            serde_json::to_writer_pretty(writer, self).context("Writing template JSON")
        } else {
            serde_yaml::to_writer(writer, self).context("Writing template YAML")
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.bank_code.trim().is_empty(),
            "Template is missing a bank_code"
        );
        ensure!(
            !self.template_id.trim().is_empty(),
            "Template is missing a template_id"
        );
        ensure!(
            !self.version.trim().is_empty(),
            "Template {} is missing a version",
            self.key()
        );
        for tab in &self.tabs {
            ensure!(!tab.id.trim().is_empty(), "Tab id cannot be empty");
            for section in &tab.sections {
                ensure!(
                    !section.id.trim().is_empty(),
                    "Section id cannot be empty in tab '{}'",
                    tab.id
                );
                for field in &section.fields {
                    validate_field(tab, section, field)?;
                }
            }
        }
        FieldLocationIndex::build(self)?;
        Ok(())
    }

    /// SHA-256 over every structural element of the template, hex encoded.
    ///
    /// Labels participate so that a relabelled template invalidates indexes
    /// persisted for the old one.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        let mut feed = |tag: &str, value: &str| {
            hasher.update(tag.as_bytes());
            hasher.update([0x1f]);
            hasher.update(value.as_bytes());
            hasher.update([0x1e]);
        };
        feed("bank", &self.bank_code);
        feed("template", &self.template_id);
        feed("version", &self.version);
        for tab in &self.tabs {
            feed("tab", &tab.id);
            feed("label", tab.label.as_deref().unwrap_or_default());
            for section in &tab.sections {
                feed("section", &section.id);
                feed("label", section.label.as_deref().unwrap_or_default());
                for field in &section.fields {
                    feed("field", &field.id);
                    feed("kind", field.kind.as_str());
                    feed("label", field.label.as_deref().unwrap_or_default());
                    for sub in &field.sub_fields {
                        feed("sub", &sub.id);
                        feed("label", sub.label.as_deref().unwrap_or_default());
                    }
                }
            }
        }
        hasher
            .finalize()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect()
    }
}

fn validate_field(tab: &Tab, section: &Section, field: &Field) -> Result<()> {
    let place = format!("{}/{}", tab.id, section.id);
    ensure!(
        !field.id.trim().is_empty(),
        "Field id cannot be empty in '{place}'"
    );
    match field.kind {
        FieldKind::Group => {
            ensure!(
                !field.sub_fields.is_empty(),
                "Group field '{}' in '{place}' must declare at least one sub-field",
                field.id
            );
            for sub in &field.sub_fields {
                ensure!(
                    !sub.id.trim().is_empty(),
                    "Sub-field id cannot be empty in group '{}'",
                    field.id
                );
            }
        }
        kind => ensure!(
            field.sub_fields.is_empty(),
            "Field '{}' in '{place}' is of kind {kind} and cannot declare sub-fields",
            field.id
        ),
    }
    Ok(())
}

pub(crate) fn is_json_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
