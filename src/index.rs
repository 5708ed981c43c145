//! Field location index built from a template schema.
//!
//! The index maps every field id (including group sub-fields) to the tab and
//! section that own it. It is immutable once built, so a single instance can
//! be shared across threads behind an `Arc`. [`IndexCache`] is the
//! caller-owned build-once, read-many holder keyed by template identity.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
    fs::File,
    io::BufWriter,
    path::Path,
    sync::{Arc, PoisonError, RwLock},
};

use anyhow::{Context, Result, anyhow};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::{OrganizeError, OrganizeResult},
    template::{FieldKind, SchemaKey, TemplateSchema},
};

const INDEX_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldLocation {
    pub tab_id: String,
    pub section_id: String,
    pub parent_group_id: Option<String>,
}

impl FieldLocation {
    fn new(tab_id: &str, section_id: &str) -> Self {
        FieldLocation {
            tab_id: tab_id.to_string(),
            section_id: section_id.to_string(),
            parent_group_id: None,
        }
    }

    fn within_group(&self, group_id: &str) -> Self {
        FieldLocation {
            parent_group_id: Some(group_id.to_string()),
            ..self.clone()
        }
    }

    pub fn path(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FieldLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tab_id, self.section_id)?;
        if let Some(group) = &self.parent_group_id {
            write!(f, "/{group}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedField {
    pub location: FieldLocation,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLocationIndex {
    format_version: u32,
    schema_key: SchemaKey,
    schema_version: String,
    fingerprint: String,
    fields: BTreeMap<String, IndexedField>,
    order: Vec<String>,
    groups: BTreeMap<String, Vec<String>>,
    tabs: BTreeSet<String>,
    sections: BTreeSet<String>,
}

impl FieldLocationIndex {
    pub fn build(schema: &TemplateSchema) -> OrganizeResult<Self> {
        let mut index = FieldLocationIndex {
            format_version: INDEX_FORMAT_VERSION,
            schema_key: schema.key(),
            schema_version: schema.version.clone(),
            fingerprint: schema.fingerprint(),
            fields: BTreeMap::new(),
            order: Vec::new(),
            groups: BTreeMap::new(),
            tabs: BTreeSet::new(),
            sections: BTreeSet::new(),
        };

        for tab in &schema.tabs {
            index.tabs.insert(tab.id.clone());
            for section in &tab.sections {
                index.sections.insert(section.id.clone());
                let location = FieldLocation::new(&tab.id, &section.id);
                for field in &section.fields {
                    index.insert(&field.id, location.clone(), field.kind)?;
                    if field.is_group() {
                        let nested = location.within_group(&field.id);
                        let mut members = Vec::with_capacity(field.sub_fields.len());
                        for sub in &field.sub_fields {
                            index.insert(&sub.id, nested.clone(), FieldKind::Scalar)?;
                            members.push(sub.id.clone());
                        }
                        index.groups.insert(field.id.clone(), members);
                    }
                }
            }
        }

        debug!(
            "Indexed {} field(s) across {} tab(s) for template {} v{}",
            index.fields.len(),
            index.tabs.len(),
            index.schema_key,
            index.schema_version
        );
        Ok(index)
    }

    fn insert(
        &mut self,
        field_id: &str,
        location: FieldLocation,
        kind: FieldKind,
    ) -> OrganizeResult<()> {
        if let Some(existing) = self.fields.get(field_id) {
            return Err(OrganizeError::DuplicateFieldId {
                field_id: field_id.to_string(),
                first: existing.location.path(),
                second: location.path(),
            });
        }
        self.fields
            .insert(field_id.to_string(), IndexedField { location, kind });
        self.order.push(field_id.to_string());
        Ok(())
    }

    pub fn locate(&self, field_id: &str) -> Option<&FieldLocation> {
        self.fields.get(field_id).map(|field| &field.location)
    }

    pub fn get(&self, field_id: &str) -> Option<&IndexedField> {
        self.fields.get(field_id)
    }

    pub fn contains(&self, field_id: &str) -> bool {
        self.fields.contains_key(field_id)
    }

    pub fn kind(&self, field_id: &str) -> Option<FieldKind> {
        self.fields.get(field_id).map(|field| field.kind)
    }

    pub fn is_group(&self, field_id: &str) -> bool {
        self.groups.contains_key(field_id)
    }

    pub fn sub_fields(&self, group_id: &str) -> Option<&[String]> {
        self.groups.get(group_id).map(Vec::as_slice)
    }

    pub fn is_tab(&self, id: &str) -> bool {
        self.tabs.contains(id)
    }

    pub fn is_section(&self, id: &str) -> bool {
        self.sections.contains(id)
    }

    /// True when `key` names any structural element of the template.
    pub fn recognizes(&self, key: &str) -> bool {
        self.contains(key) || self.is_tab(key) || self.is_section(key)
    }

    /// Fields in template declaration order, sub-fields following their group.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndexedField)> {
        self.order
            .iter()
            .filter_map(|id| self.fields.get(id).map(|field| (id.as_str(), field)))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn schema_key(&self) -> &SchemaKey {
        &self.schema_key
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Whether this index was built from exactly `schema`.
    pub fn matches(&self, schema: &TemplateSchema) -> bool {
        self.schema_key == schema.key()
            && self.schema_version == schema.version
            && self.fingerprint == schema.fingerprint()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating index file {path:?}"))?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .context("Writing index file")?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("Opening index file {path:?}"))?;
        let (index, _): (FieldLocationIndex, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                .with_context(|| format!("Decoding index file {path:?}"))?;
        if index.format_version != INDEX_FORMAT_VERSION {
            return Err(anyhow!(
                "Unsupported index version {} (expected {INDEX_FORMAT_VERSION})",
                index.format_version
            ));
        }
        Ok(index)
    }
}

/// Caller-owned cache of location indexes keyed by template identity.
///
/// An entry is replaced, never mutated, when a template arrives with a
/// different version than the cached index.
#[derive(Debug, Default)]
pub struct IndexCache {
    entries: RwLock<HashMap<SchemaKey, Arc<FieldLocationIndex>>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(&self, schema: &TemplateSchema) -> OrganizeResult<Arc<FieldLocationIndex>> {
        let key = schema.key();
        if let Some(cached) = self.lookup(&key, &schema.version) {
            return Ok(cached);
        }

        let built = Arc::new(FieldLocationIndex::build(schema)?);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.get(&key)
            && existing.schema_version == schema.version
        {
            return Ok(Arc::clone(existing));
        }
        debug!("Caching location index for {key} v{}", schema.version);
        entries.insert(key, Arc::clone(&built));
        Ok(built)
    }

    pub fn get(&self, key: &SchemaKey) -> Option<Arc<FieldLocationIndex>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &SchemaKey, version: &str) -> Option<Arc<FieldLocationIndex>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|index| index.schema_version == version)
            .cloned()
    }
}
