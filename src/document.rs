//! The normalized, hierarchical form of a submission.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{index::FieldLocationIndex, table::TableDefinition};

/// Field id → value within one section. Group fields hold an object of
/// sub-field id → value.
pub type SectionData = Map<String, Value>;

/// Section id → section data within one tab, in template order.
pub type TabData = IndexMap<String, SectionData>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NormalizedDocument {
    pub schema_version: String,
    #[serde(default)]
    pub common_fields: Map<String, Value>,
    #[serde(default)]
    pub data: IndexMap<String, TabData>,
    #[serde(default)]
    pub tables: BTreeMap<String, TableDefinition>,
    #[serde(default)]
    pub unmapped: Map<String, Value>,
}

impl NormalizedDocument {
    pub fn new(schema_version: &str) -> Self {
        NormalizedDocument {
            schema_version: schema_version.to_string(),
            ..Default::default()
        }
    }

    pub fn section(&self, tab_id: &str, section_id: &str) -> Option<&SectionData> {
        self.data.get(tab_id)?.get(section_id)
    }

    pub fn section_mut(&mut self, tab_id: &str, section_id: &str) -> &mut SectionData {
        self.data
            .entry(tab_id.to_string())
            .or_default()
            .entry(section_id.to_string())
            .or_default()
    }

    pub fn field(&self, tab_id: &str, section_id: &str, field_id: &str) -> Option<&Value> {
        self.section(tab_id, section_id)?.get(field_id)
    }

    /// Puts tabs, sections, fields and group members in template declaration
    /// order. Anything the template does not declare keeps its relative order
    /// after the declared entries.
    pub(crate) fn order_by_template(&mut self, index: &FieldLocationIndex) {
        let mut tabs = HashMap::new();
        let mut sections = HashMap::new();
        let mut fields = HashMap::new();
        for (position, (field_id, field)) in index.iter().enumerate() {
            tabs.entry(field.location.tab_id.as_str()).or_insert(position);
            sections
                .entry((field.location.tab_id.as_str(), field.location.section_id.as_str()))
                .or_insert(position);
            fields.insert(field_id, position);
        }

        self.data
            .sort_by(|a, _, b, _| rank(&tabs, a.as_str()).cmp(&rank(&tabs, b.as_str())));
        for (tab_id, tab) in self.data.iter_mut() {
            tab.sort_by(|a, _, b, _| {
                rank(&sections, (tab_id.as_str(), a.as_str()))
                    .cmp(&rank(&sections, (tab_id.as_str(), b.as_str())))
            });
            for section in tab.values_mut() {
                sort_entries(section, &fields);
                for (field_id, value) in section.iter_mut() {
                    if index.is_group(field_id)
                        && let Value::Object(members) = value
                    {
                        sort_entries(members, &fields);
                    }
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.common_fields.is_empty()
            && self.data.is_empty()
            && self.tables.is_empty()
            && self.unmapped.is_empty()
    }
}

fn rank<K: Eq + std::hash::Hash>(ranks: &HashMap<K, usize>, key: K) -> usize {
    ranks.get(&key).copied().unwrap_or(usize::MAX)
}

fn sort_entries(map: &mut Map<String, Value>, ranks: &HashMap<&str, usize>) {
    let mut entries = std::mem::take(map).into_iter().collect::<Vec<_>>();
    entries.sort_by_key(|(key, _)| rank(ranks, key.as_str()));
    *map = entries.into_iter().collect();
}
