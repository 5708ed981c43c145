//! Assembly of classified buckets and detected tables into a document.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::{debug, warn};
use serde_json::{Map, Value};

use crate::{
    classify::ClassifiedBuckets,
    document::NormalizedDocument,
    error::{OrganizeError, OrganizeResult},
    flatten::leaf_entries,
    index::{FieldLocation, FieldLocationIndex},
    table::TableDefinition,
};

/// Builds the normalized document.
///
/// `buckets.unclassified` must hold only what table detection left behind;
/// every entry in `tables` that the index does not resolve was taken out of
/// it. After assembly the document is checked to carry exactly the values it
/// was given.
pub fn assemble(
    buckets: ClassifiedBuckets,
    mut tables: BTreeMap<String, TableDefinition>,
    index: &FieldLocationIndex,
    schema_version: &str,
) -> OrganizeResult<NormalizedDocument> {
    let mut expected = Vec::with_capacity(buckets.retained_len() + tables.len());
    expected.extend(buckets.common.iter().map(|(k, v)| (k.clone(), v.clone())));
    expected.extend(
        buckets
            .located
            .iter()
            .map(|(k, located)| (k.clone(), located.value.clone())),
    );
    expected.extend(buckets.unclassified.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut doc = NormalizedDocument::new(schema_version);
    doc.common_fields = buckets.common;

    let mut placed = HashSet::new();
    for (field_id, located) in buckets.located {
        placed.insert(field_id.clone());
        place_located(&mut doc, index, field_id, located.location, located.value);
    }

    for (field_id, table) in tables.iter_mut() {
        table.metadata.located = match index.locate(field_id) {
            Some(location) => {
                if !placed.contains(field_id) {
                    place_located(
                        &mut doc,
                        index,
                        field_id.clone(),
                        location.clone(),
                        table.to_value(),
                    );
                    expected.push((field_id.clone(), table.to_value()));
                }
                true
            }
            None => {
                expected.push((field_id.clone(), table.to_value()));
                false
            }
        };
    }
    doc.tables = tables;

    for (field_id, value) in buckets.unclassified {
        warn!("Field '{field_id}' is not part of template v{schema_version}; keeping it as unmapped");
        doc.unmapped.insert(field_id, value);
    }
    doc.order_by_template(index);

    check_conservation(&doc, index, expected)?;
    debug!(
        "Assembled document: {} common, {} tab(s), {} table(s), {} unmapped",
        doc.common_fields.len(),
        doc.data.len(),
        doc.tables.len(),
        doc.unmapped.len()
    );
    Ok(doc)
}

fn place_located(
    doc: &mut NormalizedDocument,
    index: &FieldLocationIndex,
    field_id: String,
    location: FieldLocation,
    value: Value,
) {
    let section = doc.section_mut(&location.tab_id, &location.section_id);
    let displaced = match location.parent_group_id {
        Some(group_id) => {
            let slot = section
                .entry(group_id.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            let displaced = if slot.is_object() {
                None
            } else {
                warn!(
                    "Group '{group_id}' received its own value alongside sub-field '{field_id}'; moving it to unmapped"
                );
                Some((group_id, std::mem::replace(slot, Value::Object(Map::new()))))
            };
            if let Value::Object(members) = slot {
                members.insert(field_id, value);
            }
            displaced
        }
        None if index.is_group(&field_id) => {
            if section.contains_key(&field_id) || value.is_object() {
                warn!(
                    "Group '{field_id}' value cannot be merged with its sub-fields; moving it to unmapped"
                );
                Some((field_id, value))
            } else {
                section.insert(field_id, value);
                None
            }
        }
        None => {
            section.insert(field_id, value);
            None
        }
    };
    if let Some((key, value)) = displaced {
        doc.unmapped.insert(key, value);
    }
}

fn check_conservation(
    doc: &NormalizedDocument,
    index: &FieldLocationIndex,
    expected: Vec<(String, Value)>,
) -> OrganizeResult<()> {
    let actual = leaf_entries(doc, index)?;
    let mut missing = Vec::new();
    let mut unexpected = Vec::new();

    let mut remaining: HashMap<String, Vec<Value>> = HashMap::new();
    for (key, value) in actual {
        remaining.entry(key).or_default().push(value);
    }
    for (key, value) in expected {
        let matched = remaining.get_mut(&key).and_then(|values| {
            values
                .iter()
                .position(|candidate| *candidate == value)
                .map(|position| values.swap_remove(position))
        });
        if matched.is_none() {
            missing.push(key);
        }
    }
    for (key, values) in remaining {
        unexpected.extend(std::iter::repeat_n(key, values.len()));
    }

    if missing.is_empty() && unexpected.is_empty() {
        return Ok(());
    }
    missing.sort();
    unexpected.sort();
    Err(OrganizeError::ConservationViolated {
        missing,
        unexpected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::LocatedValue;
    use crate::table::{TableColumn, TableOrigin};
    use crate::template::{Field, Section, Tab, TemplateSchema};
    use serde_json::json;

    fn index() -> FieldLocationIndex {
        let schema = TemplateSchema {
            bank_code: "SBI".to_string(),
            template_id: "flat".to_string(),
            version: "7".to_string(),
            tabs: vec![Tab {
                id: "Property".to_string(),
                label: None,
                sections: vec![Section {
                    id: "Details".to_string(),
                    label: None,
                    fields: vec![
                        Field::group("location", &["plot_no", "door_no"]),
                        Field::table_hint("building_specs"),
                        Field::scalar("landmark"),
                    ],
                }],
            }],
        };
        FieldLocationIndex::build(&schema).unwrap()
    }

    fn located(index: &FieldLocationIndex, id: &str, value: Value) -> (String, LocatedValue) {
        let location: FieldLocation = index.locate(id).cloned().unwrap();
        (id.to_string(), LocatedValue { location, value })
    }

    #[test]
    fn group_members_nest_under_their_group() {
        let index = index();
        let buckets = ClassifiedBuckets {
            located: vec![
                located(&index, "plot_no", json!("12A")),
                located(&index, "door_no", json!("5")),
            ],
            ..Default::default()
        };
        let doc = assemble(buckets, BTreeMap::new(), &index, "7").unwrap();
        assert_eq!(
            doc.field("Property", "Details", "location"),
            Some(&json!({"plot_no": "12A", "door_no": "5"}))
        );
        assert_eq!(doc.schema_version, "7");
    }

    #[test]
    fn located_tables_are_placed_twice() {
        let index = index();
        let value = json!([{"item": "Foundation", "rate": 500}, {"item": "Walls", "rate": 300}]);
        let rows = value
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row.as_object().cloned().unwrap())
            .collect();
        let table = TableDefinition::new(
            vec![TableColumn::new("item", None), TableColumn::new("rate", None)],
            rows,
            TableOrigin::Records,
        );
        let buckets = ClassifiedBuckets {
            located: vec![located(&index, "building_specs", value.clone())],
            ..Default::default()
        };
        let mut tables = BTreeMap::new();
        tables.insert("building_specs".to_string(), table);

        let doc = assemble(buckets, tables, &index, "7").unwrap();
        assert_eq!(doc.field("Property", "Details", "building_specs"), Some(&value));
        assert!(doc.tables["building_specs"].metadata.located);
    }

    #[test]
    fn unclassified_values_land_in_unmapped() {
        let index = index();
        let mut buckets = ClassifiedBuckets::default();
        buckets
            .unclassified
            .insert("random_note".to_string(), json!("hello"));
        let doc = assemble(buckets, BTreeMap::new(), &index, "7").unwrap();
        assert_eq!(doc.unmapped["random_note"], json!("hello"));
        assert!(doc.data.is_empty());
    }

    #[test]
    fn group_scalar_with_members_moves_to_unmapped() {
        let index = index();
        let buckets = ClassifiedBuckets {
            located: vec![
                located(&index, "location", json!("near temple")),
                located(&index, "plot_no", json!("12A")),
            ],
            ..Default::default()
        };
        let doc = assemble(buckets, BTreeMap::new(), &index, "7").unwrap();
        assert_eq!(doc.unmapped["location"], json!("near temple"));
        assert_eq!(
            doc.field("Property", "Details", "location"),
            Some(&json!({"plot_no": "12A"}))
        );
    }

    #[test]
    fn group_scalar_alone_stays_in_place() {
        let index = index();
        let buckets = ClassifiedBuckets {
            located: vec![located(&index, "location", json!("near temple"))],
            ..Default::default()
        };
        let doc = assemble(buckets, BTreeMap::new(), &index, "7").unwrap();
        assert_eq!(
            doc.field("Property", "Details", "location"),
            Some(&json!("near temple"))
        );
        assert!(doc.unmapped.is_empty());
    }
}
