//! Edit-mode flattening: the inverse of organizing.
//!
//! Tab, section and group nesting is discarded and every value is emitted
//! under its own field id. Tables are emitted as the value originally
//! submitted, not as their definition wrapper.

use std::collections::HashSet;

use log::{debug, warn};
use serde_json::Value;

use crate::{
    classify::FlatMap,
    document::NormalizedDocument,
    error::{OrganizeError, OrganizeResult},
    index::FieldLocationIndex,
};

/// Every field id → value pair carried by `doc`, in partition order:
/// common fields, data, tables not already present in data, unmapped.
///
/// Keys may repeat when the document is inconsistent; callers decide how
/// to treat that.
pub fn leaf_entries(
    doc: &NormalizedDocument,
    index: &FieldLocationIndex,
) -> OrganizeResult<Vec<(String, Value)>> {
    let mut leaves = Vec::new();
    for (field_id, value) in &doc.common_fields {
        leaves.push((field_id.clone(), value.clone()));
    }

    let mut from_data = HashSet::new();
    for (tab_id, tab) in &doc.data {
        for (section_id, section) in tab {
            let path = format!("{tab_id}/{section_id}");
            for (field_id, value) in section {
                if !index.contains(field_id) {
                    return Err(OrganizeError::malformed(
                        field_id,
                        path,
                        "is not defined by the template",
                    ));
                }
                match value {
                    Value::Object(members) if index.is_group(field_id) => {
                        for (member_id, member_value) in members {
                            if !index.contains(member_id) {
                                return Err(OrganizeError::malformed(
                                    member_id,
                                    format!("{path}/{field_id}"),
                                    "is not defined by the template",
                                ));
                            }
                            from_data.insert(member_id.as_str());
                            leaves.push((member_id.clone(), member_value.clone()));
                        }
                    }
                    _ => {
                        from_data.insert(field_id.as_str());
                        leaves.push((field_id.clone(), value.clone()));
                    }
                }
            }
        }
    }

    for (field_id, table) in &doc.tables {
        if from_data.contains(field_id.as_str()) {
            continue;
        }
        leaves.push((field_id.clone(), table.to_value()));
    }
    for (field_id, value) in &doc.unmapped {
        leaves.push((field_id.clone(), value.clone()));
    }
    Ok(leaves)
}

/// Flattens a stored document into the key → value map an edit form expects.
pub fn flatten(doc: &NormalizedDocument, index: &FieldLocationIndex) -> OrganizeResult<FlatMap> {
    if doc.schema_version != index.schema_version() {
        warn!(
            "Flattening a v{} document with template {} v{}",
            doc.schema_version,
            index.schema_key(),
            index.schema_version()
        );
    }
    let mut flat = FlatMap::new();
    for (field_id, value) in leaf_entries(doc, index)? {
        if flat.contains_key(&field_id) {
            return Err(OrganizeError::malformed(
                field_id,
                "document",
                "appears in more than one place",
            ));
        }
        flat.insert(field_id, value);
    }
    debug!("Flattened document into {} key(s)", flat.len());
    Ok(flat)
}
