//! Public entry points of the reorganization engine.
//!
//! ```text
//! flat + template ─▶ index ─▶ classify ─▶ detect tables ─▶ assemble ─▶ document
//! document + template ─▶ index ─▶ flatten ─▶ flat
//! ```
//!
//! Every call works only on its inputs. An [`Organizer`] holds read-only
//! configuration and may be shared across threads.

use log::{debug, info};

use crate::{
    assemble::assemble,
    classify::{FlatMap, classify},
    config::FieldSets,
    detect::TableDetector,
    document::NormalizedDocument,
    error::OrganizeResult,
    flatten::flatten,
    index::FieldLocationIndex,
    template::{FieldKind, TemplateSchema},
};

pub struct Organizer {
    fields: FieldSets,
    detector: TableDetector,
}

impl Organizer {
    pub fn new(fields: FieldSets) -> Self {
        Organizer {
            fields,
            detector: TableDetector::default(),
        }
    }

    pub fn with_detector(mut self, detector: TableDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn fields(&self) -> &FieldSets {
        &self.fields
    }

    pub fn organize(&self, flat: &FlatMap, schema: &TemplateSchema) -> OrganizeResult<NormalizedDocument> {
        let index = FieldLocationIndex::build(schema)?;
        self.organize_indexed(flat, &index)
    }

    /// Organizes against a prebuilt (typically cached) index.
    pub fn organize_indexed(
        &self,
        flat: &FlatMap,
        index: &FieldLocationIndex,
    ) -> OrganizeResult<NormalizedDocument> {
        let mut buckets = classify(flat, index, &self.fields);

        let unclassified = std::mem::take(&mut buckets.unclassified);
        let (mut tables, remaining) = self.detector.detect_tables(unclassified);
        buckets.unclassified = remaining;

        for (field_id, located) in &buckets.located {
            let kind = index.kind(field_id);
            if kind == Some(FieldKind::Group) {
                continue;
            }
            let hinted = kind == Some(FieldKind::DynamicTableHint);
            if let Some(table) = self.detector.inspect(field_id, &located.value, hinted) {
                tables.insert(field_id.clone(), table);
            }
        }
        debug!(
            "Detected {} table(s), {} value(s) left unclassified",
            tables.len(),
            buckets.unclassified.len()
        );

        let doc = assemble(buckets, tables, index, index.schema_version())?;
        info!(
            "Organized {} submitted key(s) for template {} v{}",
            flat.len(),
            index.schema_key(),
            index.schema_version()
        );
        Ok(doc)
    }
}

/// Organizes a flat submission with explicit common and metadata ids.
pub fn organize<S: AsRef<str>>(
    flat: &FlatMap,
    schema: &TemplateSchema,
    common_field_ids: &[S],
    metadata_field_ids: &[S],
) -> OrganizeResult<NormalizedDocument> {
    let fields = FieldSets::new(
        common_field_ids.iter().map(|id| id.as_ref().to_string()),
        metadata_field_ids.iter().map(|id| id.as_ref().to_string()),
    );
    Organizer::new(fields).organize(flat, schema)
}

/// Flattens a stored document for edit mode against the current template.
pub fn deflatten(doc: &NormalizedDocument, schema: &TemplateSchema) -> OrganizeResult<FlatMap> {
    let index = FieldLocationIndex::build(schema)?;
    flatten(doc, &index)
}
