//! Common and metadata field-id configuration.
//!
//! Common fields are shared by every template and live outside the tab
//! hierarchy. Metadata fields are bookkeeping values that travel with a
//! submission (status, organization ids) and are discarded on organize.

use std::{collections::BTreeSet, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, ensure};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

const DEFAULT_COMMON_FIELDS: &[&str] = &[
    "applicant_name",
    "bank_branch",
    "inspection_date",
    "reference_number",
    "valuation_date",
];

const DEFAULT_METADATA_FIELDS: &[&str] = &[
    "_id",
    "bank_code",
    "created_at",
    "created_by",
    "org_id",
    "organization_id",
    "status",
    "template_id",
    "updated_at",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldSets {
    #[serde(default)]
    pub common: BTreeSet<String>,
    #[serde(default)]
    pub metadata: BTreeSet<String>,
}

impl FieldSets {
    pub fn new<C, M>(common: C, metadata: M) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        M: IntoIterator,
        M::Item: Into<String>,
    {
        FieldSets {
            common: common.into_iter().map(Into::into).collect(),
            metadata: metadata.into_iter().map(Into::into).collect(),
        }
    }

    pub fn builtin() -> Self {
        FieldSets::new(
            DEFAULT_COMMON_FIELDS.iter().copied(),
            DEFAULT_METADATA_FIELDS.iter().copied(),
        )
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Opening field set file {path:?}"))?;
        let reader = BufReader::new(file);
        let sets: FieldSets =
            serde_yaml::from_reader(reader).context("Parsing field set YAML")?;
        sets.validate()
            .with_context(|| format!("Validating field sets in {path:?}"))?;
        Ok(sets)
    }

    /// Loads `path` when given (built-in defaults otherwise), then appends
    /// the extra ids.
    pub fn resolve(path: Option<&Path>, common: &[String], metadata: &[String]) -> Result<Self> {
        let mut sets = match path {
            Some(path) => FieldSets::load(path)?,
            None => FieldSets::builtin(),
        };
        sets.extend(common, metadata);
        sets.validate()?;
        Ok(sets)
    }

    /// Appends ids given as repeatable or comma-separated CLI values.
    pub fn extend(&mut self, common: &[String], metadata: &[String]) {
        self.common.extend(split_ids(common));
        self.metadata.extend(split_ids(metadata));
    }

    pub fn validate(&self) -> Result<()> {
        let overlap = self.common.intersection(&self.metadata).join(", ");
        ensure!(
            overlap.is_empty(),
            "Field id(s) listed as both common and metadata: {overlap}"
        );
        Ok(())
    }

    pub fn is_common(&self, field_id: &str) -> bool {
        self.common.contains(field_id)
    }

    pub fn is_metadata(&self, field_id: &str) -> bool {
        self.metadata.contains(field_id)
    }
}

fn split_ids(values: &[String]) -> impl Iterator<Item = String> + '_ {
    values
        .iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
