//! Partitioning of a flat submission into classification buckets.
//!
//! Every key is evaluated independently, first match wins:
//!
//! 1. metadata ids are dropped
//! 2. common ids go to the common bucket
//! 3. pre-grouped objects are expanded into their leaves, which are then
//!    classified by the other rules; expansion is all or nothing
//! 4. ids resolved by the location index are located
//! 5. everything else is unclassified and offered to table detection
//!
//! Classification never fails. Unknown input is carried forward so that a
//! save is never blocked by keys the template does not know.

use std::collections::{BTreeSet, HashSet};

use log::{debug, warn};
use serde_json::{Map, Value};

use crate::{
    config::FieldSets,
    index::{FieldLocation, FieldLocationIndex},
};

/// Flat key → value map as submitted by a form.
pub type FlatMap = Map<String, Value>;

const MAX_EXPANSION_DEPTH: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct LocatedValue {
    pub location: FieldLocation,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedBuckets {
    pub common: FlatMap,
    /// Template fields in submission order. Keys are unique.
    pub located: Vec<(String, LocatedValue)>,
    pub unclassified: FlatMap,
    pub dropped: BTreeSet<String>,
    /// Submitted keys whose object values were expanded into their children.
    pub expanded: Vec<String>,
}

impl ClassifiedBuckets {
    pub fn located_value(&self, field_id: &str) -> Option<&LocatedValue> {
        self.located
            .iter()
            .find(|(id, _)| id == field_id)
            .map(|(_, located)| located)
    }

    /// Keys that carry data into the document, i.e. everything not dropped
    /// and not expanded.
    pub fn retained_len(&self) -> usize {
        self.common.len() + self.located.len() + self.unclassified.len()
    }

    /// The submission as the engine sees it after expansion, minus dropped
    /// metadata. Organizing then flattening must reproduce exactly this.
    pub fn effective_input(&self) -> FlatMap {
        let mut effective = FlatMap::new();
        for (key, value) in &self.common {
            effective.insert(key.clone(), value.clone());
        }
        for (key, located) in &self.located {
            effective.insert(key.clone(), located.value.clone());
        }
        for (key, value) in &self.unclassified {
            effective.insert(key.clone(), value.clone());
        }
        effective
    }
}

pub fn classify(flat: &FlatMap, index: &FieldLocationIndex, fields: &FieldSets) -> ClassifiedBuckets {
    let mut classifier = Classifier {
        index,
        fields,
        claimed: flat.keys().cloned().collect(),
        buckets: ClassifiedBuckets::default(),
    };
    for (key, value) in flat {
        classifier.classify_entry(key, value);
    }

    let buckets = classifier.buckets;
    debug!(
        "Classified {} key(s): {} common, {} located, {} unclassified, {} dropped, {} expanded",
        flat.len(),
        buckets.common.len(),
        buckets.located.len(),
        buckets.unclassified.len(),
        buckets.dropped.len(),
        buckets.expanded.len()
    );
    buckets
}

struct Classifier<'a> {
    index: &'a FieldLocationIndex,
    fields: &'a FieldSets,
    claimed: HashSet<String>,
    buckets: ClassifiedBuckets,
}

/// Everything one pre-grouped value would turn into once fully expanded.
#[derive(Default)]
struct Expansion<'v> {
    wrappers: Vec<&'v str>,
    leaves: Vec<(&'v str, &'v Value)>,
}

impl Classifier<'_> {
    fn classify_entry(&mut self, key: &str, value: &Value) {
        if self.expandable(key)
            && let Some(children) = pre_grouped_children(value, self.index)
            && self.try_expand(key, children)
        {
            return;
        }
        self.place(key, value);
    }

    /// Expands `children` all the way down, or not at all. Any leaf that is
    /// already claimed or repeats within the expansion keeps the outermost
    /// value intact.
    fn try_expand(&mut self, key: &str, children: &FlatMap) -> bool {
        let mut expansion = Expansion::default();
        self.plan(children, 1, &mut expansion);

        let mut seen = HashSet::new();
        if let Some((collision, _)) = expansion
            .leaves
            .iter()
            .find(|(leaf, _)| self.claimed.contains(*leaf) || !seen.insert(*leaf))
        {
            warn!("Keeping '{key}' intact: nested key '{collision}' would appear twice in the submission");
            return false;
        }

        self.buckets.expanded.push(key.to_string());
        self.buckets
            .expanded
            .extend(expansion.wrappers.iter().map(|wrapper| wrapper.to_string()));
        self.claimed
            .extend(expansion.leaves.iter().map(|(leaf, _)| leaf.to_string()));
        for (leaf, leaf_value) in expansion.leaves {
            self.place(leaf, leaf_value);
        }
        true
    }

    fn plan<'v>(&self, children: &'v FlatMap, depth: usize, expansion: &mut Expansion<'v>) {
        for (child, child_value) in children {
            if depth < MAX_EXPANSION_DEPTH
                && self.expandable(child)
                && let Some(grandchildren) = pre_grouped_children(child_value, self.index)
            {
                expansion.wrappers.push(child.as_str());
                self.plan(grandchildren, depth + 1, expansion);
            } else {
                expansion.leaves.push((child.as_str(), child_value));
            }
        }
    }

    fn expandable(&self, key: &str) -> bool {
        !self.fields.is_metadata(key) && !self.fields.is_common(key)
    }

    fn place(&mut self, key: &str, value: &Value) {
        if self.fields.is_metadata(key) {
            self.buckets.dropped.insert(key.to_string());
            return;
        }
        if self.fields.is_common(key) {
            self.buckets.common.insert(key.to_string(), value.clone());
            return;
        }
        if let Some(location) = self.index.locate(key) {
            self.buckets.located.push((
                key.to_string(),
                LocatedValue {
                    location: location.clone(),
                    value: value.clone(),
                },
            ));
            return;
        }
        self.buckets
            .unclassified
            .insert(key.to_string(), value.clone());
    }
}

/// Returns the object's entries when every key names a template element.
fn pre_grouped_children<'v>(value: &'v Value, index: &FieldLocationIndex) -> Option<&'v FlatMap> {
    let object = value.as_object()?;
    if object.is_empty() || !object.keys().all(|key| index.recognizes(key)) {
        return None;
    }
    Some(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{Field, Section, Tab, TemplateSchema};
    use serde_json::json;

    fn index() -> FieldLocationIndex {
        let schema = TemplateSchema {
            bank_code: "SBI".to_string(),
            template_id: "flat".to_string(),
            version: "1".to_string(),
            tabs: vec![Tab {
                id: "Property".to_string(),
                label: None,
                sections: vec![Section {
                    id: "Details".to_string(),
                    label: None,
                    fields: vec![
                        Field::group("location", &["plot_no", "door_no"]),
                        Field::scalar("landmark"),
                    ],
                }],
            }],
        };
        FieldLocationIndex::build(&schema).unwrap()
    }

    fn flat(value: Value) -> FlatMap {
        value.as_object().cloned().unwrap()
    }

    fn fields() -> FieldSets {
        FieldSets::new(["applicant_name"], ["status"])
    }

    #[test]
    fn metadata_wins_over_common_and_template() {
        let sets = FieldSets::new(["landmark"], ["landmark"]);
        let buckets = classify(&flat(json!({"landmark": "temple"})), &index(), &sets);
        assert!(buckets.dropped.contains("landmark"));
        assert!(buckets.common.is_empty());
        assert!(buckets.located.is_empty());
    }

    #[test]
    fn partitions_each_key_once() {
        let input = flat(json!({
            "status": "draft",
            "applicant_name": "R. Iyer",
            "plot_no": "12A",
            "random_note": "hello"
        }));
        let buckets = classify(&input, &index(), &fields());
        assert_eq!(buckets.dropped.iter().collect::<Vec<_>>(), vec!["status"]);
        assert_eq!(buckets.common["applicant_name"], json!("R. Iyer"));
        let plot = buckets.located_value("plot_no").unwrap();
        assert_eq!(plot.location.parent_group_id.as_deref(), Some("location"));
        assert_eq!(buckets.unclassified["random_note"], json!("hello"));
        assert_eq!(buckets.retained_len(), 3);
    }

    #[test]
    fn pre_grouped_values_match_flat_submission() {
        let grouped = flat(json!({"location": {"plot_no": "12A", "door_no": "5"}}));
        let plain = flat(json!({"plot_no": "12A", "door_no": "5"}));
        let from_grouped = classify(&grouped, &index(), &fields());
        let from_plain = classify(&plain, &index(), &fields());
        assert_eq!(from_grouped.located, from_plain.located);
        assert_eq!(from_grouped.expanded, vec!["location".to_string()]);
        assert_eq!(from_grouped.effective_input(), plain);
    }

    #[test]
    fn tab_and_section_wrappers_are_expanded() {
        let grouped = flat(json!({"Property": {"Details": {"landmark": "temple"}}}));
        let buckets = classify(&grouped, &index(), &fields());
        assert_eq!(buckets.located.len(), 1);
        assert_eq!(buckets.located[0].0, "landmark");
        assert_eq!(buckets.expanded, vec!["Property", "Details"]);
    }

    #[test]
    fn colliding_nested_keys_keep_value_intact() {
        let input = flat(json!({
            "plot_no": "12A",
            "location": {"plot_no": "99", "door_no": "5"}
        }));
        let buckets = classify(&input, &index(), &fields());
        assert!(buckets.expanded.is_empty());
        let group = buckets.located_value("location").unwrap();
        assert_eq!(group.value, json!({"plot_no": "99", "door_no": "5"}));
        assert_eq!(buckets.effective_input(), input);
    }

    #[test]
    fn deep_collision_keeps_outermost_wrapper_intact() {
        let input = flat(json!({
            "Property": {"Details": {"landmark": "a"}},
            "landmark": "b"
        }));
        let buckets = classify(&input, &index(), &fields());
        assert!(buckets.expanded.is_empty());
        assert_eq!(
            buckets.unclassified["Property"],
            json!({"Details": {"landmark": "a"}})
        );
        assert_eq!(buckets.located_value("landmark").unwrap().value, json!("b"));
        assert_eq!(buckets.effective_input(), input);
    }

    #[test]
    fn leaves_repeated_inside_one_wrapper_block_expansion() {
        let input = flat(json!({
            "Property": {
                "location": {"plot_no": "1"},
                "Details": {"plot_no": "2"}
            }
        }));
        let buckets = classify(&input, &index(), &fields());
        assert!(buckets.expanded.is_empty());
        assert_eq!(buckets.effective_input(), input);
    }

    #[test]
    fn expansion_stops_at_depth_limit() {
        let input = flat(json!({
            "Property": {"Details": {"Property": {"Details": {"Property": {"landmark": "deep"}}}}}
        }));
        let buckets = classify(&input, &index(), &fields());
        assert_eq!(
            buckets.expanded,
            vec!["Property", "Details", "Property", "Details"]
        );
        assert!(buckets.located.is_empty());
        assert_eq!(
            buckets.unclassified["Property"],
            json!({"landmark": "deep"})
        );
    }

    #[test]
    fn objects_with_unknown_keys_are_not_expanded() {
        let input = flat(json!({"survey": {"plot_no": "1", "owner": "x"}}));
        let buckets = classify(&input, &index(), &fields());
        assert!(buckets.expanded.is_empty());
        assert!(buckets.unclassified.contains_key("survey"));
    }
}
