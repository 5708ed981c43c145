use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use log::{info, warn};
use serde_json::Value;
use similar::TextDiff;

use crate::{
    classify::{FlatMap, classify},
    cli::VerifyArgs,
    engine::Organizer,
    error::OrganizeResult,
    flatten::flatten,
    index::FieldLocationIndex,
    io_utils,
    template::TemplateSchema,
};

/// Outcome of organizing a submission and flattening it back.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundTripReport {
    /// Submission minus metadata ids, after pre-grouped expansion.
    pub expected: FlatMap,
    pub flattened: FlatMap,
    /// Unified line diff of the two maps, present only when they differ.
    pub diff: Option<String>,
}

impl RoundTripReport {
    pub fn is_lossless(&self) -> bool {
        self.diff.is_none()
    }
}

pub fn verify_round_trip(
    organizer: &Organizer,
    flat: &FlatMap,
    index: &FieldLocationIndex,
) -> OrganizeResult<RoundTripReport> {
    let expected = classify(flat, index, organizer.fields()).effective_input();
    let doc = organizer.organize_indexed(flat, index)?;
    let flattened = flatten(&doc, index)?;
    let diff = if flattened == expected {
        None
    } else {
        Some(render_diff(&expected, &flattened))
    };
    Ok(RoundTripReport {
        expected,
        flattened,
        diff,
    })
}

fn render_diff(expected: &FlatMap, flattened: &FlatMap) -> String {
    let left = sorted_json(expected);
    let right = sorted_json(flattened);
    TextDiff::from_lines(&left, &right)
        .unified_diff()
        .header("submitted", "flattened")
        .to_string()
}

fn sorted_json(map: &FlatMap) -> String {
    let sorted = map.iter().collect::<BTreeMap<&String, &Value>>();
    let mut text = serde_json::to_string_pretty(&sorted).unwrap_or_default();
    text.push('\n');
    text
}

pub fn execute(args: &VerifyArgs) -> Result<()> {
    let schema = TemplateSchema::load(&args.template)
        .with_context(|| format!("Loading template from {:?}", args.template))?;
    let fields = crate::resolve_field_sets(&args.field_sets)?;
    let index = FieldLocationIndex::build(&schema)?;
    let organizer = Organizer::new(fields);

    let flat = io_utils::read_flat_map(&args.input)?;
    let report = verify_round_trip(&organizer, &flat, &index)
        .with_context(|| format!("Verifying {:?}", args.input))?;
    match report.diff {
        None => {
            info!(
                "✓ {:?} round-trips through template {} v{} ({} key(s))",
                args.input,
                schema.key(),
                schema.version,
                report.expected.len()
            );
            Ok(())
        }
        Some(diff) => {
            warn!("Round trip of {:?} changed the submission", args.input);
            print!("{diff}");
            bail!("{:?} does not round-trip losslessly", args.input)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldSets;
    use crate::template::{Field, Section, Tab};
    use serde_json::json;

    fn index() -> FieldLocationIndex {
        let schema = TemplateSchema {
            bank_code: "HDFC".to_string(),
            template_id: "land".to_string(),
            version: "3".to_string(),
            tabs: vec![Tab {
                id: "Site".to_string(),
                label: None,
                sections: vec![Section {
                    id: "Boundaries".to_string(),
                    label: None,
                    fields: vec![
                        Field::scalar("north"),
                        Field::scalar("south"),
                        Field::group("survey", &["survey_no", "sub_division"]),
                    ],
                }],
            }],
        };
        FieldLocationIndex::build(&schema).unwrap()
    }

    #[test]
    fn clean_submission_is_lossless() {
        let flat = json!({
            "north": "road",
            "survey_no": "41",
            "status": "draft",
            "plant_list": [{"name": "teak", "count": 4}]
        })
        .as_object()
        .cloned()
        .unwrap();
        let organizer = Organizer::new(FieldSets::new(Vec::<String>::new(), ["status"]));
        let report = verify_round_trip(&organizer, &flat, &index()).unwrap();
        assert!(report.is_lossless());
        assert!(!report.expected.contains_key("status"));
        assert_eq!(report.expected.len(), 3);
    }

    #[test]
    fn pre_grouped_input_is_compared_after_expansion() {
        let flat = json!({"survey": {"survey_no": "41", "sub_division": "2B"}})
            .as_object()
            .cloned()
            .unwrap();
        let organizer = Organizer::new(FieldSets::default());
        let report = verify_round_trip(&organizer, &flat, &index()).unwrap();
        assert!(report.is_lossless());
        assert_eq!(report.flattened["sub_division"], json!("2B"));
    }

    #[test]
    fn diff_names_both_sides() {
        let expected = json!({"north": "road"}).as_object().cloned().unwrap();
        let flattened = json!({"north": "river"}).as_object().cloned().unwrap();
        let diff = render_diff(&expected, &flattened);
        assert!(diff.contains("--- submitted"));
        assert!(diff.contains("+++ flattened"));
        assert!(diff.contains("-  \"north\": \"road\""));
        assert!(diff.contains("+  \"north\": \"river\""));
    }
}
