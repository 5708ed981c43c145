//! Field listing from a template file.
//!
//! Builds the location index for a template and renders every field id with
//! its kind and location as an aligned table.

use anyhow::{Context, Result};
use log::info;

use crate::{cli::FieldsArgs, index::FieldLocationIndex, table, template::TemplateSchema};

pub fn execute(args: &FieldsArgs) -> Result<()> {
    let schema = TemplateSchema::load(&args.template)
        .with_context(|| format!("Loading template from {:?}", args.template))?;
    let index = FieldLocationIndex::build(&schema)?;

    if index.is_empty() {
        info!("Template {:?} does not define any fields", args.template);
        return Ok(());
    }

    let rows = field_rows(&index);
    let headers = vec![
        "#".to_string(),
        "field".to_string(),
        "kind".to_string(),
        "location".to_string(),
    ];
    print!("{}", table::render_grid(&headers, &rows));
    info!(
        "Listed {} field(s) from template {} v{}",
        index.len(),
        index.schema_key(),
        index.schema_version()
    );
    Ok(())
}

fn field_rows(index: &FieldLocationIndex) -> Vec<Vec<String>> {
    index
        .iter()
        .enumerate()
        .map(|(idx, (field_id, field))| {
            vec![
                (idx + 1).to_string(),
                field_id.to_string(),
                field.kind.to_string(),
                field.location.path(),
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_follow_declaration_order() {
        let schema = TemplateSchema::from_yaml_str(
            r#"
bank_code: SBI
template_id: flat
version: "1"
tabs:
  - id: Property
    sections:
      - id: Details
        fields:
          - id: location
            kind: group
            sub_fields:
              - id: plot_no
          - id: landmark
"#,
        )
        .unwrap();
        let index = FieldLocationIndex::build(&schema).unwrap();
        let rows = field_rows(&index);
        assert_eq!(rows[0], vec!["1", "location", "group", "Property/Details"]);
        assert_eq!(rows[1], vec!["2", "plot_no", "scalar", "Property/Details/location"]);
        assert_eq!(rows[2], vec!["3", "landmark", "scalar", "Property/Details"]);
    }
}
