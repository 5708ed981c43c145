use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Organize flat form submissions into template-shaped documents",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build a field location index (.idx) for a template
    Index(IndexArgs),
    /// Organize a flat JSON submission into a normalized document
    Organize(OrganizeArgs),
    /// Flatten a normalized document back into an edit-mode map
    Flatten(FlattenArgs),
    /// Check that a submission survives organize + flatten unchanged
    Verify(VerifyArgs),
    /// Print the dynamic tables of a document, or export one as CSV
    Tables(TablesArgs),
    /// List every field a template defines with its location
    Fields(FieldsArgs),
}

#[derive(Debug, Args)]
pub struct IndexArgs {
    /// Template file (YAML, or JSON by extension)
    #[arg(short, long)]
    pub template: PathBuf,
    /// Output index file (.idx)
    #[arg(short = 'o', long = "index")]
    pub index: PathBuf,
}

/// Options that decide which ids are common and which are metadata.
#[derive(Debug, Args, Default, Clone)]
pub struct FieldSetArgs {
    /// YAML file with `common:` and `metadata:` id lists (built-in defaults otherwise)
    #[arg(short = 'f', long = "fields")]
    pub fields: Option<PathBuf>,
    /// Additional common field ids (repeatable or comma-separated)
    #[arg(long = "common", action = clap::ArgAction::Append)]
    pub common: Vec<String>,
    /// Additional metadata field ids to drop (repeatable or comma-separated)
    #[arg(long = "metadata", action = clap::ArgAction::Append)]
    pub metadata: Vec<String>,
}

#[derive(Debug, Args)]
pub struct OrganizeArgs {
    /// Template file (YAML, or JSON by extension)
    #[arg(short, long)]
    pub template: PathBuf,
    /// Flat JSON submission (`-` for stdin)
    #[arg(short, long)]
    pub input: PathBuf,
    /// Output document (stdout if omitted or `-`)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub field_sets: FieldSetArgs,
    /// Prebuilt index file; rebuilt when it does not match the template
    #[arg(short = 'x', long = "index")]
    pub index: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct FlattenArgs {
    /// Template file (YAML, or JSON by extension)
    #[arg(short, long)]
    pub template: PathBuf,
    /// Normalized document (`-` for stdin)
    #[arg(short, long)]
    pub input: PathBuf,
    /// Output flat map (stdout if omitted or `-`)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Template file (YAML, or JSON by extension)
    #[arg(short, long)]
    pub template: PathBuf,
    /// Flat JSON submission (`-` for stdin)
    #[arg(short, long)]
    pub input: PathBuf,
    #[command(flatten)]
    pub field_sets: FieldSetArgs,
}

#[derive(Debug, Args)]
pub struct TablesArgs {
    /// Normalized document (`-` for stdin)
    #[arg(short, long)]
    pub input: PathBuf,
    /// Only show the table stored under this field id
    #[arg(long)]
    pub field: Option<String>,
    /// Write the selected table as CSV to this path (`-` for stdout)
    #[arg(long)]
    pub csv: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct FieldsArgs {
    /// Template file (YAML, or JSON by extension)
    #[arg(short, long)]
    pub template: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn organize_accepts_repeated_and_comma_separated_ids() {
        let cli = Cli::try_parse_from([
            "form-organizer",
            "organize",
            "-t",
            "template.yaml",
            "-i",
            "-",
            "--common",
            "owner_name,survey_no",
            "--common",
            "ward",
            "--metadata",
            "csrf_token",
        ])
        .unwrap();
        let Commands::Organize(args) = cli.command else {
            panic!("expected organize");
        };
        assert_eq!(args.field_sets.common, vec!["owner_name,survey_no", "ward"]);
        assert_eq!(args.field_sets.metadata, vec!["csrf_token"]);
        assert!(args.output.is_none());
        assert!(args.index.is_none());
    }

    #[test]
    fn tables_requires_input() {
        assert!(Cli::try_parse_from(["form-organizer", "tables"]).is_err());
    }
}
