#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use form_organizer::{FieldLocationIndex, FlatMap, TemplateSchema};
use serde_json::Value;
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// The residential flat template every integration test shares.
pub fn template() -> TemplateSchema {
    TemplateSchema::load(&fixture_path("residential_flat.yaml")).expect("load template fixture")
}

pub fn index() -> FieldLocationIndex {
    FieldLocationIndex::build(&template()).expect("index template fixture")
}

pub fn submission() -> FlatMap {
    let text = std::fs::read_to_string(fixture_path("submission.json")).expect("read submission");
    flat(serde_json::from_str(&text).expect("parse submission"))
}

pub fn flat(value: Value) -> FlatMap {
    value.as_object().cloned().expect("flat map fixture must be an object")
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    pub fn write_json(&self, name: &str, value: &Value) -> PathBuf {
        self.write(
            name,
            &serde_json::to_string_pretty(value).expect("serialize json fixture"),
        )
    }
}
