//! Named failures raised by the reorganization engine.
//!
//! Classification outcomes (unknown keys, unmapped values) never appear here:
//! they are recorded in the document itself. Only schema/document consistency
//! defects surface as errors so they reach the caller under their own name.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrganizeError {
    /// The same field id is declared at more than one place in a template.
    #[error("duplicate field id '{field_id}' declared at '{first}' and '{second}'")]
    DuplicateFieldId {
        field_id: String,
        first: String,
        second: String,
    },
    /// A stored document references a field the template does not define.
    #[error("malformed document: field '{field_id}' at '{path}' {reason}")]
    MalformedDocument {
        field_id: String,
        path: String,
        reason: String,
    },
    /// The assembled document does not carry exactly the submitted values.
    #[error(
        "assembled document lost or invented values (missing: [{}], unexpected: [{}])",
        .missing.join(", "),
        .unexpected.join(", ")
    )]
    ConservationViolated {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
}

impl OrganizeError {
    pub(crate) fn malformed(
        field_id: impl Into<String>,
        path: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        OrganizeError::MalformedDocument {
            field_id: field_id.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type OrganizeResult<T> = std::result::Result<T, OrganizeError>;
