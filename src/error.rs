// ⚠️ Domain outcomes - why a file or a row contributed nothing
// Storage/IO plumbing stays on anyhow; these are the reasons callers count.

use serde::Serialize;
use thiserror::Error;

// ============================================================================
// FILE-LEVEL SKIPS
// ============================================================================

/// A filing that contributes zero records. Never fatal to a pass.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum SkipReason {
    #[error("no numeric regulatory id in path")]
    NoRegulatoryId,

    #[error("file could not be read: {0}")]
    Unreadable(String),

    #[error("no information table in filing")]
    NoInformationTable,

    #[error("malformed information table: {0}")]
    MalformedTable(String),

    #[error("filer {0} is not registered (run seed-funds)")]
    UnknownFiler(String),
}

impl SkipReason {
    /// Short machine-friendly code used in the audit log
    pub fn code(&self) -> &'static str {
        match self {
            SkipReason::NoRegulatoryId => "no_regulatory_id",
            SkipReason::Unreadable(_) => "unreadable",
            SkipReason::NoInformationTable => "no_information_table",
            SkipReason::MalformedTable(_) => "malformed_table",
            SkipReason::UnknownFiler(_) => "unknown_filer",
        }
    }
}

// ============================================================================
// ROW-LEVEL SKIPS
// ============================================================================

/// A table row that was discarded before identity resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowSkip {
    #[error("row has no security identifier")]
    MissingSecurityId,

    #[error("row has no value")]
    MissingValue,

    #[error("row value {0:?} is not numeric")]
    InvalidValue(String),
}

// ============================================================================
// TREE PARSING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("xml error: {0}")]
    Xml(String),

    #[error("unbound namespace prefix on <{0}>")]
    UnboundPrefix(String),

    #[error("unclosed element <{0}>")]
    Unclosed(String),

    #[error("document has no root element")]
    Empty,
}

impl From<quick_xml::Error> for ExtractError {
    fn from(err: quick_xml::Error) -> Self {
        ExtractError::Xml(err.to_string())
    }
}

impl From<ExtractError> for SkipReason {
    fn from(err: ExtractError) -> Self {
        SkipReason::MalformedTable(err.to_string())
    }
}
