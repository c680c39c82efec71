// 🏗️ Row Classifier - infoTable rows → normalized positions
//
// Each <infoTable> row is either a plain equity holding or, when it carries
// a PUT/CALL marker, option exposure on the same issuer. Identity resolution
// happens later (see ingest.rs); this module only reads and normalizes.

use crate::db::DerivativeKind;
use crate::error::RowSkip;
use crate::extractor::{field_text, find_child, info_table_rows, XmlNode};
use serde::{Deserialize, Serialize};

/// Filings report value in thousands of dollars
pub const VALUE_SCALE: f64 = 1000.0;

// ============================================================================
// CORE TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowKind {
    Equity,
    Derivative(DerivativeKind),
}

impl RowKind {
    /// Absent, empty, or anything other than PUT/CALL is equity
    pub fn classify(put_call: Option<&str>) -> Self {
        match put_call.and_then(DerivativeKind::parse) {
            Some(kind) => RowKind::Derivative(kind),
            None => RowKind::Equity,
        }
    }

    pub fn is_derivative(&self) -> bool {
        matches!(self, RowKind::Derivative(_))
    }
}

/// One normalized table row, before identity resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoTableRow {
    pub issuer_name: Option<String>,
    pub cusip: String,
    /// USD, already scaled by VALUE_SCALE
    pub value: f64,
    /// Shares held, or underlying shares for options
    pub shares: f64,
    pub kind: RowKind,
}

// ============================================================================
// FIELD NORMALIZATION
// ============================================================================

fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Reported value (thousands) → USD
pub fn parse_value(raw: &str) -> Result<f64, RowSkip> {
    parse_number(raw)
        .map(|v| v * VALUE_SCALE)
        .ok_or_else(|| RowSkip::InvalidValue(raw.to_string()))
}

/// `shrsOrPrnAmt/sshPrnamt`, or 0 when the amount block is missing or unreadable
pub fn parse_shares(row: &XmlNode) -> f64 {
    find_child(row, "shrsOrPrnAmt")
        .and_then(|amount| field_text(amount, "sshPrnamt"))
        .and_then(parse_number)
        .unwrap_or(0.0)
}

/// Read and normalize a single <infoTable> row
pub fn parse_row(row: &XmlNode) -> Result<InfoTableRow, RowSkip> {
    let cusip = field_text(row, "cusip").ok_or(RowSkip::MissingSecurityId)?;
    let raw_value = field_text(row, "value").ok_or(RowSkip::MissingValue)?;
    let value = parse_value(raw_value)?;

    Ok(InfoTableRow {
        issuer_name: field_text(row, "nameOfIssuer").map(str::to_string),
        cusip: cusip.to_string(),
        value,
        shares: parse_shares(row),
        kind: RowKind::classify(field_text(row, "putCall")),
    })
}

/// Every row of a parsed information table, in document order
pub fn parse_rows(root: &XmlNode) -> Vec<Result<InfoTableRow, RowSkip>> {
    info_table_rows(root).into_iter().map(parse_row).collect()
}

// ============================================================================
// TESTS
// ============================================================================
