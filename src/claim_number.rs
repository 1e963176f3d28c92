//! Claim number formatting and parsing
//!
//! Claim numbers are human-readable and sequential per tenant per year:
//! `CLM-{CC}-{YYYY}-{NNNNNN}`, e.g. `CLM-XK-2026-000007`. The country code
//! comes from the tenant, the sequence from the per-tenant-per-year counter.
//!
//! These functions are pure; no I/O happens here. `is_valid` doubles as the
//! fast-reject gate in front of any storage lookup so malformed input never
//! reaches the database.

use serde::{Deserialize, Serialize};

use crate::error::ClaimsError;

/// Lowest sequence value a claim number may carry.
pub const MIN_SEQUENCE: u32 = 1;
/// Highest sequence value; six zero-padded digits.
pub const MAX_SEQUENCE: u32 = 999_999;

const PREFIX: &str = "CLM";

/// Components of a parsed claim number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedClaimNumber {
    pub country_code: String,
    pub year: i32,
    pub sequence: u32,
}

/// Format a claim number from its components.
///
/// The country code is normalized to uppercase. Fails if the sequence is
/// outside `[1, 999999]` or the components cannot produce a parseable value.
pub fn format(country_code: &str, year: i32, sequence: u32) -> Result<String, ClaimsError> {
    if !(MIN_SEQUENCE..=MAX_SEQUENCE).contains(&sequence) {
        return Err(ClaimsError::OutOfRangeSequence(i64::from(sequence)));
    }

    let cc = country_code.trim().to_ascii_uppercase();
    if !(2..=3).contains(&cc.len()) || !cc.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(ClaimsError::InvalidInput(format!(
            "invalid country code: {country_code}"
        )));
    }

    if !(1000..=9999).contains(&year) {
        return Err(ClaimsError::InvalidInput(format!("invalid year: {year}")));
    }

    Ok(std::format!("{PREFIX}-{cc}-{year:04}-{sequence:06}"))
}

/// Parse a claim number against the fixed pattern `CLM-[A-Z]{2,3}-\d{4}-\d{6}`.
///
/// Input is case-insensitive and surrounding whitespace is ignored. Any
/// deviation from the pattern yields `None`, never a partial result.
pub fn parse(value: &str) -> Option<ParsedClaimNumber> {
    let normalized = value.trim().to_ascii_uppercase();
    let mut parts = normalized.split('-');

    if parts.next()? != PREFIX {
        return None;
    }

    let cc = parts.next()?;
    if !(2..=3).contains(&cc.len()) || !cc.bytes().all(|b| b.is_ascii_uppercase()) {
        return None;
    }

    let year_part = parts.next()?;
    if year_part.len() != 4 || !year_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let seq_part = parts.next()?;
    if seq_part.len() != 6 || !seq_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    if parts.next().is_some() {
        return None;
    }

    Some(ParsedClaimNumber {
        country_code: cc.to_string(),
        year: year_part.parse().ok()?,
        sequence: seq_part.parse().ok()?,
    })
}

/// Fast validity check; true iff `parse` would succeed.
pub fn is_valid(value: &str) -> bool {
    parse(value).is_some()
}
