//! Human-readable lead numbers, scoped by creation month.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use forgecrm_core::{DomainError, DomainResult, ValueObject};

/// A lead number of the form `LEAD-YYYYMM-XXXX`.
///
/// Numbers are unique and monotonically increasing within their month; the
/// sequence restarts at 1 each month. The sequence is zero-padded to four
/// digits but widens past 9999 rather than wrapping.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LeadNumber {
    year: i32,
    month: u32,
    sequence: u32,
}

impl LeadNumber {
    pub fn new(year: i32, month: u32, sequence: u32) -> DomainResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(DomainError::validation(format!(
                "lead number month out of range: {month}"
            )));
        }
        if !(1900..=9999).contains(&year) {
            return Err(DomainError::validation(format!(
                "lead number year out of range: {year}"
            )));
        }
        if sequence == 0 {
            return Err(DomainError::validation("lead number sequence starts at 1"));
        }
        Ok(Self {
            year,
            month,
            sequence,
        })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// The `LEAD-YYYYMM` prefix shared by all numbers in one month.
    pub fn month_prefix(year: i32, month: u32) -> String {
        format!("LEAD-{year:04}{month:02}")
    }

    /// The next number within the same month.
    pub fn next(&self) -> Self {
        Self {
            sequence: self.sequence + 1,
            ..*self
        }
    }
}

impl ValueObject for LeadNumber {}

impl core::fmt::Display for LeadNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "LEAD-{:04}{:02}-{:04}",
            self.year, self.month, self.sequence
        )
    }
}

impl FromStr for LeadNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || DomainError::invalid_id(format!("malformed lead number: {s}"));

        let rest = s.strip_prefix("LEAD-").ok_or_else(bad)?;
        let (stamp, seq) = rest.split_once('-').ok_or_else(bad)?;
        if stamp.len() != 6 {
            return Err(bad());
        }

        let year: i32 = stamp[..4].parse().map_err(|_| bad())?;
        let month: u32 = stamp[4..].parse().map_err(|_| bad())?;
        let sequence: u32 = seq.parse().map_err(|_| bad())?;
        if seq.len() < 4 {
            return Err(bad());
        }

        Self::new(year, month, sequence)
    }
}

impl TryFrom<String> for LeadNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LeadNumber> for String {
    fn from(value: LeadNumber) -> Self {
        value.to_string()
    }
}
