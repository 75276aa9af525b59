//! Wavelength range lookup.
//!
//! The header's `cRange_*` constants do not match the bands the LSA reports
//! for the UV2 model, so the band table is maintained by hand instead.

use serde::{Deserialize, Serialize};

use crate::error::{WlmError, WlmResult};
use crate::measurement::RangeLookup;

/// One entry of the table: raw range index and its band in nm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WavelengthRange {
    /// Raw index as returned by `GetRange`
    pub index: i64,
    /// Lower edge in nm
    pub min_nm: f64,
    /// Upper edge in nm
    pub max_nm: f64,
}

/// Ordered table translating raw range indices into wavelength bands.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WavelengthRangeTable {
    ranges: Vec<WavelengthRange>,
}

impl Default for WavelengthRangeTable {
    fn default() -> Self {
        Self {
            ranges: vec![
                WavelengthRange { index: 0, min_nm: 190.0, max_nm: 260.0 },
                WavelengthRange { index: 1, min_nm: 250.0, max_nm: 330.0 },
                WavelengthRange { index: 2, min_nm: 320.0, max_nm: 420.0 },
            ],
        }
    }
}

impl WavelengthRangeTable {
    /// Build a table from `(index, min_nm, max_nm)` rows.
    ///
    /// Rejects duplicate indices and bands whose minimum is not below the maximum.
    pub fn new(rows: impl IntoIterator<Item = (i64, f64, f64)>) -> WlmResult<Self> {
        let mut ranges: Vec<WavelengthRange> = Vec::new();
        for (index, min_nm, max_nm) in rows {
            if min_nm >= max_nm {
                return Err(WlmError::Configuration(format!(
                    "Range {index} has min {min_nm} nm >= max {max_nm} nm"
                )));
            }
            if ranges.iter().any(|r| r.index == index) {
                return Err(WlmError::Configuration(format!(
                    "Duplicate wavelength range index {index}"
                )));
            }
            ranges.push(WavelengthRange { index, min_nm, max_nm });
        }
        Ok(Self { ranges })
    }

    /// The row for `index`, if any.
    pub fn get(&self, index: i64) -> Option<&WavelengthRange> {
        self.ranges.iter().find(|r| r.index == index)
    }

    /// Translate a raw index; unknown indices become [`RangeLookup::NotFound`].
    pub fn lookup(&self, index: i64) -> RangeLookup {
        match self.get(index) {
            Some(range) => RangeLookup::Found {
                index,
                min_nm: range.min_nm,
                max_nm: range.max_nm,
            },
            None => RangeLookup::NotFound { index },
        }
    }

    /// Rows in table order.
    pub fn iter(&self) -> impl Iterator<Item = &WavelengthRange> {
        self.ranges.iter()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}
