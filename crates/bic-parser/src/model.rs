use std::fmt;
use std::path::Path;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::ParserError;

/// Integer column holding the calendar year of each daily row.
pub const YEAR_COLUMN: &str = "Year";
/// Integer column holding the day of year (1-based) of each daily row.
pub const DAY_OF_YEAR_COLUMN: &str = "DayOfYear";

/// Sentinel PROMICE writes for invalid or absent measurements.
pub const MISSING_SENTINEL: f64 = -999.0;

/// Stations whose code is the first file-name token only.
const SINGLE_TOKEN_STATIONS: &[&str] = &["MIT", "EGP", "CEN"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationCode(String);

impl StationCode {
    pub fn new(code: impl Into<String>) -> Result<Self, String> {
        let code = code.into();
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return Err("station code must not be empty".to_string());
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(format!("invalid station code '{trimmed}'"));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Derives the station code from a PROMICE-style file name, e.g.
    /// `KAN_L_day_v03_upd.txt` -> `KAN_L` and `MIT_day_v03_upd.txt` -> `MIT`.
    pub fn from_file_name(file_name: &str) -> Result<Self, ParserError> {
        let base = Path::new(file_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(file_name);

        let mut tokens = base.split('_').filter(|t| !t.is_empty());
        let first = tokens
            .next()
            .ok_or_else(|| ParserError::InvalidStationName(file_name.to_string()))?;

        let code = if SINGLE_TOKEN_STATIONS
            .iter()
            .any(|prefix| first.eq_ignore_ascii_case(prefix))
        {
            first.to_ascii_uppercase()
        } else {
            match tokens.next() {
                Some(second) => format!("{first}_{second}"),
                None => first.to_string(),
            }
        };

        Self::new(code).map_err(|_| ParserError::InvalidStationName(file_name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for StationCode {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        StationCode::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationFileFormat {
    /// Whitespace-delimited PROMICE daily product (`*_day_v03_upd.txt`).
    PromiceDaily,
    /// Comma-separated file with a `date` column and one column per channel.
    CanonicalCsv,
}

impl StationFileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            StationFileFormat::PromiceDaily => "promice_daily",
            StationFileFormat::CanonicalCsv => "canonical_csv",
        }
    }
}

impl fmt::Display for StationFileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed station file: a daily table with integer `Year` / `DayOfYear` columns and one
/// nullable `Float64` column per measured variable.
#[derive(Debug, Clone)]
pub struct ParsedStationFile {
    pub file_hash: String,
    pub station: StationCode,
    pub format: StationFileFormat,
    pub df: DataFrame,
}

impl ParsedStationFile {
    /// Distinct years present in the file, ascending.
    pub fn years(&self) -> PolarsResult<Vec<i32>> {
        let years = self.df.column(YEAR_COLUMN)?.i32()?;
        let mut distinct: Vec<i32> = years.into_iter().flatten().collect();
        distinct.sort_unstable();
        distinct.dedup();
        Ok(distinct)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.df.column(name).is_ok()
    }
}
