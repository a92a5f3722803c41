//! Hand-curated corrections per station-year, kept in a TOML catalogue.
//!
//! ```toml
//! [[station_year]]
//! station = "KAN_L"
//! year = 2012
//! quality = "high"
//! reference_onset_doy = 176
//! maintenance_doys = [212]
//!
//! [[station_year.corrections]]
//! kind = "shift"
//! channel = "ablation"
//! from_doy = 204
//! offset = -2.6
//! ```
//!
//! Day-of-year bounds are inclusive. Ablation values are corrected after sign
//! normalisation, so a rising series means surface lowering.
//!
//! The catalogue for the PROMICE v03 daily products ships in `data/station_log.toml`
//! and is available as [`StationLog::bundled`].

use std::path::Path;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::series::{Channel, Observation, StationYear, StationYearKey, TimeSeries};

/// How far a station-year's record can be trusted for onset detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQuality {
    #[default]
    High,
    /// Detection runs, but any onset is reported with low confidence.
    Low,
    /// Detection is skipped and the station-year never contributes.
    Unusable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ManualCorrection {
    /// Adds `offset` to every present value from `from_doy` (to `to_doy`, if given).
    Shift {
        channel: Channel,
        from_doy: u32,
        #[serde(default)]
        to_doy: Option<u32>,
        offset: f64,
    },
    MaskDays {
        channel: Channel,
        doys: Vec<u32>,
    },
    MaskRange {
        channel: Channel,
        #[serde(default)]
        from_doy: Option<u32>,
        #[serde(default)]
        to_doy: Option<u32>,
    },
    /// Masks values above `threshold` inside the day range, and values equal to it
    /// unless `inclusive = false`.
    MaskAbove {
        channel: Channel,
        threshold: f64,
        #[serde(default = "inclusive_bound")]
        inclusive: bool,
        #[serde(default)]
        from_doy: Option<u32>,
        #[serde(default)]
        to_doy: Option<u32>,
    },
    /// Masks values below `threshold` inside the day range, and values equal to it
    /// unless `inclusive = false`.
    MaskBelow {
        channel: Channel,
        threshold: f64,
        #[serde(default = "inclusive_bound")]
        inclusive: bool,
        #[serde(default)]
        from_doy: Option<u32>,
        #[serde(default)]
        to_doy: Option<u32>,
    },
    /// Replaces missing values inside the day range with `value`.
    FillMissing {
        channel: Channel,
        value: f64,
        #[serde(default)]
        from_doy: Option<u32>,
        #[serde(default)]
        to_doy: Option<u32>,
    },
    /// Subtracts the value on `doy` from that day and every later one.
    /// Nothing changes when that day has no value.
    ZeroAt { channel: Channel, doy: u32 },
}

impl ManualCorrection {
    pub fn channel(&self) -> Channel {
        match self {
            ManualCorrection::Shift { channel, .. }
            | ManualCorrection::MaskDays { channel, .. }
            | ManualCorrection::MaskRange { channel, .. }
            | ManualCorrection::MaskAbove { channel, .. }
            | ManualCorrection::MaskBelow { channel, .. }
            | ManualCorrection::FillMissing { channel, .. }
            | ManualCorrection::ZeroAt { channel, .. } => *channel,
        }
    }

    fn days(&self) -> Vec<u32> {
        match self {
            ManualCorrection::Shift {
                from_doy, to_doy, ..
            } => std::iter::once(*from_doy).chain(*to_doy).collect(),
            ManualCorrection::MaskDays { doys, .. } => doys.clone(),
            ManualCorrection::ZeroAt { doy, .. } => vec![*doy],
            ManualCorrection::MaskRange {
                from_doy, to_doy, ..
            }
            | ManualCorrection::MaskAbove {
                from_doy, to_doy, ..
            }
            | ManualCorrection::MaskBelow {
                from_doy, to_doy, ..
            }
            | ManualCorrection::FillMissing {
                from_doy, to_doy, ..
            } => from_doy.iter().chain(to_doy.iter()).copied().collect(),
        }
    }

    fn adjust(&self, doy: u32, value: Option<f64>) -> Option<f64> {
        match self {
            ManualCorrection::Shift {
                from_doy,
                to_doy,
                offset,
                ..
            } if in_range(doy, Some(*from_doy), *to_doy) => value.map(|v| v + offset),
            ManualCorrection::MaskDays { doys, .. } if doys.contains(&doy) => None,
            ManualCorrection::MaskRange {
                from_doy, to_doy, ..
            } if in_range(doy, *from_doy, *to_doy) => None,
            ManualCorrection::MaskAbove {
                threshold,
                inclusive,
                from_doy,
                to_doy,
                ..
            } if in_range(doy, *from_doy, *to_doy) => {
                value.filter(|v| v < threshold || (!inclusive && v == threshold))
            }
            ManualCorrection::MaskBelow {
                threshold,
                inclusive,
                from_doy,
                to_doy,
                ..
            } if in_range(doy, *from_doy, *to_doy) => {
                value.filter(|v| v > threshold || (!inclusive && v == threshold))
            }
            ManualCorrection::FillMissing {
                value: fill,
                from_doy,
                to_doy,
                ..
            } if in_range(doy, *from_doy, *to_doy) => value.or(Some(*fill)),
            _ => value,
        }
    }

    pub fn apply(&self, series: &TimeSeries) -> TimeSeries {
        if let ManualCorrection::ZeroAt { doy, .. } = self {
            return zero_at(series, *doy);
        }
        let observations = series
            .iter()
            .map(|obs| Observation::new(obs.date, self.adjust(obs.date.ordinal(), obs.value)))
            .collect();
        TimeSeries::from_parts(observations)
    }
}

fn zero_at(series: &TimeSeries, doy: u32) -> TimeSeries {
    let reference = series
        .iter()
        .find(|obs| obs.date.ordinal() == doy)
        .and_then(|obs| obs.value);
    let Some(reference) = reference else {
        return series.clone();
    };

    let observations = series
        .iter()
        .map(|obs| {
            let value = if obs.date.ordinal() >= doy {
                obs.value.map(|v| v - reference)
            } else {
                obs.value
            };
            Observation::new(obs.date, value)
        })
        .collect();
    TimeSeries::from_parts(observations)
}

fn in_range(doy: u32, from: Option<u32>, to: Option<u32>) -> bool {
    from.map_or(true, |from| doy >= from) && to.map_or(true, |to| doy <= to)
}

fn default_albedo_valid() -> bool {
    true
}

fn inclusive_bound() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationLogEntry {
    pub station: String,
    pub year: i32,
    #[serde(default)]
    pub quality: DataQuality,
    /// When false the albedo channel is discarded for this station-year.
    #[serde(default = "default_albedo_valid")]
    pub albedo_valid: bool,
    /// Published onset day of year used to validate detections.
    #[serde(default)]
    pub reference_onset_doy: Option<u32>,
    #[serde(default)]
    pub maintenance_doys: Vec<u32>,
    #[serde(default)]
    pub corrections: Vec<ManualCorrection>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl StationLogEntry {
    pub fn matches(&self, key: &StationYearKey) -> bool {
        self.station == key.station.as_str() && self.year == key.year
    }

    pub fn maintenance_dates(&self) -> Vec<NaiveDate> {
        self.maintenance_doys
            .iter()
            .filter_map(|doy| NaiveDate::from_yo_opt(self.year, *doy))
            .collect()
    }

    /// Applies the corrections in catalogue order, then drops albedo if it is flagged unusable.
    pub fn apply(&self, station_year: &StationYear) -> Result<StationYear> {
        let mut corrected = station_year.clone();
        for correction in &self.corrections {
            let channel = correction.channel();
            let series = correction.apply(corrected.channel(channel));
            corrected = corrected.with_channel(channel, series)?;
        }

        if !self.albedo_valid {
            let missing = corrected.albedo().missing_like();
            corrected = corrected.with_channel(Channel::Albedo, missing)?;
        }
        Ok(corrected)
    }

    fn validate(&self) -> Result<()> {
        let days = self
            .corrections
            .iter()
            .flat_map(ManualCorrection::days)
            .chain(self.maintenance_doys.iter().copied())
            .chain(self.reference_onset_doy);

        for doy in days {
            if NaiveDate::from_yo_opt(self.year, doy).is_none() {
                return Err(PipelineError::InvalidConfiguration(format!(
                    "station log {}_{}: day of year {doy} does not exist",
                    self.station, self.year
                )));
            }
        }
        Ok(())
    }
}

const BUNDLED_CATALOGUE: &str = include_str!("../data/station_log.toml");

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StationLog {
    #[serde(default, rename = "station_year")]
    pub entries: Vec<StationLogEntry>,
}

impl StationLog {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let log: StationLog = toml::from_str(content)?;
        for entry in &log.entries {
            entry.validate()?;
        }

        for (idx, entry) in log.entries.iter().enumerate() {
            let duplicate = log.entries[..idx]
                .iter()
                .any(|other| other.station == entry.station && other.year == entry.year);
            if duplicate {
                return Err(PipelineError::InvalidConfiguration(format!(
                    "station log lists {}_{} more than once",
                    entry.station, entry.year
                )));
            }
        }
        Ok(log)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// The curated PROMICE catalogue compiled into the crate.
    pub fn bundled() -> Result<Self> {
        Self::from_toml_str(BUNDLED_CATALOGUE)
    }

    pub fn entry(&self, key: &StationYearKey) -> Option<&StationLogEntry> {
        self.entries.iter().find(|entry| entry.matches(key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
