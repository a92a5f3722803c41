use std::fmt;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

pub use bic_parser::StationCode;

use crate::error::{PipelineError, Result};

/// One daily sample. `value` is `None` when the sensor reported nothing usable; a present
/// `0.0` is a real measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

impl Observation {
    /// Non-finite values are stored as missing.
    pub fn new(date: NaiveDate, value: Option<f64>) -> Self {
        Self {
            date,
            value: value.filter(|v| v.is_finite()),
        }
    }

    pub fn missing(date: NaiveDate) -> Self {
        Self { date, value: None }
    }
}

/// Date-ordered sequence of daily observations.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct TimeSeries {
    observations: Vec<Observation>,
}

impl TimeSeries {
    pub fn new(observations: Vec<Observation>) -> Result<Self> {
        if let Some(pair) = observations.windows(2).find(|w| w[1].date <= w[0].date) {
            return Err(PipelineError::Validation(format!(
                "series dates must be strictly increasing ({} followed by {})",
                pair[0].date, pair[1].date
            )));
        }
        Ok(Self { observations })
    }

    /// Builds a series over consecutive days starting at `start`.
    pub fn from_values(start: NaiveDate, values: &[Option<f64>]) -> Self {
        let observations = values
            .iter()
            .enumerate()
            .map(|(idx, value)| Observation::new(start + Duration::days(idx as i64), *value))
            .collect();
        Self { observations }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.observations.iter()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.observations.iter().map(|obs| obs.date)
    }

    pub fn values(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        self.observations.iter().map(|obs| obs.value)
    }

    pub fn position(&self, date: NaiveDate) -> Option<usize> {
        self.observations
            .binary_search_by_key(&date, |obs| obs.date)
            .ok()
    }

    pub fn value_on(&self, date: NaiveDate) -> Option<f64> {
        self.position(date)
            .and_then(|idx| self.observations[idx].value)
    }

    pub fn valid_count(&self) -> usize {
        self.observations
            .iter()
            .filter(|obs| obs.value.is_some())
            .count()
    }

    pub fn is_all_missing(&self) -> bool {
        self.valid_count() == 0
    }

    /// Applies `f` to every present value; missing values stay missing.
    pub fn map_values(&self, f: impl Fn(f64) -> f64) -> TimeSeries {
        let observations = self
            .observations
            .iter()
            .map(|obs| Observation::new(obs.date, obs.value.map(&f)))
            .collect();
        TimeSeries { observations }
    }

    /// A series over the same dates with every value missing.
    pub fn missing_like(&self) -> TimeSeries {
        TimeSeries {
            observations: self
                .observations
                .iter()
                .map(|obs| Observation::missing(obs.date))
                .collect(),
        }
    }

    pub fn same_index(&self, other: &TimeSeries) -> bool {
        self.len() == other.len() && self.dates().zip(other.dates()).all(|(a, b)| a == b)
    }

    pub(crate) fn from_parts(observations: Vec<Observation>) -> Self {
        Self { observations }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Temperature,
    SnowHeight,
    Ablation,
    Albedo,
    /// Height of the sensor boom above the surface.
    BoomHeight,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::Temperature,
        Channel::SnowHeight,
        Channel::Ablation,
        Channel::Albedo,
        Channel::BoomHeight,
    ];

    pub fn canonical_name(&self) -> &'static str {
        match self {
            Channel::Temperature => "air_temperature_c",
            Channel::SnowHeight => "snow_height_m",
            Channel::Ablation => "ice_ablation_m",
            Channel::Albedo => "albedo",
            Channel::BoomHeight => "boom_height_m",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StationYearKey {
    pub station: StationCode,
    pub year: i32,
}

impl StationYearKey {
    pub fn new(station: StationCode, year: i32) -> Self {
        Self { station, year }
    }
}

impl fmt::Display for StationYearKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.station, self.year)
    }
}

/// One station's observations for one year. All channels share one date index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationYear {
    pub key: StationYearKey,
    temperature: TimeSeries,
    snow_height: TimeSeries,
    ablation: TimeSeries,
    albedo: TimeSeries,
    boom_height: TimeSeries,
}

impl StationYear {
    /// The boom height starts out missing; set it with [`StationYear::with_channel`].
    pub fn new(
        key: StationYearKey,
        temperature: TimeSeries,
        snow_height: TimeSeries,
        ablation: TimeSeries,
        albedo: TimeSeries,
    ) -> Result<Self> {
        for (channel, series) in [
            (Channel::SnowHeight, &snow_height),
            (Channel::Ablation, &ablation),
            (Channel::Albedo, &albedo),
        ] {
            if !temperature.same_index(series) {
                return Err(PipelineError::Validation(format!(
                    "{key}: {channel} is not aligned with {}",
                    Channel::Temperature
                )));
            }
        }

        if let Some(obs) = temperature.iter().find(|obs| obs.date.year() != key.year) {
            return Err(PipelineError::Validation(format!(
                "{key}: date {} lies outside the observation year",
                obs.date
            )));
        }

        let boom_height = temperature.missing_like();
        Ok(Self {
            key,
            temperature,
            snow_height,
            ablation,
            albedo,
            boom_height,
        })
    }

    pub fn station(&self) -> &StationCode {
        &self.key.station
    }

    pub fn year(&self) -> i32 {
        self.key.year
    }

    pub fn len(&self) -> usize {
        self.temperature.len()
    }

    pub fn is_empty(&self) -> bool {
        self.temperature.is_empty()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.temperature.dates()
    }

    pub fn channel(&self, channel: Channel) -> &TimeSeries {
        match channel {
            Channel::Temperature => &self.temperature,
            Channel::SnowHeight => &self.snow_height,
            Channel::Ablation => &self.ablation,
            Channel::Albedo => &self.albedo,
            Channel::BoomHeight => &self.boom_height,
        }
    }

    pub fn temperature(&self) -> &TimeSeries {
        &self.temperature
    }

    pub fn snow_height(&self) -> &TimeSeries {
        &self.snow_height
    }

    pub fn ablation(&self) -> &TimeSeries {
        &self.ablation
    }

    pub fn albedo(&self) -> &TimeSeries {
        &self.albedo
    }

    pub fn boom_height(&self) -> &TimeSeries {
        &self.boom_height
    }

    /// Returns a copy with `series` in place of `channel`; the index must match.
    pub fn with_channel(&self, channel: Channel, series: TimeSeries) -> Result<StationYear> {
        let mut next = self.clone();
        let slot = match channel {
            Channel::Temperature => &mut next.temperature,
            Channel::SnowHeight => &mut next.snow_height,
            Channel::Ablation => &mut next.ablation,
            Channel::Albedo => &mut next.albedo,
            Channel::BoomHeight => &mut next.boom_height,
        };
        if !slot.same_index(&series) {
            return Err(PipelineError::Validation(format!(
                "{}: replacement {channel} series has a different date index",
                self.key
            )));
        }
        *slot = series;
        Ok(next)
    }
}
