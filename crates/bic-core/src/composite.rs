use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::onset::OnsetRecord;
use crate::series::{Channel, StationYear, StationYearKey, TimeSeries};

/// One station-year handed to the compositor.
#[derive(Debug, Clone, Copy)]
pub struct CompositeInput<'a> {
    pub station_year: &'a StationYear,
    pub onset: &'a OnsetRecord,
    /// Replaces the raw ablation channel of `station_year`.
    pub corrected_ablation: &'a TimeSeries,
}

impl<'a> CompositeInput<'a> {
    fn series(&self, channel: Channel) -> &'a TimeSeries {
        match channel {
            Channel::Ablation => self.corrected_ablation,
            other => self.station_year.channel(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OffsetStatistic {
    pub offset: i64,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlbedoStatistic {
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub count: usize,
}

/// A station-year's values on the offset axis; `values[i]` belongs to offset `i - dt`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeRow {
    pub key: StationYearKey,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelComposite {
    pub statistics: Vec<OffsetStatistic>,
    pub rows: Vec<CompositeRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeResult {
    pub dt: i64,
    pub offsets: Vec<i64>,
    pub channels: BTreeMap<Channel, ChannelComposite>,
    pub onset_albedo: AlbedoStatistic,
    pub contributors: Vec<StationYearKey>,
    pub station_count: usize,
    /// Station-years without a detected onset.
    pub excluded: usize,
}

impl CompositeResult {
    pub fn channel(&self, channel: Channel) -> Option<&ChannelComposite> {
        self.channels.get(&channel)
    }

    pub fn statistic(&self, channel: Channel, offset: i64) -> Option<&OffsetStatistic> {
        if offset.abs() > self.dt {
            return None;
        }
        self.channel(channel)?
            .statistics
            .get((offset + self.dt) as usize)
    }

    pub fn station_year_count(&self) -> usize {
        self.contributors.len()
    }
}

/// Offsets whose mean boom height serves as the bare-ice reference by default.
pub const DEFAULT_BOOM_REFERENCE: Range<i64> = 10..30;

/// Aligns every station-year with a detected onset on `offset = date - onset` and
/// summarises each channel per offset over `[-dt, dt]`.
///
/// The boom-height channel is composited as surface height above the bare-ice
/// reference, `mean(boom over DEFAULT_BOOM_REFERENCE) - boom`, taken per station-year.
pub fn composite(inputs: &[CompositeInput<'_>], dt: i64) -> Result<CompositeResult> {
    composite_with_boom_reference(inputs, dt, DEFAULT_BOOM_REFERENCE)
}

/// [`composite`] with an explicit half-open offset range for the boom-height reference.
pub fn composite_with_boom_reference(
    inputs: &[CompositeInput<'_>],
    dt: i64,
    boom_reference: Range<i64>,
) -> Result<CompositeResult> {
    if dt <= 0 {
        return Err(PipelineError::InvalidConfiguration(format!(
            "composite half-width must be positive, got {dt}"
        )));
    }

    let detected: Vec<(&CompositeInput<'_>, NaiveDate)> = inputs
        .iter()
        .filter_map(|input| input.onset.onset_date.map(|date| (input, date)))
        .collect();
    let excluded = inputs.len() - detected.len();

    if detected.is_empty() {
        return Err(PipelineError::NoContributors { excluded });
    }

    let width = (2 * dt + 1) as usize;
    let offsets: Vec<i64> = (-dt..=dt).collect();

    let mut channels = BTreeMap::new();
    for channel in Channel::ALL {
        let rows: Vec<CompositeRow> = detected
            .iter()
            .map(|(input, onset)| {
                let mut values = align_on_onset(input.series(channel), *onset, dt, width);
                if channel == Channel::BoomHeight {
                    values = height_above_reference(&values, dt, &boom_reference);
                }
                CompositeRow {
                    key: input.station_year.key.clone(),
                    values,
                }
            })
            .collect();

        let statistics = offsets
            .iter()
            .enumerate()
            .map(|(column, &offset)| {
                let present: Vec<f64> = rows.iter().filter_map(|row| row.values[column]).collect();
                let (mean, std) = mean_and_std(&present);
                OffsetStatistic {
                    offset,
                    mean,
                    std,
                    count: present.len(),
                }
            })
            .collect();

        channels.insert(channel, ChannelComposite { statistics, rows });
    }

    let onset_albedos: Vec<f64> = detected
        .iter()
        .filter_map(|(input, _)| input.onset.albedo)
        .collect();
    let (mean, std) = mean_and_std(&onset_albedos);
    let onset_albedo = AlbedoStatistic {
        mean,
        std,
        count: onset_albedos.len(),
    };

    let contributors: Vec<StationYearKey> = detected
        .iter()
        .map(|(input, _)| input.station_year.key.clone())
        .collect();
    let station_count = contributors
        .iter()
        .map(|key| &key.station)
        .collect::<BTreeSet<_>>()
        .len();

    info!(
        station_years = contributors.len(),
        stations = station_count,
        excluded,
        dt,
        onset_albedo_mean = ?onset_albedo.mean,
        onset_albedo_std = ?onset_albedo.std,
        "composite built"
    );

    Ok(CompositeResult {
        dt,
        offsets,
        channels,
        onset_albedo,
        contributors,
        station_count,
        excluded,
    })
}

fn align_on_onset(series: &TimeSeries, onset: NaiveDate, dt: i64, width: usize) -> Vec<Option<f64>> {
    let mut values = vec![None; width];
    for obs in series.iter() {
        let offset = (obs.date - onset).num_days();
        if offset.abs() <= dt {
            values[(offset + dt) as usize] = obs.value;
        }
    }
    values
}

/// `reference - value` for every aligned boom height, where the reference is the mean over
/// the offsets in `reference`. Without a reference value the row is entirely missing.
fn height_above_reference(
    values: &[Option<f64>],
    dt: i64,
    reference: &Range<i64>,
) -> Vec<Option<f64>> {
    let in_window: Vec<f64> = values
        .iter()
        .enumerate()
        .filter(|(column, _)| reference.contains(&(*column as i64 - dt)))
        .filter_map(|(_, value)| *value)
        .collect();

    match mean_and_std(&in_window) {
        (Some(level), _) => values.iter().map(|v| v.map(|v| level - v)).collect(),
        (None, _) => vec![None; values.len()],
    }
}

/// Arithmetic mean and sample standard deviation. The deviation needs two values.
fn mean_and_std(values: &[f64]) -> (Option<f64>, Option<f64>) {
    let n = values.len();
    if n == 0 {
        return (None, None);
    }

    let mean = values.iter().sum::<f64>() / n as f64;
    if n == 1 {
        return (Some(mean), None);
    }

    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (Some(mean), Some(variance.sqrt()))
}
