use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::DetectionConfig;
use crate::series::{StationCode, StationYear, StationYearKey, TimeSeries};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnsetFlag {
    /// Ablation around the onset has a missing run longer than `max_missing_run`.
    SparseAblation,
    /// Temperature-based onset lies too far from the ablation-based one.
    TemperatureDisagreement,
    /// Temperature never stays above freezing long enough to corroborate.
    NoTemperatureCrossing,
    /// Snow height was never observed; the snow-free condition was waived.
    SnowChannelMissing,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Low => "low",
        }
    }
}

impl OnsetFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnsetFlag::SparseAblation => "sparse_ablation",
            OnsetFlag::TemperatureDisagreement => "temperature_disagreement",
            OnsetFlag::NoTemperatureCrossing => "no_temperature_crossing",
            OnsetFlag::SnowChannelMissing => "snow_channel_missing",
        }
    }
}

/// Outcome of onset detection for one station-year. `onset_date` is `None` when no
/// bare-ice onset was found, which is a normal result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnsetRecord {
    pub station: StationCode,
    pub year: i32,
    pub onset_date: Option<NaiveDate>,
    pub albedo: Option<f64>,
    pub confidence: Confidence,
    pub flags: Vec<OnsetFlag>,
}

impl OnsetRecord {
    pub fn undetected(station_year: &StationYear, flags: Vec<OnsetFlag>) -> Self {
        Self {
            station: station_year.station().clone(),
            year: station_year.year(),
            onset_date: None,
            albedo: None,
            confidence: Confidence::Low,
            flags,
        }
    }

    pub fn key(&self) -> StationYearKey {
        StationYearKey::new(self.station.clone(), self.year)
    }

    pub fn is_detected(&self) -> bool {
        self.onset_date.is_some()
    }

    pub fn onset_day_of_year(&self) -> Option<u32> {
        self.onset_date.map(|date| date.ordinal())
    }

    pub fn has_flag(&self, flag: OnsetFlag) -> bool {
        self.flags.contains(&flag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetectorState {
    PreMelt,
    AblationCandidate,
    Confirmed(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SnowCover {
    Free,
    Covered,
    Unknown,
}

/// Finds the first day of a station-year on which the surface is snow free and the
/// corrected ablation starts a sustained rise.
///
/// `corrected_ablation` is read by date, so it may be any series covering the
/// station-year. The result depends only on the inputs.
pub fn detect_onset(
    station_year: &StationYear,
    corrected_ablation: &TimeSeries,
    config: &DetectionConfig,
) -> OnsetRecord {
    let dates: Vec<NaiveDate> = station_year.dates().collect();
    let ablation: Vec<Option<f64>> = dates
        .iter()
        .map(|date| corrected_ablation.value_on(*date))
        .collect();
    let snow: Vec<Option<f64>> = station_year.snow_height().values().collect();
    let snow_missing = station_year.snow_height().is_all_missing();

    let increments = daily_increments(&ablation);
    let sustained_from = |day: usize| sustained_run(&increments, day, config);

    let mut flags = Vec::new();
    if snow_missing {
        flags.push(OnsetFlag::SnowChannelMissing);
    }

    let mut state = DetectorState::PreMelt;
    for (day, snow_height) in snow.iter().enumerate() {
        let cover = match snow_height {
            _ if snow_missing => SnowCover::Free,
            Some(height) if *height <= config.snow_free_threshold => SnowCover::Free,
            Some(_) => SnowCover::Covered,
            None => SnowCover::Unknown,
        };

        state = match (state, cover) {
            (DetectorState::PreMelt, SnowCover::Free)
            | (DetectorState::AblationCandidate, SnowCover::Free | SnowCover::Unknown) => {
                if sustained_from(day) {
                    DetectorState::Confirmed(day)
                } else {
                    DetectorState::AblationCandidate
                }
            }
            (DetectorState::AblationCandidate, SnowCover::Covered) => DetectorState::PreMelt,
            (state, _) => state,
        };

        if let DetectorState::Confirmed(_) = state {
            break;
        }
    }

    let DetectorState::Confirmed(onset_idx) = state else {
        debug!(station_year = %station_year.key, "no bare-ice onset detected");
        return OnsetRecord::undetected(station_year, flags);
    };

    let onset_date = dates[onset_idx];
    let mut confidence = if snow_missing {
        Confidence::Low
    } else {
        Confidence::High
    };

    if longest_missing_run(&ablation, onset_idx, config.sparse_window_days) > config.max_missing_run {
        flags.push(OnsetFlag::SparseAblation);
        let temperature: Vec<Option<f64>> = station_year.temperature().values().collect();
        match temperature_onset(&temperature, config) {
            None => {
                flags.push(OnsetFlag::NoTemperatureCrossing);
                confidence = Confidence::Low;
            }
            Some(temp_idx) => {
                let distance = (dates[temp_idx] - onset_date).num_days().abs();
                if distance > config.temperature_agreement_days {
                    flags.push(OnsetFlag::TemperatureDisagreement);
                    confidence = Confidence::Low;
                }
            }
        }
    }

    let albedo = station_year.albedo().value_on(onset_date);
    info!(
        station_year = %station_year.key,
        onset = %onset_date,
        day_of_year = onset_date.ordinal(),
        ?albedo,
        ?confidence,
        "bare-ice onset detected"
    );

    OnsetRecord {
        station: station_year.station().clone(),
        year: station_year.year(),
        onset_date: Some(onset_date),
        albedo,
        confidence,
        flags,
    }
}

/// `increments[d] = ablation[d] - ablation[d - 1]` when both days are present.
fn daily_increments(ablation: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut increments = Vec::with_capacity(ablation.len());
    increments.push(None);
    increments.extend(ablation.windows(2).map(|pair| match (pair[0], pair[1]) {
        (Some(prev), Some(cur)) => Some(cur - prev),
        _ => None,
    }));
    increments.truncate(ablation.len());
    increments
}

fn sustained_run(increments: &[Option<f64>], day: usize, config: &DetectionConfig) -> bool {
    let end = day + config.min_run_days;
    end <= increments.len()
        && increments[day..end]
            .iter()
            .all(|inc| inc.is_some_and(|value| value >= config.min_ablation_increment))
}

fn longest_missing_run(values: &[Option<f64>], center: usize, half_width: i64) -> usize {
    let half_width = usize::try_from(half_width).unwrap_or(0);
    let start = center.saturating_sub(half_width);
    let end = (center + half_width + 1).min(values.len());

    let mut longest = 0;
    let mut current = 0;
    for value in &values[start..end] {
        if value.is_none() {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// First day starting `min_run_days` consecutive days above the freezing point.
fn temperature_onset(temperature: &[Option<f64>], config: &DetectionConfig) -> Option<usize> {
    let run = config.min_run_days;
    if run == 0 || temperature.len() < run {
        return None;
    }
    temperature.windows(run).position(|window| {
        window
            .iter()
            .all(|value| value.is_some_and(|t| t > config.freezing_point))
    })
}
