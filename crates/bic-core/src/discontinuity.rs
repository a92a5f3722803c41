use chrono::{Duration, NaiveDate};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::CorrectionConfig;
use crate::series::{Observation, TimeSeries};

/// Why a step between two valid observations was treated as a discontinuity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JumpKind {
    /// Rise faster than `max_daily_ablation` per elapsed day.
    ExcessiveRise,
    /// Drop deeper than `max_negative_step`, typically a sensor reset.
    NegativeStep,
    /// Step onto a known maintenance date.
    Maintenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesBoundary {
    FirstValid,
    LastValid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedShift {
    /// First date the offset applies to.
    pub date: NaiveDate,
    pub offset: f64,
    pub kind: JumpKind,
}

/// A jump that touches the first or last valid observation and cannot be anchored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UncorrectableJump {
    pub date: NaiveDate,
    pub step: f64,
    pub kind: JumpKind,
    pub boundary: SeriesBoundary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectionOutcome {
    pub series: TimeSeries,
    pub applied: Vec<AppliedShift>,
    pub uncorrectable: Vec<UncorrectableJump>,
}

impl CorrectionOutcome {
    pub fn total_offset(&self) -> f64 {
        self.applied.iter().map(|shift| shift.offset).sum()
    }
}

/// Removes offset discontinuities from a cumulative ablation series.
///
/// Consecutive valid observations are compared on the progressively corrected series. A
/// detected jump is replaced by the increment of the preceding valid pair, and the
/// resulting offset carries over to every later value. Missing values stay missing.
pub fn correct_discontinuities(
    series: &TimeSeries,
    config: &CorrectionConfig,
    maintenance: &[NaiveDate],
) -> CorrectionOutcome {
    let observations = series.observations();
    let valid: Vec<(usize, f64)> = observations
        .iter()
        .enumerate()
        .filter_map(|(idx, obs)| obs.value.map(|value| (idx, value)))
        .collect();

    // Corrected level of each valid observation, in the order of `valid`.
    let mut levels: Vec<f64> = Vec::with_capacity(valid.len());
    let mut applied = Vec::new();
    let mut uncorrectable = Vec::new();
    let mut offset = 0.0;

    for (k, &(cur_idx, raw)) in valid.iter().enumerate() {
        let mut current = raw + offset;
        let Some(&prev) = levels.last() else {
            levels.push(current);
            continue;
        };

        let prev_date = observations[valid[k - 1].0].date;
        let date = observations[cur_idx].date;
        let gap = days_between(prev_date, date);
        let step = current - prev;

        if let Some(kind) = classify_step(step, gap, maintenance.contains(&date), config) {
            let boundary = if k == 1 {
                Some(SeriesBoundary::FirstValid)
            } else if k == valid.len() - 1 {
                Some(SeriesBoundary::LastValid)
            } else {
                None
            };

            if let Some(boundary) = boundary {
                warn!(
                    %date,
                    step,
                    ?kind,
                    ?boundary,
                    "ablation jump at series boundary left uncorrected"
                );
                uncorrectable.push(UncorrectableJump {
                    date,
                    step,
                    kind,
                    boundary,
                });
            } else {
                let anchor = levels[k - 2];
                let anchor_date = observations[valid[k - 2].0].date;
                let slope = (prev - anchor) / days_between(anchor_date, prev_date);
                let shift = prev - current + slope * gap;

                debug!(%date, step, shift, ?kind, "correcting ablation discontinuity");
                offset += shift;
                current += shift;
                applied.push(AppliedShift {
                    date,
                    offset: shift,
                    kind,
                });
            }
        }

        levels.push(current);
    }

    let mut corrected: Vec<Option<f64>> = vec![None; observations.len()];
    for (&(idx, _), level) in valid.iter().zip(levels) {
        corrected[idx] = Some(level);
    }

    let observations = observations
        .iter()
        .zip(corrected)
        .map(|(obs, value)| Observation::new(obs.date, value))
        .collect();

    CorrectionOutcome {
        series: TimeSeries::from_parts(observations),
        applied,
        uncorrectable,
    }
}

fn classify_step(
    step: f64,
    gap: f64,
    on_maintenance_date: bool,
    config: &CorrectionConfig,
) -> Option<JumpKind> {
    if on_maintenance_date {
        Some(JumpKind::Maintenance)
    } else if step > config.max_daily_ablation * gap {
        Some(JumpKind::ExcessiveRise)
    } else if step < -config.max_negative_step {
        Some(JumpKind::NegativeStep)
    } else {
        None
    }
}

fn days_between(from: NaiveDate, to: NaiveDate) -> f64 {
    (to - from).num_days() as f64
}

/// Shifts `series` so that its mean over the `days` preceding `onset` is zero.
///
/// The window is `(onset - days, onset)`: both ends are left out. Without any valid value in it the series is
/// returned unchanged.
pub fn rebase_to_premelt(series: &TimeSeries, onset: NaiveDate, days: i64) -> TimeSeries {
    let window_start = onset - Duration::days(days);
    let (sum, count) = series
        .iter()
        .filter(|obs| obs.date > window_start && obs.date < onset)
        .filter_map(|obs| obs.value)
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));

    if count == 0 {
        return series.clone();
    }

    let baseline = sum / count as f64;
    series.map_values(|value| value - baseline)
}
