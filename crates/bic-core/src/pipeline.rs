use bic_parser::ParsedStationFile;
use chrono::Datelike;
use serde::Serialize;
use tracing::{info, warn};

use crate::composite::{composite_with_boom_reference, CompositeInput, CompositeResult};
use crate::config::PipelineConfig;
use crate::diagnostics::{DiagnosticSink, StationYearDiagnostics};
use crate::discontinuity::{correct_discontinuities, rebase_to_premelt, CorrectionOutcome};
use crate::error::{PipelineError, Result};
use crate::loader::load_station_years;
use crate::onset::{detect_onset, Confidence, OnsetRecord};
use crate::series::{Channel, StationCode, StationYear, StationYearKey, TimeSeries};
use crate::station_log::{DataQuality, StationLog};

/// A station-year after manual corrections, discontinuity correction and onset detection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedStationYear {
    /// Channels after station-log corrections and the albedo obstruction offset.
    pub station_year: StationYear,
    pub correction: CorrectionOutcome,
    /// Corrected ablation, rebased to a null pre-melt level when an onset was found.
    pub corrected_ablation: TimeSeries,
    pub onset: OnsetRecord,
    /// Detected minus published onset day, when the station log has a reference.
    pub reference_deviation_days: Option<i64>,
}

impl ProcessedStationYear {
    pub fn key(&self) -> &StationYearKey {
        &self.station_year.key
    }

    pub fn composite_input(&self) -> CompositeInput<'_> {
        CompositeInput {
            station_year: &self.station_year,
            onset: &self.onset,
            corrected_ablation: &self.corrected_ablation,
        }
    }
}

/// Runs correction and detection for one station-year.
pub fn process_station_year(
    station_year: &StationYear,
    config: &PipelineConfig,
    log: Option<&StationLog>,
    sink: &mut dyn DiagnosticSink,
) -> Result<ProcessedStationYear> {
    let entry = log.and_then(|log| log.entry(&station_year.key));

    let logged = match entry {
        Some(entry) => entry.apply(station_year)?,
        None => station_year.clone(),
    };
    let offset = config.composite.albedo_obstruction_offset;
    let albedo = logged.albedo().map_values(|albedo| albedo + offset);
    let prepared = logged.with_channel(Channel::Albedo, albedo)?;

    let maintenance = entry.map(|e| e.maintenance_dates()).unwrap_or_default();
    let correction =
        correct_discontinuities(prepared.ablation(), &config.correction, &maintenance);

    let quality = entry.map(|e| e.quality).unwrap_or_default();
    let mut onset = match quality {
        DataQuality::Unusable => {
            info!(station_year = %prepared.key, "record marked unusable; detection skipped");
            OnsetRecord::undetected(&prepared, Vec::new())
        }
        _ => detect_onset(&prepared, &correction.series, &config.detection),
    };
    if quality == DataQuality::Low {
        onset.confidence = Confidence::Low;
    }

    let corrected_ablation = match onset.onset_date {
        Some(date) => rebase_to_premelt(
            &correction.series,
            date,
            config.composite.premelt_baseline_days,
        ),
        None => correction.series.clone(),
    };

    let reference_deviation_days = entry
        .and_then(|e| e.reference_onset_doy)
        .zip(onset.onset_date)
        .map(|(reference, date)| i64::from(date.ordinal()) - i64::from(reference));
    if let Some(deviation) = reference_deviation_days.filter(|d| *d != 0) {
        warn!(
            station_year = %prepared.key,
            deviation_days = deviation,
            "detected onset differs from the station log reference"
        );
    }

    if config.visualisation {
        sink.record(StationYearDiagnostics::new(
            &prepared,
            &correction,
            &corrected_ablation,
            &onset,
        ))?;
    }

    Ok(ProcessedStationYear {
        station_year: prepared,
        correction,
        corrected_ablation,
        onset,
        reference_deviation_days,
    })
}

/// Loads and processes every selected year of one station file.
pub fn process_file(
    parsed: &ParsedStationFile,
    config: &PipelineConfig,
    log: Option<&StationLog>,
    sink: &mut dyn DiagnosticSink,
) -> Result<Vec<ProcessedStationYear>> {
    load_station_years(parsed, config)?
        .iter()
        .map(|station_year| process_station_year(station_year, config, log, sink))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedStationYear {
    pub station: StationCode,
    pub year: Option<i32>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub processed: Vec<ProcessedStationYear>,
    /// Stations left out because they lie in the accumulation area.
    pub excluded_stations: Vec<StationCode>,
    pub skipped: Vec<SkippedStationYear>,
    pub composite: CompositeResult,
}

impl PipelineRun {
    pub fn onsets(&self) -> impl Iterator<Item = &OnsetRecord> {
        self.processed.iter().map(|processed| &processed.onset)
    }
}

/// Processes every station file and composites the station-years around their onsets.
///
/// Problems confined to one file or station-year are logged and recorded in
/// [`PipelineRun::skipped`], as are files that lack the selected year. Only configuration
/// errors and an empty composite abort.
pub fn run(
    files: &[ParsedStationFile],
    config: &PipelineConfig,
    log: Option<&StationLog>,
    sink: &mut dyn DiagnosticSink,
) -> Result<PipelineRun> {
    config.validate()?;

    let mut processed = Vec::new();
    let mut excluded_stations = Vec::new();
    let mut skipped = Vec::new();

    for parsed in files {
        let station = &parsed.station;
        if config.composite.is_excluded(station.as_str()) {
            info!(%station, "accumulation-area station excluded from composite");
            excluded_stations.push(station.clone());
            continue;
        }

        let station_years = match load_station_years(parsed, config) {
            Ok(station_years) => station_years,
            Err(err @ PipelineError::InvalidConfiguration(_)) => return Err(err),
            Err(PipelineError::YearUnavailable { year, available }) => {
                info!(%station, year, ?available, "selected year not in station file");
                skipped.push(SkippedStationYear {
                    station: station.clone(),
                    year: Some(year),
                    reason: format!("year {year} not in file (available: {available:?})"),
                });
                continue;
            }
            Err(err) => {
                warn!(%station, error = %err, "station file skipped");
                skipped.push(SkippedStationYear {
                    station: station.clone(),
                    year: None,
                    reason: err.to_string(),
                });
                continue;
            }
        };

        for station_year in &station_years {
            match process_station_year(station_year, config, log, sink) {
                Ok(result) => processed.push(result),
                Err(err) => {
                    warn!(station_year = %station_year.key, error = %err, "station-year skipped");
                    skipped.push(SkippedStationYear {
                        station: station.clone(),
                        year: Some(station_year.year()),
                        reason: err.to_string(),
                    });
                }
            }
        }
    }

    let inputs: Vec<CompositeInput<'_>> = processed
        .iter()
        .map(ProcessedStationYear::composite_input)
        .collect();
    let composite = composite_with_boom_reference(
        &inputs,
        config.composite.dt,
        config.composite.boom_reference(),
    )?;

    Ok(PipelineRun {
        processed,
        excluded_stations,
        skipped,
        composite,
    })
}
