use chrono::NaiveDate;
use serde::Serialize;

use crate::discontinuity::{AppliedShift, CorrectionOutcome, UncorrectableJump};
use crate::error::Result;
use crate::onset::OnsetRecord;
use crate::series::{StationYear, StationYearKey, TimeSeries};

/// Everything an external renderer needs to plot one processed station-year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationYearDiagnostics {
    pub key: StationYearKey,
    pub temperature: TimeSeries,
    pub snow_height: TimeSeries,
    pub raw_ablation: TimeSeries,
    pub corrected_ablation: TimeSeries,
    pub albedo: TimeSeries,
    pub boom_height: TimeSeries,
    pub onset_date: Option<NaiveDate>,
    /// Position of the onset in the station-year's date index.
    pub onset_index: Option<usize>,
    pub applied_shifts: Vec<AppliedShift>,
    pub uncorrectable: Vec<UncorrectableJump>,
}

impl StationYearDiagnostics {
    pub fn new(
        station_year: &StationYear,
        correction: &CorrectionOutcome,
        corrected_ablation: &TimeSeries,
        onset: &OnsetRecord,
    ) -> Self {
        Self {
            key: station_year.key.clone(),
            temperature: station_year.temperature().clone(),
            snow_height: station_year.snow_height().clone(),
            raw_ablation: station_year.ablation().clone(),
            corrected_ablation: corrected_ablation.clone(),
            albedo: station_year.albedo().clone(),
            boom_height: station_year.boom_height().clone(),
            onset_date: onset.onset_date,
            onset_index: onset
                .onset_date
                .and_then(|date| station_year.temperature().position(date)),
            applied_shifts: correction.applied.clone(),
            uncorrectable: correction.uncorrectable.clone(),
        }
    }
}

/// Receives diagnostics for each processed station-year when visualisation is enabled.
pub trait DiagnosticSink {
    fn record(&mut self, diagnostics: StationYearDiagnostics) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl DiagnosticSink for NoopSink {
    fn record(&mut self, _diagnostics: StationYearDiagnostics) -> Result<()> {
        Ok(())
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    records: Vec<StationYearDiagnostics>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[StationYearDiagnostics] {
        &self.records
    }

    pub fn into_records(self) -> Vec<StationYearDiagnostics> {
        self.records
    }
}

impl DiagnosticSink for CollectingSink {
    fn record(&mut self, diagnostics: StationYearDiagnostics) -> Result<()> {
        self.records.push(diagnostics);
        Ok(())
    }
}
