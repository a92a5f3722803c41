use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::str::FromStr;

use bic_parser::StationFileFormat;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Stations in the accumulation area never reach bare ice and are left out of composites.
pub const ACCUMULATION_AREA_STATIONS: &[&str] = &["CEN", "EGP", "KAN_U"];

/// Upper bound for every window expressed in days.
pub const MAX_WINDOW_DAYS: i64 = 366;

/// Which years of a station file to process. Resolved once, when station files are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawYearSelector", into = "RawYearSelector")]
pub enum YearSelector {
    #[default]
    All,
    Specific(i32),
}

impl YearSelector {
    /// Restricts `available` (the years present in a station file) to the selection.
    ///
    /// A specific year the file does not hold gives [`PipelineError::YearUnavailable`].
    pub fn resolve(&self, available: &[i32]) -> Result<Vec<i32>> {
        match self {
            YearSelector::All => Ok(available.to_vec()),
            YearSelector::Specific(year) if available.contains(year) => Ok(vec![*year]),
            YearSelector::Specific(year) => Err(PipelineError::YearUnavailable {
                year: *year,
                available: available.to_vec(),
            }),
        }
    }
}

impl FromStr for YearSelector {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(YearSelector::All);
        }
        trimmed
            .parse::<i32>()
            .map(YearSelector::Specific)
            .map_err(|_| {
                PipelineError::InvalidConfiguration(format!(
                    "unknown year selector '{trimmed}' (expected 'all' or a year)"
                ))
            })
    }
}

impl fmt::Display for YearSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YearSelector::All => f.write_str("all"),
            YearSelector::Specific(year) => write!(f, "{year}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawYearSelector {
    Year(i64),
    Text(String),
}

impl TryFrom<RawYearSelector> for YearSelector {
    type Error = PipelineError;

    fn try_from(raw: RawYearSelector) -> Result<Self> {
        match raw {
            RawYearSelector::Year(year) => i32::try_from(year)
                .map(YearSelector::Specific)
                .map_err(|_| PipelineError::InvalidConfiguration(format!("year {year} out of range"))),
            RawYearSelector::Text(text) => text.parse(),
        }
    }
}

impl From<YearSelector> for RawYearSelector {
    fn from(selector: YearSelector) -> Self {
        match selector {
            YearSelector::All => RawYearSelector::Text("all".to_string()),
            YearSelector::Specific(year) => RawYearSelector::Year(i64::from(year)),
        }
    }
}

/// Thresholds of the ablation discontinuity scan. Units follow the ablation series (m).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    /// Largest physically plausible ablation per day; faster rises are sensor events.
    pub max_daily_ablation: f64,
    /// Largest drop tolerated as noise; deeper drops are resets or reinstallations.
    pub max_negative_step: f64,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            max_daily_ablation: 0.15,
            max_negative_step: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Snow height at or below which the surface counts as snow free.
    pub snow_free_threshold: f64,
    /// Smallest daily ablation increment that counts towards a sustained run.
    pub min_ablation_increment: f64,
    /// Consecutive qualifying increments needed to confirm onset.
    pub min_run_days: usize,
    /// Longest tolerated run of missing ablation near a candidate before temperature is consulted.
    pub max_missing_run: usize,
    /// Half-width of the window inspected for missing ablation around a candidate.
    pub sparse_window_days: i64,
    /// Air temperature (°C) above which the surface may melt.
    pub freezing_point: f64,
    /// Largest tolerated distance between ablation and temperature candidates.
    pub temperature_agreement_days: i64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            snow_free_threshold: 0.02,
            min_ablation_increment: 0.002,
            min_run_days: 3,
            max_missing_run: 5,
            sparse_window_days: 10,
            freezing_point: 0.0,
            temperature_agreement_days: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    /// Half-width of the composite window in days.
    pub dt: i64,
    /// Days before onset averaged to null the pre-melt ablation.
    pub premelt_baseline_days: i64,
    /// Radiometer field-of-view obstruction correction (Aoki et al. 2011).
    pub albedo_obstruction_offset: f64,
    /// Half-open offset range `[start, end)` whose mean boom height is the bare-ice
    /// reference for the composite snow channel.
    pub boom_reference_offsets: [i64; 2],
    pub excluded_stations: Vec<String>,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            dt: 45,
            premelt_baseline_days: 45,
            albedo_obstruction_offset: 0.034,
            boom_reference_offsets: [10, 30],
            excluded_stations: ACCUMULATION_AREA_STATIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl CompositeConfig {
    pub fn is_excluded(&self, station: &str) -> bool {
        self.excluded_stations.iter().any(|s| s == station)
    }

    pub fn boom_reference(&self) -> Range<i64> {
        let [start, end] = self.boom_reference_offsets;
        start..end
    }
}

/// Source column for each channel in a parsed station table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMap {
    pub temperature: String,
    pub snow_height: String,
    pub ablation: String,
    pub albedo: String,
    /// Sensor boom height; without it the boom channel stays missing.
    #[serde(default)]
    pub boom_height: Option<String>,
    /// PROMICE reports surface lowering as negative depth; flip it to positive ablation.
    #[serde(default)]
    pub invert_ablation: bool,
}

static PROMICE_COLUMNS: Lazy<ColumnMap> = Lazy::new(|| ColumnMap {
    temperature: "AirTemperature(C)".to_string(),
    snow_height: "SnowHeight(m)".to_string(),
    ablation: "DepthPressureTransducer_Cor(m)".to_string(),
    albedo: "Albedo_theta<70d".to_string(),
    boom_height: Some("HeightSensorBoom(m)".to_string()),
    invert_ablation: true,
});

static CANONICAL_COLUMNS: Lazy<ColumnMap> = Lazy::new(|| ColumnMap {
    temperature: "air_temperature_c".to_string(),
    snow_height: "snow_height_m".to_string(),
    ablation: "ice_ablation_m".to_string(),
    albedo: "albedo".to_string(),
    boom_height: Some("boom_height_m".to_string()),
    invert_ablation: false,
});

impl ColumnMap {
    pub fn for_format(format: StationFileFormat) -> &'static ColumnMap {
        match format {
            StationFileFormat::PromiceDaily => &PROMICE_COLUMNS,
            StationFileFormat::CanonicalCsv => &CANONICAL_COLUMNS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub year: YearSelector,
    /// Emit per-station-year diagnostics to the configured sink.
    pub visualisation: bool,
    pub correction: CorrectionConfig,
    pub detection: DetectionConfig,
    pub composite: CompositeConfig,
    /// Overrides the per-format default column mapping.
    pub columns: Option<ColumnMap>,
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn columns_for(&self, format: StationFileFormat) -> &ColumnMap {
        self.columns
            .as_ref()
            .unwrap_or_else(|| ColumnMap::for_format(format))
    }

    pub fn validate(&self) -> Result<()> {
        let [boom_start, boom_end] = self.composite.boom_reference_offsets;
        let checks: [(bool, &str); 11] = [
            (
                self.correction.max_daily_ablation > 0.0,
                "correction.max_daily_ablation must be positive",
            ),
            (
                self.correction.max_negative_step >= 0.0,
                "correction.max_negative_step must not be negative",
            ),
            (
                self.detection.snow_free_threshold >= 0.0,
                "detection.snow_free_threshold must not be negative",
            ),
            (
                self.detection.min_ablation_increment > 0.0,
                "detection.min_ablation_increment must be positive",
            ),
            (
                self.detection.min_run_days >= 1,
                "detection.min_run_days must be at least 1",
            ),
            (
                self.detection.sparse_window_days >= 0 && self.detection.temperature_agreement_days >= 0,
                "detection windows must not be negative",
            ),
            (
                self.detection.sparse_window_days <= MAX_WINDOW_DAYS,
                "detection.sparse_window_days must not exceed 366 days",
            ),
            (self.composite.dt > 0, "composite.dt must be a positive number of days"),
            (
                self.composite.dt <= MAX_WINDOW_DAYS,
                "composite.dt must not exceed 366 days",
            ),
            (
                (0..=MAX_WINDOW_DAYS).contains(&self.composite.premelt_baseline_days),
                "composite.premelt_baseline_days must lie between 0 and 366",
            ),
            (
                boom_start < boom_end,
                "composite.boom_reference_offsets must be an increasing [start, end) pair",
            ),
        ];

        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, message)) => Err(PipelineError::InvalidConfiguration(message.to_string())),
            None => Ok(()),
        }
    }
}
