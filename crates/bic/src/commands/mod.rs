pub mod composite;
pub mod process;

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bic_core::config::PipelineConfig;
use bic_core::diagnostics::{DiagnosticSink, StationYearDiagnostics};
use bic_core::onset::OnsetRecord;
use bic_core::pipeline::ProcessedStationYear;
use bic_core::station_log::StationLog;
use bic_parser::{parse_station_file, ParsedStationFile};
use comfy_table::Table;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{info, warn};

pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    dotenvy::dotenv().ok();
    let path = match path {
        Some(path) => Some(path.to_path_buf()),
        None => std::env::var_os("BIC_CONFIG").map(PathBuf::from),
    };

    match path {
        Some(path) => {
            let config = PipelineConfig::from_path(&path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?;
            info!(path = %path.display(), "configuration loaded");
            Ok(config)
        }
        None => Ok(PipelineConfig::default()),
    }
}

/// Station-log selection shared by the subcommands.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct StationLogArgs {
    /// Manual correction catalogue (TOML) used instead of the bundled one
    #[arg(long)]
    pub station_log: Option<PathBuf>,
    /// Process the records without any manual corrections
    #[arg(long, conflicts_with = "station_log")]
    pub no_station_log: bool,
}

pub fn load_station_log(args: &StationLogArgs) -> Result<Option<StationLog>> {
    if args.no_station_log {
        return Ok(None);
    }
    let log = match &args.station_log {
        Some(path) => {
            let log = StationLog::from_path(path)
                .with_context(|| format!("failed to load station log from {}", path.display()))?;
            info!(path = %path.display(), entries = log.len(), "station log loaded");
            log
        }
        None => {
            let log = StationLog::bundled().context("bundled station log is invalid")?;
            info!(entries = log.len(), "bundled station log loaded");
            log
        }
    };
    Ok(Some(log))
}

/// Reads and parses the files concurrently. Files that cannot be read or parsed are
/// logged and left out; the result keeps the order of `paths`.
pub async fn read_station_files(paths: Vec<PathBuf>) -> Result<Vec<ParsedStationFile>> {
    let mut tasks = JoinSet::new();
    for (position, path) in paths.into_iter().enumerate() {
        tasks.spawn(async move {
            let outcome = read_station_file(&path).await;
            (position, path, outcome)
        });
    }

    let mut parsed = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (position, path, outcome) = joined.context("file reader task failed")?;
        match outcome {
            Ok(file) => parsed.push((position, file)),
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(path = %path.display(), error = %reason, "station file skipped");
            }
        }
    }

    parsed.sort_by_key(|(position, _)| *position);
    Ok(parsed.into_iter().map(|(_, file)| file).collect())
}

pub async fn read_station_file(path: &Path) -> Result<ParsedStationFile> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))?;
    let parsed = parse_station_file(file_name, &content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    info!(
        path = %path.display(),
        station = %parsed.station,
        format = parsed.format.as_str(),
        rows = parsed.df.height(),
        "station file parsed"
    );
    Ok(parsed)
}

/// Writes one pretty-printed JSON document per station-year into a directory.
pub struct JsonDiagnosticSink {
    dir: PathBuf,
    written: usize,
}

impl JsonDiagnosticSink {
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create diagnostics directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            written: 0,
        })
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl DiagnosticSink for JsonDiagnosticSink {
    fn record(&mut self, diagnostics: StationYearDiagnostics) -> bic_core::Result<()> {
        let path = self.dir.join(format!("{}_diagnostics.json", diagnostics.key));
        let file = File::create(&path)?;
        serde_json::to_writer_pretty(file, &diagnostics)?;
        self.written += 1;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct OnsetRow<'a> {
    station: &'a str,
    year: i32,
    onset_date: Option<String>,
    onset_doy: Option<u32>,
    albedo: Option<f64>,
    confidence: &'static str,
    flags: String,
    reference_deviation_days: Option<i64>,
}

impl<'a> OnsetRow<'a> {
    fn new(processed: &'a ProcessedStationYear) -> Self {
        let onset = &processed.onset;
        Self {
            station: onset.station.as_str(),
            year: onset.year,
            onset_date: onset.onset_date.map(|date| date.to_string()),
            onset_doy: onset.onset_day_of_year(),
            albedo: onset.albedo,
            confidence: onset.confidence.as_str(),
            flags: flag_labels(onset),
            reference_deviation_days: processed.reference_deviation_days,
        }
    }
}

fn flag_labels(onset: &OnsetRecord) -> String {
    onset
        .flags
        .iter()
        .map(|flag| flag.as_str())
        .collect::<Vec<_>>()
        .join(";")
}

pub fn write_onsets_csv(path: &Path, processed: &[ProcessedStationYear]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for station_year in processed {
        writer.serialize(OnsetRow::new(station_year))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn onset_table(processed: &[ProcessedStationYear]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "Station-year",
        "Onset",
        "DOY",
        "Albedo",
        "Confidence",
        "Flags",
        "Shifts",
        "Uncorrectable",
    ]);
    for station_year in processed {
        let onset = &station_year.onset;
        table.add_row(vec![
            station_year.key().to_string(),
            onset
                .onset_date
                .map(|date| date.to_string())
                .unwrap_or_else(|| "-".to_string()),
            onset
                .onset_day_of_year()
                .map(|doy| doy.to_string())
                .unwrap_or_else(|| "-".to_string()),
            onset
                .albedo
                .map(|albedo| format!("{albedo:.3}"))
                .unwrap_or_else(|| "-".to_string()),
            onset.confidence.as_str().to_string(),
            flag_labels(onset),
            station_year.correction.applied.len().to_string(),
            station_year.correction.uncorrectable.len().to_string(),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use bic_core::config::{ColumnMap, PipelineConfig, YearSelector};
    use bic_core::diagnostics::NoopSink;
    use bic_core::pipeline::process_file;
    use bic_parser::StationFileFormat;

    use super::*;

    pub(crate) fn fixture_path(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../bic-core/tests/data")
            .join(name)
    }

    async fn kan_m() -> ParsedStationFile {
        read_station_file(&fixture_path("KAN_M_day_v03_upd.txt"))
            .await
            .expect("fixture reads")
    }

    fn read_rows(path: &Path) -> (Vec<String>, Vec<csv::StringRecord>) {
        let mut reader = csv::Reader::from_path(path).expect("open csv");
        let header = reader
            .headers()
            .expect("header")
            .iter()
            .map(str::to_string)
            .collect();
        let rows = reader
            .records()
            .collect::<std::result::Result<Vec<_>, _>>()
            .expect("rows");
        (header, rows)
    }

    #[tokio::test]
    async fn onsets_csv_has_one_row_per_station_year() {
        let parsed = kan_m().await;
        let log = StationLog::from_toml_str(
            r#"
            [[station_year]]
            station = "KAN_M"
            year = 2012
            reference_onset_doy = 168
            "#,
        )
        .expect("log");
        let processed = process_file(&parsed, &PipelineConfig::default(), Some(&log), &mut NoopSink)
            .expect("process");

        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("KAN_M_onsets.csv");
        write_onsets_csv(&path, &processed).expect("write onsets");

        let (header, rows) = read_rows(&path);
        assert_eq!(
            header,
            [
                "station",
                "year",
                "onset_date",
                "onset_doy",
                "albedo",
                "confidence",
                "flags",
                "reference_deviation_days",
            ]
        );
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert_eq!(&first[0], "KAN_M");
        assert_eq!(&first[1], "2012");
        assert_eq!(&first[2], "2012-06-18");
        assert_eq!(&first[3], "170");
        assert_eq!(&first[5], "high");
        assert_eq!(&first[7], "2");
        let albedo: f64 = first[4].parse().expect("albedo");
        assert!((albedo - 0.55).abs() < 1e-9);

        assert_eq!(&rows[1][3], "175");
        assert_eq!(&rows[1][7], "");
    }

    #[tokio::test]
    async fn onset_flags_are_joined_in_one_column() {
        let parsed = kan_m().await;
        let promice = ColumnMap::for_format(StationFileFormat::PromiceDaily);
        let config = PipelineConfig {
            year: YearSelector::Specific(2013),
            columns: Some(ColumnMap {
                snow_height: "NoSuchColumn".to_string(),
                ..promice.clone()
            }),
            ..PipelineConfig::default()
        };
        let processed = process_file(&parsed, &config, None, &mut NoopSink).expect("process");

        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("onsets.csv");
        write_onsets_csv(&path, &processed).expect("write onsets");

        let (_, rows) = read_rows(&path);
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][5], "low");
        assert!(rows[0][6].split(';').any(|flag| flag == "snow_channel_missing"));
    }

    #[tokio::test]
    async fn json_sink_writes_one_document_per_station_year() {
        let parsed = kan_m().await;
        let config = PipelineConfig {
            visualisation: true,
            ..PipelineConfig::default()
        };
        let dir = tempfile::tempdir().expect("temp dir");
        let diagnostics_dir = dir.path().join("diagnostics");
        let mut sink = JsonDiagnosticSink::create(&diagnostics_dir).expect("sink");

        process_file(&parsed, &config, None, &mut sink).expect("process");
        assert_eq!(sink.written(), 2);

        let path = diagnostics_dir.join("KAN_M_2013_diagnostics.json");
        let document: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read diagnostics"))
                .expect("valid JSON");
        assert_eq!(document["key"]["station"], "KAN_M");
        assert_eq!(document["key"]["year"], 2013);
        assert_eq!(document["onset_date"], "2013-06-24");
        assert_eq!(document["onset_index"], 75);
        assert_eq!(document["boom_height"].as_array().map(Vec::len), Some(161));
        assert!(diagnostics_dir.join("KAN_M_2012_diagnostics.json").is_file());
    }

    #[test]
    fn config_falls_back_to_bic_config() {
        let dir = tempfile::tempdir().expect("temp dir");
        let from_env = dir.path().join("env.toml");
        fs::write(&from_env, "[composite]\ndt = 30\n").expect("write config");
        let explicit = dir.path().join("explicit.toml");
        fs::write(&explicit, "[composite]\ndt = 20\n").expect("write config");

        std::env::set_var("BIC_CONFIG", &from_env);
        let config = load_config(None).expect("config from BIC_CONFIG");
        assert_eq!(config.composite.dt, 30);

        let config = load_config(Some(explicit.as_path())).expect("explicit config");
        assert_eq!(config.composite.dt, 20);

        std::env::remove_var("BIC_CONFIG");
        let config = load_config(None).expect("defaults");
        assert_eq!(config, PipelineConfig::default());

        let missing = dir.path().join("missing.toml");
        assert!(load_config(Some(missing.as_path())).is_err());
    }

    #[test]
    fn bundled_station_log_is_the_default() {
        let bundled = load_station_log(&StationLogArgs::default())
            .expect("bundled log")
            .expect("a log");
        assert!(bundled.len() > 200);

        let none = load_station_log(&StationLogArgs {
            station_log: None,
            no_station_log: true,
        })
        .expect("no log");
        assert!(none.is_none());

        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("log.toml");
        fs::write(&path, "[[station_year]]\nstation = \"KAN_M\"\nyear = 2012\n").expect("write log");
        let custom = load_station_log(&StationLogArgs {
            station_log: Some(path),
            no_station_log: false,
        })
        .expect("custom log")
        .expect("a log");
        assert_eq!(custom.len(), 1);
    }

    #[tokio::test]
    async fn unreadable_files_are_left_out_in_order() {
        let paths = vec![
            fixture_path("KAN_M_day_v03_upd.txt"),
            fixture_path("does_not_exist.txt"),
            fixture_path("CEN_day_v03_upd.txt"),
        ];
        let files = read_station_files(paths).await.expect("read");
        let stations: Vec<&str> = files.iter().map(|file| file.station.as_str()).collect();
        assert_eq!(stations, ["KAN_M", "CEN"]);
    }
}
