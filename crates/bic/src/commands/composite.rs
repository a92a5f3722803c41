use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bic_core::composite::CompositeResult;
use bic_core::config::{PipelineConfig, YearSelector};
use bic_core::diagnostics::{DiagnosticSink, NoopSink};
use bic_core::outputs::{
    composite_rows_to_dataframe, composite_to_dataframe, create_parquet_bytes,
    write_composite_csv,
};
use bic_core::pipeline::{run, PipelineRun};
use comfy_table::Table;
use tracing::{info, warn};

use super::{
    load_station_log, onset_table, read_station_files, write_onsets_csv, JsonDiagnosticSink,
    StationLogArgs,
};

#[derive(clap::Args, Debug)]
pub struct CompositeArgs {
    /// Directory holding the station files
    pub data_dir: PathBuf,
    /// File name patterns, relative to the data directory
    #[arg(long = "pattern", default_values = ["*_day_v03_upd.txt", "*.csv"])]
    pub patterns: Vec<String>,
    /// Half-width of the composite window in days
    #[arg(long)]
    pub dt: Option<i64>,
    /// Year to process: a calendar year or "all"
    #[arg(long)]
    pub year: Option<YearSelector>,
    /// Write per-station-year diagnostics for plotting
    #[arg(long)]
    pub visualisation: bool,
    #[command(flatten)]
    pub station_log: StationLogArgs,
    /// Also write the composite and its per-station-year rows as Parquet
    #[arg(long)]
    pub parquet: bool,
    #[arg(short, long, default_value = "bic-output")]
    pub output_dir: PathBuf,
}

pub async fn handle_composite_command(
    args: CompositeArgs,
    mut config: PipelineConfig,
) -> Result<()> {
    if let Some(dt) = args.dt {
        config.composite.dt = dt;
    }
    if let Some(year) = args.year {
        config.year = year;
    }
    config.visualisation |= args.visualisation;
    config.validate()?;

    let log = load_station_log(&args.station_log)?;
    let paths = discover_files(&args.data_dir, &args.patterns)?;
    if paths.is_empty() {
        bail!(
            "no station files matching {:?} in {}",
            args.patterns,
            args.data_dir.display()
        );
    }
    info!(files = paths.len(), dir = %args.data_dir.display(), "station files found");

    let files = read_station_files(paths).await?;

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("failed to create {}", args.output_dir.display()))?;

    let mut json_sink = None;
    let mut noop = NoopSink;
    let sink: &mut dyn DiagnosticSink = if config.visualisation {
        let dir = args.output_dir.join("diagnostics");
        json_sink.insert(JsonDiagnosticSink::create(&dir)?)
    } else {
        &mut noop
    };

    let outcome = run(&files, &config, log.as_ref(), sink).context("composite run failed")?;
    if let Some(sink) = &json_sink {
        info!(records = sink.written(), "diagnostics written");
    }

    write_outputs(&outcome, &args.output_dir, args.parquet)?;
    print_summary(&outcome);
    Ok(())
}

fn discover_files(dir: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut found = BTreeSet::new();
    for pattern in patterns {
        let full = dir.join(pattern);
        let pattern_str = full
            .to_str()
            .with_context(|| format!("invalid path pattern {}", full.display()))?;
        for entry in glob::glob(pattern_str)? {
            match entry {
                Ok(path) if path.is_file() => {
                    found.insert(path);
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "could not read path from glob pattern"),
            }
        }
    }
    Ok(found.into_iter().collect())
}

fn write_outputs(outcome: &PipelineRun, dir: &Path, parquet: bool) -> Result<()> {
    let composite_path = dir.join("composite.csv");
    let file = File::create(&composite_path)
        .with_context(|| format!("failed to create {}", composite_path.display()))?;
    write_composite_csv(&outcome.composite, file)?;

    let onsets_path = dir.join("onsets.csv");
    write_onsets_csv(&onsets_path, &outcome.processed)?;

    if parquet {
        write_parquet(&outcome.composite, dir)?;
    }

    info!(dir = %dir.display(), parquet, "composite outputs written");
    Ok(())
}

fn write_parquet(composite: &CompositeResult, dir: &Path) -> Result<()> {
    let summary = create_parquet_bytes(&composite_to_dataframe(composite)?)?;
    fs::write(dir.join("composite.parquet"), summary)?;
    let rows = create_parquet_bytes(&composite_rows_to_dataframe(composite)?)?;
    fs::write(dir.join("composite_rows.parquet"), rows)?;
    Ok(())
}

fn print_summary(outcome: &PipelineRun) {
    println!("{}", onset_table(&outcome.processed));

    let composite = &outcome.composite;
    let albedo = &composite.onset_albedo;
    let format_value = |value: Option<f64>| {
        value
            .map(|v| format!("{v:.3}"))
            .unwrap_or_else(|| "-".to_string())
    };

    let mut table = Table::new();
    table.set_header(vec!["Composite", "Value"]);
    table.add_row(vec!["Window".to_string(), format!("±{} days", composite.dt)]);
    table.add_row(vec!["Stations".to_string(), composite.station_count.to_string()]);
    table.add_row(vec![
        "Station-years".to_string(),
        composite.station_year_count().to_string(),
    ]);
    table.add_row(vec![
        "Without onset".to_string(),
        composite.excluded.to_string(),
    ]);
    table.add_row(vec![
        "Accumulation-area stations".to_string(),
        outcome.excluded_stations.len().to_string(),
    ]);
    table.add_row(vec!["Skipped".to_string(), outcome.skipped.len().to_string()]);
    table.add_row(vec![
        "Onset albedo".to_string(),
        format!(
            "{} ± {} (n = {})",
            format_value(albedo.mean),
            format_value(albedo.std),
            albedo.count
        ),
    ]);
    println!("{table}");

    for skipped in &outcome.skipped {
        let year = skipped
            .year
            .map(|year| year.to_string())
            .unwrap_or_else(|| "all years".to_string());
        println!("  skipped {} ({}): {}", skipped.station, year, skipped.reason);
    }
}

#[cfg(test)]
mod tests {
    use bic_core::diagnostics::NoopSink;

    use super::*;
    use crate::commands::tests::fixture_path;

    fn default_patterns() -> Vec<String> {
        vec!["*_day_v03_upd.txt".to_string(), "*.csv".to_string()]
    }

    #[test]
    fn discovery_matches_patterns_once_and_sorted() {
        let dir = tempfile::tempdir().expect("temp dir");
        for name in [
            "QAS_L_day_v03_upd.txt",
            "KAN_M_day_v03_upd.txt",
            "KAN_L_2012.csv",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), "").expect("write file");
        }
        fs::create_dir(dir.path().join("old.csv")).expect("create dir");

        let mut patterns = default_patterns();
        patterns.push("KAN_*".to_string());
        let found = discover_files(dir.path(), &patterns).expect("discover");

        let names: Vec<&str> = found
            .iter()
            .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
            .collect();
        assert_eq!(
            names,
            ["KAN_L_2012.csv", "KAN_M_day_v03_upd.txt", "QAS_L_day_v03_upd.txt"]
        );
    }

    #[test]
    fn discovery_in_an_empty_directory_finds_nothing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let found = discover_files(dir.path(), &default_patterns()).expect("discover");
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn composite_outputs_are_written() {
        let files = read_station_files(vec![
            fixture_path("KAN_M_day_v03_upd.txt"),
            fixture_path("CEN_day_v03_upd.txt"),
        ])
        .await
        .expect("read fixtures");
        let outcome =
            run(&files, &PipelineConfig::default(), None, &mut NoopSink).expect("pipeline run");

        let dir = tempfile::tempdir().expect("temp dir");
        write_outputs(&outcome, dir.path(), true).expect("write outputs");

        let composite = fs::read_to_string(dir.path().join("composite.csv")).expect("composite.csv");
        assert!(composite.starts_with("offset_days,"));
        assert_eq!(composite.lines().count(), 92);

        let onsets = fs::read_to_string(dir.path().join("onsets.csv")).expect("onsets.csv");
        assert_eq!(onsets.lines().count(), 3);
        assert!(onsets.lines().skip(1).all(|line| line.starts_with("KAN_M,")));

        for name in ["composite.parquet", "composite_rows.parquet"] {
            let bytes = fs::read(dir.path().join(name)).expect("parquet file");
            assert_eq!(&bytes[..4], b"PAR1", "{name}");
        }
    }

    #[tokio::test]
    async fn parquet_is_opt_in() {
        let files = read_station_files(vec![fixture_path("KAN_M_day_v03_upd.txt")])
            .await
            .expect("read fixture");
        let outcome =
            run(&files, &PipelineConfig::default(), None, &mut NoopSink).expect("pipeline run");

        let dir = tempfile::tempdir().expect("temp dir");
        write_outputs(&outcome, dir.path(), false).expect("write outputs");
        assert!(dir.path().join("composite.csv").is_file());
        assert!(!dir.path().join("composite.parquet").exists());
    }
}
