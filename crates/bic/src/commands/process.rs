use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use bic_core::config::{PipelineConfig, YearSelector};
use bic_core::diagnostics::{DiagnosticSink, NoopSink};
use bic_core::pipeline::process_file;
use tracing::{info, warn};

use super::{
    load_station_log, onset_table, read_station_file, write_onsets_csv, JsonDiagnosticSink,
    StationLogArgs,
};

#[derive(clap::Args, Debug)]
pub struct ProcessArgs {
    /// Daily station file (PROMICE `*_day_v03_upd.txt` or canonical CSV)
    pub file: PathBuf,
    /// Year to process: a calendar year or "all"
    #[arg(long)]
    pub year: Option<YearSelector>,
    /// Write per-station-year diagnostics for plotting
    #[arg(long)]
    pub visualisation: bool,
    #[command(flatten)]
    pub station_log: StationLogArgs,
    #[arg(short, long, default_value = "bic-output")]
    pub output_dir: PathBuf,
}

pub async fn handle_process_command(args: ProcessArgs, mut config: PipelineConfig) -> Result<()> {
    if let Some(year) = args.year {
        config.year = year;
    }
    config.visualisation |= args.visualisation;
    config.validate()?;

    let log = load_station_log(&args.station_log)?;
    let parsed = read_station_file(&args.file).await?;
    if config.composite.is_excluded(parsed.station.as_str()) {
        warn!(
            station = %parsed.station,
            "station lies in the accumulation area; no bare-ice onset is expected"
        );
    }

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

    let processed = process_file(&parsed, &config, log.as_ref(), sink)
        .with_context(|| format!("failed to process {}", args.file.display()))?;
    if let Some(sink) = &json_sink {
        info!(records = sink.written(), "diagnostics written");
    }

    let onsets_path = args.output_dir.join(format!("{}_onsets.csv", parsed.station));
    write_onsets_csv(&onsets_path, &processed)?;
    info!(
        station = %parsed.station,
        station_years = processed.len(),
        path = %onsets_path.display(),
        "onset records written"
    );

    println!("{}", onset_table(&processed));
    Ok(())
}
