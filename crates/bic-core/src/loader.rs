use bic_parser::{ParsedStationFile, DAY_OF_YEAR_COLUMN, YEAR_COLUMN};
use chrono::NaiveDate;
use polars::prelude::*;
use tracing::warn;

use crate::config::{ColumnMap, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::series::{Channel, StationYear, StationYearKey, TimeSeries};

/// Splits a parsed station file into one [`StationYear`] per selected year.
///
/// The year selector is resolved here, once. Days absent from the file inside a year's
/// observed span are kept as missing values so every channel shares a gap-free index.
pub fn load_station_years(
    parsed: &ParsedStationFile,
    config: &PipelineConfig,
) -> Result<Vec<StationYear>> {
    let available = parsed.years()?;
    let years = config.year.resolve(&available)?;
    let columns = config.columns_for(parsed.format);

    years
        .into_iter()
        .map(|year| station_year_from_file(parsed, year, columns))
        .collect()
}

fn station_year_from_file(
    parsed: &ParsedStationFile,
    year: i32,
    columns: &ColumnMap,
) -> Result<StationYear> {
    let key = StationYearKey::new(parsed.station.clone(), year);

    let mask = parsed.df.column(YEAR_COLUMN)?.i32()?.equal(year);
    let frame = parsed
        .df
        .filter(&mask)?
        .sort([DAY_OF_YEAR_COLUMN], SortMultipleOptions::default())?;

    let dates = row_dates(&frame, &key)?;
    let (Some(&first), Some(&last)) = (dates.first(), dates.last()) else {
        return Err(PipelineError::Validation(format!("{key}: no rows for year")));
    };
    let span = (last - first).num_days() as usize + 1;
    let slots: Vec<usize> = dates
        .iter()
        .map(|date| (*date - first).num_days() as usize)
        .collect();

    let index = DayIndex { first, span, slots };
    let temperature = index.channel(&frame, &key, Channel::Temperature, &columns.temperature, false)?;
    let snow_height = index.channel(&frame, &key, Channel::SnowHeight, &columns.snow_height, false)?;
    let ablation = index.channel(
        &frame,
        &key,
        Channel::Ablation,
        &columns.ablation,
        columns.invert_ablation,
    )?;
    let albedo = index.channel(&frame, &key, Channel::Albedo, &columns.albedo, false)?;

    let station_year = StationYear::new(key, temperature, snow_height, ablation, albedo)?;
    match &columns.boom_height {
        Some(source) => {
            let boom =
                index.channel(&frame, &station_year.key, Channel::BoomHeight, source, false)?;
            station_year.with_channel(Channel::BoomHeight, boom)
        }
        None => Ok(station_year),
    }
}

/// Maps the rows of one year's frame onto a dense daily index.
struct DayIndex {
    first: NaiveDate,
    span: usize,
    slots: Vec<usize>,
}

impl DayIndex {
    fn channel(
        &self,
        frame: &DataFrame,
        key: &StationYearKey,
        channel: Channel,
        source: &str,
        invert: bool,
    ) -> Result<TimeSeries> {
        let mut dense = vec![None; self.span];

        let Ok(column) = frame.column(source) else {
            warn!(
                station_year = %key,
                channel = %channel,
                column = source,
                "source column missing; channel treated as entirely missing"
            );
            return Ok(TimeSeries::from_values(self.first, &dense));
        };

        let values = column.cast(&DataType::Float64)?;
        for (slot, value) in self.slots.iter().zip(values.f64()?.into_iter()) {
            dense[*slot] = if invert { value.map(|v| -v) } else { value };
        }
        Ok(TimeSeries::from_values(self.first, &dense))
    }
}

fn row_dates(frame: &DataFrame, key: &StationYearKey) -> Result<Vec<NaiveDate>> {
    let days = frame.column(DAY_OF_YEAR_COLUMN)?.i32()?;
    let mut dates: Vec<NaiveDate> = Vec::with_capacity(frame.height());

    for day in days.into_iter() {
        let date = day
            .and_then(|d| u32::try_from(d).ok())
            .and_then(|d| NaiveDate::from_yo_opt(key.year, d))
            .ok_or_else(|| {
                PipelineError::Validation(format!(
                    "{key}: day of year {day:?} is not a valid day"
                ))
            })?;
        if dates.last() == Some(&date) {
            return Err(PipelineError::Validation(format!(
                "{key}: day {date} appears more than once"
            )));
        }
        dates.push(date);
    }

    Ok(dates)
}
