use std::io::{Cursor, Write};

use polars::io::parquet::write::{ParquetCompression, ParquetWriter, StatisticsOptions};
use polars::prelude::*;

use crate::composite::CompositeResult;
use crate::error::Result;
use crate::series::Channel;

pub const OFFSET_COLUMN: &str = "offset_days";

/// One row per offset with mean, standard deviation and contributor count per channel.
pub fn composite_to_dataframe(result: &CompositeResult) -> PolarsResult<DataFrame> {
    let mut columns: Vec<Column> = Vec::with_capacity(1 + Channel::ALL.len() * 3);
    columns.push(Series::new(OFFSET_COLUMN.into(), result.offsets.clone()).into());

    for channel in Channel::ALL {
        let Some(composite) = result.channel(channel) else {
            continue;
        };
        let name = channel.canonical_name();

        let means: Vec<Option<f64>> = composite.statistics.iter().map(|s| s.mean).collect();
        let stds: Vec<Option<f64>> = composite.statistics.iter().map(|s| s.std).collect();
        let counts: Vec<u32> = composite
            .statistics
            .iter()
            .map(|s| s.count as u32)
            .collect();

        columns.push(Series::new(format!("{name}_mean").into(), means).into());
        columns.push(Series::new(format!("{name}_std").into(), stds).into());
        columns.push(Series::new(format!("{name}_count").into(), counts).into());
    }

    DataFrame::new(columns)
}

/// Long table of every contributing station-year: one row per station-year and offset.
pub fn composite_rows_to_dataframe(result: &CompositeResult) -> PolarsResult<DataFrame> {
    let width = result.offsets.len();
    let row_count = result.contributors.len() * width;

    let mut stations: Vec<String> = Vec::with_capacity(row_count);
    let mut years: Vec<i32> = Vec::with_capacity(row_count);
    let mut offsets: Vec<i64> = Vec::with_capacity(row_count);
    for key in &result.contributors {
        for offset in &result.offsets {
            stations.push(key.station.to_string());
            years.push(key.year);
            offsets.push(*offset);
        }
    }

    let mut columns: Vec<Column> = vec![
        Series::new("station".into(), stations).into(),
        Series::new("year".into(), years).into(),
        Series::new(OFFSET_COLUMN.into(), offsets).into(),
    ];

    for channel in Channel::ALL {
        let Some(composite) = result.channel(channel) else {
            continue;
        };
        let values: Vec<Option<f64>> = composite
            .rows
            .iter()
            .flat_map(|row| row.values.iter().copied())
            .collect();
        columns.push(Series::new(channel.canonical_name().into(), values).into());
    }

    DataFrame::new(columns)
}

pub fn write_composite_csv<W: Write>(result: &CompositeResult, writer: W) -> Result<()> {
    let mut df = composite_to_dataframe(result)?;
    CsvWriter::new(writer)
        .include_header(true)
        .finish(&mut df)?;
    Ok(())
}

pub fn create_parquet_bytes(df: &DataFrame) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    {
        let mut cursor = Cursor::new(&mut buffer);
        let mut clone = df.clone();
        ParquetWriter::new(&mut cursor)
            .with_compression(ParquetCompression::Zstd(None))
            .with_statistics(StatisticsOptions::default())
            .finish(&mut clone)?;
    }
    Ok(buffer)
}
