use chrono::{Datelike, NaiveDate};
use csv::StringRecord;
use polars::prelude::DataFrame;

use crate::errors::ParserError;
use crate::model::{StationFileFormat, DAY_OF_YEAR_COLUMN, YEAR_COLUMN};
use crate::registry::StationFileParser;

use super::{parse_optional_f64, DailyColumns};

/// Comma-separated daily table keyed by an ISO `date` column, e.g.
///
/// ```text
/// date,air_temperature_c,snow_height_m,ice_ablation_m,albedo
/// 2012-05-01,-4.2,0.61,0.0,0.82
/// ```
pub struct CanonicalCsvParser;

impl Default for CanonicalCsvParser {
    fn default() -> Self {
        Self
    }
}

impl CanonicalCsvParser {
    const NAME: &'static str = "CANONICAL_CSV";
    const DATE_COLUMN: &'static str = "date";

    fn reader_builder() -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder.has_headers(true).trim(csv::Trim::All);
        builder
    }

    /// Returns the index of the date column and the (index, name) of every value column.
    /// `Year` / `DayOfYear` columns are ignored because both are derived from the date.
    fn classify_header(header: &StringRecord) -> Result<(usize, Vec<(usize, String)>), ParserError> {
        let date_idx = header
            .iter()
            .position(|name| name.eq_ignore_ascii_case(Self::DATE_COLUMN))
            .ok_or_else(|| ParserError::FormatMismatch {
                parser: Self::NAME,
                reason: format!("header lacks a '{}' column", Self::DATE_COLUMN),
            })?;

        if header.len() < 2 {
            return Err(ParserError::FormatMismatch {
                parser: Self::NAME,
                reason: "header has no measurement columns".to_string(),
            });
        }

        let values = header
            .iter()
            .enumerate()
            .filter(|(idx, name)| {
                *idx != date_idx && *name != YEAR_COLUMN && *name != DAY_OF_YEAR_COLUMN
            })
            .map(|(idx, name)| (idx, name.to_string()))
            .collect();

        Ok((date_idx, values))
    }

    fn parse_date(value: &str, line_index: usize) -> Result<NaiveDate, ParserError> {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|err| ParserError::DataRow {
            parser: Self::NAME,
            line_index,
            message: format!("invalid date '{}': {err}", value.trim()),
        })
    }
}

impl StationFileParser for CanonicalCsvParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn format(&self) -> StationFileFormat {
        StationFileFormat::CanonicalCsv
    }

    fn parse(&self, content: &str) -> Result<DataFrame, ParserError> {
        let mut reader = Self::reader_builder().from_reader(content.as_bytes());
        let header = reader
            .headers()
            .map_err(|err| ParserError::Csv {
                parser: Self::NAME,
                source: err,
            })?
            .clone();

        let (date_idx, value_columns) = Self::classify_header(&header)?;
        let names = value_columns.iter().map(|(_, name)| name.clone()).collect();
        let mut columns = DailyColumns::new(Self::NAME, names)?;

        let mut previous: Option<NaiveDate> = None;
        for (row_idx, record) in reader.records().enumerate() {
            let record = record.map_err(|err| ParserError::Csv {
                parser: Self::NAME,
                source: err,
            })?;
            let line_index = row_idx + 2;

            let date = Self::parse_date(record.get(date_idx).unwrap_or(""), line_index)?;
            if previous.is_some_and(|prev| date <= prev) {
                return Err(ParserError::DataRow {
                    parser: Self::NAME,
                    line_index,
                    message: format!("date {date} is not after the previous row"),
                });
            }
            previous = Some(date);

            let mut row = Vec::with_capacity(value_columns.len());
            for (idx, name) in &value_columns {
                let value = record.get(*idx).unwrap_or("");
                row.push(parse_optional_f64(Self::NAME, value, line_index, name)?);
            }

            columns.push_row(date.year(), date.ordinal() as i32, row);
        }

        columns.into_dataframe(Self::NAME)
    }
}
