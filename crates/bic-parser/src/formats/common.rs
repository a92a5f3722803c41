use std::collections::HashSet;

use polars::prelude::*;

use crate::errors::ParserError;
use crate::model::{DAY_OF_YEAR_COLUMN, MISSING_SENTINEL, YEAR_COLUMN};

/// Column-wise accumulator for a daily station table.
#[derive(Debug, Clone)]
pub(crate) struct DailyColumns {
    years: Vec<i32>,
    days_of_year: Vec<i32>,
    names: Vec<String>,
    values: Vec<Vec<Option<f64>>>,
}

impl DailyColumns {
    pub fn new(parser: &'static str, names: Vec<String>) -> Result<Self, ParserError> {
        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(ParserError::InvalidHeader {
                    parser,
                    message: format!("duplicate column '{name}'"),
                });
            }
        }
        let values = vec![Vec::new(); names.len()];
        Ok(Self {
            years: Vec::new(),
            days_of_year: Vec::new(),
            names,
            values,
        })
    }

    pub fn column_count(&self) -> usize {
        self.names.len()
    }

    pub fn push_row(&mut self, year: i32, day_of_year: i32, row: Vec<Option<f64>>) {
        debug_assert_eq!(row.len(), self.values.len());
        self.years.push(year);
        self.days_of_year.push(day_of_year);
        for (column, value) in self.values.iter_mut().zip(row) {
            column.push(value);
        }
    }

    pub fn into_dataframe(self, parser: &'static str) -> Result<DataFrame, ParserError> {
        if self.years.is_empty() {
            return Err(ParserError::EmptyData { parser });
        }

        let mut cols: Vec<Column> = Vec::with_capacity(self.names.len() + 2);
        cols.push(Series::new(YEAR_COLUMN.into(), self.years).into());
        cols.push(Series::new(DAY_OF_YEAR_COLUMN.into(), self.days_of_year).into());
        for (name, values) in self.names.into_iter().zip(self.values) {
            cols.push(Series::new(name.as_str().into(), values).into());
        }

        DataFrame::new(cols).map_err(|err| ParserError::Validation {
            parser,
            message: format!("failed to build daily dataframe: {err}"),
        })
    }
}

pub(crate) fn parse_required_i32(
    parser: &'static str,
    value: &str,
    line_index: usize,
    column: &str,
) -> Result<i32, ParserError> {
    let trimmed = value.trim();
    let parsed = trimmed
        .parse::<f64>()
        .map_err(|err| ParserError::DataRow {
            parser,
            line_index,
            message: format!("failed to parse column '{column}' as integer: {err}"),
        })?;

    if parsed == MISSING_SENTINEL || parsed.fract() != 0.0 || !parsed.is_finite() {
        return Err(ParserError::DataRow {
            parser,
            line_index,
            message: format!("column '{column}' requires an integer value, found '{trimmed}'"),
        });
    }

    Ok(parsed as i32)
}

/// Parses a measurement; blanks, `NaN`, non-finite values and the `-999` sentinel are missing.
pub(crate) fn parse_optional_f64(
    parser: &'static str,
    value: &str,
    line_index: usize,
    column: &str,
) -> Result<Option<f64>, ParserError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }

    match trimmed.parse::<f64>() {
        Ok(parsed) => {
            if !parsed.is_finite() || (parsed - MISSING_SENTINEL).abs() < f64::EPSILON {
                Ok(None)
            } else {
                Ok(Some(parsed))
            }
        }
        Err(err) => Err(ParserError::DataRow {
            parser,
            line_index,
            message: format!("failed to parse column '{column}' as float: {err}"),
        }),
    }
}
