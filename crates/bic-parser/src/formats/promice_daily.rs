use crate::errors::ParserError;
use crate::model::{StationFileFormat, DAY_OF_YEAR_COLUMN, YEAR_COLUMN};
use crate::registry::StationFileParser;
use polars::prelude::DataFrame;

use super::{parse_optional_f64, parse_required_i32, DailyColumns};

/// Whitespace-delimited PROMICE daily product: one header line of column names followed by
/// one row per day.
pub struct PromiceDailyParser;

impl Default for PromiceDailyParser {
    fn default() -> Self {
        Self
    }
}

enum Role {
    Year,
    DayOfYear,
    Value(usize),
}

impl PromiceDailyParser {
    const NAME: &'static str = "PROMICE_DAILY";

    fn classify_header(header: &[&str]) -> Result<(Vec<Role>, Vec<String>), ParserError> {
        if !header.iter().any(|name| *name == YEAR_COLUMN)
            || !header.iter().any(|name| *name == DAY_OF_YEAR_COLUMN)
        {
            return Err(ParserError::FormatMismatch {
                parser: Self::NAME,
                reason: format!("header lacks '{YEAR_COLUMN}' and '{DAY_OF_YEAR_COLUMN}' columns"),
            });
        }

        let mut roles = Vec::with_capacity(header.len());
        let mut names = Vec::new();
        for name in header {
            match *name {
                YEAR_COLUMN => roles.push(Role::Year),
                DAY_OF_YEAR_COLUMN => roles.push(Role::DayOfYear),
                other => {
                    roles.push(Role::Value(names.len()));
                    names.push(other.to_string());
                }
            }
        }
        Ok((roles, names))
    }
}

impl StationFileParser for PromiceDailyParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn format(&self) -> StationFileFormat {
        StationFileFormat::PromiceDaily
    }

    fn parse(&self, content: &str) -> Result<DataFrame, ParserError> {
        let mut lines = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        let (_, header_line) = lines.next().ok_or(ParserError::FormatMismatch {
            parser: Self::NAME,
            reason: "file is empty".to_string(),
        })?;

        if header_line.contains(',') {
            return Err(ParserError::FormatMismatch {
                parser: Self::NAME,
                reason: "header is comma-delimited".to_string(),
            });
        }

        let header: Vec<&str> = header_line.split_whitespace().collect();
        let (roles, names) = Self::classify_header(&header)?;
        let mut columns = DailyColumns::new(Self::NAME, names.clone())?;

        for (idx, line) in lines {
            let line_index = idx + 1;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != roles.len() {
                return Err(ParserError::DataRow {
                    parser: Self::NAME,
                    line_index,
                    message: format!(
                        "expected {} columns but found {}",
                        roles.len(),
                        tokens.len()
                    ),
                });
            }

            let mut year = None;
            let mut day_of_year = None;
            let mut row = vec![None; columns.column_count()];
            for (role, token) in roles.iter().zip(tokens) {
                match role {
                    Role::Year => {
                        year = Some(parse_required_i32(Self::NAME, token, line_index, YEAR_COLUMN)?)
                    }
                    Role::DayOfYear => {
                        day_of_year = Some(parse_required_i32(
                            Self::NAME,
                            token,
                            line_index,
                            DAY_OF_YEAR_COLUMN,
                        )?)
                    }
                    Role::Value(position) => {
                        row[*position] =
                            parse_optional_f64(Self::NAME, token, line_index, &names[*position])?;
                    }
                }
            }

            match (year, day_of_year) {
                (Some(year), Some(day_of_year)) => columns.push_row(year, day_of_year, row),
                _ => {
                    return Err(ParserError::DataRow {
                        parser: Self::NAME,
                        line_index,
                        message: "row lacks year or day of year".to_string(),
                    })
                }
            }
        }

        columns.into_dataframe(Self::NAME)
    }
}
