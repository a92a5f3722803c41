use crate::errors::{ParserAttempt, ParserError};
use crate::formats::{CanonicalCsvParser, PromiceDailyParser};
use crate::model::{ParsedStationFile, StationCode, StationFileFormat};
use polars::prelude::DataFrame;

pub trait StationFileParser {
    fn name(&self) -> &'static str;
    fn format(&self) -> StationFileFormat;
    fn parse(&self, content: &str) -> Result<DataFrame, ParserError>;
}

/// Parses a daily station file, trying every known layout in turn. The station code is
/// derived from `file_name` (only the final path component is considered).
pub fn parse_station_file(file_name: &str, content: &str) -> Result<ParsedStationFile, ParserError> {
    let promice = PromiceDailyParser;
    let canonical = CanonicalCsvParser;
    let parsers: [&dyn StationFileParser; 2] = [&promice, &canonical];
    parse_with_parsers(file_name, content, &parsers)
}

pub fn parse_with_parsers(
    file_name: &str,
    content: &str,
    parsers: &[&dyn StationFileParser],
) -> Result<ParsedStationFile, ParserError> {
    let station = StationCode::from_file_name(file_name)?;
    let mut attempts = Vec::new();

    for parser in parsers {
        match parser.parse(content) {
            Ok(df) => {
                return Ok(ParsedStationFile {
                    file_hash: blake3::hash(content.as_bytes()).to_hex().to_string(),
                    station,
                    format: parser.format(),
                    df,
                });
            }
            Err(ParserError::FormatMismatch { reason, .. }) => {
                attempts.push(ParserAttempt::new(parser.name(), reason));
            }
            Err(err) => return Err(err),
        }
    }

    Err(ParserError::NoMatchingParser { attempts })
}
