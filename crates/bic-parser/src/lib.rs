pub mod errors;
pub mod formats;
pub mod model;
mod registry;

pub use errors::{ParserAttempt, ParserError};
pub use model::{ParsedStationFile, StationCode, StationFileFormat, DAY_OF_YEAR_COLUMN, YEAR_COLUMN};
pub use registry::{parse_station_file, parse_with_parsers, StationFileParser};
