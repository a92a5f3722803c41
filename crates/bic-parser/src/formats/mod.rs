mod canonical_csv;
mod common;
mod promice_daily;

pub use canonical_csv::CanonicalCsvParser;
pub use promice_daily::PromiceDailyParser;

pub(crate) use common::{parse_optional_f64, parse_required_i32, DailyColumns};
