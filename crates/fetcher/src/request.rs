//! Request bodies and staged file names for daily retrievals.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

/// Whole globe as `[north, west, south, east]`.
pub const GLOBAL_AREA: [f64; 4] = [90.0, -180.0, -90.0, 180.0];

/// Sub-daily sampling requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeStep {
    Hourly,
    SixHourly,
}

impl TimeStep {
    /// `HH:00` labels covering one day.
    pub fn times(&self) -> Vec<String> {
        let step = match self {
            Self::Hourly => 1,
            Self::SixHourly => 6,
        };
        (0..24).step_by(step).map(|h| format!("{h:02}:00")).collect()
    }
}

/// One day of one variable, in the provider's query schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayRequest {
    pub product_type: String,
    pub variable: String,
    pub year: String,
    pub month: String,
    pub day: String,
    pub time: Vec<String>,
    pub area: [f64; 4],
    pub data_format: String,
    pub download_format: String,
}

impl DayRequest {
    /// Full-globe request for `variable` on `day`.
    pub fn new(variable: &str, day: NaiveDate, step: TimeStep) -> Self {
        Self {
            product_type: "reanalysis".to_string(),
            variable: variable.to_string(),
            year: day.year().to_string(),
            month: format!("{:02}", day.month()),
            day: format!("{:02}", day.day()),
            time: step.times(),
            area: GLOBAL_AREA,
            data_format: "grib".to_string(),
            download_format: "unarchived".to_string(),
        }
    }

    /// Body of the process execution call.
    pub fn to_execution_body(&self) -> serde_json::Value {
        serde_json::json!({ "inputs": self })
    }
}

/// Staged file name: `<variable>_era5land_<YYYYMMDD>.grib`.
pub fn staged_file_name(variable: &str, day: NaiveDate) -> String {
    format!("{variable}_era5land_{}.grib", day.format("%Y%m%d"))
}
