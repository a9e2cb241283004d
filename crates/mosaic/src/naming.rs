//! Filename conventions for tiled archives.

use chrono::NaiveDateTime;
use serde::Serialize;

/// Fields decoded from a tile filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFields {
    pub variable: String,
    /// Acquisition time; the index is keyed on it. `None` marks a
    /// time-invariant layer such as a terrain model.
    pub datetime_1: Option<NaiveDateTime>,
    pub datetime_2: Option<NaiveDateTime>,
    pub band: String,
    pub extra: String,
    pub tile_name: String,
    pub grid_name: String,
    pub version: String,
    pub sensor: String,
}

/// Parses an encoded filename into structured fields.
///
/// Returning `None` excludes the file from an index; it is not an error.
pub trait NamingRule: Send + Sync {
    fn parse(&self, file_name: &str) -> Option<FileFields>;
}

/// Yeoda naming: nine underscore-delimited fields,
/// `var_datetime1_datetime2_band_extra_tile_grid_version_sensor.ext`.
///
/// Empty fields are allowed except for the acquisition time, tile and grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct YeodaNaming;

/// Yeoda naming for time-invariant layers: the acquisition time may be
/// empty, and such files are selected whatever days a request asks for.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticYeodaNaming;

impl YeodaNaming {
    pub const FIELD_COUNT: usize = 9;
    pub const DATETIME_FORMAT: &'static str = "%Y%m%dT%H%M%S";

    fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(s, Self::DATETIME_FORMAT).ok()
    }

    fn parse_optional(s: &str) -> Option<Option<NaiveDateTime>> {
        if s.is_empty() {
            Some(None)
        } else {
            Self::parse_datetime(s).map(Some)
        }
    }

    fn parse_fields(file_name: &str, require_time: bool) -> Option<FileFields> {
        let stem = match file_name.rsplit_once('.') {
            Some((stem, _ext)) => stem,
            None => file_name,
        };

        let fields: Vec<&str> = stem.split('_').collect();
        if fields.len() != Self::FIELD_COUNT {
            return None;
        }

        let datetime_1 = Self::parse_optional(fields[1])?;
        if require_time && datetime_1.is_none() {
            return None;
        }
        let datetime_2 = Self::parse_optional(fields[2])?;

        if fields[5].is_empty() || fields[6].is_empty() {
            return None;
        }

        Some(FileFields {
            variable: fields[0].to_string(),
            datetime_1,
            datetime_2,
            band: fields[3].to_string(),
            extra: fields[4].to_string(),
            tile_name: fields[5].to_string(),
            grid_name: fields[6].to_string(),
            version: fields[7].to_string(),
            sensor: fields[8].to_string(),
        })
    }
}

impl NamingRule for YeodaNaming {
    fn parse(&self, file_name: &str) -> Option<FileFields> {
        Self::parse_fields(file_name, true)
    }
}

impl NamingRule for StaticYeodaNaming {
    fn parse(&self, file_name: &str) -> Option<FileFields> {
        YeodaNaming::parse_fields(file_name, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_flood_name() {
        let fields = YeodaNaming
            .parse("ENSEMBLEFLOOD_20220301T053000__VV__E054N012T3_EU020M_V0M2R3_S1.tif")
            .unwrap();
        assert_eq!(fields.variable, "ENSEMBLEFLOOD");
        assert_eq!(
            fields.datetime_1,
            NaiveDate::from_ymd_opt(2022, 3, 1)
                .unwrap()
                .and_hms_opt(5, 30, 0)
        );
        assert_eq!(fields.datetime_2, None);
        assert_eq!(fields.band, "VV");
        assert_eq!(fields.tile_name, "E054N012T3");
        assert_eq!(fields.grid_name, "EU020M");
        assert_eq!(fields.version, "V0M2R3");
        assert_eq!(fields.sensor, "S1");
    }

    #[test]
    fn test_malformed_names_are_dropped() {
        let rule = YeodaNaming;
        assert!(rule.parse("README.md").is_none());
        assert!(rule.parse("ENSEMBLEFLOOD_2022-03-01__VV__E054N012T3_EU020M_V0M2R3_S1.tif").is_none());
        assert!(rule.parse("ENSEMBLEFLOOD_20220301T053000__VV___EU020M_V0M2R3_S1.tif").is_none());
        assert!(rule.parse("A_20220301T053000_B_C_D_E_F_G_H_I.tif").is_none());
    }

    #[test]
    fn test_second_datetime() {
        let fields = YeodaNaming
            .parse("SIG0_20220301T053000_20220302T000000_VV__E054N012T3_EU020M_V1_S1.tif")
            .unwrap();
        assert!(fields.datetime_2.is_some());
    }

    #[test]
    fn test_static_layer_name() {
        let name = "DEM_____E054N012T3_EU020M_V01R01_COPDEM.tif";
        assert!(YeodaNaming.parse(name).is_none());

        let fields = StaticYeodaNaming.parse(name).unwrap();
        assert_eq!(fields.variable, "DEM");
        assert_eq!(fields.datetime_1, None);
        assert_eq!(fields.tile_name, "E054N012T3");
        assert_eq!(fields.version, "V01R01");

        // A dated file still parses, and a malformed time is still rejected
        assert!(StaticYeodaNaming
            .parse("DEM_20220301T000000____E054N012T3_EU020M_V01R01_COPDEM.tif")
            .unwrap()
            .datetime_1
            .is_some());
        assert!(StaticYeodaNaming
            .parse("DEM_2022____E054N012T3_EU020M_V01R01_COPDEM.tif")
            .is_none());
    }
}
