//! Fixed coordinate axes of a grid store.
//!
//! Axes are immutable once a store is created. Each is strictly monotonic
//! with a fixed step, so coordinates map to indices arithmetically.

use std::ops::Range;

use chrono::{Duration, NaiveDate};
use geo_common::DayRange;
use serde::{Deserialize, Serialize};

/// Daily time axis starting at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeAxis {
    pub start: NaiveDate,
    pub len: usize,
}

impl TimeAxis {
    pub fn new(start: NaiveDate, len: usize) -> Self {
        Self { start, len }
    }

    /// Axis covering every day from `start` to `end` inclusive.
    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self::new(start, DayRange::new(start, end).len())
    }

    /// Last day on the axis.
    pub fn end(&self) -> NaiveDate {
        self.start + Duration::days(self.len.saturating_sub(1) as i64)
    }

    pub fn value(&self, index: usize) -> Option<NaiveDate> {
        (index < self.len).then(|| self.start + Duration::days(index as i64))
    }

    /// Exact index of a day, or `None` when it is not on the axis.
    pub fn index_of(&self, day: NaiveDate) -> Option<usize> {
        let offset = (day - self.start).num_days();
        (offset >= 0 && (offset as usize) < self.len).then_some(offset as usize)
    }

    /// Index range of the part of `range` that lies on the axis.
    pub fn range_for(&self, range: DayRange) -> Option<Range<usize>> {
        if range.is_empty() || self.len == 0 {
            return None;
        }
        let start = range.start.max(self.start);
        let end = range.end.min(self.end());
        if start > end {
            return None;
        }
        let first = (start - self.start).num_days() as usize;
        let last = (end - self.start).num_days() as usize;
        Some(first..last + 1)
    }

    pub fn as_range(&self) -> DayRange {
        DayRange::new(self.start, self.end())
    }
}

/// Regularly spaced spatial axis; `step` is negative for descending axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialAxis {
    pub start: f64,
    pub step: f64,
    pub len: usize,
}

impl SpatialAxis {
    pub fn new(start: f64, step: f64, len: usize) -> Self {
        Self { start, step, len }
    }

    pub fn value(&self, index: usize) -> f64 {
        self.start + index as f64 * self.step
    }

    pub fn values(&self) -> Vec<f64> {
        (0..self.len).map(|i| self.value(i)).collect()
    }

    pub fn last(&self) -> f64 {
        self.value(self.len.saturating_sub(1))
    }

    /// Lowest and highest coordinate on the axis.
    pub fn bounds(&self) -> (f64, f64) {
        let (a, b) = (self.start, self.last());
        (a.min(b), a.max(b))
    }

    /// Nearest index for a coordinate, `None` beyond half a step past either end.
    pub fn nearest_index(&self, coord: f64) -> Option<usize> {
        let idx = ((coord - self.start) / self.step).round();
        (idx >= 0.0 && idx < self.len as f64).then_some(idx as usize)
    }

    /// Indices whose coordinate lies in the closed interval spanned by `a` and `b`.
    pub fn index_range(&self, a: f64, b: f64) -> Option<Range<usize>> {
        if self.len == 0 {
            return None;
        }
        let eps = 1e-6;
        let fa = (a - self.start) / self.step;
        let fb = (b - self.start) / self.step;
        let first = (fa.min(fb) - eps).ceil().max(0.0);
        let last = (fa.max(fb) + eps).floor().min(self.len as f64 - 1.0);
        if first > last {
            return None;
        }
        Some(first as usize..last as usize + 1)
    }
}

/// The three axes of a `(time, latitude, longitude)` store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridAxes {
    pub time: TimeAxis,
    pub latitude: SpatialAxis,
    pub longitude: SpatialAxis,
}

impl GridAxes {
    pub fn new(time: TimeAxis, latitude: SpatialAxis, longitude: SpatialAxis) -> Self {
        Self {
            time,
            latitude,
            longitude,
        }
    }

    /// Daily 0.1 degree global grid from 2015-01-01 to 2024-01-01.
    ///
    /// Latitude runs north to south (90 to -90), longitude from -180 to 179.9.
    pub fn default_daily_global() -> Self {
        let start = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap_or(NaiveDate::MIN);
        let end = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN);
        Self::new(
            TimeAxis::between(start, end),
            SpatialAxis::new(90.0, -0.1, 1801),
            SpatialAxis::new(-180.0, 0.1, 3600),
        )
    }

    /// Store shape in `(time, latitude, longitude)` order.
    pub fn shape(&self) -> [usize; 3] {
        [self.time.len, self.latitude.len, self.longitude.len]
    }

    /// Latitude and longitude index ranges of the cells inside a lon/lat box.
    pub fn spatial_ranges(
        &self,
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    ) -> Option<(Range<usize>, Range<usize>)> {
        let latitude = self.latitude.index_range(min_lat, max_lat)?;
        let longitude = self.longitude.index_range(min_lon, max_lon)?;
        Some((latitude, longitude))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.time.len == 0 || self.latitude.len == 0 || self.longitude.len == 0 {
            return Err("axes must not be empty".to_string());
        }
        if self.latitude.step == 0.0 || self.longitude.step == 0.0 {
            return Err("spatial steps must be non-zero".to_string());
        }
        if !self.latitude.step.is_finite() || !self.longitude.step.is_finite() {
            return Err("spatial steps must be finite".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_default_axes() {
        let axes = GridAxes::default_daily_global();
        assert_eq!(axes.time.start, day(2015, 1, 1));
        assert_eq!(axes.time.end(), day(2024, 1, 1));
        assert_eq!(axes.time.len, 3288);
        assert_eq!(axes.shape(), [3288, 1801, 3600]);
        assert!((axes.latitude.last() + 90.0).abs() < 1e-9);
        assert!((axes.longitude.last() - 179.9).abs() < 1e-9);
    }

    #[test]
    fn test_time_index() {
        let axis = TimeAxis::between(day(2022, 1, 1), day(2022, 12, 31));
        assert_eq!(axis.index_of(day(2022, 1, 1)), Some(0));
        assert_eq!(axis.index_of(day(2022, 3, 1)), Some(59));
        assert_eq!(axis.index_of(day(2021, 12, 31)), None);
        assert_eq!(axis.index_of(day(2023, 1, 1)), None);
        assert_eq!(axis.value(59), Some(day(2022, 3, 1)));
        assert_eq!(axis.value(365), None);
    }

    #[test]
    fn test_time_range_clamps_to_axis() {
        let axis = TimeAxis::between(day(2022, 1, 1), day(2022, 1, 10));
        let range = DayRange::new(day(2021, 12, 25), day(2022, 1, 3));
        assert_eq!(axis.range_for(range), Some(0..3));

        let reversed = DayRange::new(day(2022, 1, 5), day(2022, 1, 4));
        assert_eq!(axis.range_for(reversed), None);

        let outside = DayRange::new(day(2023, 1, 1), day(2023, 1, 2));
        assert_eq!(axis.range_for(outside), None);
    }

    #[test]
    fn test_descending_index_range() {
        let lat = SpatialAxis::new(90.0, -0.1, 1801);
        // 10.0 .. 9.5 inclusive, regardless of argument order
        let range = lat.index_range(9.5, 10.0).unwrap();
        assert_eq!(range, 800..806);
        assert_eq!(lat.index_range(10.0, 9.5).unwrap(), 800..806);
    }

    #[test]
    fn test_index_range_clamps() {
        let lon = SpatialAxis::new(-180.0, 0.1, 3600);
        assert_eq!(lon.index_range(-200.0, -179.95).unwrap(), 0..1);
        assert_eq!(lon.index_range(179.0, 200.0).unwrap(), 3590..3600);
        assert!(lon.index_range(200.0, 210.0).is_none());
        // Between two grid points
        assert!(lon.index_range(0.01, 0.02).is_none());
    }

    #[test]
    fn test_nearest_index() {
        let lon = SpatialAxis::new(-180.0, 0.1, 3600);
        assert_eq!(lon.nearest_index(-179.96), Some(0));
        assert_eq!(lon.nearest_index(0.04), Some(1800));
        assert_eq!(lon.nearest_index(181.0), None);
    }
}
