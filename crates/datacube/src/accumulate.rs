//! Running rainfall totals.

use geo_common::{CrsCode, Resampling};
use mosaic::Warp;

use crate::array::{Coord, DataArray};
use crate::error::{CubeError, Result};
use crate::reproject::reproject;

/// Metres of precipitation to millimetres.
pub const M_TO_MM: f32 = 1000.0;

/// Reference system of accumulated rainfall maps.
pub const ACCUMULATION_CRS: CrsCode = CrsCode::Epsg3857;

/// Pixel size of accumulated rainfall maps, in metres.
pub const ACCUMULATION_RESOLUTION_M: f64 = 500.0;

/// Running sum of daily rainfall, in millimetres.
///
/// Steps are fed in time order; each output step is the total since the
/// first one. A cell that is no-data in any step stays no-data from then on,
/// since its total is unknown.
#[derive(Debug, Clone, Default)]
pub struct RainAccumulator {
    total: Option<Vec<f32>>,
    steps: Vec<Vec<f32>>,
}

impl RainAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one daily field given in metres.
    pub fn push(&mut self, step_m: &[f32]) -> Result<()> {
        let total = match self.total.take() {
            None => step_m.iter().map(|v| v * M_TO_MM).collect::<Vec<_>>(),
            Some(total) => {
                if total.len() != step_m.len() {
                    return Err(CubeError::config(format!(
                        "step has {} cells, earlier steps {}",
                        step_m.len(),
                        total.len()
                    )));
                }
                total
                    .iter()
                    .zip(step_m)
                    .map(|(acc, v)| acc + v * M_TO_MM)
                    .collect()
            }
        };
        self.steps.push(total.clone());
        self.total = Some(total);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Cumulative steps, flattened in time order.
    pub fn finish(self) -> Vec<f32> {
        self.steps.into_iter().flatten().collect()
    }

    /// Accumulate a `(time, ...)` array of daily rainfall in metres.
    pub fn accumulate(rain: &DataArray) -> Result<DataArray> {
        if rain.dims.first().map(String::as_str) != Some("time") {
            return Err(CubeError::config(format!(
                "rainfall accumulation needs time as the first dimension, got {:?}",
                rain.dims
            )));
        }
        let steps = rain.coords.first().map(Coord::len).unwrap_or(0);
        let mut acc = Self::new();
        if steps > 0 {
            let plane = rain.values.len() / steps;
            for step in rain.values.chunks(plane.max(1)) {
                acc.push(step)?;
            }
        }

        let mut provenance = rain.provenance.clone();
        provenance.units = "mm".to_string();
        let dims: Vec<&str> = rain.dims.iter().map(String::as_str).collect();
        DataArray::new(
            format!("{}_accumulated", rain.name),
            &dims,
            rain.coords.clone(),
            acc.finish(),
            provenance,
        )
        .ok_or_else(|| CubeError::config("accumulated array does not match the input shape"))
    }

    /// Target of accumulated maps: Web Mercator at 500 m, interpolated
    /// bilinearly.
    pub fn map_warp() -> Warp {
        Warp::to(ACCUMULATION_CRS)
            .resolution(ACCUMULATION_RESOLUTION_M)
            .resampling(Resampling::Bilinear)
    }

    /// Accumulate `rain` and warp every cumulative step with `warp`.
    ///
    /// Totals are formed on the native grid first, so cells never mix
    /// before they are summed.
    pub fn accumulate_onto(rain: &DataArray, warp: &Warp) -> Result<DataArray> {
        reproject(&Self::accumulate(rain)?, warp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::Provenance;
    use chrono::NaiveDate;
    use geo_common::{descriptor, CrsCode};
    use test_utils::assert_slice_approx_eq;

    #[test]
    fn test_running_total_in_mm() {
        let mut acc = RainAccumulator::new();
        acc.push(&[0.001, 0.0]).unwrap();
        acc.push(&[0.002, 0.0005]).unwrap();
        acc.push(&[0.0, 0.001]).unwrap();
        assert_eq!(acc.len(), 3);
        assert_slice_approx_eq!(acc.finish(), vec![1.0, 0.0, 3.0, 0.5, 3.0, 1.5], 1e-4);
    }

    #[test]
    fn test_no_data_stays_no_data() {
        let mut acc = RainAccumulator::new();
        acc.push(&[0.001, f32::NAN]).unwrap();
        acc.push(&[f32::NAN, 0.001]).unwrap();
        let out = acc.finish();
        assert!((out[0] - 1.0).abs() < 1e-4);
        assert!(out[1].is_nan());
        assert!(out[2].is_nan());
        assert!(out[3].is_nan());
    }

    #[test]
    fn test_mismatched_step_rejected() {
        let mut acc = RainAccumulator::new();
        acc.push(&[0.0; 4]).unwrap();
        assert!(acc.push(&[0.0; 3]).is_err());
    }

    #[test]
    fn test_accumulate_array() {
        let days: Vec<NaiveDate> = (1..=2)
            .map(|d| NaiveDate::from_ymd_opt(2022, 3, d).unwrap())
            .collect();
        let prov = Provenance::for_dataset(
            descriptor("copernicus/predicted_rainfall").unwrap(),
            CrsCode::Epsg4326,
        );
        let rain = DataArray::new(
            "tp",
            &["time", "latitude", "longitude"],
            vec![
                Coord::Days(days),
                Coord::Values(vec![0.0]),
                Coord::Values(vec![0.0, 0.1]),
            ],
            vec![0.002, 0.0, 0.003, 0.001],
            prov,
        )
        .unwrap();

        let total = RainAccumulator::accumulate(&rain).unwrap();
        assert_eq!(total.name, "tp_accumulated");
        assert_eq!(total.shape(), vec![2, 1, 2]);
        assert_eq!(total.provenance.units, "mm");
        assert_slice_approx_eq!(total.values, vec![2.0, 0.0, 5.0, 1.0], 1e-4);
    }

    #[test]
    fn test_accumulate_onto_map_grid() {
        let days: Vec<NaiveDate> = (1..=3)
            .map(|d| NaiveDate::from_ymd_opt(2022, 3, d).unwrap())
            .collect();
        let prov = Provenance::for_dataset(
            descriptor("copernicus/predicted_rainfall").unwrap(),
            CrsCode::Epsg4326,
        );
        // 0.1 degree cells around (68E, 25N); 1 mm of rain per cell and day
        let rain = DataArray::new(
            "tp",
            &["time", "latitude", "longitude"],
            vec![
                Coord::Days(days),
                Coord::Values(vec![25.1, 25.0, 24.9]),
                Coord::Values(vec![67.9, 68.0, 68.1]),
            ],
            vec![0.001; 27],
            prov,
        )
        .unwrap();

        let map = RainAccumulator::accumulate_onto(&rain, &RainAccumulator::map_warp()).unwrap();
        assert_eq!(map.name, "tp_accumulated");
        assert_eq!(map.dims, vec!["time", "y", "x"]);
        assert_eq!(map.provenance.crs, CrsCode::Epsg3857);
        assert_eq!(map.provenance.units, "mm");

        // 0.3 degrees is about 33 km, so roughly 67 pixels of 500 m
        let shape = map.shape();
        assert_eq!(shape[0], 3);
        assert!((60..80).contains(&shape[2]), "{shape:?}");
        let Some(Coord::Values(x)) = map.coord("x") else { panic!("x coordinate missing") };
        assert!((x[1] - x[0] - ACCUMULATION_RESOLUTION_M).abs() < 1e-6);

        // Uniform fields stay uniform under bilinear interpolation
        let plane = shape[1] * shape[2];
        for (step, expected) in [(0, 1.0), (2, 3.0)] {
            let values = &map.values[step * plane..(step + 1) * plane];
            let valid: Vec<f32> = values.iter().copied().filter(|v| !v.is_nan()).collect();
            assert!(valid.len() > plane * 9 / 10);
            assert!(valid.iter().all(|v| (v - expected).abs() < 1e-4));
        }
    }

    #[test]
    fn test_accumulate_requires_time_first() {
        let prov = Provenance::for_dataset(
            descriptor("copernicus/predicted_rainfall").unwrap(),
            CrsCode::Epsg4326,
        );
        let array = DataArray::new("tp", &["y"], vec![Coord::Values(vec![0.0])], vec![1.0], prov).unwrap();
        assert!(RainAccumulator::accumulate(&array).is_err());
    }
}
