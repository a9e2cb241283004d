//! Normalization of provider slices onto the store grid.
//!
//! A provider delivers one day as several sub-daily steps on its own
//! regular lon/lat grid. Normalizing reduces the steps to one daily value
//! per cell (sum or mean, per dataset) and resamples the result onto the
//! store's latitude/longitude axes, rolling longitudes into the store's
//! range on the way.

use geo_common::{GridSpec, Reduction};

pub use geo_common::Resampling;

use crate::axis::{GridAxes, SpatialAxis};
use crate::error::{GridStoreError, Result};
use crate::types::GridArray;

/// Reduce sub-daily steps cell by cell, ignoring NaN samples.
pub fn reduce_steps(steps: &[Vec<f32>], reduction: Reduction) -> Result<Vec<f32>> {
    let first = steps
        .first()
        .ok_or_else(|| GridStoreError::transform("slice has no time steps"))?;
    if let Some(bad) = steps.iter().find(|s| s.len() != first.len()) {
        return Err(GridStoreError::transform(format!(
            "time steps differ in size ({} vs {})",
            first.len(),
            bad.len()
        )));
    }
    if steps.len() == 1 {
        return Ok(first.clone());
    }

    Ok((0..first.len())
        .map(|cell| reduction.apply(steps.iter().map(|step| step[cell])))
        .collect())
}

/// Resamples provider grids onto fixed store axes.
#[derive(Debug, Clone)]
pub struct Normalizer {
    latitude: SpatialAxis,
    longitude: SpatialAxis,
    resampling: Resampling,
}

impl Normalizer {
    pub fn new(axes: &GridAxes, resampling: Resampling) -> Self {
        Self {
            latitude: axes.latitude,
            longitude: axes.longitude,
            resampling,
        }
    }

    /// Reduce `steps` and resample onto the store grid as a `(1, lat, lon)` array.
    pub fn normalize(
        &self,
        grid: &GridSpec,
        steps: &[Vec<f32>],
        reduction: Reduction,
    ) -> Result<GridArray<f32>> {
        if grid.is_empty() {
            return Err(GridStoreError::transform("provider grid is empty"));
        }
        if let Some(step) = steps.iter().find(|s| s.len() != grid.len()) {
            return Err(GridStoreError::transform(format!(
                "step has {} values, grid {}x{} needs {}",
                step.len(),
                grid.nx,
                grid.ny,
                grid.len()
            )));
        }

        let daily = reduce_steps(steps, reduction)?;
        let data = self.resample(grid, &daily);
        Ok(GridArray::time_step(self.latitude.len, self.longitude.len, data))
    }

    /// Resample one provider field onto the store grid.
    pub fn resample(&self, grid: &GridSpec, values: &[f32]) -> Vec<f32> {
        let cols: Vec<Option<f64>> = self
            .longitude
            .values()
            .into_iter()
            .map(|lon| grid.fractional_index(lon, grid.first_y).map(|(i, _)| i))
            .collect();
        let rows: Vec<Option<f64>> = self
            .latitude
            .values()
            .into_iter()
            .map(|lat| grid.fractional_index(grid.first_x, lat).map(|(_, j)| j))
            .collect();

        let mut out = Vec::with_capacity(rows.len() * cols.len());
        for row in &rows {
            for col in &cols {
                let value = match (row, col) {
                    (Some(j), Some(i)) => match self.resampling {
                        Resampling::Nearest => nearest(values, grid, *i, *j),
                        Resampling::Bilinear => bilinear(values, grid, *i, *j),
                    },
                    _ => f32::NAN,
                };
                out.push(value);
            }
        }
        out
    }
}

fn nearest(values: &[f32], grid: &GridSpec, i: f64, j: f64) -> f32 {
    let mut col = i.round() as usize;
    if col >= grid.nx {
        col = if grid.is_global_lon() { 0 } else { grid.nx - 1 };
    }
    let row = (j.round() as usize).min(grid.ny - 1);
    values[row * grid.nx + col]
}

/// Bilinear interpolation; any NaN corner gives NaN.
fn bilinear(values: &[f32], grid: &GridSpec, i: f64, j: f64) -> f32 {
    let i = i.max(0.0);
    let j = j.max(0.0);
    let x0 = (i.floor() as usize).min(grid.nx - 1);
    let y0 = (j.floor() as usize).min(grid.ny - 1);
    let x1 = if x0 + 1 < grid.nx {
        x0 + 1
    } else if grid.is_global_lon() {
        0
    } else {
        x0
    };
    let y1 = (y0 + 1).min(grid.ny - 1);

    let xf = (i - x0 as f64).clamp(0.0, 1.0) as f32;
    let yf = (j - y0 as f64).clamp(0.0, 1.0) as f32;

    let v00 = values[y0 * grid.nx + x0];
    let v10 = values[y0 * grid.nx + x1];
    let v01 = values[y1 * grid.nx + x0];
    let v11 = values[y1 * grid.nx + x1];

    if v00.is_nan() || v10.is_nan() || v01.is_nan() || v11.is_nan() {
        return f32::NAN;
    }

    let top = v00 * (1.0 - xf) + v10 * xf;
    let bottom = v01 * (1.0 - xf) + v11 * xf;
    top * (1.0 - yf) + bottom * yf
}
