//! GRIB decoding of staged provider files.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use geo_common::GridSpec;
use tracing::debug;

use crate::error::{FetchError, Result};

/// Steps of one staged file and the grid they are laid out on.
#[derive(Debug, Clone)]
pub struct DecodedSteps {
    pub grid: GridSpec,
    pub steps: Vec<Vec<f32>>,
}

/// Decode every message of a GRIB file into one step per message.
///
/// The grid is read from each message's grid definition; all messages of a
/// file must share it. Missing values come back as NaN.
pub fn decode_steps(path: &Path) -> Result<DecodedSteps> {
    let reader = BufReader::new(File::open(path)?);
    let grib_file = grib::from_reader(reader)
        .map_err(|e| FetchError::decode(format!("{}: {e}", path.display())))?;

    let mut grid: Option<GridSpec> = None;
    let mut steps = Vec::new();
    for ((message, submessage), submsg) in grib_file.iter() {
        let context = |e: &dyn std::fmt::Display| {
            FetchError::decode(format!("message {message}.{submessage}: {e}"))
        };

        let (nx, ny) = submsg.grid_shape().map_err(|e| context(&e))?;
        let mut latlons = submsg.latlons().map_err(|e| context(&e))?;
        // Corners: first point, end of the first row, start of the last row.
        let first = latlons.next();
        let row_end = if nx > 1 { latlons.nth(nx - 2) } else { first };
        let last_row = if ny > 1 { latlons.nth((ny - 2) * nx) } else { first };
        let (Some(first), Some(row_end), Some(last_row)) = (first, row_end, last_row) else {
            return Err(context(&"grid has fewer points than its shape"));
        };
        let message_grid = grid_from_corners(nx, ny, first, row_end, last_row)
            .ok_or_else(|| context(&format!("unsupported {nx}x{ny} grid")))?;

        match grid {
            Some(expected) if expected != message_grid => {
                return Err(context(&format!(
                    "grid {message_grid:?} differs from the first message's {expected:?}"
                )));
            }
            _ => grid = Some(message_grid),
        }

        let decoder = grib::Grib2SubmessageDecoder::from(submsg).map_err(|e| context(&e))?;
        let values: Vec<f32> = decoder.dispatch().map_err(|e| context(&e))?.collect();
        if values.len() != message_grid.len() {
            return Err(context(&format!(
                "{} values for a {}x{} grid",
                values.len(),
                message_grid.nx,
                message_grid.ny
            )));
        }
        steps.push(values);
    }

    let Some(grid) = grid else {
        return Err(FetchError::decode(format!(
            "{} contains no GRIB messages",
            path.display()
        )));
    };

    debug!(path = %path.display(), steps = steps.len(), ?grid, "Decoded GRIB file");
    Ok(DecodedSteps { grid, steps })
}

/// Build a regular lon/lat grid from three corner points given as
/// `(lat, lon)`.
///
/// GRIB2 encodes longitudes in `[0, 360)`, so a grid starting at the
/// antimeridian arrives with a first longitude of 180; it is moved to -180.
/// Increments are rounded to microdegrees, the resolution of the encoding.
pub fn grid_from_corners(
    nx: usize,
    ny: usize,
    first: (f32, f32),
    row_end: (f32, f32),
    last_row: (f32, f32),
) -> Option<GridSpec> {
    if nx < 2 || ny < 2 {
        return None;
    }
    let (lat0, lon0) = (first.0 as f64, first.1 as f64);

    let mut lon_span = row_end.1 as f64 - lon0;
    if lon_span <= 0.0 {
        lon_span += 360.0;
    }
    let dx = to_microdegrees(lon_span / (nx - 1) as f64);
    let dy = to_microdegrees((last_row.0 as f64 - lat0) / (ny - 1) as f64);
    if dx == 0.0 || dy == 0.0 {
        return None;
    }

    let first_x = if lon0 >= 180.0 { lon0 - 360.0 } else { lon0 };
    Some(GridSpec::new(
        nx,
        ny,
        dx,
        dy,
        to_microdegrees(first_x),
        to_microdegrees(lat0),
    ))
}

fn to_microdegrees(degrees: f64) -> f64 {
    (degrees * 1e6).round() / 1e6
}
