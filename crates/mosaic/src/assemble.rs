//! On-demand merging of selected tiles into one raster.
//!
//! Each request walks a fixed sequence of stages:
//!
//! ```text
//! Init -> IndexFiltered -> FilesOpened -> AxisAligned -> Reduced -> Clipped -> Done
//!   \__________\______________\______________\____________\__________\--> Failed
//! ```
//!
//! Files keep their own geotransform until the reduction samples them onto
//! the output grid, so tiles need not share a pixel lattice. A file that
//! cannot be opened or decoded is skipped and reported; it never aborts the
//! other tiles of the request.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use geo_common::{CrsCode, DayRange, Extent, Reduction};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::{AssemblyError, MosaicError, Result};
use crate::index::{IndexEntry, MosaicIndex};
use crate::raster::{read_header, read_window};
use crate::tile::{GeoTransform, TileId};

/// Snapping tolerance in pixel units.
const SNAP_EPS: f64 = 1e-6;

/// Progress of one assembly request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Init,
    IndexFiltered,
    FilesOpened,
    AxisAligned,
    Reduced,
    Clipped,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::IndexFiltered => "index_filtered",
            Self::FilesOpened => "files_opened",
            Self::AxisAligned => "axis_aligned",
            Self::Reduced => "reduced",
            Self::Clipped => "clipped",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A file skipped during assembly.
#[derive(Debug)]
pub struct TileFailure {
    pub tile: TileId,
    pub path: PathBuf,
    pub stage: Stage,
    pub error: MosaicError,
}

/// Assembled raster, north-up, row-major; no-data is NaN.
#[derive(Debug)]
pub struct Mosaic {
    pub values: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub crs: CrsCode,
    /// Tiles that contributed pixels, sorted.
    pub tiles: Vec<TileId>,
    pub files: Vec<PathBuf>,
    pub failures: Vec<TileFailure>,
}

impl Mosaic {
    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        (col < self.width && row < self.height).then(|| self.values[row * self.width + col])
    }

    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_nan()).count()
    }

    pub fn extent(&self) -> Extent {
        let (min_x, min_y, max_x, max_y) = self.transform.bounds(self.width, self.height);
        Extent::new(min_x, min_y, max_x, max_y, self.crs)
    }

    /// Map x of every column centre.
    pub fn x_coords(&self) -> Vec<f64> {
        (0..self.width)
            .map(|c| self.transform.pixel_center(c, 0).0)
            .collect()
    }

    /// Map y of every row centre.
    pub fn y_coords(&self) -> Vec<f64> {
        (0..self.height)
            .map(|r| self.transform.pixel_center(0, r).1)
            .collect()
    }
}

/// A selected file with its georeferencing resolved.
#[derive(Debug, Clone)]
struct OpenedTile<'a> {
    entry: &'a IndexEntry,
    crs: CrsCode,
    transform: GeoTransform,
    width: usize,
    height: usize,
}

impl OpenedTile<'_> {
    fn extent(&self) -> Extent {
        let (min_x, min_y, max_x, max_y) = self.transform.bounds(self.width, self.height);
        Extent::new(min_x, min_y, max_x, max_y, self.crs)
    }
}

/// One tile sampled onto a sub-rectangle of the output grid.
struct Layer {
    col0: usize,
    row0: usize,
    width: usize,
    values: Vec<f32>,
}

#[derive(Debug, Clone, Copy)]
struct OutputGrid {
    crs: CrsCode,
    transform: GeoTransform,
    width: usize,
    height: usize,
}

struct Progress {
    stage: Stage,
}

impl Progress {
    fn advance(&mut self, next: Stage) {
        debug!(from = %self.stage, to = %next, "Assembly stage");
        self.stage = next;
    }

    fn fail(&mut self, attempted: Stage, error: MosaicError) -> AssemblyError {
        if error.is_no_tiles() {
            info!(stage = %attempted, error = %error, "Mosaic assembly found nothing");
        } else {
            warn!(stage = %attempted, error = %error, "Mosaic assembly failed");
        }
        self.stage = Stage::Failed;
        AssemblyError::new(attempted, error)
    }
}

/// Assembles mosaics from a shared index.
#[derive(Debug, Clone)]
pub struct MosaicAssembler {
    index: Arc<MosaicIndex>,
    reduction: Reduction,
}

impl MosaicAssembler {
    /// Assembler reducing overlaps with the maximum, no-data lowest.
    pub fn new(index: Arc<MosaicIndex>) -> Self {
        Self {
            index,
            reduction: Reduction::Max,
        }
    }

    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }

    pub fn index(&self) -> &MosaicIndex {
        &self.index
    }

    pub fn reduction(&self) -> Reduction {
        self.reduction
    }

    /// Merge every file acquired in `[start, end]` (or on `start` alone)
    /// that intersects `extent` and clip the result to `extent`.
    ///
    /// Selection is inclusive, so a query that only touches a tile edge
    /// selects that tile; since no pixel lies inside it, the request fails
    /// with `NoTilesFound` at [`Stage::AxisAligned`] instead of returning an
    /// empty raster.
    #[instrument(skip(self, extent), fields(extent = ?extent.to_tuple(), crs = %extent.crs))]
    pub fn assemble(
        &self,
        extent: &Extent,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> std::result::Result<Mosaic, AssemblyError> {
        let mut progress = Progress { stage: Stage::Init };
        let range = DayRange::from_query(start, end);

        if let Err(e) = extent.validate() {
            return Err(progress.fail(Stage::IndexFiltered, e.into()));
        }

        let rows = self.index.select(extent, start, end);
        if rows.is_empty() {
            let error = MosaicError::NoTilesFound {
                extent: format!("{:?} {}", extent.to_tuple(), extent.crs),
                start: range.start,
                end: range.end,
            };
            return Err(progress.fail(Stage::IndexFiltered, error));
        }
        progress.advance(Stage::IndexFiltered);
        debug!(files = rows.len(), "Selected files");

        let mut failures = Vec::new();
        let opened = self.open_files(&rows, &mut failures);
        if opened.is_empty() {
            let error = MosaicError::raster(format!(
                "none of the {} selected files could be opened",
                rows.len()
            ));
            return Err(progress.fail(Stage::FilesOpened, error));
        }
        progress.advance(Stage::FilesOpened);

        let (grid, opened) = match align(extent, range, opened, &mut failures) {
            Ok(aligned) => aligned,
            Err(e) => return Err(progress.fail(Stage::AxisAligned, e)),
        };
        progress.advance(Stage::AxisAligned);

        let (mut values, contributing) = match self.reduce(&grid, &opened, &mut failures) {
            Ok(reduced) => reduced,
            Err(e) => return Err(progress.fail(Stage::Reduced, e)),
        };
        progress.advance(Stage::Reduced);

        clip(&grid, extent, &mut values);
        progress.advance(Stage::Clipped);

        let tiles: Vec<TileId> = contributing
            .iter()
            .map(|t| t.entry.tile.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let files = contributing.iter().map(|t| t.entry.path.clone()).collect();

        progress.advance(Stage::Done);
        info!(
            width = grid.width,
            height = grid.height,
            tiles = tiles.len(),
            skipped = failures.len(),
            "Assembled mosaic"
        );

        Ok(Mosaic {
            values,
            width: grid.width,
            height: grid.height,
            transform: grid.transform,
            crs: grid.crs,
            tiles,
            files,
            failures,
        })
    }

    /// Read georeferencing of every selected file in parallel.
    ///
    /// A file's own geotransform wins over the one derived from its tile name.
    fn open_files<'a>(
        &self,
        rows: &[&'a IndexEntry],
        failures: &mut Vec<TileFailure>,
    ) -> Vec<OpenedTile<'a>> {
        let results: Vec<(&'a IndexEntry, Result<OpenedTile<'a>>)> = rows
            .par_iter()
            .map(|&entry| (entry, self.open_file(entry)))
            .collect();

        let mut opened = Vec::with_capacity(results.len());
        for (entry, result) in results {
            match result {
                Ok(tile) => opened.push(tile),
                Err(error) => {
                    warn!(path = %entry.path.display(), error = %error, "Skipping unreadable tile");
                    failures.push(TileFailure {
                        tile: entry.tile.clone(),
                        path: entry.path.clone(),
                        stage: Stage::FilesOpened,
                        error,
                    });
                }
            }
        }
        opened
    }

    fn open_file<'a>(&self, entry: &'a IndexEntry) -> Result<OpenedTile<'a>> {
        let footprint = self.index.footprint(&entry.tile).ok_or_else(|| {
            MosaicError::raster(format!("no footprint for tile {}", entry.tile))
        })?;
        let header = read_header(&entry.path)?;

        let transform = match header.transform {
            Some(transform) => transform,
            None if (header.width, header.height) == (footprint.width, footprint.height) => {
                footprint.transform
            }
            None => {
                return Err(MosaicError::raster(format!(
                    "{}: no geotransform and {}x{} pixels do not match tile {}",
                    entry.path.display(),
                    header.width,
                    header.height,
                    entry.tile
                )))
            }
        };

        if transform.pixel_width <= 0.0 || transform.pixel_height >= 0.0 {
            return Err(MosaicError::raster(format!(
                "{}: only north-up rasters are supported",
                entry.path.display()
            )));
        }

        Ok(OpenedTile {
            entry,
            crs: footprint.crs,
            transform,
            width: header.width,
            height: header.height,
        })
    }

    /// Sample every tile onto the output grid in parallel, then fold the
    /// layers with the reduction rule.
    fn reduce<'a>(
        &self,
        grid: &OutputGrid,
        opened: &[OpenedTile<'a>],
        failures: &mut Vec<TileFailure>,
    ) -> Result<(Vec<f32>, Vec<OpenedTile<'a>>)> {
        let layers: Vec<Result<Option<Layer>>> = opened
            .par_iter()
            .map(|tile| sample_tile(grid, tile))
            .collect();

        let mut values = vec![f32::NAN; grid.width * grid.height];
        let mut counts = match self.reduction {
            Reduction::Mean => vec![0u32; values.len()],
            _ => Vec::new(),
        };
        let mut contributing = Vec::new();

        for (tile, layer) in opened.iter().zip(layers) {
            match layer {
                Ok(Some(layer)) => {
                    self.fold_layer(grid, &layer, &mut values, &mut counts);
                    contributing.push(tile.clone());
                }
                Ok(None) => {
                    debug!(tile = %tile.entry.tile, "Tile does not reach the output window");
                }
                Err(error) => {
                    warn!(path = %tile.entry.path.display(), error = %error, "Skipping undecodable tile");
                    failures.push(TileFailure {
                        tile: tile.entry.tile.clone(),
                        path: tile.entry.path.clone(),
                        stage: Stage::Reduced,
                        error,
                    });
                }
            }
        }

        if contributing.is_empty() && !opened.is_empty() && failures.iter().any(|f| f.stage == Stage::Reduced) {
            return Err(MosaicError::raster(format!(
                "none of the {} opened files could be decoded",
                opened.len()
            )));
        }

        if self.reduction == Reduction::Mean {
            for (v, n) in values.iter_mut().zip(&counts) {
                if *n > 0 {
                    *v /= *n as f32;
                }
            }
        }

        Ok((values, contributing))
    }

    fn fold_layer(&self, grid: &OutputGrid, layer: &Layer, values: &mut [f32], counts: &mut [u32]) {
        for (r, row) in layer.values.chunks(layer.width).enumerate() {
            let offset = (layer.row0 + r) * grid.width + layer.col0;
            for (c, &v) in row.iter().enumerate() {
                if v.is_nan() {
                    continue;
                }
                let i = offset + c;
                let acc = &mut values[i];
                match self.reduction {
                    Reduction::Max => {
                        if acc.is_nan() || v > *acc {
                            *acc = v;
                        }
                    }
                    Reduction::Sum | Reduction::Mean => {
                        *acc = if acc.is_nan() { v } else { *acc + v };
                    }
                }
                if let Some(n) = counts.get_mut(i) {
                    *n += 1;
                }
            }
        }
    }
}

/// Pick the output reference system and lattice, and restrict the query to
/// the area the tiles cover.
///
/// The first tile (in tile order) fixes the reference system and pixel
/// lattice; tiles in another reference system are skipped.
fn align<'a>(
    extent: &Extent,
    range: DayRange,
    mut opened: Vec<OpenedTile<'a>>,
    failures: &mut Vec<TileFailure>,
) -> Result<(OutputGrid, Vec<OpenedTile<'a>>)> {
    opened.sort_by(|a, b| (&a.entry.tile, &a.entry.path).cmp(&(&b.entry.tile, &b.entry.path)));
    let anchor = opened[0].transform;
    let crs = opened[0].crs;

    let (same, other): (Vec<_>, Vec<_>) = opened.into_iter().partition(|t| t.crs == crs);
    for tile in other {
        warn!(tile = %tile.entry.tile, crs = %tile.crs, mosaic_crs = %crs, "Skipping tile in another reference system");
        failures.push(TileFailure {
            tile: tile.entry.tile.clone(),
            path: tile.entry.path.clone(),
            stage: Stage::AxisAligned,
            error: MosaicError::projection(format!(
                "tile {} is in {}, mosaic is in {crs}",
                tile.entry.tile, tile.crs
            )),
        });
    }

    let query = extent.transform_to(crs)?;
    let coverage = same
        .iter()
        .map(OpenedTile::extent)
        .reduce(|acc, e| acc.union(&e))
        .ok_or_else(|| MosaicError::projection("no tiles left in a common reference system"))?;

    let window = query.intersection(&coverage).ok_or_else(|| MosaicError::NoTilesFound {
        extent: format!("{:?} {}", extent.to_tuple(), extent.crs),
        start: range.start,
        end: range.end,
    })?;

    let px = anchor.pixel_width;
    let py = -anchor.pixel_height;
    let (ox, oy) = (anchor.origin_x, anchor.origin_y);

    let x0 = ox + ((window.min_x - ox) / px + SNAP_EPS).floor() * px;
    let x1 = ox + ((window.max_x - ox) / px - SNAP_EPS).ceil() * px;
    let y_top = oy - ((oy - window.max_y) / py + SNAP_EPS).floor() * py;
    let y_bottom = oy - ((oy - window.min_y) / py - SNAP_EPS).ceil() * py;

    let width = ((x1 - x0) / px).round().max(0.0) as usize;
    let height = ((y_top - y_bottom) / py).round().max(0.0) as usize;

    // Touching a tile edge selects the tile but leaves no pixel to fill.
    if width == 0 || height == 0 {
        return Err(MosaicError::NoTilesFound {
            extent: format!("{:?} {}", extent.to_tuple(), extent.crs),
            start: range.start,
            end: range.end,
        });
    }

    Ok((
        OutputGrid {
            crs,
            transform: GeoTransform::new(x0, y_top, px, -py),
            width,
            height,
        },
        same,
    ))
}

/// Nearest-neighbour sample of one tile onto the part of the output grid it
/// covers. Returns `None` without decoding when the tile misses the grid;
/// otherwise only the source pixels under the grid are decoded.
fn sample_tile(grid: &OutputGrid, tile: &OpenedTile<'_>) -> Result<Option<Layer>> {
    let cols: Vec<(usize, usize)> = (0..grid.width)
        .filter_map(|c| {
            let (x, y) = grid.transform.pixel_center(c, 0);
            let (src, _) = tile.transform.pixel_of(x, y);
            (src >= 0 && (src as usize) < tile.width).then_some((c, src as usize))
        })
        .collect();
    let rows: Vec<(usize, usize)> = (0..grid.height)
        .filter_map(|r| {
            let (x, y) = grid.transform.pixel_center(0, r);
            let (_, src) = tile.transform.pixel_of(x, y);
            (src >= 0 && (src as usize) < tile.height).then_some((r, src as usize))
        })
        .collect();

    let (Some(&(col0, _)), Some(&(row0, _))) = (cols.first(), rows.first()) else {
        return Ok(None);
    };

    let src_cols = source_span(&cols);
    let src_rows = source_span(&rows);
    let window = read_window(&tile.entry.path, src_rows, src_cols)?;
    if (window.header.width, window.header.height) != (tile.width, tile.height) {
        return Err(MosaicError::raster(format!(
            "{} changed size since it was opened",
            tile.entry.path.display()
        )));
    }

    let mut values = Vec::with_capacity(cols.len() * rows.len());
    for &(_, src_row) in &rows {
        values.extend(
            cols.iter()
                .map(|&(_, src_col)| window.get(src_col, src_row).unwrap_or(f32::NAN)),
        );
    }

    Ok(Some(Layer {
        col0,
        row0,
        width: cols.len(),
        values,
    }))
}

/// Smallest source index range holding every sampled index.
fn source_span(samples: &[(usize, usize)]) -> Range<usize> {
    let min = samples.iter().map(|&(_, src)| src).min().unwrap_or(0);
    let max = samples.iter().map(|&(_, src)| src).max().unwrap_or(0);
    min..max + 1
}

/// Blank pixels whose centre falls outside the query extent when the query
/// is in a different reference system than the mosaic.
fn clip(grid: &OutputGrid, extent: &Extent, values: &mut [f32]) {
    if extent.crs == grid.crs || grid.width == 0 {
        return;
    }

    let source = grid.crs.projection();
    let target = extent.crs.projection();
    values
        .par_chunks_mut(grid.width)
        .enumerate()
        .for_each(|(r, row)| {
            for (c, v) in row.iter_mut().enumerate() {
                if v.is_nan() {
                    continue;
                }
                let (x, y) = grid.transform.pixel_center(c, r);
                let inside = source
                    .transform(&target, x, y)
                    .map(|(qx, qy)| extent.contains_point(qx, qy))
                    .unwrap_or(false);
                if !inside {
                    *v = f32::NAN;
                }
            }
        });
}
