//! Spatially tiled raster archives.
//!
//! A [`MosaicIndex`] catalogs an archive once: every file whose relative
//! path passes the configured [`PathFilter`]s and whose name a
//! [`NamingRule`] can decode becomes an entry keyed by tile and
//! acquisition time. The [`MosaicAssembler`] answers requests against the
//! index by selecting entries in space and time, sampling them onto a
//! common grid, reducing overlaps, and clipping to the request.
//!
//! ```ignore
//! use std::sync::Arc;
//! use mosaic::{flood_filters, MosaicAssembler, MosaicIndex, YeodaNaming};
//!
//! let index = MosaicIndex::build(root, &YeodaNaming, &flood_filters()?)?;
//! let assembler = MosaicAssembler::new(Arc::new(index));
//! let mosaic = assembler.assemble(&extent, day, None)?;
//! println!("{} tiles", mosaic.tiles.len());
//! ```

pub mod assemble;
pub mod error;
pub mod filter;
pub mod index;
pub mod naming;
pub mod raster;
pub mod tile;
pub mod warp;

pub use assemble::{Mosaic, MosaicAssembler, Stage, TileFailure};
pub use error::{AssemblyError, MosaicError, Result};
pub use filter::{dem_filters, flood_filters, matches_all, PathFilter};
pub use index::{IndexEntry, MosaicIndex};
pub use naming::{FileFields, NamingRule, StaticYeodaNaming, YeodaNaming};
pub use raster::{read_band, read_header, read_window, write_geotiff_i16, RasterHeader, RasterWindow};
pub use tile::{Equi7GridName, Equi7TileName, GeoTransform, TileFootprint, TileId};
pub use warp::{GeoRaster, Warp, MAX_WARP_PIXELS};
