//! Single-band GeoTIFF reading, and writing of derived products.

use std::fs::File;
use std::io::BufWriter;
use std::ops::Range;
use std::path::Path;

use geo_common::CrsCode;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tracing::info;

use crate::error::{MosaicError, Result};
use crate::tile::GeoTransform;
use crate::warp::GeoRaster;

/// GeoTIFF model pixel scale tag.
const TAG_PIXEL_SCALE: u16 = 33550;
/// GeoTIFF model tiepoint tag.
const TAG_TIEPOINT: u16 = 33922;
/// GDAL no-data tag (ASCII).
const TAG_GDAL_NODATA: u16 = 42113;
/// GeoTIFF key directory tag.
const TAG_GEO_KEYS: u16 = 34735;

const KEY_MODEL_TYPE: u16 = 1024;
const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_TYPE: u16 = 3072;

/// Georeferencing read from a tile file without decoding pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterHeader {
    pub width: usize,
    pub height: usize,
    /// `None` when the file carries no tiepoint/scale tags.
    pub transform: Option<GeoTransform>,
    pub nodata: Option<f32>,
    /// EPSG code from the GeoTIFF keys, when the file names one.
    pub epsg: Option<u16>,
}

/// A decoded rectangle of the first band; no-data pixels are NaN.
#[derive(Debug, Clone)]
pub struct RasterWindow {
    pub header: RasterHeader,
    /// Source pixel of the window's first element.
    pub row0: usize,
    pub col0: usize,
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl RasterWindow {
    /// Value at source pixel `(col, row)`, if it lies inside the window.
    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        let c = col.checked_sub(self.col0).filter(|c| *c < self.width)?;
        let r = row.checked_sub(self.row0).filter(|r| *r < self.height)?;
        Some(self.data[r * self.width + c])
    }
}

fn open_decoder(path: &Path) -> Result<Decoder<File>> {
    let file = File::open(path)?;

    // Only the strips or tiles under a window are decoded, but one strip of
    // a 15000 pixel wide f64 tile is already large.
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024;
    limits.intermediate_buffer_size = 512 * 1024 * 1024;
    limits.ifd_value_size = 64 * 1024 * 1024;

    Ok(Decoder::new(file)?.with_limits(limits))
}

fn read_header_from(decoder: &mut Decoder<File>) -> Result<RasterHeader> {
    let (width, height) = decoder.dimensions()?;
    Ok(RasterHeader {
        width: width as usize,
        height: height as usize,
        transform: read_geotransform(decoder),
        nodata: read_nodata(decoder),
        epsg: read_epsg(decoder),
    })
}

/// Read dimensions, geotransform and no-data value.
pub fn read_header(path: &Path) -> Result<RasterHeader> {
    let mut decoder = open_decoder(path)?;
    read_header_from(&mut decoder)
}

/// Decode the whole first band.
pub fn read_band(path: &Path) -> Result<RasterWindow> {
    let header = read_header(path)?;
    read_window(path, 0..header.height, 0..header.width)
}

/// Decode source rows `rows` and columns `cols` of the first band, widening
/// to f32 and mapping no-data to NaN.
///
/// Only the strips or tiles overlapping the window are decompressed.
pub fn read_window(path: &Path, rows: Range<usize>, cols: Range<usize>) -> Result<RasterWindow> {
    let mut decoder = open_decoder(path)?;
    let header = read_header_from(&mut decoder)?;

    if rows.is_empty() || cols.is_empty() || rows.end > header.height || cols.end > header.width {
        return Err(MosaicError::raster(format!(
            "{}: window rows {rows:?} cols {cols:?} outside {}x{} raster",
            path.display(),
            header.width,
            header.height
        )));
    }

    let (chunk_w, chunk_h) = decoder.chunk_dimensions();
    let (chunk_w, chunk_h) = (chunk_w as usize, chunk_h as usize);
    if chunk_w == 0 || chunk_h == 0 {
        return Err(MosaicError::raster(format!(
            "{}: empty {:?} layout",
            path.display(),
            decoder.get_chunk_type()
        )));
    }
    // Strips span the full width, so this is 1 for stripped files.
    let chunks_across = header.width.div_ceil(chunk_w);

    let width = cols.len();
    let mut data = vec![f32::NAN; rows.len() * width];
    for chunk_row in rows.start / chunk_h..=(rows.end - 1) / chunk_h {
        for chunk_col in cols.start / chunk_w..=(cols.end - 1) / chunk_w {
            let index = (chunk_row * chunks_across + chunk_col) as u32;
            let (data_w, data_h) = decoder.chunk_data_dimensions(index);
            let (data_w, data_h) = (data_w as usize, data_h as usize);
            let chunk = widen(decoder.read_chunk(index)?);

            let pixels = data_w * data_h;
            if pixels == 0 || chunk.len() % pixels != 0 {
                return Err(MosaicError::raster(format!(
                    "{}: chunk {index} holds {} samples for {data_w}x{data_h} pixels",
                    path.display(),
                    chunk.len()
                )));
            }
            // Interleaved samples: the first band is every `samples`-th value.
            let samples = chunk.len() / pixels;

            let (top, left) = (chunk_row * chunk_h, chunk_col * chunk_w);
            let overlap_rows = rows.start.max(top)..rows.end.min(top + data_h);
            let overlap_cols = cols.start.max(left)..cols.end.min(left + data_w);
            for r in overlap_rows {
                let out = (r - rows.start) * width;
                for c in overlap_cols.clone() {
                    data[out + c - cols.start] = chunk[((r - top) * data_w + c - left) * samples];
                }
            }
        }
    }

    if let Some(nodata) = header.nodata {
        for v in data.iter_mut().filter(|v| **v == nodata) {
            *v = f32::NAN;
        }
    }

    Ok(RasterWindow {
        header,
        row0: rows.start,
        col0: cols.start,
        width,
        height: rows.len(),
        data,
    })
}

/// Write `raster` as a 16-bit signed GeoTIFF, rounding values and storing
/// NaN as `nodata`.
///
/// Values outside the i16 range saturate.
pub fn write_geotiff_i16(path: &Path, raster: &GeoRaster, nodata: i16) -> Result<()> {
    let width = u32::try_from(raster.width)
        .map_err(|_| MosaicError::raster(format!("{} columns do not fit a TIFF", raster.width)))?;
    let height = u32::try_from(raster.height)
        .map_err(|_| MosaicError::raster(format!("{} rows do not fit a TIFF", raster.height)))?;
    let epsg = epsg_code(raster.crs)?;

    let data: Vec<i16> = raster
        .values
        .iter()
        .map(|v| {
            if v.is_nan() {
                nodata
            } else {
                v.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
            }
        })
        .collect();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;
    let mut image = encoder.new_image::<colortype::GrayI16>(width, height)?;

    let t = raster.transform;
    let (model, crs_key) = if raster.crs.is_geographic() {
        (2, KEY_GEOGRAPHIC_TYPE)
    } else {
        (1, KEY_PROJECTED_TYPE)
    };
    #[rustfmt::skip]
    let keys: [u16; 16] = [
        1, 1, 0, 3,
        KEY_MODEL_TYPE, 0, 1, model,
        // PixelIsArea
        KEY_RASTER_TYPE, 0, 1, 1,
        crs_key, 0, 1, epsg,
    ];

    let dir = image.encoder();
    dir.write_tag(Tag::from_u16_exhaustive(TAG_PIXEL_SCALE), &[t.pixel_width, -t.pixel_height, 0.0][..])?;
    dir.write_tag(Tag::from_u16_exhaustive(TAG_TIEPOINT), &[0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0][..])?;
    dir.write_tag(Tag::from_u16_exhaustive(TAG_GEO_KEYS), &keys[..])?;
    dir.write_tag(Tag::from_u16_exhaustive(TAG_GDAL_NODATA), nodata.to_string().as_str())?;
    image.write_data(&data)?;

    info!(
        path = %path.display(),
        width,
        height,
        crs = %raster.crs,
        "Wrote GeoTIFF"
    );
    Ok(())
}

fn epsg_code(crs: CrsCode) -> Result<u16> {
    let code = match crs {
        CrsCode::Epsg4326 => 4326,
        CrsCode::Epsg3857 => 3857,
        CrsCode::Equi7(subgrid) => subgrid.epsg(),
    };
    u16::try_from(code).map_err(|_| MosaicError::projection(format!("EPSG:{code} has no GeoTIFF key")))
}

fn widen(result: DecodingResult) -> Vec<f32> {
    match result {
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::U16(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::I16(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
    }
}

fn read_geotransform(decoder: &mut Decoder<File>) -> Option<GeoTransform> {
    let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_TIEPOINT)).ok()?;
    let scale = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_PIXEL_SCALE)).ok()?;
    if tiepoint.len() < 6 || scale.len() < 2 {
        return None;
    }

    // Tiepoint is [i, j, k, x, y, z]: raster (i, j) sits at map (x, y)
    let (i, j) = (tiepoint[0], tiepoint[1]);
    let (x, y) = (tiepoint[3], tiepoint[4]);
    Some(GeoTransform::new(
        x - i * scale[0],
        y + j * scale[1],
        scale[0],
        -scale[1],
    ))
}

fn read_nodata(decoder: &mut Decoder<File>) -> Option<f32> {
    let text = decoder.get_tag_ascii_string(Tag::from_u16_exhaustive(TAG_GDAL_NODATA)).ok()?;
    text.trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .parse()
        .ok()
}

fn read_epsg(decoder: &mut Decoder<File>) -> Option<u16> {
    let keys = decoder.get_tag_u16_vec(Tag::from_u16_exhaustive(TAG_GEO_KEYS)).ok()?;
    // Header of four shorts, then one (key, location, count, value) entry per key
    keys.get(4..)?
        .chunks_exact(4)
        .find(|entry| {
            (entry[0] == KEY_PROJECTED_TYPE || entry[0] == KEY_GEOGRAPHIC_TYPE) && entry[1] == 0
        })
        .map(|entry| entry[3])
}
