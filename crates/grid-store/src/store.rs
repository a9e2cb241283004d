//! Zarr V3 grid store.
//!
//! A store is a Zarr group on the local filesystem holding one
//! `(time, latitude, longitude)` array per variable, the `covered` flag
//! array along time, coordinate arrays and an optional static `area`
//! variable. Data variables are created without payload: every chunk
//! reads as the NaN fill value until a region write touches it.

use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use geo_common::{DatasetDescriptor, DayRange, Reduction, Resolution};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::codec::BytesToBytesCodecTraits;
use zarrs::array::{Array, ArrayBuilder, ChunkGrid, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::{Group, GroupBuilder};
use zarrs_filesystem::FilesystemStore;

use crate::area::grid_box_areas;
use crate::axis::GridAxes;
use crate::config::{GridStoreConfig, ZarrCompression};
use crate::error::{GridStoreError, Result};
use crate::region::StoreRegion;
use crate::types::{GridArray, GridSlice};

/// Name of the per-day coverage flag array.
pub const COVERED: &str = "covered";
/// Name of the static grid-box area variable.
pub const AREA: &str = "area";

const RESERVED: &[&str] = &[COVERED, AREA, "time", "latitude", "longitude"];
const LAYOUT_ATTR: &str = "layout";

/// A data variable held by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    pub long_name: String,
    pub units: String,
    /// How sub-daily samples were reduced into the stored daily value.
    pub reduction: Reduction,
}

impl VariableSpec {
    pub fn new(name: impl Into<String>, units: impl Into<String>, reduction: Reduction) -> Self {
        let name = name.into();
        Self {
            long_name: name.clone(),
            name,
            units: units.into(),
            reduction,
        }
    }

    pub fn from_descriptor(descriptor: &DatasetDescriptor) -> Self {
        Self {
            name: descriptor.variable.to_string(),
            long_name: descriptor.long_name.to_string(),
            units: descriptor.units.to_string(),
            reduction: descriptor.reduction,
        }
    }
}

/// Self-describing layout recorded in the root group attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreLayout {
    pub axes: GridAxes,
    pub crs: String,
    pub variables: Vec<VariableSpec>,
    /// Cell size in degrees used for the `area` variable, when present.
    pub area_resolution: Option<f64>,
}

impl StoreLayout {
    pub fn new(axes: GridAxes) -> Self {
        Self {
            axes,
            crs: "EPSG:4326".to_string(),
            variables: Vec::new(),
            area_resolution: None,
        }
    }

    /// Layout for a time-grid dataset on the given axes.
    pub fn for_dataset(descriptor: &DatasetDescriptor, axes: GridAxes) -> Self {
        let mut layout = Self::new(axes).with_variable(VariableSpec::from_descriptor(descriptor));
        if descriptor.with_area {
            let resolution = match descriptor.native_resolution {
                Resolution::Degrees(deg) => deg,
                Resolution::Meters(_) => axes.latitude.step.abs(),
            };
            layout = layout.with_area(resolution);
        }
        layout
    }

    pub fn with_variable(mut self, variable: VariableSpec) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn with_area(mut self, resolution: f64) -> Self {
        self.area_resolution = Some(resolution);
        self
    }

    pub fn variable(&self, name: &str) -> Option<&VariableSpec> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        self.axes.validate().map_err(GridStoreError::Config)?;
        if self.variables.is_empty() {
            return Err(GridStoreError::Config("store needs at least one variable".into()));
        }
        for v in &self.variables {
            if v.name.is_empty() || v.name.contains('/') || RESERVED.contains(&v.name.as_str()) {
                return Err(GridStoreError::Config(format!(
                    "invalid variable name '{}'",
                    v.name
                )));
            }
        }
        Ok(())
    }
}

/// What to read from a store.
///
/// Time is selected by calendar days (clamped to the axis), space by index
/// ranges. Unset parts select the whole axis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    pub time: Option<DayRange>,
    pub latitude: Option<Range<usize>>,
    pub longitude: Option<Range<usize>>,
    /// Return stored bytes for days whose coverage flag is unset instead of NaN.
    pub unmasked: bool,
}

impl Selector {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_time(mut self, range: DayRange) -> Self {
        self.time = Some(range);
        self
    }

    pub fn with_latitude(mut self, range: Range<usize>) -> Self {
        self.latitude = Some(range);
        self
    }

    pub fn with_longitude(mut self, range: Range<usize>) -> Self {
        self.longitude = Some(range);
        self
    }

    pub fn unmasked(mut self) -> Self {
        self.unmasked = true;
        self
    }
}

/// Handle to an on-disk grid store.
///
/// Writes go through a store-wide lock so that read-modify-write of shared
/// chunks (the `covered` array, multi-day chunks) never interleaves inside
/// one process. Other processes must not write the same store concurrently.
pub struct GridStore {
    root: PathBuf,
    layout: StoreLayout,
    arrays: HashMap<String, Array<FilesystemStore>>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for GridStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridStore")
            .field("root", &self.root)
            .field("layout", &self.layout)
            .finish()
    }
}

impl GridStore {
    /// Allocate a new store at `root`.
    ///
    /// Only metadata, coordinates and the static `area` variable are written;
    /// data variables stay unmaterialized.
    pub fn create(root: impl AsRef<Path>, layout: StoreLayout, config: &GridStoreConfig) -> Result<Self> {
        let root = root.as_ref();
        config.validate().map_err(GridStoreError::Config)?;
        layout.validate()?;

        if Self::exists(root) {
            return Err(GridStoreError::invalid_metadata(format!(
                "store already exists at {}",
                root.display()
            )));
        }

        std::fs::create_dir_all(root)?;
        let storage = Arc::new(FilesystemStore::new(root).map_err(GridStoreError::storage)?);

        let mut group = GroupBuilder::new()
            .build(storage.clone(), "/")
            .map_err(GridStoreError::zarr)?;
        group
            .attributes_mut()
            .insert(LAYOUT_ATTR.to_string(), serde_json::to_value(&layout)?);
        group
            .attributes_mut()
            .insert("crs".to_string(), serde_json::json!(layout.crs));
        group.store_metadata().map_err(GridStoreError::storage)?;

        let axes = layout.axes;
        let [nt, ny, nx] = axes.shape();
        let mut arrays = HashMap::new();

        for variable in &layout.variables {
            let chunk = vec![
                config.time_chunk.min(nt) as u64,
                config.spatial_chunk.min(ny) as u64,
                config.spatial_chunk.min(nx) as u64,
            ];
            let mut attrs = serde_json::Map::new();
            attrs.insert(
                "_ARRAY_DIMENSIONS".to_string(),
                serde_json::json!(["time", "latitude", "longitude"]),
            );
            attrs.insert("long_name".to_string(), serde_json::json!(variable.long_name));
            attrs.insert("units".to_string(), serde_json::json!(variable.units));
            attrs.insert(
                "reduction".to_string(),
                serde_json::json!(variable.reduction.as_str()),
            );

            let array = build_array(
                &storage,
                &variable.name,
                vec![nt as u64, ny as u64, nx as u64],
                chunk,
                DataType::Float32,
                FillValue::from(f32::NAN),
                attrs,
                compression_codec(config, 4)?,
            )?;
            arrays.insert(variable.name.clone(), array);
        }

        let covered = build_array(
            &storage,
            COVERED,
            vec![nt as u64],
            vec![config.covered_chunk.min(nt) as u64],
            DataType::UInt8,
            FillValue::from(0u8),
            dims_attr(&["time"]),
            None,
        )?;
        arrays.insert(COVERED.to_string(), covered);

        write_coordinates(&storage, &layout)?;

        if let Some(resolution) = layout.area_resolution {
            let mut attrs = dims_attr(&["latitude", "longitude"]);
            attrs.insert("units".to_string(), serde_json::json!("m2"));
            let area = build_array(
                &storage,
                AREA,
                vec![ny as u64, nx as u64],
                vec![
                    config.spatial_chunk.min(ny) as u64,
                    config.spatial_chunk.min(nx) as u64,
                ],
                DataType::Float64,
                FillValue::from(f64::NAN),
                attrs,
                compression_codec(config, 8)?,
            )?;
            let values = grid_box_areas(
                &axes.latitude.values(),
                &axes.longitude.values(),
                resolution,
            );
            store_elements(&area, &[0, 0], &[ny, nx], &values)?;
            arrays.insert(AREA.to_string(), area);
        }

        info!(
            root = %root.display(),
            shape = ?axes.shape(),
            variables = layout.variables.len(),
            area = layout.area_resolution.is_some(),
            "Created grid store"
        );

        Ok(Self {
            root: root.to_path_buf(),
            layout,
            arrays,
            write_lock: Mutex::new(()),
        })
    }

    /// Open an existing store.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !Self::exists(root) {
            return Err(GridStoreError::invalid_metadata(format!(
                "no grid store at {}",
                root.display()
            )));
        }
        let storage = Arc::new(FilesystemStore::new(root).map_err(GridStoreError::storage)?);

        let group = Group::open(storage.clone(), "/").map_err(GridStoreError::zarr)?;
        let layout_value = group
            .attributes()
            .get(LAYOUT_ATTR)
            .cloned()
            .ok_or_else(|| GridStoreError::invalid_metadata("missing layout attribute"))?;
        let layout: StoreLayout = serde_json::from_value(layout_value)?;

        let mut names: Vec<&str> = layout.variables.iter().map(|v| v.name.as_str()).collect();
        names.push(COVERED);
        if layout.area_resolution.is_some() {
            names.push(AREA);
        }

        let mut arrays = HashMap::new();
        for name in names {
            let array = Array::open(storage.clone(), &node_path(name))
                .map_err(|e| GridStoreError::invalid_metadata(format!("{name}: {e}")))?;
            arrays.insert(name.to_string(), array);
        }

        debug!(root = %root.display(), "Opened grid store");

        Ok(Self {
            root: root.to_path_buf(),
            layout,
            arrays,
            write_lock: Mutex::new(()),
        })
    }

    /// Open the store at `root`, creating it with `layout` when absent.
    ///
    /// An existing store must have the same axes and hold every requested variable.
    pub fn open_or_create(
        root: impl AsRef<Path>,
        layout: StoreLayout,
        config: &GridStoreConfig,
    ) -> Result<Self> {
        let root = root.as_ref();
        if !Self::exists(root) {
            return Self::create(root, layout, config);
        }

        let store = Self::open(root)?;
        if store.layout.axes != layout.axes {
            return Err(GridStoreError::invalid_metadata(format!(
                "existing store at {} has different axes",
                root.display()
            )));
        }
        if let Some(missing) = layout
            .variables
            .iter()
            .find(|v| store.layout.variable(&v.name).is_none())
        {
            return Err(GridStoreError::UnknownVariable(missing.name.clone()));
        }
        Ok(store)
    }

    /// Whether a store has been created at `root`.
    pub fn exists(root: &Path) -> bool {
        root.join("zarr.json").is_file()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn axes(&self) -> &GridAxes {
        &self.layout.axes
    }

    /// Write exactly `region` of `variable`.
    ///
    /// The region must span the full spatial extent, and `values` must have
    /// the region's shape.
    pub fn write_region(
        &self,
        variable: &str,
        region: &StoreRegion,
        values: &GridArray<f32>,
    ) -> Result<()> {
        let array = self.data_array(variable)?;
        region.check_writable(variable, self.axes())?;

        let expected = region.shape();
        if values.shape != expected || !values.is_consistent() {
            return Err(GridStoreError::region_mismatch(
                variable,
                format!("shape {expected:?}"),
                format!("shape {:?} with {} values", values.shape, values.data.len()),
            ));
        }

        let _guard = self.lock()?;
        store_elements(
            array,
            &[region.time.start, region.latitude.start, region.longitude.start],
            &expected,
            &values.data,
        )?;

        debug!(
            variable,
            time = ?region.time,
            values = values.data.len(),
            "Wrote store region"
        );
        Ok(())
    }

    /// Read `variable` for the selected days and index ranges.
    ///
    /// Days whose coverage flag is unset read as NaN unless the selector is
    /// unmasked.
    pub fn read(&self, variable: &str, selector: &Selector) -> Result<GridSlice> {
        let array = self.data_array(variable)?;
        let axes = self.axes();

        let time = match selector.time {
            Some(range) => axes.time.range_for(range).ok_or_else(|| {
                GridStoreError::outside_axis(
                    "time",
                    format!("{}..={}", range.start, range.end),
                    axes.time.len,
                )
            })?,
            None => 0..axes.time.len,
        };
        let latitude = check_index_range("latitude", selector.latitude.clone(), axes.latitude.len)?;
        let longitude =
            check_index_range("longitude", selector.longitude.clone(), axes.longitude.len)?;

        let shape = [time.len(), latitude.len(), longitude.len()];
        let mut data: Vec<f32> =
            retrieve_elements(array, &[time.start, latitude.start, longitude.start], &shape)?;

        let covered: Vec<bool> = self
            .read_flags(time.clone())?
            .into_iter()
            .map(|flag| flag != 0)
            .collect();

        if !selector.unmasked {
            let plane = shape[1] * shape[2];
            for (step, _) in covered.iter().enumerate().filter(|(_, c)| !**c) {
                data[step * plane..(step + 1) * plane].fill(f32::NAN);
            }
        }

        Ok(GridSlice {
            values: GridArray::new(shape.to_vec(), data),
            days: time.filter_map(|i| axes.time.value(i)).collect(),
            latitudes: latitude.map(|i| axes.latitude.value(i)).collect(),
            longitudes: longitude.map(|i| axes.longitude.value(i)).collect(),
            covered,
        })
    }

    /// Read the static grid-box area over the given index ranges.
    pub fn read_area(
        &self,
        latitude: Option<Range<usize>>,
        longitude: Option<Range<usize>>,
    ) -> Result<GridArray<f64>> {
        let array = self
            .arrays
            .get(AREA)
            .ok_or_else(|| GridStoreError::UnknownVariable(AREA.to_string()))?;
        let axes = self.axes();
        let latitude = check_index_range("latitude", latitude, axes.latitude.len)?;
        let longitude = check_index_range("longitude", longitude, axes.longitude.len)?;

        let shape = [latitude.len(), longitude.len()];
        let data = retrieve_elements(array, &[latitude.start, longitude.start], &shape)?;
        Ok(GridArray::new(shape.to_vec(), data))
    }

    /// Raw coverage flags for a range of time indices.
    pub(crate) fn read_flags(&self, time: Range<usize>) -> Result<Vec<u8>> {
        if time.is_empty() {
            return Ok(Vec::new());
        }
        retrieve_elements(self.covered_array()?, &[time.start], &[time.len()])
    }

    /// Set the coverage flag of one time index.
    pub(crate) fn set_flag(&self, index: usize) -> Result<()> {
        let len = self.axes().time.len;
        if index >= len {
            return Err(GridStoreError::outside_axis("time", index.to_string(), len));
        }
        let array = self.covered_array()?;
        let _guard = self.lock()?;
        store_elements(array, &[index], &[1], &[1u8])
    }

    fn data_array(&self, variable: &str) -> Result<&Array<FilesystemStore>> {
        if self.layout.variable(variable).is_none() {
            return Err(GridStoreError::UnknownVariable(variable.to_string()));
        }
        self.arrays
            .get(variable)
            .ok_or_else(|| GridStoreError::UnknownVariable(variable.to_string()))
    }

    fn covered_array(&self) -> Result<&Array<FilesystemStore>> {
        self.arrays
            .get(COVERED)
            .ok_or_else(|| GridStoreError::invalid_metadata("missing covered array"))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| GridStoreError::storage("store write lock poisoned"))
    }
}

pub(crate) fn node_path(name: &str) -> String {
    format!("/{name}")
}

pub(crate) fn dims_attr(dims: &[&str]) -> serde_json::Map<String, serde_json::Value> {
    let mut attrs = serde_json::Map::new();
    attrs.insert("_ARRAY_DIMENSIONS".to_string(), serde_json::json!(dims));
    attrs
}

fn check_index_range(axis: &'static str, range: Option<Range<usize>>, len: usize) -> Result<Range<usize>> {
    let range = range.unwrap_or(0..len);
    if range.is_empty() || range.end > len {
        return Err(GridStoreError::outside_axis(
            axis,
            format!("{}..{}", range.start, range.end),
            len,
        ));
    }
    Ok(range)
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn build_array(
    storage: &Arc<FilesystemStore>,
    name: &str,
    shape: Vec<u64>,
    chunk_shape: Vec<u64>,
    data_type: DataType,
    fill_value: FillValue,
    attrs: serde_json::Map<String, serde_json::Value>,
    codec: Option<Arc<dyn BytesToBytesCodecTraits>>,
) -> Result<Array<FilesystemStore>> {
    let chunk_grid: ChunkGrid = chunk_shape
        .try_into()
        .map_err(|e| GridStoreError::Config(format!("{:?}", e)))?;

    let mut binding = ArrayBuilder::new(shape, data_type, chunk_grid, fill_value);
    let mut builder = binding.attributes(attrs);
    if let Some(codec) = codec {
        builder = builder.bytes_to_bytes_codecs(vec![codec]);
    }

    let array = builder
        .build(storage.clone(), &node_path(name))
        .map_err(GridStoreError::zarr)?;
    array.store_metadata().map_err(GridStoreError::storage)?;
    Ok(array)
}

/// Blosc codec for an element size, or `None` when compression is disabled.
pub(crate) fn compression_codec(
    config: &GridStoreConfig,
    typesize: usize,
) -> Result<Option<Arc<dyn BytesToBytesCodecTraits>>> {
    let compressor = match config.compression {
        ZarrCompression::None => return Ok(None),
        ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
        ZarrCompression::BloscZstd => BloscCompressor::Zstd,
    };

    let level = BloscCompressionLevel::try_from(config.compression_level)
        .map_err(|_| GridStoreError::Config("invalid compression level".to_string()))?;

    let (shuffle, typesize) = if config.shuffle {
        (BloscShuffleMode::Shuffle, Some(typesize))
    } else {
        (BloscShuffleMode::NoShuffle, None)
    };

    let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
        .map_err(|e| GridStoreError::Config(e.to_string()))?;
    Ok(Some(Arc::new(codec)))
}

fn write_coordinates(storage: &Arc<FilesystemStore>, layout: &StoreLayout) -> Result<()> {
    let axes = layout.axes;

    let mut time_attrs = dims_attr(&["time"]);
    time_attrs.insert(
        "units".to_string(),
        serde_json::json!(format!("days since {}", axes.time.start)),
    );
    time_attrs.insert("calendar".to_string(), serde_json::json!("proleptic_gregorian"));
    let time = build_array(
        storage,
        "time",
        vec![axes.time.len as u64],
        vec![axes.time.len as u64],
        DataType::Int64,
        FillValue::from(0i64),
        time_attrs,
        None,
    )?;
    let offsets: Vec<i64> = (0..axes.time.len as i64).collect();
    store_elements(&time, &[0], &[axes.time.len], &offsets)?;

    for (name, axis) in [("latitude", axes.latitude), ("longitude", axes.longitude)] {
        let mut attrs = dims_attr(&[name]);
        let units = if name == "latitude" { "degrees_north" } else { "degrees_east" };
        attrs.insert("units".to_string(), serde_json::json!(units));
        let coord = build_array(
            storage,
            name,
            vec![axis.len as u64],
            vec![axis.len as u64],
            DataType::Float64,
            FillValue::from(f64::NAN),
            attrs,
            None,
        )?;
        store_elements(&coord, &[0], &[axis.len], &axis.values())?;
    }

    Ok(())
}

fn subset(start: &[usize], shape: &[usize]) -> Result<ArraySubset> {
    ArraySubset::new_with_start_shape(
        start.iter().map(|&v| v as u64).collect(),
        shape.iter().map(|&v| v as u64).collect(),
    )
    .map_err(GridStoreError::zarr)
}

pub(crate) fn store_elements<T: zarrs::array::Element>(
    array: &Array<FilesystemStore>,
    start: &[usize],
    shape: &[usize],
    values: &[T],
) -> Result<()> {
    array
        .store_array_subset_elements(&subset(start, shape)?, values)
        .map_err(GridStoreError::storage)
}

pub(crate) fn retrieve_elements<T: zarrs::array::ElementOwned>(
    array: &Array<FilesystemStore>,
    start: &[usize],
    shape: &[usize],
) -> Result<Vec<T>> {
    array
        .retrieve_array_subset_elements(&subset(start, shape)?)
        .map_err(GridStoreError::storage)
}
