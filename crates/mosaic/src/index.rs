//! Catalog of a tiled archive.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use geo_common::{DayRange, Extent};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::Result;
use crate::filter::{matches_all, PathFilter};
use crate::naming::{FileFields, NamingRule};
use crate::tile::{TileFootprint, TileId};

/// One cataloged file.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub path: PathBuf,
    pub tile: TileId,
    pub fields: FileFields,
}

impl IndexEntry {
    /// Calendar day of acquisition; `None` for time-invariant layers.
    pub fn day(&self) -> Option<NaiveDate> {
        self.fields.datetime_1.map(|t| t.date())
    }
}

/// Read-only catalog built once from a directory scan.
///
/// Entries are kept in acquisition order; every entry's tile has a known
/// footprint.
#[derive(Debug, Clone)]
pub struct MosaicIndex {
    root: PathBuf,
    entries: Vec<IndexEntry>,
    footprints: BTreeMap<TileId, TileFootprint>,
}

impl MosaicIndex {
    /// Scan `root`, keeping files whose relative path passes every filter
    /// and whose name the naming rule can parse.
    ///
    /// Files failing either test, or naming a tile whose footprint cannot
    /// be derived, are left out of the index.
    pub fn build(root: &Path, naming: &dyn NamingRule, filters: &[PathFilter]) -> Result<Self> {
        let mut entries = Vec::new();
        let mut footprints = BTreeMap::new();
        let mut skipped = 0usize;

        for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            if !matches_all(filters, relative) {
                skipped += 1;
                continue;
            }

            let Some(fields) = entry.file_name().to_str().and_then(|name| naming.parse(name)) else {
                skipped += 1;
                continue;
            };

            let tile = TileId::new(&fields.grid_name, &fields.tile_name);
            if !footprints.contains_key(&tile) {
                match TileFootprint::from_equi7(&tile.grid_name, &tile.tile_name) {
                    Ok(footprint) => {
                        footprints.insert(tile.clone(), footprint);
                    }
                    Err(e) => {
                        debug!(path = %path.display(), error = %e, "Skipping file with unknown tile geometry");
                        skipped += 1;
                        continue;
                    }
                }
            }

            entries.push(IndexEntry {
                path: path.to_path_buf(),
                tile,
                fields,
            });
        }

        entries.sort_by(|a, b| {
            (a.fields.datetime_1, &a.tile, &a.path).cmp(&(b.fields.datetime_1, &b.tile, &b.path))
        });

        info!(
            root = %root.display(),
            files = entries.len(),
            tiles = footprints.len(),
            skipped = skipped,
            "Built mosaic index"
        );

        Ok(Self {
            root: root.to_path_buf(),
            entries,
            footprints,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn footprint(&self, tile: &TileId) -> Option<&TileFootprint> {
        self.footprints.get(tile)
    }

    pub fn tiles(&self) -> impl Iterator<Item = &TileId> {
        self.footprints.keys()
    }

    /// Tiles whose footprint intersects `extent`; touching edges count.
    ///
    /// The query is reprojected into each tile's reference system as a
    /// densified envelope, which can only grow the query, so no
    /// intersecting tile is missed. Where that reprojection is undefined
    /// the footprint is moved into the query's system instead.
    pub fn select_by_bbox(&self, extent: &Extent) -> BTreeSet<TileId> {
        self.footprints
            .values()
            .filter(|fp| footprint_intersects(fp, extent))
            .map(|fp| fp.id.clone())
            .collect()
    }

    /// Entries acquired within `[start, end]` by calendar day; a missing
    /// `end` selects the single day `start`. Entries without an acquisition
    /// time match every range.
    pub fn select_by_time(&self, start: NaiveDate, end: Option<NaiveDate>) -> Vec<&IndexEntry> {
        let range = DayRange::from_query(start, end);
        self.entries
            .iter()
            .filter(|e| e.day().map_or(true, |day| range.contains(day)))
            .collect()
    }

    /// Entries matching both the time range and the extent.
    pub fn select(
        &self,
        extent: &Extent,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Vec<&IndexEntry> {
        let tiles = self.select_by_bbox(extent);
        self.select_by_time(start, end)
            .into_iter()
            .filter(|e| tiles.contains(&e.tile))
            .collect()
    }
}

fn footprint_intersects(footprint: &TileFootprint, extent: &Extent) -> bool {
    let tile_extent = footprint.extent();

    match extent.transform_to(tile_extent.crs) {
        Ok(query) => query.intersects(&tile_extent),
        Err(_) => match tile_extent.transform_to(extent.crs) {
            Ok(tile) => tile.intersects(extent),
            Err(e) => {
                debug!(tile = %footprint.id, error = %e, "Tile not comparable with query extent");
                false
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{dem_filters, flood_filters};
    use crate::naming::{StaticYeodaNaming, YeodaNaming};
    use geo_common::CrsCode;
    use projection::Equi7Subgrid;
    use test_utils::{dem_tile_path, flood_tile_path};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    fn eu(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Extent {
        Extent::new(min_x, min_y, max_x, max_y, CrsCode::Equi7(Equi7Subgrid::Eu))
    }

    fn flood_index() -> (tempfile::TempDir, MosaicIndex) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for (d, tile) in [
            (day(2022, 3, 1), "E054N012T3"),
            (day(2022, 3, 1), "E057N012T3"),
            (day(2022, 3, 2), "E054N012T3"),
            (day(2022, 3, 5), "E054N015T3"),
        ] {
            touch(&flood_tile_path(root, d, tile, "EU020M", "V0M2R3"));
        }
        // Filtered out: wrong version, unparseable name.
        touch(&flood_tile_path(root, day(2022, 3, 1), "E054N012T3", "EU020M", "V0M2R2"));
        touch(&root.join("V0M2R3/EQUI7_EU020M/E054N012T3/notes_E054N012T3.txt"));

        let index = MosaicIndex::build(root, &YeodaNaming, &flood_filters().unwrap()).unwrap();
        (dir, index)
    }

    #[test]
    fn test_build_applies_filters_and_naming() {
        let (_dir, index) = flood_index();
        assert_eq!(index.len(), 4);
        assert_eq!(index.tiles().count(), 3);
        assert!(index.entries().windows(2).all(|w| w[0].fields.datetime_1 <= w[1].fields.datetime_1));
    }

    #[test]
    fn test_select_by_time() {
        let (_dir, index) = flood_index();
        assert_eq!(index.select_by_time(day(2022, 3, 1), None).len(), 2);
        assert_eq!(index.select_by_time(day(2022, 3, 1), Some(day(2022, 3, 2))).len(), 3);
        assert_eq!(index.select_by_time(day(2022, 3, 3), Some(day(2022, 3, 4))).len(), 0);
        assert!(index.select_by_time(day(2022, 3, 5), Some(day(2022, 3, 1))).is_empty());
    }

    #[test]
    fn test_select_by_bbox_touching_edge() {
        let (_dir, index) = flood_index();
        // Right edge of E054N012T3 is x = 5 700 000, which is also the left edge of E057N012T3.
        let touching = eu(5_650_000.0, 1_250_000.0, 5_700_000.0, 1_260_000.0);
        let tiles = index.select_by_bbox(&touching);
        assert!(tiles.contains(&TileId::new("EU020M", "E054N012T3")));
        assert!(tiles.contains(&TileId::new("EU020M", "E057N012T3")));
        assert_eq!(tiles.len(), 2);
    }

    #[test]
    fn test_select_by_bbox_outside() {
        let (_dir, index) = flood_index();
        let outside = eu(100_000.0, 100_000.0, 200_000.0, 200_000.0);
        assert!(index.select_by_bbox(&outside).is_empty());
    }

    #[test]
    fn test_select_by_bbox_geographic_query() {
        let (_dir, index) = flood_index();
        let fp = index.footprint(&TileId::new("EU020M", "E054N012T3")).unwrap();
        let (cx, cy) = fp.transform.pixel_center(7500, 7500);
        let (lon, lat) = CrsCode::Equi7(Equi7Subgrid::Eu)
            .projection()
            .to_geographic(cx, cy)
            .unwrap();

        let query = Extent::geographic(lon - 0.01, lat - 0.01, lon + 0.01, lat + 0.01);
        let tiles = index.select_by_bbox(&query);
        assert_eq!(tiles.into_iter().collect::<Vec<_>>(), vec![TileId::new("EU020M", "E054N012T3")]);
    }

    #[test]
    fn test_select_combines_time_and_space() {
        let (_dir, index) = flood_index();
        let west = eu(5_500_000.0, 1_300_000.0, 5_600_000.0, 1_400_000.0);
        let rows = index.select(&west, day(2022, 3, 1), Some(day(2022, 3, 5)));
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|e| e.tile.tile_name == "E054N012T3"));
    }

    #[test]
    fn test_static_layers_match_every_day() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&dem_tile_path(root, "E054N012T3", "EU020M"));
        touch(&dem_tile_path(root, "E057N012T3", "EU020M"));
        // Another product in the same tree
        touch(&flood_tile_path(root, day(2022, 3, 1), "E054N012T3", "EU020M", "V0M2R3"));

        let index = MosaicIndex::build(root, &StaticYeodaNaming, &dem_filters().unwrap()).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.entries().iter().all(|e| e.day().is_none()));
        assert_eq!(index.select_by_time(day(1999, 1, 1), None).len(), 2);
        assert_eq!(index.select_by_time(day(2022, 3, 1), Some(day(2022, 3, 9))).len(), 2);

        // The dated naming rule ignores undated files entirely
        let dated = MosaicIndex::build(root, &YeodaNaming, &dem_filters().unwrap()).unwrap();
        assert!(dated.is_empty());
    }
}
