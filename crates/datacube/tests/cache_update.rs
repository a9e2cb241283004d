//! Integration test: cache updates and time-grid reads against an on-disk store.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use datacube::{CacheUpdater, CubeError, DataSource, TimeGridSource, UpdateFailure};
use fetcher::{FetchError, RawSlice, RemoteFetcher};
use geo_common::{descriptor, DatasetDescriptor, DayRange, Extent, GridSpec};
use grid_store::{GridAxes, GridStore, GridStoreConfig, Selector, SpatialAxis, StoreLayout, TimeAxis};
use test_utils::{assert_slice_approx_eq, create_day_field};

const ROWS: usize = 3;
const COLS: usize = 4;

fn day(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, m, d).unwrap()
}

fn rainfall() -> &'static DatasetDescriptor {
    descriptor("copernicus/predicted_rainfall").unwrap()
}

/// Latitudes 1, 0, -1 and longitudes 0..3: the provider grid matches the
/// store grid exactly, so nearest resampling is the identity.
fn axes() -> GridAxes {
    GridAxes::new(
        TimeAxis::between(day(3, 1), day(3, 10)),
        SpatialAxis::new(1.0, -1.0, ROWS),
        SpatialAxis::new(0.0, 1.0, COLS),
    )
}

fn provider_grid() -> GridSpec {
    GridSpec::new(COLS, ROWS, 1.0, -1.0, 0.0, 1.0)
}

fn store_config() -> GridStoreConfig {
    GridStoreConfig {
        spatial_chunk: 2,
        covered_chunk: 4,
        ..Default::default()
    }
}

/// Delivers two identical steps per day and records every request.
#[derive(Default)]
struct CountingFetcher {
    calls: Mutex<Vec<NaiveDate>>,
    unavailable: HashSet<NaiveDate>,
    malformed: HashSet<NaiveDate>,
}

impl CountingFetcher {
    fn unavailable_on(days: &[NaiveDate]) -> Self {
        Self {
            unavailable: days.iter().copied().collect(),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<NaiveDate> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort();
        calls
    }
}

#[async_trait]
impl RemoteFetcher for CountingFetcher {
    async fn fetch_day(&self, dataset: &DatasetDescriptor, d: NaiveDate) -> fetcher::Result<RawSlice> {
        self.calls.lock().unwrap().push(d);
        if self.unavailable.contains(&d) {
            return Err(FetchError::Unavailable { day: d });
        }
        let mut field = create_day_field(offset(d), COLS, ROWS);
        if self.malformed.contains(&d) {
            field.pop();
        }
        Ok(RawSlice {
            day: d,
            variable: dataset.variable.to_string(),
            units: dataset.units.to_string(),
            grid: provider_grid(),
            steps: vec![field.clone(), field],
        })
    }
}

fn offset(d: NaiveDate) -> usize {
    (d - day(3, 1)).num_days() as usize + 1
}

/// Daily value the store should hold: the sum of the two identical steps.
fn expected_day(d: NaiveDate) -> Vec<f32> {
    create_day_field(offset(d), COLS, ROWS)
        .into_iter()
        .map(|v| v * 2.0)
        .collect()
}

fn open_store(root: &std::path::Path) -> Arc<GridStore> {
    let layout = StoreLayout::for_dataset(rainfall(), axes());
    Arc::new(GridStore::open_or_create(root, layout, &store_config()).unwrap())
}

fn read_day(store: &GridStore, d: NaiveDate) -> Vec<f32> {
    store
        .read("tp", &Selector::all().with_time(DayRange::single(d)))
        .unwrap()
        .values
        .data
}

#[tokio::test]
async fn test_fetches_only_missing_days() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir.path().join("rain.zarr"));
    let fetcher = Arc::new(CountingFetcher::default());
    let updater = CacheUpdater::new(rainfall(), store.clone(), fetcher.clone());

    let report = updater
        .ensure_covered(DayRange::new(day(3, 1), day(3, 3)))
        .await
        .unwrap();
    assert_eq!(report.requested, vec![day(3, 1), day(3, 2), day(3, 3)]);
    assert_eq!(report.committed, vec![day(3, 1), day(3, 2), day(3, 3)]);
    assert!(report.is_complete());
    assert_eq!(fetcher.calls().len(), 3);

    for d in [day(3, 1), day(3, 2), day(3, 3)] {
        assert!(updater.tracker().is_covered(d).unwrap());
        assert_slice_approx_eq!(read_day(&store, d), expected_day(d), 1e-6);
    }

    // Widening the range fetches only the new days.
    let report = updater
        .ensure_covered(DayRange::new(day(3, 2), day(3, 5)))
        .await
        .unwrap();
    assert_eq!(report.committed, vec![day(3, 4), day(3, 5)]);
    assert_eq!(fetcher.calls().len(), 5);
}

#[tokio::test]
async fn test_covered_range_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir.path().join("rain.zarr"));
    let fetcher = Arc::new(CountingFetcher::default());
    let updater = CacheUpdater::new(rainfall(), store.clone(), fetcher.clone());
    let range = DayRange::new(day(3, 1), day(3, 3));

    updater.ensure_covered(range).await.unwrap();
    let before: Vec<Vec<f32>> = range.days().map(|d| read_day(&store, d)).collect();

    let report = updater.ensure_covered(range).await.unwrap();
    assert!(report.was_noop());
    assert!(report.committed.is_empty());
    assert_eq!(fetcher.calls().len(), 3);

    let after: Vec<Vec<f32>> = range.days().map(|d| read_day(&store, d)).collect();
    for (a, b) in before.iter().zip(&after) {
        assert_slice_approx_eq!(a, b, 0.0);
    }
}

#[tokio::test]
async fn test_unavailable_day_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir.path().join("rain.zarr"));
    let fetcher = Arc::new(CountingFetcher::unavailable_on(&[day(3, 2)]));
    let updater = CacheUpdater::new(rainfall(), store.clone(), fetcher.clone());

    let report = updater
        .ensure_covered(DayRange::new(day(3, 1), day(3, 3)))
        .await
        .unwrap();
    assert_eq!(report.committed, vec![day(3, 1), day(3, 3)]);
    assert_eq!(report.failures, vec![UpdateFailure::FetchUnavailable { day: day(3, 2) }]);

    assert!(!updater.tracker().is_covered(day(3, 2)).unwrap());
    assert!(read_day(&store, day(3, 2)).iter().all(|v| v.is_nan()));
    assert_slice_approx_eq!(read_day(&store, day(3, 3)), expected_day(day(3, 3)), 1e-6);

    // The failed day is the only one requested again.
    let report = updater
        .ensure_covered(DayRange::new(day(3, 1), day(3, 3)))
        .await
        .unwrap();
    assert_eq!(report.requested, vec![day(3, 2)]);
    assert_eq!(fetcher.calls().len(), 4);
}

#[tokio::test]
async fn test_malformed_slice_is_transform_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir.path().join("rain.zarr"));
    let fetcher = Arc::new(CountingFetcher {
        malformed: [day(3, 4)].into_iter().collect(),
        ..Default::default()
    });
    let updater = CacheUpdater::new(rainfall(), store, fetcher);

    let report = updater
        .ensure_covered(DayRange::new(day(3, 3), day(3, 5)))
        .await
        .unwrap();
    assert_eq!(report.committed, vec![day(3, 3), day(3, 5)]);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        report.failures[0],
        UpdateFailure::TransformError { day: d, .. } if d == day(3, 4)
    ));
}

#[tokio::test]
async fn test_concurrency_does_not_change_content() {
    let range = DayRange::new(day(3, 1), day(3, 8));
    let mut results = Vec::new();

    for n in [1, 8] {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir.path().join("rain.zarr"));
        let updater = CacheUpdater::new(rainfall(), store.clone(), Arc::new(CountingFetcher::default()))
            .with_max_concurrent(n);
        let report = updater.ensure_covered(range).await.unwrap();
        assert_eq!(report.committed.len(), 8);

        let slice = store.read("tp", &Selector::all().with_time(range)).unwrap();
        results.push(slice.values.data);
    }

    let bits: Vec<Vec<u32>> = results
        .iter()
        .map(|data| data.iter().map(|v| v.to_bits()).collect())
        .collect();
    assert_eq!(bits[0], bits[1]);
}

/// Store contents and coverage flags over `range`, as raw bits.
fn snapshot(store: &GridStore, updater: &CacheUpdater, range: DayRange) -> (Vec<u32>, Vec<bool>) {
    let slice = store.read("tp", &Selector::all().with_time(range)).unwrap();
    let bits = slice.values.data.iter().map(|v| v.to_bits()).collect();
    let flags = range
        .days()
        .map(|d| updater.tracker().is_covered(d).unwrap())
        .collect();
    (bits, flags)
}

#[tokio::test]
async fn test_split_range_matches_single_update() {
    let whole = DayRange::new(day(3, 1), day(3, 8));
    // Splits inside the first covered chunk (4 days) and in either order.
    let splits = [
        vec![DayRange::new(day(3, 1), day(3, 3)), DayRange::new(day(3, 4), day(3, 8))],
        vec![DayRange::new(day(3, 6), day(3, 8)), DayRange::new(day(3, 1), day(3, 5))],
    ];

    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir.path().join("whole.zarr"));
    let updater = CacheUpdater::new(rainfall(), store.clone(), Arc::new(CountingFetcher::default()));
    updater.ensure_covered(whole).await.unwrap();
    let expected = snapshot(&store, &updater, whole);
    assert!(expected.1.iter().all(|covered| *covered));

    for (i, parts) in splits.iter().enumerate() {
        let store = open_store(&dir.path().join(format!("split-{i}.zarr")));
        let fetcher = Arc::new(CountingFetcher::default());
        let updater = CacheUpdater::new(rainfall(), store.clone(), fetcher.clone());
        for part in parts {
            updater.ensure_covered(*part).await.unwrap();
        }

        assert_eq!(fetcher.calls().len(), 8, "split {i} fetched a day twice");
        assert_eq!(snapshot(&store, &updater, whole), expected, "split {i}");
    }
}

#[tokio::test]
async fn test_range_outside_axis_requests_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir.path().join("rain.zarr"));
    let fetcher = Arc::new(CountingFetcher::default());
    let updater = CacheUpdater::new(rainfall(), store, fetcher.clone());

    let report = updater
        .ensure_covered(DayRange::new(day(5, 1), day(5, 3)))
        .await
        .unwrap();
    assert!(report.was_noop());

    let report = updater
        .ensure_covered(DayRange::new(day(3, 3), day(3, 1)))
        .await
        .unwrap();
    assert!(report.was_noop());
    assert!(fetcher.calls().is_empty());
}

fn time_grid(root: &std::path::Path, fetcher: Arc<CountingFetcher>) -> TimeGridSource {
    TimeGridSource::new(rainfall(), root.join("rain.zarr"), fetcher)
        .with_axes(axes())
        .with_store_config(store_config())
}

#[tokio::test]
async fn test_get_returns_requested_cells() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(CountingFetcher::default());
    let source = time_grid(dir.path(), fetcher.clone());

    // Latitudes 1 and 0, longitudes 1 and 2.
    let extent = Extent::geographic(0.5, -0.5, 2.5, 1.5);
    let array = source.get(&extent, day(3, 2), Some(day(3, 3))).await.unwrap();

    assert_eq!(array.dims, vec!["time", "latitude", "longitude"]);
    assert_eq!(array.shape(), vec![2, 2, 2]);
    assert_eq!(array.days(), Some(&[day(3, 2), day(3, 3)][..]));
    assert_eq!(array.provenance.dataset, "copernicus/predicted_rainfall");
    assert!(array.provenance.missing_days.is_empty());

    let full = expected_day(day(3, 3));
    assert_eq!(array.get(&[1, 0, 0]), Some(full[1]));
    assert_eq!(array.get(&[1, 1, 1]), Some(full[COLS + 2]));
    assert_eq!(fetcher.calls(), vec![day(3, 2), day(3, 3)]);

    // A single-day request on a cached day fetches nothing.
    let array = source.get(&extent, day(3, 2), None).await.unwrap();
    assert_eq!(array.shape(), vec![1, 2, 2]);
    assert_eq!(fetcher.calls().len(), 2);
}

#[tokio::test]
async fn test_get_masks_unavailable_days() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(CountingFetcher::unavailable_on(&[day(3, 2)]));
    let source = time_grid(dir.path(), fetcher);

    let extent = Extent::geographic(0.0, -1.0, 3.0, 1.0);
    let (array, report) = source
        .get_with_report(&extent, day(3, 1), Some(day(3, 3)))
        .await
        .unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(array.provenance.missing_days, vec![day(3, 2)]);

    let plane = ROWS * COLS;
    assert!(array.values[plane..2 * plane].iter().all(|v| v.is_nan()));
    assert_eq!(array.values[..plane].iter().filter(|v| v.is_nan()).count(), 0);
}

#[tokio::test]
async fn test_strict_get_fails_on_missing_days() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(CountingFetcher::unavailable_on(&[day(3, 2)]));
    let source = time_grid(dir.path(), fetcher).with_strict(true);

    let extent = Extent::geographic(0.0, -1.0, 3.0, 1.0);
    let err = source
        .get(&extent, day(3, 1), Some(day(3, 3)))
        .await
        .unwrap_err();
    match err {
        CubeError::IncompleteCoverage { missing } => assert_eq!(missing, vec![day(3, 2)]),
        other => panic!("expected IncompleteCoverage, got {other}"),
    }
}

#[tokio::test]
async fn test_get_outside_grid_fails() {
    let dir = tempfile::tempdir().unwrap();
    let source = time_grid(dir.path(), Arc::new(CountingFetcher::default()));

    let far = Extent::geographic(50.0, 40.0, 60.0, 45.0);
    assert!(matches!(
        source.get(&far, day(3, 1), None).await.unwrap_err(),
        CubeError::Store(_)
    ));

    let late = Extent::geographic(0.0, 0.0, 1.0, 1.0);
    assert!(matches!(
        source.get(&late, day(6, 1), None).await.unwrap_err(),
        CubeError::Store(_)
    ));
}
