//! Lookup of sample files that are too large to check in.

use std::path::PathBuf;

fn workspace_root() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir)
        .parent() // crates/
        .and_then(|p| p.parent())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from(manifest_dir))
}

/// Searches `TEST_DATA_DIR`, then the fetcher and mosaic `testdata/`
/// directories, then the workspace `testdata/`.
pub fn find_test_file(name: &str) -> Option<PathBuf> {
    let root = workspace_root();
    std::env::var("TEST_DATA_DIR")
        .ok()
        .map(|dir| PathBuf::from(dir).join(name))
        .into_iter()
        .chain([
            root.join("crates/fetcher/testdata").join(name),
            root.join("crates/mosaic/testdata").join(name),
            root.join("testdata").join(name),
        ])
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_root_has_manifest() {
        assert!(workspace_root().join("Cargo.toml").exists());
    }

    #[test]
    fn test_missing_file_is_none() {
        assert!(find_test_file("tp_era5land_19700101.grib").is_none());
    }
}
