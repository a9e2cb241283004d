//! Path filters applied while cataloging a mosaic tree.

use std::path::Path;

use regex::Regex;

use crate::error::Result;

/// A pattern every retained file's path relative to the index root must match.
#[derive(Debug, Clone)]
pub struct PathFilter {
    pattern: Regex,
}

impl PathFilter {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn matches(&self, relative_path: &str) -> bool {
        self.pattern.is_match(relative_path)
    }
}

/// AND-combination of filters; an empty list keeps every file.
pub fn matches_all(filters: &[PathFilter], relative_path: &Path) -> bool {
    let path = relative_path.to_string_lossy();
    filters.iter().all(|f| f.matches(&path))
}

/// Filters for the GFM ensemble flood archive: product version V0M2R3,
/// 20 m Equi7 grids and 300 km tiles.
pub fn flood_filters() -> Result<Vec<PathFilter>> {
    Ok(vec![
        PathFilter::new("V0M2R3")?,
        PathFilter::new("EQUI7_(AS|AF|EU|NA|SA|OC)020M")?,
        PathFilter::new(r"E\d{3}N\d{3}T3")?,
    ])
}

/// Filters for the Copernicus DEM archive on the Equi7 grid: release
/// V01R01, 20 m grids and 300 km tiles.
pub fn dem_filters() -> Result<Vec<PathFilter>> {
    Ok(vec![
        PathFilter::new("V01R01")?,
        PathFilter::new("EQUI7_(AS|AF|EU|NA|SA|OC)020M")?,
        PathFilter::new(r"E\d{3}N\d{3}T3")?,
    ])
}
