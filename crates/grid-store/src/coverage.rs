//! Per-day coverage flags.
//!
//! The tracker is a view onto the `covered` array inside a [`GridStore`];
//! it owns no storage of its own. A set flag means the day's region holds
//! values written by a completed update. Flags are only ever set after the
//! region write returned, so a reader that sees a flag also sees the data.

use std::sync::Arc;

use chrono::NaiveDate;
use geo_common::DayRange;
use tracing::debug;

use crate::error::{GridStoreError, Result};
use crate::store::GridStore;

#[derive(Debug, Clone)]
pub struct CoverageTracker {
    store: Arc<GridStore>,
}

impl CoverageTracker {
    pub fn new(store: Arc<GridStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<GridStore> {
        &self.store
    }

    /// Days of `range` on the time axis whose flag is unset, ascending.
    ///
    /// A reversed range, or one that misses the axis, yields nothing.
    pub fn missing(&self, range: DayRange) -> Result<Vec<NaiveDate>> {
        let axis = self.store.axes().time;
        let Some(indices) = axis.range_for(range) else {
            return Ok(Vec::new());
        };

        let flags = self.store.read_flags(indices.clone())?;
        Ok(indices
            .zip(flags)
            .filter(|(_, flag)| *flag == 0)
            .filter_map(|(i, _)| axis.value(i))
            .collect())
    }

    /// Set the flag for `day`. Marking an already covered day is a no-op.
    pub fn mark_covered(&self, day: NaiveDate) -> Result<()> {
        let index = self.index(day)?;
        self.store.set_flag(index)?;
        debug!(%day, "Marked day covered");
        Ok(())
    }

    pub fn is_covered(&self, day: NaiveDate) -> Result<bool> {
        let index = self.index(day)?;
        Ok(self.store.read_flags(index..index + 1)?.first() == Some(&1))
    }

    /// Flags of every day of `range` that lies on the axis.
    pub fn covered_mask(&self, range: DayRange) -> Result<Vec<(NaiveDate, bool)>> {
        let axis = self.store.axes().time;
        let Some(indices) = axis.range_for(range) else {
            return Ok(Vec::new());
        };
        let flags = self.store.read_flags(indices.clone())?;
        Ok(indices
            .zip(flags)
            .filter_map(|(i, flag)| axis.value(i).map(|day| (day, flag != 0)))
            .collect())
    }

    fn index(&self, day: NaiveDate) -> Result<usize> {
        let axis = self.store.axes().time;
        axis.index_of(day)
            .ok_or_else(|| GridStoreError::outside_axis("time", day.to_string(), axis.len))
    }
}
