//! In-memory arrays exchanged with a grid store.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Dense row-major array with an explicit shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridArray<T> {
    pub shape: Vec<usize>,
    pub data: Vec<T>,
}

impl<T> GridArray<T> {
    pub fn new(shape: Vec<usize>, data: Vec<T>) -> Self {
        Self { shape, data }
    }

    /// Number of elements the shape describes.
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    /// Whether `data` holds exactly as many elements as `shape` describes.
    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.num_elements()
    }

    pub fn get(&self, index: &[usize]) -> Option<&T> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut flat = 0;
        for (&i, &n) in index.iter().zip(&self.shape) {
            if i >= n {
                return None;
            }
            flat = flat * n + i;
        }
        self.data.get(flat)
    }
}

impl GridArray<f32> {
    /// Single `(1, latitude, longitude)` time step.
    pub fn time_step(rows: usize, cols: usize, data: Vec<f32>) -> Self {
        Self::new(vec![1, rows, cols], data)
    }

    /// Count of cells carrying data (not NaN).
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }
}

/// Result of a store read: values plus the coordinates they sit on.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSlice {
    /// Values in `(time, latitude, longitude)` order.
    pub values: GridArray<f32>,
    pub days: Vec<NaiveDate>,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    /// Coverage flag of each returned day.
    pub covered: Vec<bool>,
}

impl GridSlice {
    /// Days in the slice whose coverage flag is unset.
    pub fn missing_days(&self) -> Vec<NaiveDate> {
        self.days
            .iter()
            .zip(&self.covered)
            .filter(|(_, covered)| !**covered)
            .map(|(day, _)| *day)
            .collect()
    }

    /// Values of one time step, row-major `(latitude, longitude)`.
    pub fn step(&self, index: usize) -> Option<&[f32]> {
        let plane = self.latitudes.len() * self.longitudes.len();
        self.values.data.get(index * plane..(index + 1) * plane)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_row_major() {
        let array = GridArray::new(vec![2, 2, 3], (0..12).collect::<Vec<i32>>());
        assert_eq!(array.get(&[0, 0, 0]), Some(&0));
        assert_eq!(array.get(&[0, 1, 2]), Some(&5));
        assert_eq!(array.get(&[1, 0, 1]), Some(&7));
        assert_eq!(array.get(&[2, 0, 0]), None);
        assert_eq!(array.get(&[0, 0]), None);
    }

    #[test]
    fn test_consistency() {
        assert!(GridArray::time_step(2, 2, vec![0.0; 4]).is_consistent());
        assert!(!GridArray::time_step(2, 2, vec![0.0; 3]).is_consistent());
    }
}
