//! Per-column statistics

use super::Column;
use roaring::RoaringTreemap;

/// Statistics computed once per column when a catalog is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColumnStats {
    /// Number of tuples
    pub tuples: u64,
    /// Smallest value (0 for an empty column)
    pub min: u64,
    /// Largest value (0 for an empty column)
    pub max: u64,
    /// Exact number of distinct values
    pub distinct: u64,
}

impl ColumnStats {
    /// Scan `column` once
    pub fn compute(column: &Column) -> Self {
        let values = column.values();
        if values.is_empty() {
            return Self::default();
        }
        let mut min = u64::MAX;
        let mut max = u64::MIN;
        let mut seen = RoaringTreemap::new();
        for &value in values {
            min = min.min(value);
            max = max.max(value);
            seen.insert(value);
        }
        Self {
            tuples: values.len() as u64,
            min,
            max,
            distinct: seen.len(),
        }
    }

    /// Width of `[min, max]`, or 0 for an empty column
    pub fn span(&self) -> u64 {
        if self.tuples == 0 {
            0
        } else {
            (self.max - self.min).saturating_add(1)
        }
    }
}
