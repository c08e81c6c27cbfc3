//! Query results

use std::fmt;

/// Final sums, match counter and (when collected) surviving row ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    sums: Vec<u64>,
    amount: u64,
    rows: Option<Vec<u64>>,
}

impl QueryResult {
    /// Assemble a result
    pub fn new(sums: Vec<u64>, amount: u64, rows: Option<Vec<u64>>) -> Self {
        Self { sums, amount, rows }
    }

    /// Raw sums, in projection order
    pub fn sums(&self) -> &[u64] {
        &self.sums
    }

    /// Number of surviving row combinations
    pub fn amount(&self) -> u64 {
        self.amount
    }

    /// True when no row survived; every column is then NULL
    pub fn is_null(&self) -> bool {
        self.amount == 0
    }

    /// Per-column values, `None` for NULL
    pub fn values(&self) -> Vec<Option<u64>> {
        self.sums
            .iter()
            .map(|&sum| (!self.is_null()).then_some(sum))
            .collect()
    }

    /// Collected row ids, if the plan asked for them
    pub fn rows(&self) -> Option<&[u64]> {
        self.rows.as_deref()
    }
}

/// Space-separated sums, or `NULL` per column when no row survived
impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.values().into_iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match value {
                Some(sum) => write!(f, "{sum}")?,
                None => f.write_str("NULL")?,
            }
        }
        Ok(())
    }
}
