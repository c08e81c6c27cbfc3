//! In-memory columnar storage
//!
//! A [`Catalog`] owns the relations of one workload. Each [`Relation`] is a
//! set of equally long `u64` columns addressed by position. Column memory never
//! moves once the catalog is built, which is what lets generated code embed
//! column base addresses.

mod stats;

pub use stats::ColumnStats;

use crate::error::{Error, Result};
use crate::index::BitsetTable;
use crate::jit::FnBuilder;
use cranelift::prelude::*;
use rayon::prelude::*;
use tracing::{debug, info};

/// Global relation identifier (position in the catalog)
pub type RelationId = usize;

/// Column identifier (position in its relation)
pub type ColumnId = usize;

/// One column of `u64` values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    values: Vec<u64>,
}

impl Column {
    /// Wrap a vector of values
    pub fn new(values: Vec<u64>) -> Self {
        Self { values }
    }

    /// Value at `row`
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of range.
    #[inline]
    pub fn load(&self, row: u64) -> u64 {
        self.values[row as usize]
    }

    /// All values
    pub fn values(&self) -> &[u64] {
        &self.values
    }

    /// Number of tuples
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the column holds no tuple
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Base address of the values
    pub fn as_ptr(&self) -> *const u64 {
        self.values.as_ptr()
    }

    /// Emit a load of the value at the symbolic `row`
    ///
    /// No bounds check is emitted; row ids come from the scan, which never
    /// exceeds the relation size.
    pub fn emit_load(&self, fb: &mut FnBuilder<'_>, row: Value) -> Value {
        let base = fb.embed_ptr(self.as_ptr());
        let offset = fb.builder().ins().ishl_imm(row, 3);
        let addr = fb.builder().ins().iadd(base, offset);
        fb.load(types::I64, addr, 0)
    }
}

impl From<Vec<u64>> for Column {
    fn from(values: Vec<u64>) -> Self {
        Self::new(values)
    }
}

/// A columnar relation
#[derive(Debug, Clone)]
pub struct Relation {
    id: RelationId,
    columns: Vec<Column>,
    tuples: u64,
}

impl Relation {
    /// Build a relation from its columns
    ///
    /// Fails when the columns differ in length.
    pub fn new(id: RelationId, columns: Vec<Vec<u64>>) -> Result<Self> {
        let tuples = columns.first().map_or(0, Vec::len);
        if let Some((pos, column)) = columns
            .iter()
            .enumerate()
            .find(|(_, column)| column.len() != tuples)
        {
            return Err(Error::storage(format!(
                "relation {id}: column {pos} has {} tuples, expected {tuples}",
                column.len()
            )));
        }
        Ok(Self {
            id,
            columns: columns.into_iter().map(Column::new).collect(),
            tuples: tuples as u64,
        })
    }

    /// Relation identifier
    pub fn id(&self) -> RelationId {
        self.id
    }

    /// Column by id
    pub fn column(&self, id: ColumnId) -> Result<&Column> {
        self.columns.get(id).ok_or_else(|| {
            Error::plan(format!(
                "relation {} has no column {id} ({} columns)",
                self.id,
                self.columns.len()
            ))
        })
    }

    /// All columns
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Number of tuples
    pub fn num_tuples(&self) -> u64 {
        self.tuples
    }

    /// Number of columns
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }
}

/// The relations of a workload plus their precomputed statistics
#[derive(Debug)]
pub struct Catalog {
    relations: Vec<Relation>,
    stats: Vec<Vec<ColumnStats>>,
}

impl Catalog {
    /// Take ownership of `relations` and compute every column's statistics
    ///
    /// Relation ids must equal their position.
    pub fn new(relations: Vec<Relation>) -> Result<Self> {
        if let Some((pos, relation)) = relations
            .iter()
            .enumerate()
            .find(|(pos, relation)| relation.id() != *pos)
        {
            return Err(Error::storage(format!(
                "relation id {} stored at position {pos}",
                relation.id()
            )));
        }

        let pairs: Vec<(RelationId, ColumnId)> = relations
            .iter()
            .flat_map(|r| (0..r.num_columns()).map(move |c| (r.id(), c)))
            .collect();
        let computed: Vec<ColumnStats> = pairs
            .par_iter()
            .map(|&(r, c)| ColumnStats::compute(&relations[r].columns[c]))
            .collect();

        let mut computed = computed.into_iter();
        let stats = relations
            .iter()
            .map(|r| computed.by_ref().take(r.num_columns()).collect())
            .collect();

        info!(
            "Catalog ready: {} relations, {} columns with statistics",
            relations.len(),
            pairs.len()
        );
        Ok(Self { relations, stats })
    }

    /// All relations
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Relation by id
    pub fn relation(&self, id: RelationId) -> Result<&Relation> {
        self.relations.get(id).ok_or_else(|| {
            Error::plan(format!(
                "unknown relation {id} ({} relations)",
                self.relations.len()
            ))
        })
    }

    /// Precomputed statistics of one column
    pub fn column_stats(&self, relation: RelationId, column: ColumnId) -> Result<ColumnStats> {
        self.relation(relation)?.column(column)?;
        Ok(self.stats[relation][column])
    }

    /// Build the membership bitset of one column's values
    pub fn build_membership(
        &self,
        relation: RelationId,
        column: ColumnId,
        max_bits: u64,
    ) -> Result<BitsetTable> {
        let stats = self.column_stats(relation, column)?;
        let values = self.relation(relation)?.column(column)?;
        let table = BitsetTable::from_column(values, &stats, max_bits)?;
        debug!(
            "Membership of {}.{}: {} values over {} bits",
            relation,
            column,
            table.count(),
            table.span()
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::new(vec![
            Relation::new(0, vec![vec![1, 2, 3], vec![10, 20, 30]]).unwrap(),
            Relation::new(1, vec![vec![5, 5, 9, 2]]).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_relation_shape() {
        let relation = Relation::new(3, vec![vec![4, 5], vec![6, 7], vec![8, 9]]).unwrap();
        assert_eq!(relation.id(), 3);
        assert_eq!(relation.num_tuples(), 2);
        assert_eq!(relation.num_columns(), 3);
        assert_eq!(relation.column(2).unwrap().load(1), 9);
    }

    #[test]
    fn test_ragged_columns_rejected() {
        let err = Relation::new(0, vec![vec![1, 2], vec![3]]).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_unknown_column_is_plan_error() {
        let relation = Relation::new(0, vec![vec![1]]).unwrap();
        assert!(matches!(relation.column(1), Err(Error::Plan(_))));
    }

    #[test]
    fn test_catalog_rejects_misplaced_ids() {
        let err = Catalog::new(vec![Relation::new(1, vec![vec![1]]).unwrap()]).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_catalog_stats_per_column() {
        let catalog = catalog();
        assert_eq!(catalog.column_stats(0, 1).unwrap().max, 30);
        let stats = catalog.column_stats(1, 0).unwrap();
        assert_eq!((stats.tuples, stats.min, stats.max, stats.distinct), (4, 2, 9, 3));
        assert!(catalog.column_stats(1, 1).is_err());
        assert!(catalog.relation(2).is_err());
    }

    #[test]
    fn test_build_membership() {
        let catalog = catalog();
        let table = catalog.build_membership(1, 0, 1 << 20).unwrap();
        assert!(table.lookup(5));
        assert!(table.lookup(2));
        assert!(!table.lookup(3));
        assert_eq!(table.count(), 3);
    }
}
