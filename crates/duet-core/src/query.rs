//! Rewritten query plans, the input of pipeline construction

use crate::index::BitsetTable;
use crate::storage::{ColumnId, RelationId};
use std::fmt;

/// A column of a query-local relation slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Selection {
    /// Index into the plan's bindings (not a global relation id)
    pub binding: usize,
    /// Column within the bound relation
    pub column: ColumnId,
}

impl Selection {
    /// Create a selection
    pub fn new(binding: usize, column: ColumnId) -> Self {
        Self { binding, column }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.binding, self.column)
    }
}

/// Unsigned comparison against a constant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `<`
    Less,
    /// `>`
    Greater,
    /// `=`
    Equal,
}

impl Comparison {
    /// Apply to `lhs` and `rhs`
    #[inline]
    pub fn eval(self, lhs: u64, rhs: u64) -> bool {
        match self {
            Self::Less => lhs < rhs,
            Self::Greater => lhs > rhs,
            Self::Equal => lhs == rhs,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Less => "<",
            Self::Greater => ">",
            Self::Equal => "=",
        };
        f.write_str(op)
    }
}

/// `column <op> constant`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterPredicate {
    /// Filtered column
    pub selection: Selection,
    /// Comparison
    pub op: Comparison,
    /// Right-hand constant
    pub constant: u64,
}

/// Semi-join of a probe column against a prebuilt membership index
#[derive(Debug, Clone, Copy)]
pub struct SemiJoinSpec<'a> {
    /// Probe column
    pub probe: Selection,
    /// Values the probe must hit
    pub index: &'a BitsetTable,
}

/// A query after rewriting: bindings, filters, semi-joins and projections
///
/// Stages are chained in this order: constant filters, semi-joins, the
/// optional row-id collect, then the projection.
#[derive(Debug, Clone, Default)]
pub struct QueryPlan<'a> {
    /// Global relation id per query-local slot
    pub bindings: Vec<RelationId>,
    /// Constant filters
    pub filters: Vec<FilterPredicate>,
    /// Semi-joins
    pub semi_joins: Vec<SemiJoinSpec<'a>>,
    /// Slot whose surviving row ids are collected
    pub collect: Option<usize>,
    /// Summed columns, in output order
    pub projections: Vec<Selection>,
}

impl<'a> QueryPlan<'a> {
    /// Plan over `bindings` with nothing else yet
    pub fn new(bindings: impl Into<Vec<RelationId>>) -> Self {
        Self {
            bindings: bindings.into(),
            ..Self::default()
        }
    }

    /// Add a constant filter
    pub fn filter(mut self, selection: Selection, op: Comparison, constant: u64) -> Self {
        self.filters.push(FilterPredicate {
            selection,
            op,
            constant,
        });
        self
    }

    /// Add a semi-join
    pub fn semi_join(mut self, probe: Selection, index: &'a BitsetTable) -> Self {
        self.semi_joins.push(SemiJoinSpec { probe, index });
        self
    }

    /// Collect the surviving row ids of `binding`
    pub fn collect_rows(mut self, binding: usize) -> Self {
        self.collect = Some(binding);
        self
    }

    /// Add a summed column
    pub fn project(mut self, selection: Selection) -> Self {
        self.projections.push(selection);
        self
    }
}
