//! Duet Core - Dual-mode analytical pipeline
//!
//! This crate runs semi-join / filter / SUM queries over in-memory columnar
//! relations in one of two equivalent ways:
//! - tree-walking interpretation, one row combination at a time
//! - one native function per query, generated with Cranelift
//!
//! Both modes share the stage definitions, the membership indexes and the
//! growable buffer layout, and produce bit-identical results.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               Executor                       │
//! │   (mode selection, cross-check, metrics)    │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │          Pipeline / Stages                   │
//! │ (Scan, Filter, SemiJoin, Collect, Project)  │
//! │       execute ◄──────► codegen (JIT)        │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │     Index Layer        │     PodVec buffer   │
//! │   (BitsetTable)        │ (host + generated)  │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │           Storage Layer                      │
//! │     (Catalog, Relations, Column stats)      │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use duet_core::{BitsetTable, Catalog, Executor, ExecutorConfig, QueryPlan, Relation, Selection};
//!
//! let catalog = Catalog::new(vec![Relation::new(
//!     0,
//!     vec![vec![1, 2, 3, 5, 9, 10], vec![10, 20, 30, 40, 50, 60]],
//! )?])?;
//! let members = BitsetTable::from_values([2, 5, 9], 1 << 20)?;
//! let plan = QueryPlan::new([0])
//!     .semi_join(Selection::new(0, 0), &members)
//!     .project(Selection::new(0, 1));
//!
//! let mut executor = Executor::new(ExecutorConfig::default());
//! let outcome = executor.execute(&catalog, &plan)?;
//! assert_eq!(outcome.result.to_string(), "110");
//! # Ok::<(), duet_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod config;
pub mod error;
pub mod execution;
pub mod executor;
pub mod index;
pub mod jit;
pub mod query;
pub mod storage;

pub use buffer::{PodVec, PodVecHandle};
pub use config::{ExecutionMode, ExecutorConfig, JitConfig, OptLevel};
pub use error::{Error, Result};
pub use execution::{Pipeline, QueryResult};
pub use executor::{Executor, QueryMetrics, QueryOutcome, WorkloadStats};
pub use index::BitsetTable;
pub use jit::{CompiledQuery, JitCompiler};
pub use query::{Comparison, QueryPlan, Selection};
pub use storage::{Catalog, Column, ColumnStats, Relation};
