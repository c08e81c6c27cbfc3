//! Per-query driver
//!
//! Builds a pipeline for each plan, runs it in the configured mode and
//! returns the result together with explicit timings. With `cross_check`
//! enabled both modes run on independently built pipelines and any
//! difference is an error.

use crate::buffer::PodVec;
use crate::config::{ExecutionMode, ExecutorConfig};
use crate::error::{Error, Result};
use crate::execution::{Pipeline, QueryResult};
use crate::index::BitsetTable;
use crate::jit::JitCompiler;
use crate::query::QueryPlan;
use crate::storage::{Catalog, ColumnId, RelationId};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Timings of one query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryMetrics {
    /// Pipeline construction
    pub prepare: Duration,
    /// Native compilation (compiled mode only)
    pub compile: Option<Duration>,
    /// Row processing
    pub execute: Duration,
}

/// Result and timings of one query
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// Query result
    pub result: QueryResult,
    /// Timings
    pub metrics: QueryMetrics,
}

/// Totals over every query an executor ran
#[derive(Debug, Clone, Default)]
pub struct WorkloadStats {
    /// Queries completed
    pub queries: usize,
    /// Queries without any surviving row
    pub null_results: usize,
    /// Total pipeline construction time
    pub prepare: Duration,
    /// Total compilation time
    pub compile: Duration,
    /// Total row processing time
    pub execute: Duration,
}

impl WorkloadStats {
    fn record(&mut self, outcome: &QueryOutcome) {
        self.queries += 1;
        if outcome.result.is_null() {
            self.null_results += 1;
        }
        self.prepare += outcome.metrics.prepare;
        self.compile += outcome.metrics.compile.unwrap_or_default();
        self.execute += outcome.metrics.execute;
    }

    /// Sum of all phases
    pub fn total(&self) -> Duration {
        self.prepare + self.compile + self.execute
    }
}

/// Runs query plans against a catalog
pub struct Executor {
    config: ExecutorConfig,
    jit: JitCompiler,
    stats: WorkloadStats,
}

impl Executor {
    /// Create an executor
    pub fn new(config: ExecutorConfig) -> Self {
        let jit = JitCompiler::new(config.jit.clone());
        Self {
            config,
            jit,
            stats: WorkloadStats::default(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Totals so far
    pub fn stats(&self) -> &WorkloadStats {
        &self.stats
    }

    /// Run one query
    pub fn execute<'a>(
        &mut self,
        catalog: &'a Catalog,
        plan: &QueryPlan<'a>,
    ) -> Result<QueryOutcome> {
        let start = Instant::now();
        let mut pipeline = Pipeline::build(catalog, plan)?;
        let prepare = start.elapsed();

        let (result, compile, execute) = match self.config.mode {
            ExecutionMode::Interpret => {
                let (result, execute) = Self::run_interpreted(&mut pipeline);
                (result, None, execute)
            }
            ExecutionMode::Compile => {
                let (result, compile, execute) = self.run_compiled(&mut pipeline)?;
                (result, Some(compile), execute)
            }
        };
        debug!(
            "Query done ({}): prepare {:?}, compile {:?}, execute {:?}",
            self.config.mode, prepare, compile, execute
        );

        if self.config.cross_check {
            self.cross_check(catalog, plan, &result)?;
        }

        let outcome = QueryOutcome {
            result,
            metrics: QueryMetrics {
                prepare,
                compile,
                execute,
            },
        };
        self.stats.record(&outcome);
        Ok(outcome)
    }

    /// Membership bitset of one catalog column, capped by `max_bitset_bits`
    pub fn build_membership(
        &self,
        catalog: &Catalog,
        relation: RelationId,
        column: ColumnId,
    ) -> Result<BitsetTable> {
        catalog.build_membership(relation, column, self.config.max_bitset_bits)
    }

    /// Run every plan in order, stopping at the first error
    pub fn execute_all<'a>(
        &mut self,
        catalog: &'a Catalog,
        plans: &[QueryPlan<'a>],
    ) -> Result<Vec<QueryOutcome>> {
        plans.iter().map(|plan| self.execute(catalog, plan)).collect()
    }

    fn run_interpreted(pipeline: &mut Pipeline<'_>) -> (QueryResult, Duration) {
        let start = Instant::now();
        pipeline.execute();
        let execute = start.elapsed();
        (pipeline.result(), execute)
    }

    fn run_compiled(
        &mut self,
        pipeline: &mut Pipeline<'_>,
    ) -> Result<(QueryResult, Duration, Duration)> {
        let mut compiled = self.jit.compile(pipeline)?;
        let compile = compiled.compile_time();

        let mut results = PodVec::<u64>::new();
        let start = Instant::now();
        let amount = compiled.run(&mut results);
        let execute = start.elapsed();

        let rows = compiled.pipeline().collected_rows().map(<[u64]>::to_vec);
        Ok((QueryResult::new(results.to_vec(), amount, rows), compile, execute))
    }

    fn cross_check<'a>(
        &mut self,
        catalog: &'a Catalog,
        plan: &QueryPlan<'a>,
        result: &QueryResult,
    ) -> Result<()> {
        let mut pipeline = Pipeline::build(catalog, plan)?;
        let (interpreted, compiled) = match self.config.mode {
            ExecutionMode::Interpret => (result.clone(), self.run_compiled(&mut pipeline)?.0),
            ExecutionMode::Compile => (Self::run_interpreted(&mut pipeline).0, result.clone()),
        };
        if interpreted != compiled {
            warn!("Interpreted and compiled results differ");
            return Err(Error::ResultMismatch {
                interpreted: format!("{interpreted:?}"),
                compiled: format!("{compiled:?}"),
            });
        }
        Ok(())
    }
}
