//! Dual-mode operator pipeline
//!
//! ```text
//! ScanStage ─► Filter* ─► SemiJoin* ─► Collect? ─► Projection
//!  (drives)                                         (terminal)
//! ```
//!
//! Every stage implements [`Operator`] twice over the same per-row logic:
//! `execute` processes the current row combination of an [`InterpContext`]
//! and forwards to its downstream slice, while `codegen` emits that logic
//! into the function under construction with the downstream stages' code
//! inlined in place of the forward. Stages live in one pipeline-owned vector;
//! each stage only ever sees the slice after it.

mod collect;
mod filter;
mod pipeline;
mod projection;
mod result;
mod scan;
mod semijoin;

pub use collect::CollectStage;
pub use filter::FilterStage;
pub use pipeline::Pipeline;
pub use projection::ProjectionStage;
pub use result::QueryResult;
pub use scan::ScanStage;
pub use semijoin::SemiJoinStage;

use crate::error::Result;
use crate::jit::{CodegenContext, FnBuilder};

/// Per-query interpreter state: the current row id of every binding slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpContext {
    /// Written by the scan, read by every other stage
    pub rowids: Vec<u64>,
}

impl InterpContext {
    /// All row ids at zero
    pub fn new(slots: usize) -> Self {
        Self {
            rowids: vec![0; slots],
        }
    }
}

/// Shape shared by every pipeline stage
pub trait Operator<'a> {
    /// Process the current row combination of `ctx`
    fn execute(&mut self, ctx: &InterpContext, downstream: &mut [Stage<'a>]);

    /// Emit the per-row logic, inlining `downstream` where the row survives
    fn codegen(
        &self,
        fb: &mut FnBuilder<'_>,
        ctx: &mut CodegenContext,
        downstream: &[Stage<'a>],
    ) -> Result<()>;
}

/// Pipeline stage variants
#[derive(Debug)]
pub enum Stage<'a> {
    /// Constant comparison
    Filter(FilterStage<'a>),
    /// Membership probe
    SemiJoin(SemiJoinStage<'a>),
    /// Row-id collection
    Collect(CollectStage),
    /// Terminal SUM aggregation
    Projection(ProjectionStage<'a>),
}

impl<'a> Operator<'a> for Stage<'a> {
    fn execute(&mut self, ctx: &InterpContext, downstream: &mut [Stage<'a>]) {
        match self {
            Stage::Filter(stage) => stage.execute(ctx, downstream),
            Stage::SemiJoin(stage) => stage.execute(ctx, downstream),
            Stage::Collect(stage) => stage.execute(ctx, downstream),
            Stage::Projection(stage) => stage.execute(ctx, downstream),
        }
    }

    fn codegen(
        &self,
        fb: &mut FnBuilder<'_>,
        ctx: &mut CodegenContext,
        downstream: &[Stage<'a>],
    ) -> Result<()> {
        match self {
            Stage::Filter(stage) => stage.codegen(fb, ctx, downstream),
            Stage::SemiJoin(stage) => stage.codegen(fb, ctx, downstream),
            Stage::Collect(stage) => stage.codegen(fb, ctx, downstream),
            Stage::Projection(stage) => stage.codegen(fb, ctx, downstream),
        }
    }
}

/// Hand the current row to the head of `downstream`
#[inline]
pub(crate) fn forward(ctx: &InterpContext, downstream: &mut [Stage<'_>]) {
    if let Some((next, rest)) = downstream.split_first_mut() {
        next.execute(ctx, rest);
    }
}

/// Emit the code of the head of `downstream`
pub(crate) fn forward_codegen(
    fb: &mut FnBuilder<'_>,
    ctx: &mut CodegenContext,
    downstream: &[Stage<'_>],
) -> Result<()> {
    match downstream.split_first() {
        Some((next, rest)) => next.codegen(fb, ctx, rest),
        None => Ok(()),
    }
}
