//! Per-query codegen context

use super::FnBuilder;
use crate::buffer::PodVecHandle;
use cranelift::prelude::*;

/// Symbolic state shared by every stage while one query function is emitted
///
/// Mirrors the interpreter context: one row-id variable per bound relation,
/// plus the accumulators and match counter of the terminal stage, and the
/// output buffer passed as the function argument.
#[derive(Debug)]
pub struct CodegenContext {
    /// Current row id per binding slot
    pub rowids: Vec<Variable>,
    /// Running sum per projected column
    pub accumulators: Vec<Variable>,
    /// Number of surviving row combinations
    pub amount: Variable,
    /// Output buffer receiving the final sums
    pub results: PodVecHandle<u64>,
}

impl CodegenContext {
    /// Declare every variable zero-initialized in the current block
    pub fn new(fb: &mut FnBuilder<'_>, slots: usize, projections: usize, results: Value) -> Self {
        let zero = fb.iconst(0);
        let rowids = (0..slots)
            .map(|_| fb.declare_var(types::I64, zero))
            .collect();
        let accumulators = (0..projections)
            .map(|_| fb.declare_var(types::I64, zero))
            .collect();
        let amount = fb.declare_var(types::I64, zero);
        Self {
            rowids,
            accumulators,
            amount,
            results: PodVecHandle::new(results),
        }
    }

    /// Live row id of `slot`
    pub fn rowid(&self, fb: &mut FnBuilder<'_>, slot: usize) -> Value {
        fb.use_var(self.rowids[slot])
    }
}
