//! Semi-join filter stage

use super::{InterpContext, Operator, Stage, forward, forward_codegen};
use crate::error::Result;
use crate::index::BitsetTable;
use crate::jit::{CodegenContext, FnBuilder};
use crate::storage::Column;

/// Forwards rows whose probe value is present in a membership index
///
/// Pure filter: never touches the aggregation state.
#[derive(Debug)]
pub struct SemiJoinStage<'a> {
    probe: &'a Column,
    slot: usize,
    index: &'a BitsetTable,
}

impl<'a> SemiJoinStage<'a> {
    /// Probe `index` with `probe` of binding `slot`
    pub fn new(probe: &'a Column, slot: usize, index: &'a BitsetTable) -> Self {
        Self { probe, slot, index }
    }

    /// The index this stage probes
    pub fn index(&self) -> &'a BitsetTable {
        self.index
    }
}

impl<'a> Operator<'a> for SemiJoinStage<'a> {
    fn execute(&mut self, ctx: &InterpContext, downstream: &mut [Stage<'a>]) {
        let value = self.probe.load(ctx.rowids[self.slot]);
        if self.index.lookup(value) {
            forward(ctx, downstream);
        }
    }

    fn codegen(
        &self,
        fb: &mut FnBuilder<'_>,
        ctx: &mut CodegenContext,
        downstream: &[Stage<'a>],
    ) -> Result<()> {
        let row = ctx.rowid(fb, self.slot);
        let value = self.probe.emit_load(fb, row);
        self.index
            .emit_check(fb, value, |fb| forward_codegen(fb, ctx, downstream))
    }
}
