//! Terminal SUM aggregation stage

use cranelift::prelude::InstBuilder;

use super::{InterpContext, Operator, QueryResult, Stage};
use crate::buffer::PodVec;
use crate::error::Result;
use crate::jit::{CodegenContext, FnBuilder};
use crate::storage::Column;

/// Sums each projected column over the surviving rows and counts them
///
/// All additions wrap modulo 2^64, the same as the generated 64-bit adds.
#[derive(Debug)]
pub struct ProjectionStage<'a> {
    columns: Vec<(&'a Column, usize)>,
    sums: PodVec<u64>,
    amount: u64,
}

impl<'a> ProjectionStage<'a> {
    /// Sum `columns`, each paired with its binding slot, in order
    pub fn new(columns: Vec<(&'a Column, usize)>) -> Self {
        let mut sums = PodVec::new();
        sums.extend(std::iter::repeat_n(0, columns.len()));
        Self {
            columns,
            sums,
            amount: 0,
        }
    }

    /// Number of projected columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Running sums, in projection order
    pub fn sums(&self) -> &[u64] {
        &self.sums
    }

    /// Number of row combinations accumulated
    pub fn amount(&self) -> u64 {
        self.amount
    }

    /// Interpreted result
    pub fn result(&self) -> QueryResult {
        QueryResult::new(self.sums.to_vec(), self.amount, None)
    }

    /// Emit, once after the row loop, the pushes of the final accumulators
    /// onto the output buffer
    pub fn codegen_save(&self, fb: &mut FnBuilder<'_>, ctx: &CodegenContext) -> Result<()> {
        for &acc in &ctx.accumulators {
            let sum = fb.use_var(acc);
            ctx.results.push_back(fb, sum)?;
        }
        Ok(())
    }
}

impl<'a> Operator<'a> for ProjectionStage<'a> {
    fn execute(&mut self, ctx: &InterpContext, downstream: &mut [Stage<'a>]) {
        debug_assert!(downstream.is_empty(), "projection must be terminal");
        for (sum, (column, slot)) in self.sums.iter_mut().zip(&self.columns) {
            *sum = sum.wrapping_add(column.load(ctx.rowids[*slot]));
        }
        self.amount = self.amount.wrapping_add(1);
    }

    fn codegen(
        &self,
        fb: &mut FnBuilder<'_>,
        ctx: &mut CodegenContext,
        downstream: &[Stage<'a>],
    ) -> Result<()> {
        debug_assert!(downstream.is_empty(), "projection must be terminal");
        for (&acc, (column, slot)) in ctx.accumulators.iter().zip(&self.columns) {
            let row = ctx.rowid(fb, *slot);
            let value = column.emit_load(fb, row);
            let sum = fb.use_var(acc);
            let sum = fb.builder().ins().iadd(sum, value);
            fb.def_var(acc, sum);
        }
        let amount = fb.use_var(ctx.amount);
        let amount = fb.builder().ins().iadd_imm(amount, 1);
        fb.def_var(ctx.amount, amount);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_and_counts() {
        let a = Column::new(vec![1, 2, 3]);
        let b = Column::new(vec![10, 20, 30]);
        let mut stage = ProjectionStage::new(vec![(&a, 0), (&b, 1)]);
        assert_eq!(stage.sums(), &[0, 0]);

        let mut ctx = InterpContext::new(2);
        for (ra, rb) in [(0, 2), (2, 2)] {
            ctx.rowids = vec![ra, rb];
            stage.execute(&ctx, &mut []);
        }
        assert_eq!(stage.sums(), &[4, 60]);
        assert_eq!(stage.amount(), 2);
    }

    #[test]
    fn test_sums_wrap() {
        let a = Column::new(vec![u64::MAX, 2]);
        let mut stage = ProjectionStage::new(vec![(&a, 0)]);
        let mut ctx = InterpContext::new(1);
        for row in 0..2 {
            ctx.rowids[0] = row;
            stage.execute(&ctx, &mut []);
        }
        assert_eq!(stage.sums(), &[1]);
    }

    #[test]
    fn test_untouched_stage_is_null() {
        let a = Column::new(vec![5]);
        let stage = ProjectionStage::new(vec![(&a, 0), (&a, 0)]);
        assert_eq!(stage.result().to_string(), "NULL NULL");
    }
}
