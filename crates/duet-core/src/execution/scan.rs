//! Nested-loop scan driving a stage chain

use super::{InterpContext, Operator, Stage, forward_codegen};
use crate::error::Result;
use crate::jit::{CodegenContext, FnBuilder};

/// Enumerates every row-id combination of the bound relations
///
/// Slot 0 is the outermost loop and row ids ascend, in both modes.
#[derive(Debug, Clone)]
pub struct ScanStage {
    tuples: Vec<u64>,
}

impl ScanStage {
    /// Scan over relations of the given sizes, one per slot
    pub fn new(tuples: Vec<u64>) -> Self {
        Self { tuples }
    }

    /// Number of binding slots
    pub fn slots(&self) -> usize {
        self.tuples.len()
    }

    /// Number of row combinations the scan produces
    pub fn combinations(&self) -> u128 {
        self.tuples.iter().map(|&t| t as u128).product()
    }

    /// Run `stages` once per combination
    pub fn execute(&self, ctx: &mut InterpContext, stages: &mut [Stage<'_>]) {
        self.execute_level(0, ctx, stages);
    }

    fn execute_level(&self, level: usize, ctx: &mut InterpContext, stages: &mut [Stage<'_>]) {
        if level == self.tuples.len() {
            if let Some((head, rest)) = stages.split_first_mut() {
                head.execute(ctx, rest);
            }
            return;
        }
        for row in 0..self.tuples[level] {
            ctx.rowids[level] = row;
            self.execute_level(level + 1, ctx, stages);
        }
    }

    /// Emit the nested loops with the chain inlined in the innermost body
    pub fn codegen(
        &self,
        fb: &mut FnBuilder<'_>,
        ctx: &mut CodegenContext,
        stages: &[Stage<'_>],
    ) -> Result<()> {
        self.codegen_level(0, fb, ctx, stages)
    }

    fn codegen_level(
        &self,
        level: usize,
        fb: &mut FnBuilder<'_>,
        ctx: &mut CodegenContext,
        stages: &[Stage<'_>],
    ) -> Result<()> {
        if level == self.tuples.len() {
            return forward_codegen(fb, ctx, stages);
        }
        let end = fb.iconst(self.tuples[level]);
        let counter = ctx.rowids[level];
        fb.for_range(counter, end, |fb| {
            self.codegen_level(level + 1, fb, ctx, stages)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::CollectStage;

    #[test]
    fn test_enumeration_order() {
        let scan = ScanStage::new(vec![2, 3]);
        assert_eq!(scan.combinations(), 6);

        let mut stages = vec![Stage::Collect(CollectStage::new(1))];
        let mut ctx = InterpContext::new(2);
        scan.execute(&mut ctx, &mut stages);
        let Stage::Collect(collect) = &stages[0] else {
            unreachable!()
        };
        assert_eq!(collect.rows().as_slice(), &[0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_empty_relation_produces_nothing() {
        let scan = ScanStage::new(vec![4, 0]);
        assert_eq!(scan.combinations(), 0);
        let mut stages = vec![Stage::Collect(CollectStage::new(0))];
        scan.execute(&mut InterpContext::new(2), &mut stages);
        let Stage::Collect(collect) = &stages[0] else {
            unreachable!()
        };
        assert!(collect.rows().is_empty());
    }
}
