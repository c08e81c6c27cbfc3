//! Constant filter stage

use super::{InterpContext, Operator, Stage, forward, forward_codegen};
use crate::error::Result;
use crate::jit::{CodegenContext, FnBuilder};
use crate::query::Comparison;
use crate::storage::Column;
use cranelift::prelude::*;

/// Forwards rows whose `column` value satisfies `op constant`
#[derive(Debug)]
pub struct FilterStage<'a> {
    column: &'a Column,
    slot: usize,
    op: Comparison,
    constant: u64,
}

impl<'a> FilterStage<'a> {
    /// Filter on `column` of binding `slot`
    pub fn new(column: &'a Column, slot: usize, op: Comparison, constant: u64) -> Self {
        Self {
            column,
            slot,
            op,
            constant,
        }
    }
}

fn condition(op: Comparison) -> IntCC {
    match op {
        Comparison::Less => IntCC::UnsignedLessThan,
        Comparison::Greater => IntCC::UnsignedGreaterThan,
        Comparison::Equal => IntCC::Equal,
    }
}

impl<'a> Operator<'a> for FilterStage<'a> {
    fn execute(&mut self, ctx: &InterpContext, downstream: &mut [Stage<'a>]) {
        let value = self.column.load(ctx.rowids[self.slot]);
        if self.op.eval(value, self.constant) {
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
        let value = self.column.emit_load(fb, row);
        let constant = fb.iconst(self.constant);
        let pass = fb.builder().ins().icmp(condition(self.op), value, constant);
        fb.if_then(pass, |fb| forward_codegen(fb, ctx, downstream))
    }
}
