//! Row-id collect stage

use super::{InterpContext, Operator, Stage, forward, forward_codegen};
use crate::buffer::{PodVec, PodVecHandle};
use crate::error::Result;
use crate::jit::{CodegenContext, FnBuilder};
use std::cell::UnsafeCell;
use std::fmt;

/// Appends the current row id of one slot, then forwards
///
/// The buffer sits in an [`UnsafeCell`] because generated code appends to it
/// through an embedded address while the stage is only shared-borrowed.
pub struct CollectStage {
    slot: usize,
    rows: UnsafeCell<PodVec<u64>>,
}

impl CollectStage {
    /// Collect the row ids of binding `slot`
    pub fn new(slot: usize) -> Self {
        Self {
            slot,
            rows: UnsafeCell::new(PodVec::new()),
        }
    }

    /// Binding slot whose row ids are collected
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Row ids collected so far, in enumeration order
    pub fn rows(&self) -> &PodVec<u64> {
        // SAFETY: generated code only writes while a `CompiledQuery` holds the
        // pipeline mutably, so no write can overlap this shared borrow.
        unsafe { &*self.rows.get() }
    }
}

impl fmt::Debug for CollectStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectStage")
            .field("slot", &self.slot)
            .field("rows", self.rows())
            .finish()
    }
}

impl<'a> Operator<'a> for CollectStage {
    fn execute(&mut self, ctx: &InterpContext, downstream: &mut [Stage<'a>]) {
        self.rows.get_mut().push_back(ctx.rowids[self.slot]);
        forward(ctx, downstream);
    }

    fn codegen(
        &self,
        fb: &mut FnBuilder<'_>,
        ctx: &mut CodegenContext,
        downstream: &[Stage<'a>],
    ) -> Result<()> {
        let rows = PodVecHandle::from_host(fb, self.rows.get());
        let row = ctx.rowid(fb, self.slot);
        rows.push_back(fb, row)?;
        forward_codegen(fb, ctx, downstream)
    }
}
