//! Symbolic accessors for [`PodVec`](super::PodVec) inside generated code
//!
//! A [`PodVecHandle`] is the address of a [`VecRecord`] as seen by the
//! function being synthesized. Its methods emit the same field updates the
//! host methods perform, at the same offsets, so a buffer can be appended to by
//! generated code and read back by the host without conversion.

use super::{PodVec, VecRecord};
use crate::error::Result;
use crate::jit::{FnBuilder, JitScalar};
use cranelift::prelude::*;
use std::marker::PhantomData;
use std::mem::{align_of, size_of};

/// Address of a buffer record inside a function under construction
#[derive(Debug, Clone, Copy)]
pub struct PodVecHandle<T> {
    record: Value,
    _elem: PhantomData<T>,
}

impl<T: JitScalar> PodVecHandle<T> {
    /// Wrap a pointer-typed value that holds a record address
    pub fn new(record: Value) -> Self {
        Self {
            record,
            _elem: PhantomData,
        }
    }

    /// Embed the address of a host buffer as a constant
    ///
    /// The buffer must stay at this address, and must not be touched by the
    /// host, for as long as the generated code can run.
    pub fn from_host<const INIT: usize>(fb: &mut FnBuilder<'_>, vec: *mut PodVec<T, INIT>) -> Self {
        // the record is the first field of a #[repr(C)] PodVec
        let record = fb.embed_ptr(vec as *const VecRecord);
        Self::new(record)
    }

    /// Symbolic record address
    pub fn record(&self) -> Value {
        self.record
    }

    /// Load `start`
    pub fn begin(&self, fb: &mut FnBuilder<'_>) -> Value {
        let ptr_ty = fb.ptr_type();
        fb.load(ptr_ty, self.record, VecRecord::START_OFFSET)
    }

    /// Load `finish`
    pub fn end(&self, fb: &mut FnBuilder<'_>) -> Value {
        let ptr_ty = fb.ptr_type();
        fb.load(ptr_ty, self.record, VecRecord::FINISH_OFFSET)
    }

    /// Load `capend`
    pub fn capacity_end(&self, fb: &mut FnBuilder<'_>) -> Value {
        let ptr_ty = fb.ptr_type();
        fb.load(ptr_ty, self.record, VecRecord::CAPEND_OFFSET)
    }

    /// Number of elements in use
    pub fn size(&self, fb: &mut FnBuilder<'_>) -> Value {
        let start = self.begin(fb);
        let finish = self.end(fb);
        let bytes = fb.builder().ins().isub(finish, start);
        fb.builder().ins().udiv_imm(bytes, size_of::<T>() as i64)
    }

    /// Append `value` (of type `T::IR_TYPE`)
    ///
    /// Emits: load `finish`/`capend`; when equal, double the byte size through
    /// the host reallocation primitive and rewrite `start`/`capend`; store the
    /// value at `finish`; store `finish` advanced by one element.
    pub fn push_back(&self, fb: &mut FnBuilder<'_>, value: Value) -> Result<()> {
        let ptr_ty = fb.ptr_type();
        let record = self.record;

        let finish = self.end(fb);
        let capend = self.capacity_end(fb);
        let finish_var = fb.declare_var(ptr_ty, finish);
        let full = fb.builder().ins().icmp(IntCC::Equal, finish, capend);

        fb.if_then(full, |fb| {
            let start = fb.load(ptr_ty, record, VecRecord::START_OFFSET);
            let finish = fb.use_var(finish_var);
            let bytes = fb.builder().ins().isub(finish, start);
            let doubled = fb.builder().ins().ishl_imm(bytes, 1);
            let align = fb.builder().ins().iconst(ptr_ty, align_of::<T>() as i64);
            let new_start = fb.call_realloc(start, bytes, doubled, align);
            fb.store(new_start, record, VecRecord::START_OFFSET);

            let new_finish = fb.builder().ins().iadd(new_start, bytes);
            fb.def_var(finish_var, new_finish);
            let new_capend = fb.builder().ins().iadd(new_start, doubled);
            fb.store(new_capend, record, VecRecord::CAPEND_OFFSET);
            Ok(())
        })?;

        let finish = fb.use_var(finish_var);
        fb.store(value, finish, 0);
        let advanced = fb.builder().ins().iadd_imm(finish, size_of::<T>() as i64);
        fb.store(advanced, record, VecRecord::FINISH_OFFSET);
        Ok(())
    }
}
