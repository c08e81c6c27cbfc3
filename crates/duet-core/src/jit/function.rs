//! Function-under-construction wrapper used by every codegen routine
//!
//! [`FnBuilder`] owns the Cranelift [`FunctionBuilder`] of the function being
//! synthesized and adds the few structured helpers the stages need:
//! embedding host addresses as constants, loads/stores, SSA variables,
//! `if_then` blocks and counted loops, and the call to the host reallocation
//! primitive.

use crate::error::Result;
use cranelift::codegen::ir::FuncRef;
use cranelift::prelude::*;

/// Element types that generated code can load and store directly
pub trait JitScalar: bytemuck::Pod {
    /// Cranelift type of the element
    const IR_TYPE: Type;
}

impl JitScalar for u64 {
    const IR_TYPE: Type = types::I64;
}

impl JitScalar for i64 {
    const IR_TYPE: Type = types::I64;
}

impl JitScalar for u32 {
    const IR_TYPE: Type = types::I32;
}

impl JitScalar for i32 {
    const IR_TYPE: Type = types::I32;
}

impl JitScalar for u16 {
    const IR_TYPE: Type = types::I16;
}

impl JitScalar for u8 {
    const IR_TYPE: Type = types::I8;
}

/// Builder for one synthesized function
pub struct FnBuilder<'a> {
    builder: FunctionBuilder<'a>,
    ptr_ty: Type,
    realloc: FuncRef,
    next_var: u32,
}

impl<'a> FnBuilder<'a> {
    pub(crate) fn new(builder: FunctionBuilder<'a>, ptr_ty: Type, realloc: FuncRef) -> Self {
        Self {
            builder,
            ptr_ty,
            realloc,
            next_var: 0,
        }
    }

    /// Raw Cranelift builder, for instructions without a helper here
    pub fn builder(&mut self) -> &mut FunctionBuilder<'a> {
        &mut self.builder
    }

    /// Target pointer type
    pub fn ptr_type(&self) -> Type {
        self.ptr_ty
    }

    /// 64-bit integer constant
    pub fn iconst(&mut self, value: u64) -> Value {
        self.builder.ins().iconst(types::I64, value as i64)
    }

    /// Embed a host address as a pointer-typed constant
    pub fn embed_ptr<T>(&mut self, ptr: *const T) -> Value {
        let ptr_ty = self.ptr_ty;
        self.builder.ins().iconst(ptr_ty, ptr as usize as i64)
    }

    /// Load a `ty` value from `addr + offset`
    pub fn load(&mut self, ty: Type, addr: Value, offset: i32) -> Value {
        self.builder.ins().load(ty, MemFlags::trusted(), addr, offset)
    }

    /// Store `value` to `addr + offset`
    pub fn store(&mut self, value: Value, addr: Value, offset: i32) {
        self.builder.ins().store(MemFlags::trusted(), value, addr, offset);
    }

    /// Declare a fresh SSA variable initialized to `init`
    pub fn declare_var(&mut self, ty: Type, init: Value) -> Variable {
        let var = Variable::new(self.next_var as usize);
        self.next_var += 1;
        self.builder.declare_var(var, ty);
        self.builder.def_var(var, init);
        var
    }

    /// Current value of `var`
    pub fn use_var(&mut self, var: Variable) -> Value {
        self.builder.use_var(var)
    }

    /// Assign `value` to `var`
    pub fn def_var(&mut self, var: Variable, value: Value) {
        self.builder.def_var(var, value);
    }

    /// Emit a call to the host reallocation primitive
    /// ([`crate::buffer::pod_realloc`]) and return the new region start.
    pub fn call_realloc(
        &mut self,
        ptr: Value,
        old_bytes: Value,
        new_bytes: Value,
        align: Value,
    ) -> Value {
        let call = self
            .builder
            .ins()
            .call(self.realloc, &[ptr, old_bytes, new_bytes, align]);
        self.builder.inst_results(call)[0]
    }

    /// Run `body` only when `cond` is non-zero
    pub fn if_then(
        &mut self,
        cond: Value,
        body: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        let then_block = self.builder.create_block();
        let merge_block = self.builder.create_block();
        self.builder
            .ins()
            .brif(cond, then_block, &[], merge_block, &[]);

        self.builder.switch_to_block(then_block);
        self.builder.seal_block(then_block);
        body(self)?;
        self.builder.ins().jump(merge_block, &[]);

        self.builder.switch_to_block(merge_block);
        self.builder.seal_block(merge_block);
        Ok(())
    }

    /// Run `body` for `counter` in `0..end` (unsigned)
    ///
    /// `end` must be defined before the loop; `counter` holds the current
    /// iteration inside `body`.
    pub fn for_range(
        &mut self,
        counter: Variable,
        end: Value,
        body: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        let header = self.builder.create_block();
        let body_block = self.builder.create_block();
        let exit = self.builder.create_block();

        let zero = self.builder.ins().iconst(types::I64, 0);
        self.builder.def_var(counter, zero);
        self.builder.ins().jump(header, &[]);

        self.builder.switch_to_block(header);
        let current = self.builder.use_var(counter);
        let more = self
            .builder
            .ins()
            .icmp(IntCC::UnsignedLessThan, current, end);
        self.builder.ins().brif(more, body_block, &[], exit, &[]);

        self.builder.switch_to_block(body_block);
        self.builder.seal_block(body_block);
        body(self)?;
        let current = self.builder.use_var(counter);
        let next = self.builder.ins().iadd_imm(current, 1);
        self.builder.def_var(counter, next);
        self.builder.ins().jump(header, &[]);

        // back edge is in place, the header has all its predecessors now
        self.builder.seal_block(header);
        self.builder.switch_to_block(exit);
        self.builder.seal_block(exit);
        Ok(())
    }

    /// Return `value` and finish the function
    pub(crate) fn finish(mut self, value: Value) {
        self.builder.ins().return_(&[value]);
        self.builder.seal_all_blocks();
        self.builder.finalize();
    }
}
