//! Native code generation for query pipelines
//!
//! Every query gets its own Cranelift [`JITModule`] holding one exported
//! function:
//!
//! ```text
//! extern "C" fn(results: *mut PodVec<u64>) -> u64
//! ```
//!
//! The body is the scan's nested loops with each stage's per-row fragment
//! inlined in chain order. The final sums are pushed onto `results` and the
//! match counter is returned. Stage state (column bases, bitset words,
//! collect buffers) is embedded by address, so the compiled handle keeps the
//! pipeline mutably borrowed for as long as it lives.

mod context;
mod function;

pub use context::CodegenContext;
pub use function::{FnBuilder, JitScalar};

use crate::buffer::{PodVec, pod_realloc};
use crate::config::JitConfig;
use crate::error::{Error, Result};
use crate::execution::Pipeline;
use cranelift::prelude::*;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{Linkage, Module};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Symbol under which generated code reaches the buffer reallocation primitive
pub const REALLOC_SYMBOL: &str = "duet_pod_realloc";

/// Name of the exported query function
pub const QUERY_SYMBOL: &str = "duet_query";

/// Signature of every compiled query function
pub type QueryFn = unsafe extern "C" fn(*mut PodVec<u64>) -> u64;

/// Compilation statistics
#[derive(Debug, Clone, Default)]
pub struct JitStats {
    /// Functions compiled successfully
    pub compilations: usize,
    /// Compilations that failed
    pub failures: usize,
    /// Total time spent compiling
    pub total_compile_time: Duration,
}

/// Compiles query pipelines into native functions
pub struct JitCompiler {
    config: JitConfig,
    stats: JitStats,
}

impl JitCompiler {
    /// Create a compiler with the given settings
    pub fn new(config: JitConfig) -> Self {
        Self {
            config,
            stats: JitStats::default(),
        }
    }

    /// Compilation statistics so far
    pub fn stats(&self) -> &JitStats {
        &self.stats
    }

    fn new_module(&self) -> Result<JITModule> {
        let mut flag_builder = settings::builder();
        let settings_err =
            |e: settings::SetError| Error::codegen(format!("JIT settings error: {e}"));
        flag_builder
            .set("use_colocated_libcalls", "false")
            .map_err(settings_err)?;
        flag_builder.set("is_pic", "false").map_err(settings_err)?;
        flag_builder
            .set("opt_level", self.config.opt_level.as_setting())
            .map_err(settings_err)?;
        flag_builder
            .set(
                "enable_verifier",
                if self.config.verify { "true" } else { "false" },
            )
            .map_err(settings_err)?;

        let isa_builder = cranelift_native::builder()
            .map_err(|e| Error::codegen(format!("ISA builder error: {e}")))?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| Error::codegen(format!("ISA finish error: {e}")))?;

        let mut builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
        builder.symbol(REALLOC_SYMBOL, pod_realloc as *const u8);
        Ok(JITModule::new(builder))
    }

    /// Build one function `fn(ptr) -> u64` whose body is emitted by `body`
    ///
    /// `body` receives the builder positioned in the entry block and the
    /// argument value, and returns the value to return.
    pub fn build_function<F>(&mut self, name: &str, body: F) -> Result<JitFunction>
    where
        F: FnOnce(&mut FnBuilder<'_>, Value) -> Result<Value>,
    {
        let start = Instant::now();
        let mut module = self.new_module()?;
        match Self::define(&mut module, name, body) {
            Ok(entry) => {
                let compile_time = start.elapsed();
                self.stats.compilations += 1;
                self.stats.total_compile_time += compile_time;
                debug!("Compiled `{}` in {:?}", name, compile_time);
                Ok(JitFunction {
                    module: Some(module),
                    entry,
                    compile_time,
                })
            }
            Err(e) => {
                self.stats.failures += 1;
                // SAFETY: nothing from this module was handed out.
                unsafe { module.free_memory() };
                Err(e)
            }
        }
    }

    fn define<F>(module: &mut JITModule, name: &str, body: F) -> Result<*const u8>
    where
        F: FnOnce(&mut FnBuilder<'_>, Value) -> Result<Value>,
    {
        let ptr_ty = module.target_config().pointer_type();
        if ptr_ty != types::I64 {
            return Err(Error::codegen(format!(
                "unsupported pointer type {ptr_ty}, only 64-bit targets are supported"
            )));
        }

        let mut realloc_sig = module.make_signature();
        for _ in 0..4 {
            realloc_sig.params.push(AbiParam::new(ptr_ty));
        }
        realloc_sig.returns.push(AbiParam::new(ptr_ty));
        let realloc_id = module.declare_function(REALLOC_SYMBOL, Linkage::Import, &realloc_sig)?;

        let mut sig = module.make_signature();
        sig.params.push(AbiParam::new(ptr_ty));
        sig.returns.push(AbiParam::new(types::I64));
        let func_id = module.declare_function(name, Linkage::Export, &sig)?;

        let mut ctx = module.make_context();
        ctx.func.signature = sig;
        let mut builder_ctx = FunctionBuilderContext::new();
        {
            let mut builder = FunctionBuilder::new(&mut ctx.func, &mut builder_ctx);
            let realloc = module.declare_func_in_func(realloc_id, builder.func);

            let entry = builder.create_block();
            builder.append_block_params_for_function_params(entry);
            builder.switch_to_block(entry);
            builder.seal_block(entry);
            let arg = builder.block_params(entry)[0];

            let mut fb = FnBuilder::new(builder, ptr_ty, realloc);
            let ret = body(&mut fb, arg)?;
            fb.finish(ret);
        }
        trace!("Generated `{}`:\n{}", name, ctx.func.display());

        module.define_function(func_id, &mut ctx)?;
        module.clear_context(&mut ctx);
        module.finalize_definitions()?;
        Ok(module.get_finalized_function(func_id))
    }

    /// Compile `pipeline` into one native function
    pub fn compile<'p, 'a>(
        &mut self,
        pipeline: &'p mut Pipeline<'a>,
    ) -> Result<CompiledQuery<'p, 'a>> {
        let function = {
            let pipeline = &*pipeline;
            self.build_function(QUERY_SYMBOL, |fb, results| pipeline.codegen(fb, results))?
        };
        Ok(CompiledQuery { function, pipeline })
    }
}

/// Finalized native function and the module that owns its memory
pub struct JitFunction {
    module: Option<JITModule>,
    entry: *const u8,
    compile_time: Duration,
}

impl JitFunction {
    /// Time spent building and finalizing
    pub fn compile_time(&self) -> Duration {
        self.compile_time
    }

    /// Call the function with `arg`
    ///
    /// # Safety
    ///
    /// Every address embedded in the function must still be valid and not
    /// aliased by live references, and `arg` must be valid for the body.
    pub unsafe fn call(&self, arg: *mut PodVec<u64>) -> u64 {
        // SAFETY: built with the `QueryFn` signature by `JitCompiler::define`.
        let f: QueryFn = unsafe { std::mem::transmute(self.entry) };
        unsafe { f(arg) }
    }
}

impl Drop for JitFunction {
    fn drop(&mut self) {
        if let Some(module) = self.module.take() {
            // SAFETY: `entry` is never used past this point.
            unsafe { module.free_memory() };
        }
    }
}

impl std::fmt::Debug for JitFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JitFunction")
            .field("entry", &self.entry)
            .field("compile_time", &self.compile_time)
            .finish()
    }
}

/// A compiled query, holding its pipeline exclusively
pub struct CompiledQuery<'p, 'a> {
    function: JitFunction,
    pipeline: &'p mut Pipeline<'a>,
}

impl<'a> CompiledQuery<'_, 'a> {
    /// Run the query, pushing one sum per projection onto `results`, and
    /// return the number of surviving row combinations
    pub fn run(&mut self, results: &mut PodVec<u64>) -> u64 {
        // SAFETY: the pipeline (and through it the catalog and indexes) is
        // borrowed for our lifetime, so every embedded address is live; the
        // `&mut` borrows rule out concurrent host access.
        unsafe { self.function.call(results) }
    }

    /// Time spent compiling
    pub fn compile_time(&self) -> Duration {
        self.function.compile_time()
    }

    /// The pipeline, for reading stage-owned buffers after a run
    pub fn pipeline(&self) -> &Pipeline<'a> {
        self.pipeline
    }
}
