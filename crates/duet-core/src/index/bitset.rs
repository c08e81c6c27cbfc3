//! Dense membership bitset

use crate::error::{Error, Result};
use crate::jit::FnBuilder;
use crate::storage::{Column, ColumnStats};
use cranelift::prelude::*;
use roaring::RoaringTreemap;

/// Point-membership table over `[base, base + len)`
///
/// One bit per value in the range. `lookup(v)` is a wrapping subtract, one
/// unsigned compare and one bit test, which is also exactly what
/// [`BitsetTable::emit_check`] generates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitsetTable {
    base: u64,
    len: u64,
    words: Vec<u64>,
    count: u64,
}

fn check_span(min: u64, max: u64, max_bits: u64) -> Result<u64> {
    let width = max - min;
    if width >= max_bits {
        return Err(Error::index(format!(
            "value range [{min}, {max}] needs more than {max_bits} bits"
        )));
    }
    Ok(width + 1)
}

impl BitsetTable {
    /// Table that contains nothing
    pub fn empty() -> Self {
        Self {
            base: 0,
            len: 0,
            words: Vec::new(),
            count: 0,
        }
    }

    fn with_range(base: u64, len: u64) -> Self {
        Self {
            base,
            len,
            words: vec![0; len.div_ceil(64) as usize],
            count: 0,
        }
    }

    fn set(&mut self, value: u64) {
        let off = value - self.base;
        let word = &mut self.words[(off >> 6) as usize];
        let mask = 1u64 << (off & 63);
        if *word & mask == 0 {
            *word |= mask;
            self.count += 1;
        }
    }

    /// Table holding exactly `values`
    ///
    /// Fails with an index error when `max - min` does not fit in `max_bits`.
    pub fn from_values(values: impl IntoIterator<Item = u64>, max_bits: u64) -> Result<Self> {
        let set: RoaringTreemap = values.into_iter().collect();
        let (Some(min), Some(max)) = (set.min(), set.max()) else {
            return Ok(Self::empty());
        };
        let mut table = Self::with_range(min, check_span(min, max, max_bits)?);
        for value in set.iter() {
            table.set(value);
        }
        Ok(table)
    }

    /// Table holding the values of `column`, sized from its statistics
    pub fn from_column(column: &Column, stats: &ColumnStats, max_bits: u64) -> Result<Self> {
        if stats.tuples == 0 {
            return Ok(Self::empty());
        }
        let mut table = Self::with_range(stats.min, check_span(stats.min, stats.max, max_bits)?);
        for &value in column.values() {
            if value < stats.min || value > stats.max {
                return Err(Error::index(format!(
                    "value {value} outside column statistics [{}, {}]",
                    stats.min, stats.max
                )));
            }
            table.set(value);
        }
        Ok(table)
    }

    /// True when `value` is present
    #[inline]
    pub fn lookup(&self, value: u64) -> bool {
        let off = value.wrapping_sub(self.base);
        off < self.len && (self.words[(off >> 6) as usize] >> (off & 63)) & 1 == 1
    }

    /// Smallest value the table can hold
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Number of bits covered
    pub fn span(&self) -> u64 {
        self.len
    }

    /// Number of distinct values present
    pub fn count(&self) -> u64 {
        self.count
    }

    /// True when no value is present
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Emit `if lookup(value) { body }`
    ///
    /// The word array address of this instance is embedded as a constant.
    /// Nothing is emitted for an empty table.
    pub fn emit_check<F>(&self, fb: &mut FnBuilder<'_>, value: Value, body: F) -> Result<()>
    where
        F: FnOnce(&mut FnBuilder<'_>) -> Result<()>,
    {
        if self.count == 0 {
            return Ok(());
        }
        let base = fb.iconst(self.base);
        let off = fb.builder().ins().isub(value, base);
        let len = fb.iconst(self.len);
        let in_range = fb.builder().ins().icmp(IntCC::UnsignedLessThan, off, len);
        let words = self.words.as_ptr();

        fb.if_then(in_range, |fb| {
            let words = fb.embed_ptr(words);
            let index = fb.builder().ins().ushr_imm(off, 6);
            let byte_off = fb.builder().ins().ishl_imm(index, 3);
            let addr = fb.builder().ins().iadd(words, byte_off);
            let word = fb.load(types::I64, addr, 0);
            let shift = fb.builder().ins().band_imm(off, 63);
            let shifted = fb.builder().ins().ushr(word, shift);
            let bit = fb.builder().ins().band_imm(shifted, 1);
            fb.if_then(bit, body)
        })
    }
}
