//! Membership indexes consumed by semi-joins
//!
//! - [`BitsetTable`]: dense bitset over the value range of a key column,
//!   with a host lookup and an inlinable generated check

mod bitset;

pub use bitset::BitsetTable;
