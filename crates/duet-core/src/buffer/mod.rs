//! Growable buffer shared between host code and generated code
//!
//! [`PodVec`] is a vector over plain-old-data elements whose storage is
//! described by a fixed three-pointer record ([`VecRecord`]): `start`, `finish`
//! (one past the last used element) and `capend` (one past the capacity).
//! The host methods in this module and the symbolic methods in [`emit`] read
//! and write the same fields at the same offsets, so a buffer filled by
//! generated code can be inspected by the host and vice versa.
//!
//! Growth reallocates the whole region instead of moving elements one by one,
//! which is why elements are bound by [`bytemuck::Pod`]. Both modes grow through
//! the same primitive, [`pod_realloc`].
//!
//! Invariant: `start <= finish <= capend`, elements in `[start, finish)` are
//! initialized, everything past `finish` is indeterminate.

pub mod emit;

use bytemuck::{Pod, Zeroable};
use std::alloc::{self, Layout};
use std::fmt;
use std::marker::PhantomData;
use std::mem::{align_of, offset_of, size_of};
use std::ops::{Deref, DerefMut};
use std::ptr;
use std::slice;

pub use emit::PodVecHandle;

/// Initial capacity (in elements) used when none is given
pub const DEFAULT_INITIAL_CAPACITY: usize = 1024;

/// Raw three-field layout of a [`PodVec`]
///
/// Generated code addresses these fields through the `*_OFFSET` constants.
#[repr(C)]
#[derive(Debug)]
pub struct VecRecord {
    /// First element
    pub start: *mut u8,
    /// One past the last used element
    pub finish: *mut u8,
    /// One past the allocated capacity
    pub capend: *mut u8,
}

impl VecRecord {
    /// Byte offset of `start`
    pub const START_OFFSET: i32 = offset_of!(VecRecord, start) as i32;
    /// Byte offset of `finish`
    pub const FINISH_OFFSET: i32 = offset_of!(VecRecord, finish) as i32;
    /// Byte offset of `capend`
    pub const CAPEND_OFFSET: i32 = offset_of!(VecRecord, capend) as i32;
}

/// Reallocates a buffer region from `old_bytes` to `new_bytes`.
///
/// Host growth calls this directly; generated code calls it by address, so
/// both modes leave the allocator in the same state for the same push
/// sequence. Aborts through [`alloc::handle_alloc_error`] when the allocator
/// fails.
///
/// # Safety
///
/// `ptr` must come from the global allocator with layout `(old_bytes, align)`,
/// and `new_bytes` must be non-zero and not overflow `isize` once rounded up to
/// `align`.
pub unsafe extern "C" fn pod_realloc(
    ptr: *mut u8,
    old_bytes: usize,
    new_bytes: usize,
    align: usize,
) -> *mut u8 {
    // SAFETY: forwarded from the caller contract.
    let new_ptr = unsafe {
        let old = Layout::from_size_align_unchecked(old_bytes, align);
        alloc::realloc(ptr, old, new_bytes)
    };
    if new_ptr.is_null() {
        // SAFETY: `align` is a valid alignment per the caller contract.
        alloc::handle_alloc_error(unsafe { Layout::from_size_align_unchecked(new_bytes, align) });
    }
    new_ptr
}

#[cold]
fn capacity_overflow() -> ! {
    panic!("PodVec capacity overflow");
}

fn checked_bytes<T>(elements: usize) -> usize {
    match elements.checked_mul(size_of::<T>()) {
        Some(bytes) if bytes <= isize::MAX as usize - (align_of::<T>() - 1) => bytes,
        _ => capacity_overflow(),
    }
}

/// Contiguous growable buffer of plain-old-data elements
///
/// `INIT` is the capacity allocated at construction; it must be non-zero,
/// which is checked at compile time. Capacity only ever doubles from there
/// (or changes through [`PodVec::reserve`]), so after `n` pushes onto a fresh
/// buffer the capacity is the smallest `INIT * 2^k` that holds `n` elements.
#[repr(C)]
pub struct PodVec<T: Pod, const INIT: usize = DEFAULT_INITIAL_CAPACITY> {
    record: VecRecord,
    _marker: PhantomData<T>,
}

// SAFETY: the buffer exclusively owns its region and `Pod` elements hold no
// references, so moving or sharing it across threads is as safe as for `Vec`.
unsafe impl<T: Pod + Send, const INIT: usize> Send for PodVec<T, INIT> {}
unsafe impl<T: Pod + Sync, const INIT: usize> Sync for PodVec<T, INIT> {}

impl<T: Pod, const INIT: usize> PodVec<T, INIT> {
    /// Create an empty buffer with `INIT` elements of capacity
    pub fn new() -> Self {
        const {
            assert!(INIT > 0, "PodVec initial capacity must be non-zero");
            assert!(size_of::<T>() > 0, "PodVec does not support zero-sized elements");
        }
        let bytes = checked_bytes::<T>(INIT);
        let layout = match Layout::from_size_align(bytes, align_of::<T>()) {
            Ok(layout) => layout,
            Err(_) => capacity_overflow(),
        };
        // SAFETY: `layout` has a non-zero size.
        let start = unsafe { alloc::alloc(layout) };
        if start.is_null() {
            alloc::handle_alloc_error(layout);
        }
        Self {
            record: VecRecord {
                start,
                finish: start,
                // SAFETY: `bytes` is the size of the allocation.
                capend: unsafe { start.add(bytes) },
            },
            _marker: PhantomData,
        }
    }

    fn used_bytes(&self) -> usize {
        self.record.finish as usize - self.record.start as usize
    }

    fn capacity_bytes(&self) -> usize {
        self.record.capend as usize - self.record.start as usize
    }

    /// Number of elements in use
    #[inline]
    pub fn len(&self) -> usize {
        self.used_bytes() / size_of::<T>()
    }

    /// Number of elements the current region can hold
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity_bytes() / size_of::<T>()
    }

    /// True when no element is in use
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.record.start == self.record.finish
    }

    /// Pointer to the first element
    pub fn as_ptr(&self) -> *const T {
        self.record.start as *const T
    }

    /// Mutable pointer to the first element
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.record.start as *mut T
    }

    /// The raw layout record
    pub fn record(&self) -> &VecRecord {
        &self.record
    }

    /// Active elements as a slice
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: `[start, finish)` holds `len()` initialized, aligned elements.
        unsafe { slice::from_raw_parts(self.as_ptr(), self.len()) }
    }

    /// Active elements as a mutable slice
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let len = self.len();
        // SAFETY: as for `as_slice`, with exclusive access through `&mut self`.
        unsafe { slice::from_raw_parts_mut(self.as_mut_ptr(), len) }
    }

    /// Resize the backing region to hold `capacity` elements, keeping the used
    /// prefix.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or smaller than the current length.
    pub fn reserve(&mut self, capacity: usize) {
        assert!(capacity > 0, "reserve(0): capacity must be positive");
        assert!(
            capacity >= self.len(),
            "reserve({capacity}) below current length {}",
            self.len()
        );
        let used = self.used_bytes();
        let new_bytes = checked_bytes::<T>(capacity);
        // SAFETY: the region was allocated with (capacity_bytes, align_of::<T>()).
        let start = unsafe {
            pod_realloc(
                self.record.start,
                self.capacity_bytes(),
                new_bytes,
                align_of::<T>(),
            )
        };
        self.record.start = start;
        // SAFETY: `used <= new_bytes` by the assertion above.
        unsafe {
            self.record.finish = start.add(used);
            self.record.capend = start.add(new_bytes);
        }
    }

    #[cold]
    #[inline(never)]
    fn grow(&mut self) {
        let bytes = self.capacity_bytes();
        // Never zero: construction and `reserve` both refuse an empty region.
        let doubled = match bytes.checked_mul(2) {
            Some(doubled) if doubled <= isize::MAX as usize - (align_of::<T>() - 1) => doubled,
            _ => capacity_overflow(),
        };
        // SAFETY: the region was allocated with (bytes, align_of::<T>()).
        let start = unsafe { pod_realloc(self.record.start, bytes, doubled, align_of::<T>()) };
        self.record.start = start;
        // SAFETY: the buffer was full, so the used prefix is exactly `bytes`.
        unsafe {
            self.record.finish = start.add(bytes);
            self.record.capend = start.add(doubled);
        }
    }

    /// Append `value`, doubling the capacity first when full
    #[inline]
    pub fn push_back(&mut self, value: T) {
        if self.record.finish == self.record.capend {
            self.grow();
        }
        // SAFETY: `finish < capend` and is aligned for `T`.
        unsafe {
            ptr::write(self.record.finish as *mut T, value);
            self.record.finish = self.record.finish.add(size_of::<T>());
        }
    }

    /// Append a zeroed element and return it for in-place initialization
    pub fn emplace_back(&mut self) -> &mut T {
        self.push_back(<T as Zeroable>::zeroed());
        let last = self.len() - 1;
        &mut self.as_mut_slice()[last]
    }

    /// Remove and return the last element
    ///
    /// # Panics
    ///
    /// Panics if the buffer is empty.
    pub fn pop_back(&mut self) -> T {
        assert!(!self.is_empty(), "pop_back on empty PodVec");
        // SAFETY: non-empty, so `finish - size_of::<T>()` is the last element.
        unsafe {
            self.record.finish = self.record.finish.sub(size_of::<T>());
            ptr::read(self.record.finish as *const T)
        }
    }

    /// Drop every element; capacity is unchanged
    pub fn clear(&mut self) {
        self.record.finish = self.record.start;
    }

    /// Move `finish` to `start + len` without touching memory
    ///
    /// # Safety
    ///
    /// `len` must not exceed the capacity, and elements in `[old_len, len)`
    /// must be written before they are read.
    pub unsafe fn resize(&mut self, len: usize) {
        debug_assert!(len <= self.capacity(), "resize({len}) beyond capacity");
        // SAFETY: within the allocation per the caller contract.
        self.record.finish = unsafe { self.record.start.add(len * size_of::<T>()) };
    }

    /// Truncate the buffer so that `new_end` becomes one past the last element
    ///
    /// # Safety
    ///
    /// `new_end` must point into `[start, finish]` of this buffer and be
    /// element-aligned.
    pub unsafe fn erase_end(&mut self, new_end: *const T) {
        debug_assert!(
            new_end as usize >= self.record.start as usize
                && new_end as usize <= self.record.finish as usize
        );
        self.record.finish = new_end as *mut u8;
    }

    /// Exchange contents (all three fields) with `other`
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(&mut self.record, &mut other.record);
    }
}

impl<T: Pod, const INIT: usize> Drop for PodVec<T, INIT> {
    fn drop(&mut self) {
        // SAFETY: the region is owned and was allocated with this layout.
        unsafe {
            alloc::dealloc(
                self.record.start,
                Layout::from_size_align_unchecked(self.capacity_bytes(), align_of::<T>()),
            );
        }
    }
}

impl<T: Pod, const INIT: usize> Default for PodVec<T, INIT> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Pod, const INIT: usize> Deref for PodVec<T, INIT> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T: Pod, const INIT: usize> DerefMut for PodVec<T, INIT> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

/// Equal when the active ranges have the same length and the same bytes;
/// capacity is ignored.
impl<T: Pod, const A: usize, const B: usize> PartialEq<PodVec<T, B>> for PodVec<T, A> {
    fn eq(&self, other: &PodVec<T, B>) -> bool {
        bytemuck::cast_slice::<T, u8>(self.as_slice())
            == bytemuck::cast_slice::<T, u8>(other.as_slice())
    }
}

impl<T: Pod, const INIT: usize> Eq for PodVec<T, INIT> {}

impl<T: Pod + fmt::Debug, const INIT: usize> fmt::Debug for PodVec<T, INIT> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

impl<T: Pod, const INIT: usize> Extend<T> for PodVec<T, INIT> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push_back(value);
        }
    }
}

impl<T: Pod, const INIT: usize> FromIterator<T> for PodVec<T, INIT> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut vec = Self::new();
        vec.extend(iter);
        vec
    }
}

impl<T: Pod, const INIT: usize> From<&[T]> for PodVec<T, INIT> {
    fn from(values: &[T]) -> Self {
        values.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_layout() {
        let ptr = size_of::<*mut u8>() as i32;
        assert_eq!(VecRecord::START_OFFSET, 0);
        assert_eq!(VecRecord::FINISH_OFFSET, ptr);
        assert_eq!(VecRecord::CAPEND_OFFSET, 2 * ptr);
        assert_eq!(size_of::<PodVec<u64>>(), size_of::<VecRecord>());
        assert_eq!(offset_of!(PodVec<u32, 8>, record), 0);
    }

    #[test]
    fn test_new_is_empty_with_initial_capacity() {
        let vec = PodVec::<u64, 16>::new();
        assert!(vec.is_empty());
        assert_eq!(vec.len(), 0);
        assert_eq!(vec.capacity(), 16);

        let default = PodVec::<u32>::default();
        assert_eq!(default.capacity(), DEFAULT_INITIAL_CAPACITY);
    }

    #[test]
    fn test_push_doubles_when_full() {
        // capacity 4, fifth push doubles
        let mut vec = PodVec::<u64, 4>::new();
        for value in [10, 20, 30, 40] {
            vec.push_back(value);
        }
        assert_eq!(vec.capacity(), 4);
        vec.push_back(50);
        assert_eq!(vec.capacity(), 8);
        assert_eq!(vec.len(), 5);
        assert_eq!(vec.as_slice(), &[10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_pop_back_equals_fresh_buffer() {
        // popping restores equality with a buffer that never held 4
        let mut vec = PodVec::<u64, 2>::from(&[1, 2, 3, 4][..]);
        assert_eq!(vec.pop_back(), 4);
        let fresh = PodVec::<u64, 64>::from(&[1, 2, 3][..]);
        assert_ne!(vec.capacity(), fresh.capacity());
        assert_eq!(vec, fresh);
    }

    #[test]
    #[should_panic(expected = "pop_back on empty PodVec")]
    fn test_pop_back_empty_panics() {
        let mut vec = PodVec::<u64, 4>::new();
        vec.pop_back();
    }

    #[test]
    fn test_equality_ignores_capacity_but_not_contents() {
        let mut a = PodVec::<u32, 4>::from(&[7, 8, 9][..]);
        let b = PodVec::<u32, 128>::from(&[7, 8, 9][..]);
        assert_eq!(a, b);
        a[1] = 42;
        assert_ne!(a, b);
        a[1] = 8;
        a.push_back(10);
        assert_ne!(a, b);
    }

    #[test]
    fn test_reserve_grows_and_shrinks() {
        let mut vec = PodVec::<u64, 4>::from(&[1, 2, 3][..]);
        vec.reserve(100);
        assert_eq!(vec.capacity(), 100);
        assert_eq!(vec.as_slice(), &[1, 2, 3]);
        vec.reserve(3);
        assert_eq!(vec.capacity(), 3);
        vec.push_back(4);
        assert_eq!(vec.capacity(), 6);
        assert_eq!(vec.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    #[should_panic(expected = "below current length")]
    fn test_reserve_below_length_panics() {
        let mut vec = PodVec::<u64, 4>::from(&[1, 2, 3][..]);
        vec.reserve(2);
    }

    #[test]
    #[should_panic(expected = "capacity must be positive")]
    fn test_reserve_zero_panics() {
        let mut vec = PodVec::<u64>::new();
        vec.reserve(0);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut vec: PodVec<u64, 2> = (0..9).collect();
        let capacity = vec.capacity();
        vec.clear();
        assert!(vec.is_empty());
        assert_eq!(vec.capacity(), capacity);
    }

    #[test]
    fn test_resize_and_erase_end() {
        let mut vec: PodVec<u64, 8> = (1..=6).collect();
        unsafe { vec.resize(4) };
        assert_eq!(vec.as_slice(), &[1, 2, 3, 4]);

        let end = unsafe { vec.as_ptr().add(2) };
        unsafe { vec.erase_end(end) };
        assert_eq!(vec.as_slice(), &[1, 2]);
    }

    #[test]
    fn test_emplace_back() {
        #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
        #[repr(C)]
        struct Pair {
            key: u64,
            value: u64,
        }

        let mut vec = PodVec::<Pair, 1>::new();
        let slot = vec.emplace_back();
        assert_eq!(*slot, Pair { key: 0, value: 0 });
        slot.key = 3;
        slot.value = 9;
        vec.emplace_back().key = 4;
        assert_eq!(vec.len(), 2);
        assert_eq!(vec[0], Pair { key: 3, value: 9 });
        assert_eq!(vec[1], Pair { key: 4, value: 0 });
    }

    #[test]
    fn test_swap() {
        let mut a = PodVec::<u16, 4>::from(&[1, 2][..]);
        let mut b = PodVec::<u16, 4>::from(&[3, 4, 5, 6, 7][..]);
        a.swap(&mut b);
        assert_eq!(a.as_slice(), &[3, 4, 5, 6, 7]);
        assert_eq!(a.capacity(), 8);
        assert_eq!(b.as_slice(), &[1, 2]);
        assert_eq!(b.capacity(), 4);
    }

    #[test]
    fn test_debug_lists_active_elements() {
        let vec = PodVec::<u8, 4>::from(&[1, 2, 3][..]);
        assert_eq!(format!("{vec:?}"), "[1, 2, 3]");
    }

    #[test]
    fn test_pod_realloc_preserves_prefix() {
        let layout = Layout::from_size_align(16, 8).unwrap();
        unsafe {
            let ptr = alloc::alloc(layout);
            ptr::write_bytes(ptr, 0xAB, 16);
            let grown = pod_realloc(ptr, 16, 64, 8);
            assert!(slice::from_raw_parts(grown, 16).iter().all(|&b| b == 0xAB));
            alloc::dealloc(grown, Layout::from_size_align(64, 8).unwrap());
        }
    }
}
