//! The kernel heap: a bump allocator over a static backing region.
//!
//! Grounded on the reference kernel's `memory/allocator.rs` for the
//! `Locked<BumpAllocator>`-as-`#[global_allocator]` shape. Simplified
//! to back the bump region with a static array living in the kernel
//! image's own identity-mapped low region (the same assumption
//! `memory::page_table`'s module doc already documents for
//! `Box<PageTable>`) instead of mapping fresh pages for it: page
//! mapping for the heap itself is an external collaborator's job, not
//! this core's (see DESIGN.md).

use core::alloc::{GlobalAlloc, Layout};
use core::cell::UnsafeCell;
use spin::Mutex;

/// Heap size available to `Box`/`Vec`/`String` allocations.
const HEAP_SIZE: usize = 256 * 1024;

#[repr(align(16))]
struct HeapStorage(UnsafeCell<[u8; HEAP_SIZE]>);

unsafe impl Sync for HeapStorage {}

#[cfg(not(test))]
static HEAP: HeapStorage = HeapStorage(UnsafeCell::new([0; HEAP_SIZE]));

struct BumpAllocator {
    start: usize,
    end: usize,
    next: usize,
}

impl BumpAllocator {
    const fn empty() -> Self {
        BumpAllocator { start: 0, end: 0, next: 0 }
    }

    /// # Safety
    /// `start..start + size` must be valid, writable memory not aliased
    /// by anything else, and this must run at most once before any
    /// `alloc` call.
    unsafe fn init(&mut self, start: usize, size: usize) {
        self.start = start;
        self.end = start + size;
        self.next = start;
    }

    fn allocate(&mut self, layout: Layout) -> *mut u8 {
        let alloc_start = align_up(self.next, layout.align());
        let alloc_end = match alloc_start.checked_add(layout.size()) {
            Some(end) => end,
            None => return core::ptr::null_mut(),
        };
        if alloc_end > self.end {
            core::ptr::null_mut()
        } else {
            self.next = alloc_end;
            alloc_start as *mut u8
        }
    }
}

fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

/// Wraps `spin::Mutex` so `GlobalAlloc` (which only gets `&self`) can be
/// implemented on a `static`.
pub struct Locked<A> {
    inner: Mutex<A>,
}

impl<A> Locked<A> {
    const fn new(inner: A) -> Self {
        Locked { inner: Mutex::new(inner) }
    }
}

unsafe impl GlobalAlloc for Locked<BumpAllocator> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.inner.lock().allocate(layout)
    }

    /// Never reclaimed: a bump allocator only grows. This core has no
    /// use for freeing kernel-heap memory (see DESIGN.md).
    unsafe fn dealloc(&self, _ptr: *mut u8, _layout: Layout) {}
}

#[cfg(not(test))]
#[global_allocator]
static ALLOCATOR: Locked<BumpAllocator> = Locked::new(BumpAllocator::empty());

/// Point the allocator at its backing storage. Must run once, before
/// the first heap allocation, right after `memory::init`.
#[cfg(not(test))]
pub fn init() {
    unsafe {
        ALLOCATOR.inner.lock().init(HEAP.0.get() as usize, HEAP_SIZE);
    }
    log::info!("Kernel heap ready, {} bytes", HEAP_SIZE);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_next_multiple() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(17, 16), 32);
    }

    #[test]
    fn bump_allocator_returns_increasing_aligned_addresses() {
        let mut a = BumpAllocator::empty();
        unsafe { a.init(0x1000, 0x100) };
        let layout = Layout::from_size_align(8, 8).unwrap();
        let p0 = a.allocate(layout);
        let p1 = a.allocate(layout);
        assert_eq!(p0 as usize, 0x1000);
        assert_eq!(p1 as usize, 0x1008);
    }

    #[test]
    fn bump_allocator_fails_past_end() {
        let mut a = BumpAllocator::empty();
        unsafe { a.init(0x1000, 8) };
        let layout = Layout::from_size_align(16, 8).unwrap();
        assert!(a.allocate(layout).is_null());
    }
}
