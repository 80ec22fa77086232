//! Resizing the pixel buffers must not hold the old and new pair at once.
//! Lives in its own test binary because it installs a counting allocator.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

use renderer::PixelBuffers;

struct Counting;

static CURRENT: AtomicUsize = AtomicUsize::new(0);
static PEAK: AtomicUsize = AtomicUsize::new(0);

unsafe impl GlobalAlloc for Counting {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            let now = CURRENT.fetch_add(layout.size(), Ordering::SeqCst) + layout.size();
            PEAK.fetch_max(now, Ordering::SeqCst);
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc_zeroed(layout);
        if !ptr.is_null() {
            let now = CURRENT.fetch_add(layout.size(), Ordering::SeqCst) + layout.size();
            PEAK.fetch_max(now, Ordering::SeqCst);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        CURRENT.fetch_sub(layout.size(), Ordering::SeqCst);
    }
}

#[global_allocator]
static ALLOCATOR: Counting = Counting;

#[test]
fn resize_releases_old_buffers_before_allocating() {
    const SIDE: u32 = 1024;
    let pair_bytes = 2 * (SIDE as usize) * (SIDE as usize) * 4;

    let mut buffers = PixelBuffers::new();
    assert!(buffers.ensure_capacity(SIDE, SIDE));

    let baseline = CURRENT.load(Ordering::SeqCst);
    PEAK.store(baseline, Ordering::SeqCst);
    assert!(buffers.ensure_capacity(SIDE, SIDE + 1));

    let growth = PEAK.load(Ordering::SeqCst) - baseline;
    // The new pair is slightly larger than the old one; holding both would
    // roughly double the peak.
    assert!(
        growth < pair_bytes / 2,
        "peak grew by {growth} bytes during a {pair_bytes} byte resize"
    );
}
