//! GDT / TSS setup.
//!
//! Grounded on the reference kernel's `gdt.rs` (the `OnceCell`-guarded
//! singleton TSS plus an `AtomicPtr<TaskStateSegment>` fast path for
//! [`set_kernel_stack`], and the overall init()-builds-TSS-then-GDT
//! ordering) and on the original C core's `struct gdt`/`struct tss`
//! byte layouts (`include/hal/hal.h`), since the `x86_64` crate's
//! descriptor types assume long mode and cannot express a flat 32-bit
//! segment.

use conquer_once::spin::OnceCell;
use core::mem::size_of;
use core::sync::atomic::{AtomicPtr, Ordering};

/// Number of GDT entries: null, kernel code, kernel data, user code, user data, TSS.
pub const NUM_GDT_ENTRIES: usize = 6;

pub const SEL_NULL: u16 = 0;
pub const SEL_KERNEL_CODE: u16 = 1 * 8;
pub const SEL_KERNEL_DATA: u16 = 2 * 8;
pub const SEL_USER_CODE: u16 = (3 * 8) | 3;
pub const SEL_USER_DATA: u16 = (4 * 8) | 3;
pub const SEL_TSS: u16 = 5 * 8;

const ACCESS_PRESENT: u8 = 1 << 7;
const ACCESS_CODE_DATA_SEGMENT: u8 = 1 << 4; // S bit
const ACCESS_EXECUTABLE: u8 = 1 << 3;
const ACCESS_READWRITE: u8 = 1 << 1;
const ACCESS_TSS_TYPE: u8 = 0x9; // 32-bit TSS (available)

const fn dpl(level: u8) -> u8 {
    level << 5
}

const GRAN_4K: u8 = 1 << 7;
const GRAN_32BIT: u8 = 1 << 6;

/// One flat-segment GDT descriptor, matching the hardware's packed 8-byte layout.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct GdtEntry {
    limit_low: u16,
    base_low: u16,
    base_middle: u8,
    access: u8,
    granularity: u8,
    base_high: u8,
}

impl GdtEntry {
    const fn null() -> Self {
        GdtEntry {
            limit_low: 0,
            base_low: 0,
            base_middle: 0,
            access: 0,
            granularity: 0,
            base_high: 0,
        }
    }

    const fn flat(access: u8, granularity: u8) -> Self {
        // base = 0, limit = 0xFFFFF (4 GiB with 4 KiB granularity).
        GdtEntry {
            limit_low: 0xFFFF,
            base_low: 0,
            base_middle: 0,
            access,
            granularity: granularity | 0x0F,
            base_high: 0,
        }
    }

    const fn system(base: u32, limit: u32, access: u8) -> Self {
        GdtEntry {
            limit_low: (limit & 0xFFFF) as u16,
            base_low: (base & 0xFFFF) as u16,
            base_middle: ((base >> 16) & 0xFF) as u8,
            access,
            granularity: ((limit >> 16) & 0x0F) as u8,
            base_high: ((base >> 24) & 0xFF) as u8,
        }
    }
}

#[repr(C, packed)]
struct GdtPointer {
    limit: u16,
    base: u32,
}

/// Task State Segment. Only `ss0`/`esp0` are meaningful for software task
/// switching; every other field stays zero and `iomap_base` is set to the
/// structure size so no I/O permission bitmap is consulted.
#[repr(C, packed)]
pub struct Tss {
    prev_tss: u32,
    pub esp0: u32,
    pub ss0: u32,
    esp1: u32,
    ss1: u32,
    esp2: u32,
    ss2: u32,
    cr3: u32,
    eip: u32,
    eflags: u32,
    eax: u32,
    ecx: u32,
    edx: u32,
    ebx: u32,
    esp: u32,
    ebp: u32,
    esi: u32,
    edi: u32,
    es: u32,
    cs: u32,
    ss: u32,
    ds: u32,
    fs: u32,
    gs: u32,
    ldt: u32,
    trap: u16,
    iomap_base: u16,
}

impl Tss {
    const fn zeroed() -> Self {
        Tss {
            prev_tss: 0,
            esp0: 0,
            ss0: 0,
            esp1: 0,
            ss1: 0,
            esp2: 0,
            ss2: 0,
            cr3: 0,
            eip: 0,
            eflags: 0,
            eax: 0,
            ecx: 0,
            edx: 0,
            ebx: 0,
            esp: 0,
            ebp: 0,
            esi: 0,
            edi: 0,
            es: 0,
            cs: 0,
            ss: 0,
            ds: 0,
            fs: 0,
            gs: 0,
            ldt: 0,
            trap: 0,
            iomap_base: size_of::<Tss>() as u16,
        }
    }
}

static TSS: OnceCell<Tss> = OnceCell::uninit();
static TSS_PTR: AtomicPtr<Tss> = AtomicPtr::new(core::ptr::null_mut());
static GDT: OnceCell<[GdtEntry; NUM_GDT_ENTRIES]> = OnceCell::uninit();

/// Build the TSS and the flat GDT, then load both with `lgdt`/`ltr`.
///
/// Must run once, early in boot, before interrupts are enabled.
pub fn init() {
    let tss_ref = TSS.init_once(Tss::zeroed);
    let tss_ptr = tss_ref as *const Tss as *mut Tss;
    TSS_PTR.store(tss_ptr, Ordering::Release);

    // SAFETY: tss_ptr outlives 'static (TSS is a static OnceCell).
    unsafe {
        (*tss_ptr).ss0 = SEL_KERNEL_DATA as u32;
    }

    let tss_base = tss_ptr as u32;
    let tss_limit = (size_of::<Tss>() - 1) as u32;

    let entries = GDT.init_once(|| {
        [
            GdtEntry::null(),
            GdtEntry::flat(
                ACCESS_PRESENT | dpl(0) | ACCESS_CODE_DATA_SEGMENT | ACCESS_EXECUTABLE | ACCESS_READWRITE,
                GRAN_4K | GRAN_32BIT,
            ),
            GdtEntry::flat(
                ACCESS_PRESENT | dpl(0) | ACCESS_CODE_DATA_SEGMENT | ACCESS_READWRITE,
                GRAN_4K | GRAN_32BIT,
            ),
            GdtEntry::flat(
                ACCESS_PRESENT | dpl(3) | ACCESS_CODE_DATA_SEGMENT | ACCESS_EXECUTABLE | ACCESS_READWRITE,
                GRAN_4K | GRAN_32BIT,
            ),
            GdtEntry::flat(
                ACCESS_PRESENT | dpl(3) | ACCESS_CODE_DATA_SEGMENT | ACCESS_READWRITE,
                GRAN_4K | GRAN_32BIT,
            ),
            GdtEntry::system(tss_base, tss_limit, ACCESS_PRESENT | dpl(0) | ACCESS_TSS_TYPE),
        ]
    });

    let gdt_ptr = GdtPointer {
        limit: (size_of::<[GdtEntry; NUM_GDT_ENTRIES]>() - 1) as u16,
        base: entries.as_ptr() as u32,
    };

    unsafe {
        load_gdt(&gdt_ptr);
        reload_segments();
        load_tss();
    }

    log::info!("GDT initialized: {} flat segments + 1 TSS selector", NUM_GDT_ENTRIES - 2);
}

/// Write the TSS `esp0` field so the next ring-3 -> ring-0 transition lands
/// on `top`. Called on every thread switch by the scheduler.
pub fn set_kernel_stack(top: u32) {
    let ptr = TSS_PTR.load(Ordering::Acquire);
    debug_assert!(!ptr.is_null(), "set_kernel_stack called before gdt::init()");
    if !ptr.is_null() {
        unsafe {
            (*ptr).esp0 = top;
        }
    }
}

#[cfg(not(test))]
unsafe fn load_gdt(ptr: &GdtPointer) {
    core::arch::asm!("lgdt [{}]", in(reg) ptr, options(nostack, preserves_flags));
}

#[cfg(test)]
unsafe fn load_gdt(_ptr: &GdtPointer) {}

#[cfg(not(test))]
unsafe fn reload_segments() {
    core::arch::asm!(
        "push {code_sel}",
        "lea {tmp}, [2f]",
        "push {tmp}",
        "retf",
        "2:",
        "mov ax, {data_sel:x}",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "mov ss, ax",
        code_sel = const SEL_KERNEL_CODE as u32,
        data_sel = in(reg) SEL_KERNEL_DATA,
        tmp = lateout(reg) _,
        options(preserves_flags),
    );
}

#[cfg(test)]
unsafe fn reload_segments() {}

#[cfg(not(test))]
unsafe fn load_tss() {
    core::arch::asm!("ltr {0:x}", in(reg) SEL_TSS, options(nostack, preserves_flags));
}

#[cfg(test)]
unsafe fn load_tss() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_indices_match_ring() {
        assert_eq!(SEL_KERNEL_CODE & 3, 0);
        assert_eq!(SEL_KERNEL_DATA & 3, 0);
        assert_eq!(SEL_USER_CODE & 3, 3);
        assert_eq!(SEL_USER_DATA & 3, 3);
    }

    #[test]
    fn tss_iomap_base_disables_io_bitmap() {
        let tss = Tss::zeroed();
        assert_eq!(tss.iomap_base as usize, size_of::<Tss>());
    }
}
