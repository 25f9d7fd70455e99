//! C4: builds a legal architectural CPU state for a chosen x86 mode and
//! writes it into the vCPU, per the segment-configuration table and
//! mode-specific control-register deltas.

use kvm_bindings::kvm_segment;
use kvm_ioctls::VcpuFd;
use vm_memory::GuestMemoryMmap;

use crate::error::{Error, Result};
use crate::pagetable::PageTableLayout;

const CR0_PE: u64 = 1 << 0;
const CR0_PG: u64 = 1 << 31;
const CR4_PAE: u64 = 1 << 5;
const EFER_LME_LMA: u64 = 0x500;

const CODE_TYPE: u8 = 0x0B;
const DATA_TYPE: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmMode {
    Real,
    Protected,
    Long,
}

impl VmMode {
    pub fn name(self) -> &'static str {
        match self {
            VmMode::Real => "real",
            VmMode::Protected => "protected",
            VmMode::Long => "long",
        }
    }

    /// Exclusive upper bound on a legal entry point for this mode, or
    /// `None` when the mode places no constraint (Long mode).
    fn entry_limit(self) -> Option<u64> {
        match self {
            VmMode::Real => Some(1 << 16),
            VmMode::Protected => Some(1 << 32),
            VmMode::Long => None,
        }
    }
}

/// Input to `BootStateAssembler::assemble`.
pub struct VmOptions {
    pub mode: VmMode,
    pub mem_bytes: u64,
    pub entry_point: u64,
    pub external_page_table_base: Option<u64>,
}

struct SegmentShape {
    selector_code: u16,
    selector_data: u16,
    limit: u32,
    db: u8,
    l: u8,
    g: u8,
}

fn segment_shape(mode: VmMode) -> SegmentShape {
    match mode {
        VmMode::Real => SegmentShape { selector_code: 0, selector_data: 0, limit: 0xFFFF, db: 0, l: 0, g: 0 },
        VmMode::Protected => SegmentShape { selector_code: 8, selector_data: 16, limit: 0xFFFF_FFFF, db: 1, l: 0, g: 1 },
        VmMode::Long => SegmentShape { selector_code: 8, selector_data: 16, limit: 0xFFFF_FFFF, db: 0, l: 1, g: 1 },
    }
}

fn make_segment(selector: u16, type_: u8, shape: &SegmentShape) -> kvm_segment {
    kvm_segment {
        base: 0,
        limit: shape.limit,
        selector,
        type_,
        present: 1,
        dpl: 0,
        db: shape.db,
        s: 1,
        l: shape.l,
        g: shape.g,
        avl: 0,
        unusable: 0,
        padding: 0,
    }
}

/// Assembles boot state for `options` and writes it into `vcpu`. For Long
/// mode without an external page-table base, also builds and fills the
/// identity-mapping hierarchy in `mem`, returning its layout so the caller
/// can register its region and report the CR3 used.
pub fn assemble(
    vcpu: &VcpuFd,
    mem: &GuestMemoryMmap<()>,
    options: &VmOptions,
    page_table_region_base: u64,
) -> Result<Option<PageTableLayout>> {
    if let Some(limit) = options.mode.entry_limit() {
        if options.entry_point >= limit {
            return Err(Error::EntryTooHigh { entry: options.entry_point, mode: options.mode.name() });
        }
    }

    let mut regs = vcpu.get_regs().map_err(Error::RegisterAccessFailed)?;
    regs.rip = options.entry_point;
    vcpu.set_regs(&regs).map_err(Error::RegisterAccessFailed)?;

    let mut sregs = vcpu.get_sregs().map_err(Error::RegisterAccessFailed)?;

    let shape = segment_shape(options.mode);
    let code = make_segment(shape.selector_code, CODE_TYPE, &shape);
    let data = make_segment(shape.selector_data, DATA_TYPE, &shape);

    sregs.cs = code;
    sregs.ds = data;
    sregs.es = data;
    sregs.fs = data;
    sregs.gs = data;
    sregs.ss = data;

    let layout = match options.mode {
        VmMode::Real => None,
        VmMode::Protected => {
            sregs.cr0 |= CR0_PE;
            None
        }
        VmMode::Long => {
            sregs.cr0 |= CR0_PE | CR0_PG;
            sregs.cr4 |= CR4_PAE;
            sregs.efer |= EFER_LME_LMA;

            if let Some(base) = options.external_page_table_base {
                sregs.cr3 = base;
                tracing::info!(cr3 = format_args!("{base:#x}"), "using external page-table base");
                None
            } else {
                let layout = PageTableLayout::compute(options.mem_bytes, page_table_region_base);
                layout.fill(mem)?;
                sregs.cr3 = layout.cr3();
                tracing::info!(
                    cr3 = format_args!("{:#x}", layout.cr3()),
                    total_pages = layout.total_pages,
                    "identity-mapping page table built"
                );
                Some(layout)
            }
        }
    };

    vcpu.set_sregs(&sregs).map_err(Error::RegisterAccessFailed)?;
    tracing::info!(mode = options.mode.name(), entry = format_args!("{:#x}", options.entry_point), "boot state assembled");

    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_mode_rejects_high_entry() {
        assert_eq!(VmMode::Real.entry_limit(), Some(1 << 16));
        assert!(VmMode::Real.entry_limit().unwrap() <= 0x10000);
    }

    #[test]
    fn protected_mode_rejects_high_entry() {
        assert_eq!(VmMode::Protected.entry_limit(), Some(1u64 << 32));
    }

    #[test]
    fn long_mode_has_no_entry_limit() {
        assert_eq!(VmMode::Long.entry_limit(), None);
    }

    #[test]
    fn segment_shapes_match_spec_table() {
        let real = segment_shape(VmMode::Real);
        assert_eq!((real.selector_code, real.selector_data, real.limit, real.db, real.l, real.g), (0, 0, 0xFFFF, 0, 0, 0));

        let prot = segment_shape(VmMode::Protected);
        assert_eq!((prot.selector_code, prot.selector_data, prot.limit, prot.db, prot.l, prot.g), (8, 16, 0xFFFF_FFFF, 1, 0, 1));

        let long = segment_shape(VmMode::Long);
        assert_eq!((long.selector_code, long.selector_data, long.limit, long.db, long.l, long.g), (8, 16, 0xFFFF_FFFF, 0, 1, 1));
    }
}
