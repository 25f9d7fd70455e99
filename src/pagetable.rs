//! C3: 4-level identity-mapping page-table builder, used only in Long mode
//! when no external page-table base is supplied.
//!
//! The sizing and fill algorithm is generic over `mem_bytes`, rather than a
//! fixed-size 2 MiB-hugepage direct map: every level is computed from the
//! level below it, with 4 KiB leaf pages, so the table scales from a 4 KiB
//! guest up to a 512 GiB one without a recompile.

use vm_memory::{GuestAddress, GuestMemoryMmap};

use crate::error::Result;
use crate::memory::{self, PAGE_SIZE};

const PRESENT_WRITABLE: u64 = 0x03;
const NUM_LEVELS: usize = 4;

fn ceil_div(n: u64, d: u64) -> u64 {
    n.div_ceil(d)
}

/// One level of the 4-level hierarchy: how many 4 KiB pages it occupies and
/// where, within the page-table region, it starts.
#[derive(Debug, Clone, Copy)]
struct Level {
    page_count: u64,
    offset_pages: u64,
}

/// Sizing and placement of the whole 4-level hierarchy relative to the
/// region's own guest base (`region_base`, immediately above RAM).
#[derive(Debug, Clone, Copy)]
pub struct PageTableLayout {
    levels: [Level; NUM_LEVELS],
    pub total_pages: u64,
    pub region_base: u64,
}

impl PageTableLayout {
    /// `pages[0] = ceil(mem_bytes / 4096)`; each subsequent level holds one
    /// entry per page of the level below it, so `pages[L] =
    /// ceil(pages[L-1] * 8 / 4096)`.
    pub fn compute(mem_bytes: u64, region_base: u64) -> Self {
        let mut page_counts = [0u64; NUM_LEVELS];
        page_counts[0] = ceil_div(mem_bytes, PAGE_SIZE);
        for level in 1..NUM_LEVELS {
            page_counts[level] = ceil_div(page_counts[level - 1] * 8, PAGE_SIZE);
        }

        let mut levels = [Level { page_count: 0, offset_pages: 0 }; NUM_LEVELS];
        let mut offset = 0u64;
        for level in 0..NUM_LEVELS {
            levels[level] = Level { page_count: page_counts[level], offset_pages: offset };
            offset += page_counts[level];
        }

        Self { levels, total_pages: offset, region_base }
    }

    /// Total size of the region, in bytes.
    pub fn region_size(&self) -> u64 {
        self.total_pages * PAGE_SIZE
    }

    /// Guest base address of level `L` (0 = deepest / PT-equivalent).
    fn level_base(&self, level: usize) -> u64 {
        self.region_base + self.levels[level].offset_pages * PAGE_SIZE
    }

    /// CR3: the base of the topmost level, which sits in the last page(s)
    /// of the region. For every `mem_bytes` this crate supports this is the
    /// region's final page.
    pub fn cr3(&self) -> u64 {
        self.level_base(NUM_LEVELS - 1)
    }

    /// Writes every populated entry of every level into `mem`. Entries
    /// beyond the last populated index in a level are left zero (the
    /// region is allocated zero-filled, so there is nothing to do there).
    pub fn fill(&self, mem: &GuestMemoryMmap<()>) -> Result<()> {
        for level in 0..NUM_LEVELS {
            let child_base = if level == 0 { 0 } else { self.level_base(level - 1) };
            let entry_count = self.levels[level].page_count;
            let level_base = self.level_base(level);

            for i in 0..entry_count {
                let entry = child_base + i * PAGE_SIZE + PRESENT_WRITABLE;
                let addr = GuestAddress(level_base + i * 8);
                memory::write_u64(mem, addr, entry)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total_pages_reference(mem_bytes: u64) -> u64 {
        let p0 = ceil_div(mem_bytes, PAGE_SIZE);
        let p1 = ceil_div(p0 * 8, PAGE_SIZE);
        let p2 = ceil_div(p1 * 8, PAGE_SIZE);
        let p3 = ceil_div(p2 * 8, PAGE_SIZE);
        p0 + p1 + p2 + p3
    }

    #[test]
    fn sizing_matches_reference_formula() {
        for mem_bytes in [4096u64, 1 << 20, 1 << 30, 512u64 << 30] {
            let layout = PageTableLayout::compute(mem_bytes, mem_bytes);
            assert_eq!(layout.total_pages, total_pages_reference(mem_bytes));
        }
    }

    #[test]
    fn cr3_is_last_page_of_region() {
        let mem_bytes = 1u64 << 20;
        let layout = PageTableLayout::compute(mem_bytes, mem_bytes);
        assert_eq!(layout.cr3(), mem_bytes + (layout.total_pages - 1) * PAGE_SIZE);
    }

    #[test]
    fn top_level_is_a_single_page_for_realistic_sizes() {
        for mem_bytes in [4096u64, 1 << 20, 1 << 30, 512u64 << 30] {
            let layout = PageTableLayout::compute(mem_bytes, mem_bytes);
            assert_eq!(layout.levels[NUM_LEVELS - 1].page_count, 1);
        }
    }
}
