//! C2: guest physical memory — allocation, KVM registration, and byte-level
//! writes used by the image loader and the page-table builder.

use kvm_bindings::kvm_userspace_memory_region;
use kvm_ioctls::VmFd;
use vm_memory::{Bytes, GuestAddress, GuestMemory, GuestMemoryMmap, GuestMemoryRegion};

use crate::error::{Error, Result};

pub const PAGE_SIZE: u64 = 4096;

/// Rounds `bytes` up to a whole number of 4096-byte pages.
pub fn page_align(bytes: u64) -> u64 {
    (bytes + PAGE_SIZE - 1) / PAGE_SIZE * PAGE_SIZE
}

/// Bookkeeping for one registered guest-physical region. The backing host
/// mapping itself lives inside the `GuestMemoryMmap` that produced it; this
/// struct only remembers where it sits and which KVM slot it occupies.
#[derive(Debug, Clone, Copy)]
pub struct GuestRegionInfo {
    pub guest_base: u64,
    pub size: u64,
    pub slot: u32,
}

/// Allocates one zero-filled, page-aligned anonymous mapping per `(base,
/// size)` pair and wraps them all in a single `GuestMemoryMmap`, so that
/// writes and reads can address either region by guest physical address
/// without the caller tracking which host mapping backs which range.
pub fn allocate(ranges: &[(GuestAddress, usize)]) -> Result<GuestMemoryMmap<()>> {
    GuestMemoryMmap::from_ranges(ranges).map_err(|e| Error::MemoryRegistrationFailed(e.to_string()))
}

/// Registers every region of `mem` with the VM container, in iteration
/// order, as consecutive KVM slots starting at 0 (RAM is slot 0; the
/// long-mode page table, when present, is slot 1).
pub fn register_all(vm: &VmFd, mem: &GuestMemoryMmap<()>) -> Result<Vec<GuestRegionInfo>> {
    let mut regions = Vec::new();
    for (slot, region) in mem.iter().enumerate() {
        let slot = u32::try_from(slot).expect("fewer than u32::MAX guest regions");
        let host_addr = region
            .get_host_address(vm_memory::MemoryRegionAddress(0))
            .map_err(|e| Error::MemoryRegistrationFailed(e.to_string()))?;

        // SAFETY: `host_addr` points into the mmap owned by `mem`, which
        // outlives the `VmFd` for the remainder of the session.
        unsafe {
            vm.set_user_memory_region(kvm_userspace_memory_region {
                slot,
                guest_phys_addr: region.start_addr().0,
                memory_size: region.len(),
                userspace_addr: host_addr as u64,
                flags: 0,
            })
        }
        .map_err(|e| Error::MemoryRegistrationFailed(e.to_string()))?;

        tracing::info!(
            slot,
            guest_base = format_args!("{:#x}", region.start_addr().0),
            size = region.len(),
            "guest memory region registered"
        );

        regions.push(GuestRegionInfo {
            guest_base: region.start_addr().0,
            size: region.len(),
            slot,
        });
    }
    Ok(regions)
}

/// Copies `bytes` into guest memory at `addr`. The caller ensures the write
/// stays within a registered region.
pub fn write(mem: &GuestMemoryMmap<()>, addr: GuestAddress, bytes: &[u8]) -> Result<()> {
    mem.write_slice(bytes, addr).map_err(Error::GuestMemory)
}

/// Writes a single little-endian `u64` (a page-table entry) at `addr`.
pub fn write_u64(mem: &GuestMemoryMmap<()>, addr: GuestAddress, value: u64) -> Result<()> {
    mem.write_obj(value, addr).map_err(Error::GuestMemory)
}
