//! C6: the orchestrator. Wires C1–C5 together for one image execution and
//! owns every resource `VmSession` lists.
//!
//! Every field below is an owning Rust type (`Kvm`, `VmFd`, `VcpuFd`,
//! `GuestMemoryMmap`) whose `Drop` impl releases its kernel resource.
//! Rust drops struct fields in forward declaration order (unlike local
//! variables, which drop in reverse), so the fields here are declared in
//! reverse acquisition order — last-acquired first — which makes plain
//! field drop release everything in reverse of how it was acquired, with
//! no manual teardown function needed.

use std::path::Path;

use kvm_ioctls::{VcpuFd, VmFd};
use vm_memory::{GuestAddress, GuestMemoryMmap};

use crate::boot::{self, VmMode, VmOptions};
use crate::error::{Error, Result};
use crate::hypervisor::HostHypervisor;
use crate::loader;
use crate::memory::{self, GuestRegionInfo};
use crate::pagetable::PageTableLayout;
use crate::runloop;

pub struct Session {
    _memory: GuestMemoryMmap<()>,
    page_table_region: Option<GuestRegionInfo>,
    vcpu: VcpuFd,
    _vm: VmFd,
    _hypervisor: HostHypervisor,
    ram_region: GuestRegionInfo,
}

impl Session {
    /// Builds a `Session` for `image_path` under `options`: opens the
    /// hypervisor, allocates and registers guest memory (RAM, plus an
    /// identity-mapping page table when Long mode needs one), loads the
    /// image, and assembles boot state. Every failure here is fatal and
    /// propagates before the vCPU is ever resumed.
    pub fn boot(options: VmOptions, image_path: &Path) -> Result<Self> {
        let hypervisor = HostHypervisor::open()?;
        hypervisor.runblock_size()?;

        let vm = hypervisor.create_vm()?;
        let vcpu = vm.create_vcpu(0).map_err(Error::HypervisorUnavailable)?;

        let mem_bytes = memory::page_align(options.mem_bytes);
        let needs_page_table = options.mode == VmMode::Long && options.external_page_table_base.is_none();

        let mut ranges = vec![(GuestAddress(0), mem_bytes as usize)];
        if needs_page_table {
            let layout = PageTableLayout::compute(mem_bytes, mem_bytes);
            ranges.push((GuestAddress(mem_bytes), layout.region_size() as usize));
        }

        let mem = memory::allocate(&ranges)?;
        let mut regions = memory::register_all(&vm, &mem)?;
        let ram_region = regions.remove(0);
        let page_table_region = needs_page_table.then(|| regions.remove(0));

        loader::load_image(image_path, &mem, mem_bytes)?;

        boot::assemble(&vcpu, &mem, &options, mem_bytes)?;

        Ok(Self {
            _memory: mem,
            page_table_region,
            vcpu,
            _vm: vm,
            _hypervisor: hypervisor,
            ram_region,
        })
    }

    /// Drives the vCPU through run iterations until a clean shutdown, an
    /// unhandled exit, or a run failure.
    pub fn run(&mut self) -> Result<()> {
        runloop::run(&mut self.vcpu)
    }

    pub fn ram_region(&self) -> GuestRegionInfo {
        self.ram_region
    }

    pub fn page_table_region(&self) -> Option<GuestRegionInfo> {
        self.page_table_region
    }
}
