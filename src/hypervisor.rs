//! C1: thin wrapper over the host kernel's virtualization control channel.
//!
//! `kvm-ioctls` already owns the file descriptors for us (`Kvm` and `VmFd`
//! both close on drop), so this module's job is narrower than the raw
//! ioctl surface it wraps: translate the three operations the rest of the
//! crate needs (open the device, create a VM, learn the vcpu run-block
//! size) into the crate's own error taxonomy, with one log line per step.

use kvm_ioctls::{Kvm, VmFd};

use crate::error::{Error, Result};

pub struct HostHypervisor {
    kvm: Kvm,
}

impl HostHypervisor {
    /// Opens `/dev/kvm` (or whatever the host hypervisor control device is).
    pub fn open() -> Result<Self> {
        let kvm = Kvm::new().map_err(Error::HypervisorUnavailable)?;
        tracing::info!(api_version = kvm.get_api_version(), "hypervisor control channel opened");
        Ok(Self { kvm })
    }

    /// Issues the "create VM" control operation.
    pub fn create_vm(&self) -> Result<VmFd> {
        let vm = self.kvm.create_vm().map_err(Error::HypervisorUnavailable)?;
        tracing::info!("VM container created");
        Ok(vm)
    }

    /// Size, in bytes, of the kernel-managed per-vcpu run-block. `VcpuFd`
    /// queries and maps this internally on `create_vcpu`; we query it again
    /// here purely to log it, so the VMM has an explicit record of the
    /// quantity it's relying on.
    pub fn runblock_size(&self) -> Result<usize> {
        let size = self.kvm.get_vcpu_mmap_size().map_err(Error::HypervisorUnavailable)?;
        tracing::debug!(size, "vcpu run-block size");
        Ok(size)
    }
}
