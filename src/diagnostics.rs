//! Dumps the full session state to stderr when a vCPU exit falls outside
//! the serial fast path. Field-for-field grounded on `blankvm.c`'s
//! `vm_dump`/`vm_dump_segment`.
//!
//! `VcpuExit` borrows its vCPU for as long as it lives (its IO/MMIO data
//! slices point into the kernel-owned run-block), so the run loop first
//! copies whatever it needs out of the exit into an owned `ExitSummary`
//! before calling back into `vcpu.get_regs()`/`get_sregs()` here.

use kvm_bindings::kvm_segment;
use kvm_ioctls::{VcpuExit, VcpuFd};

/// An owned snapshot of the parts of a `VcpuExit` the dump needs, taken
/// before the borrow of the vCPU that produced it ends.
pub enum ExitSummary {
    Io { out: bool, port: u16, data: Vec<u8> },
    Mmio { write: bool, addr: u64, data: Vec<u8> },
    Other(String),
}

impl ExitSummary {
    pub fn from_exit(exit: &VcpuExit<'_>) -> Self {
        match exit {
            VcpuExit::IoOut(port, data) => ExitSummary::Io { out: true, port: *port, data: data.to_vec() },
            VcpuExit::IoIn(port, data) => ExitSummary::Io { out: false, port: *port, data: data.to_vec() },
            VcpuExit::MmioWrite(addr, data) => ExitSummary::Mmio { write: true, addr: *addr, data: data.to_vec() },
            VcpuExit::MmioRead(addr, data) => ExitSummary::Mmio { write: false, addr: *addr, data: data.to_vec() },
            other => ExitSummary::Other(exit_name(other)),
        }
    }

    pub fn name(&self) -> String {
        match self {
            ExitSummary::Io { .. } => "KVM_EXIT_IO".to_string(),
            ExitSummary::Mmio { .. } => "KVM_EXIT_MMIO".to_string(),
            ExitSummary::Other(name) => name.clone(),
        }
    }
}

/// Human-readable name for an exit. The four exits the run loop itself
/// branches on get their canonical KVM name; any other exit is named from
/// its `Debug` representation, since `VcpuExit` is a typed enum rather than
/// the raw numeric `exit_reason` the original C indexes its 28-entry name
/// table with (see DESIGN.md's resolution of this Open Question).
pub fn exit_name(exit: &VcpuExit<'_>) -> String {
    match exit {
        VcpuExit::IoIn(..) | VcpuExit::IoOut(..) => "KVM_EXIT_IO".to_string(),
        VcpuExit::MmioRead(..) | VcpuExit::MmioWrite(..) => "KVM_EXIT_MMIO".to_string(),
        VcpuExit::Hlt => "KVM_EXIT_HLT".to_string(),
        VcpuExit::Shutdown => "KVM_EXIT_SHUTDOWN".to_string(),
        other => {
            let debug = format!("{other:?}");
            let name = debug.split(['(', '{', ' ']).next().unwrap_or("UNKNOWN");
            if name.is_empty() { "UNKNOWN".to_string() } else { name.to_string() }
        }
    }
}

/// Writes the full diagnostic dump for `summary` on `vcpu` to stderr.
pub fn dump(vcpu: &VcpuFd, summary: &ExitSummary) {
    eprintln!("===== BEGIN VM STATE =====");
    eprintln!("Exit reason: {}", summary.name());
    eprintln!();

    match summary {
        ExitSummary::Io { out: true, port, data } => {
            eprint!("Write {}x1 bytes at port {port:#06x}: ", data.len());
            for byte in data {
                eprint!("{byte:02x} ");
            }
            eprintln!("\n");
        }
        ExitSummary::Io { out: false, port, data } => {
            eprintln!("Read {}x1 bytes at port {port:#06x}\n", data.len());
        }
        ExitSummary::Mmio { write: true, addr, data } => {
            eprint!("Write {} bytes at {addr:#018x}: ", data.len());
            for byte in data {
                eprint!("{byte:02x} ");
            }
            eprintln!("\n");
        }
        ExitSummary::Mmio { write: false, addr, data } => {
            eprintln!("Read {} bytes at {addr:#018x}\n", data.len());
        }
        ExitSummary::Other(_) => {}
    }

    match vcpu.get_regs() {
        Ok(regs) => {
            eprintln!(
                "RAX={:016x} RBX={:016x} RCX={:016x} RDX={:016x}",
                regs.rax, regs.rbx, regs.rcx, regs.rdx
            );
            eprintln!(
                "RSI={:016x} RDI={:016x} RSP={:016x} RBP={:016x}",
                regs.rsi, regs.rdi, regs.rsp, regs.rbp
            );
            eprintln!(
                "R8 ={:016x} R9 ={:016x} R10={:016x} R11={:016x}",
                regs.r8, regs.r9, regs.r10, regs.r11
            );
            eprintln!(
                "R12={:016x} R13={:016x} R14={:016x} R15={:016x}",
                regs.r12, regs.r13, regs.r14, regs.r15
            );
            eprintln!("RIP={:016x} RFL={:016x}\n", regs.rip, regs.rflags);
        }
        Err(e) => eprintln!("KVM_GET_REGS failed: {e}"),
    }

    match vcpu.get_sregs() {
        Ok(sregs) => {
            dump_segment("CS ", &sregs.cs);
            dump_segment("DS ", &sregs.ds);
            dump_segment("ES ", &sregs.es);
            dump_segment("FS ", &sregs.fs);
            dump_segment("GS ", &sregs.gs);
            dump_segment("SS ", &sregs.ss);
            dump_segment("TR ", &sregs.tr);
            dump_segment("LDT", &sregs.ldt);
            eprintln!(
                "GDT BASE={:016x} LIM={:04x}        IDT BASE={:016x} LIM={:04x}\n",
                sregs.gdt.base, sregs.gdt.limit, sregs.idt.base, sregs.idt.limit
            );

            eprintln!(
                "CR0={:016x} CR2={:016x} CR3={:016x} CR4={:016x}",
                sregs.cr0, sregs.cr2, sregs.cr3, sregs.cr4
            );
            eprintln!("CR8={:016x} EFER={:016x} APIC={:016x}", sregs.cr8, sregs.efer, sregs.apic_base);
            eprintln!(
                "INT BITMAP {:016x} {:016x} {:016x} {:016x}",
                sregs.interrupt_bitmap[0], sregs.interrupt_bitmap[1], sregs.interrupt_bitmap[2], sregs.interrupt_bitmap[3]
            );
        }
        Err(e) => eprintln!("KVM_GET_SREGS failed: {e}"),
    }

    eprintln!("===== END VM STATE =====\n");
}

fn dump_segment(name: &str, seg: &kvm_segment) {
    eprint!("{name} BASE={:016x} LIM={:08x} SEL={:04x} ", seg.base, seg.limit, seg.selector);
    eprintln!(
        "TP={:x} P={:x} DPL={:x} DB={:x} S={:x} L={:x} G={:x} A={:x}",
        seg.type_, seg.present, seg.dpl, seg.db, seg.s, seg.l, seg.g, seg.avl
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hlt_gets_canonical_name() {
        assert_eq!(exit_name(&VcpuExit::Hlt), "KVM_EXIT_HLT");
    }

    #[test]
    fn shutdown_gets_canonical_name() {
        assert_eq!(exit_name(&VcpuExit::Shutdown), "KVM_EXIT_SHUTDOWN");
    }

    #[test]
    fn io_exits_are_named_kvm_exit_io() {
        let out_buf = [0u8; 2];
        assert_eq!(exit_name(&VcpuExit::IoOut(0x3F8, &out_buf)), "KVM_EXIT_IO");
        let mut in_buf = [0u8; 2];
        assert_eq!(exit_name(&VcpuExit::IoIn(0x3F8, &mut in_buf)), "KVM_EXIT_IO");
    }

    #[test]
    fn summary_from_io_out_copies_data() {
        let data = [0x41u8];
        let summary = ExitSummary::from_exit(&VcpuExit::IoOut(0x3F8, &data));
        match summary {
            ExitSummary::Io { out: true, port: 0x3F8, data } => assert_eq!(data, vec![0x41]),
            _ => panic!("expected Io summary"),
        }
    }
}
