//! End-to-end scenarios driven through the public `Session` API. Each
//! builds a tiny raw image in a temp file and drives a real session
//! against the host's hypervisor device.

use std::io::Write;

use blankvm::boot::VmMode;
use blankvm::boot::VmOptions;
use blankvm::session::Session;

fn write_image(bytes: &[u8]) -> tempfile_path::TempImage {
    tempfile_path::TempImage::write(bytes)
}

/// Tiny helper standing in for a `tempfile` dependency: writes a scratch
/// image under the OS temp dir and removes it on drop.
mod tempfile_path {
    use std::path::PathBuf;

    pub struct TempImage {
        pub path: PathBuf,
    }

    impl TempImage {
        pub fn write(bytes: &[u8]) -> Self {
            let mut path = std::env::temp_dir();
            let unique = std::process::id();
            path.push(format!("blankvm-test-{unique}-{}.img", bytes.len()));
            std::fs::write(&path, bytes).expect("write scratch image");
            Self { path }
        }
    }

    impl Drop for TempImage {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn options(mode: VmMode, mem_bytes: u64, entry_point: u64) -> VmOptions {
    VmOptions { mode, mem_bytes, entry_point, external_page_table_base: None }
}

#[test]
fn s1_real_mode_hlt_is_an_unhandled_exit() {
    let image = write_image(&[0xF4]); // hlt
    let mut session = Session::boot(options(VmMode::Real, 4096, 0), &image.path).expect("boot");
    let err = session.run().expect_err("hlt should surface as an unhandled exit");
    assert!(err.to_string().contains("KVM_EXIT_HLT"));
}

#[test]
fn s5_real_mode_entry_point_guard_rejects_before_first_resume() {
    let image = write_image(&[0xF4]);
    let err = Session::boot(options(VmMode::Real, 4096, 0x10000), &image.path)
        .expect_err("entry point at the real-mode limit must be rejected");
    assert!(err.to_string().contains("exceeds the addressable range"));
}

#[test]
fn image_larger_than_guest_ram_is_rejected() {
    let image = write_image(&vec![0u8; 8192]);
    let err = Session::boot(options(VmMode::Real, 4096, 0), &image.path)
        .expect_err("an image bigger than guest RAM must be rejected up front");
    assert!(err.to_string().contains("larger than"));
}

#[test]
fn long_mode_without_external_page_table_registers_two_slots() {
    // mov al, 'L'; mov dx, 0x3f8; out dx, al; hlt
    let code: &[u8] = &[0xB0, b'L', 0x66, 0xBA, 0xF8, 0x03, 0xEE, 0xF4];
    let image = write_image(code);
    let mut session = Session::boot(options(VmMode::Long, 2 * 1024 * 1024, 0), &image.path).expect("boot");
    assert!(session.page_table_region().is_some(), "long mode must auto-build a page table region");
    let err = session.run().expect_err("the final hlt is unhandled");
    assert!(err.to_string().contains("KVM_EXIT_HLT"));
}
