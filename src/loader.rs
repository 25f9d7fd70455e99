//! Copies a flat binary image into guest RAM starting at guest physical
//! address 0.
//!
//! Grounded on `blankvm.c`'s `vm_load_image`: a single `read()` of up to
//! the image's own size, not retried on a short read. Unlike the original,
//! an image larger than guest RAM is rejected up front rather than
//! silently handed to a `read()` that would truncate it.

use std::io::Read;
use std::path::Path;

use vm_memory::{GuestAddress, GuestMemoryMmap};

use crate::error::{Error, Result};
use crate::memory;

/// Loads `path` into `mem` at guest physical address 0, returning the
/// number of bytes actually copied (which may be less than the file's size
/// if the single `read()` call returns short).
pub fn load_image(path: &Path, mem: &GuestMemoryMmap<()>, mem_bytes: u64) -> Result<u64> {
    let to_load_err = |source: std::io::Error| Error::ImageLoadFailed { path: path.to_path_buf(), source };

    let mut file = std::fs::File::open(path).map_err(to_load_err)?;
    let image_size = file.metadata().map_err(to_load_err)?.len();

    if image_size > mem_bytes {
        let source = std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("image is {image_size} bytes, larger than the {mem_bytes}-byte guest RAM region"),
        );
        return Err(to_load_err(source));
    }

    let mut buf = vec![0u8; image_size as usize];
    let read = file.read(&mut buf).map_err(to_load_err)?;

    memory::write(mem, GuestAddress(0), &buf[..read])?;
    tracing::info!(path = %path.display(), bytes = read, "image loaded into guest RAM");

    Ok(read as u64)
}
