//! Single-byte bridge between guest port 0x3F8 and host stdio. Only
//! single-byte, single-count accesses are handled here — a guest probing
//! LCR/IER/MCR or otherwise driving a fuller 16550 register set is routed
//! to the diagnostic sink by the caller before reaching this module at
//! all.

use std::io::{Read, Write};

use crate::error::Result;

pub const COM1_PORT: u16 = 0x3F8;

/// Writes one byte to host stdout, in guest emission order.
pub fn write_byte(byte: u8) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&[byte])?;
    stdout.flush()?;
    Ok(())
}

/// Reads one byte from host stdin. Returns `None` on EOF, which the run
/// loop treats as a clean shutdown rather than a failure.
pub fn read_byte() -> Result<Option<u8>> {
    let mut buf = [0u8; 1];
    let mut stdin = std::io::stdin().lock();
    match stdin.read(&mut buf)? {
        0 => Ok(None),
        _ => Ok(Some(buf[0])),
    }
}
