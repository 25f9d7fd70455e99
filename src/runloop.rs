//! C5: the vCPU run loop. Single-threaded and cooperative — each iteration
//! resumes the guest once, then either services the serial fast path or
//! hands off to the diagnostic sink and terminates.

use kvm_ioctls::{VcpuExit, VcpuFd};

use crate::diagnostics::{self, ExitSummary};
use crate::error::{Error, Result};
use crate::serial;

/// Runs `vcpu` until the guest's stdin reaches EOF (clean shutdown), an
/// exit outside the serial fast path occurs (`Error::UnhandledExit`, after
/// the diagnostic dump has run), or the "run" control operation itself
/// fails (`Error::RunFailed`).
pub fn run(vcpu: &mut VcpuFd) -> Result<()> {
    tracing::info!("entering vcpu run loop");

    loop {
        let exit = vcpu.run().map_err(Error::RunFailed)?;

        let unhandled = match exit {
            VcpuExit::IoOut(port, data) if port == serial::COM1_PORT && data.len() == 1 => {
                serial::write_byte(data[0])?;
                None
            }
            VcpuExit::IoIn(port, data) if port == serial::COM1_PORT && data.len() == 1 => {
                match serial::read_byte()? {
                    Some(byte) => {
                        data[0] = byte;
                        None
                    }
                    None => {
                        tracing::info!("guest stdin reached EOF, shutting down cleanly");
                        return Ok(());
                    }
                }
            }
            other => Some(ExitSummary::from_exit(&other)),
        };

        if let Some(summary) = unhandled {
            let name = summary.name();
            tracing::warn!(exit = %name, "unhandled vcpu exit");
            diagnostics::dump(vcpu, &summary);
            return Err(Error::UnhandledExit(name));
        }
    }
}
