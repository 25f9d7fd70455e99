use thiserror::Error as ThisError;

/// The crate-wide error taxonomy. Every variant is fatal to the current
/// session: there is no retry and no partial continuation.
#[derive(ThisError, Debug)]
pub enum Error {
    #[error("hypervisor unavailable: {0}")]
    HypervisorUnavailable(#[source] kvm_ioctls::Error),

    #[error("memory registration failed: {0}")]
    MemoryRegistrationFailed(String),

    #[error("failed to load image {path}: {source}")]
    ImageLoadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("entry point {entry:#x} exceeds the addressable range of {mode} mode")]
    EntryTooHigh { entry: u64, mode: &'static str },

    #[error("register access failed: {0}")]
    RegisterAccessFailed(#[source] kvm_ioctls::Error),

    #[error("vcpu run failed: {0}")]
    RunFailed(#[source] kvm_ioctls::Error),

    #[error("unhandled vcpu exit: {0}")]
    UnhandledExit(String),

    #[error("guest memory error: {0}")]
    GuestMemory(#[from] vm_memory::GuestMemoryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
