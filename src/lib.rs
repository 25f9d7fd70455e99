//! A minimal hardware-assisted VMM: a single vCPU, KVM-backed, booting a
//! raw flat image in real, protected, or long mode and bridging one
//! legacy serial port to host stdio.
//!
//! The module layout mirrors the component breakdown: `hypervisor` and
//! `memory` are the two resources the session acquires first, `pagetable`
//! and `boot` assemble architectural state, `serial`/`diagnostics`/
//! `runloop` drive the vCPU, and `session` ties all of it together behind
//! a single `boot`/`run` entry point that `main.rs` calls.

pub mod boot;
pub mod cli;
pub mod diagnostics;
pub mod error;
pub mod hypervisor;
pub mod loader;
pub mod memory;
pub mod pagetable;
pub mod runloop;
pub mod serial;
pub mod session;

pub use error::{Error, Result};
pub use session::Session;
