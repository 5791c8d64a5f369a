//! A WASI preview-1 filesystem over a littlefs image in RAM.
//!
//! This crate services the file and directory hostcalls of a sandboxed
//! guest: a capability-checked descriptor table, preopen-rooted path
//! resolution, and a call dispatcher that shuttles every buffer across the
//! guest/host memory boundary through a call-scoped arena. The backing
//! store is a littlefs instance over a RAM block device; it lives entirely
//! in the hosting process and vanishes with the instance.
//!
//! Compiled for wasm32 the crate exports the preview-1 fs surface plus
//! `initialize_internal`/`allocate` and imports `copy_in`/`copy_out`/
//! `trace`/`now_ms` from the `internal` module. On native targets the host
//! boundary is simulated so the whole stack is testable with plain `cargo
//! test`.

#![deny(unused_extern_crates, unstable_features)]
#![warn(unused_import_braces)]

mod ctx;
mod entry;
mod error;
mod host;
mod hostcalls;
mod logger;
mod memory;
mod metadata;
mod path;
mod preview1;
mod sys;
mod table;
pub mod wasi;
pub mod wasi32;

pub use ctx::WasiCtx;
pub use error::{Errno, Result};

/// Simulated-host hooks for native tests.
#[cfg(not(target_arch = "wasm32"))]
#[doc(hidden)]
pub mod sim {
    pub use crate::host::{guest_memory_with, set_now_ms};
}
