//! The host boundary.
//!
//! On wasm32 these are the four primitives the embedding runtime supplies in
//! the `internal` import module. On native targets a simulated host stands
//! in: an in-process guest-memory image addressed by guest offset, a trace
//! sink on stderr, and a settable millisecond clock. The simulation is what
//! makes everything above this module testable without a bytecode runtime.

#[cfg(target_arch = "wasm32")]
mod imp {
    mod ffi {
        #[link(wasm_import_module = "internal")]
        extern "C" {
            pub fn copy_in(src_addr: i32, dst_addr: i32, size: i32) -> i32;
            pub fn copy_out(src_addr: i32, dst_addr: i32, size: i32) -> i32;
            pub fn trace(is_error: i32, addr: i32, size: i32) -> i32;
            pub fn now_ms() -> i32;
        }
    }

    pub(crate) fn copy_in(src: u32, dst: *mut u8, len: usize) {
        unsafe {
            ffi::copy_in(src as i32, dst as usize as i32, len as i32);
        }
    }

    pub(crate) fn copy_out(src: *const u8, dst: u32, len: usize) {
        unsafe {
            ffi::copy_out(src as usize as i32, dst as i32, len as i32);
        }
    }

    pub(crate) fn trace(is_error: bool, message: &str) {
        unsafe {
            ffi::trace(
                is_error as i32,
                message.as_ptr() as usize as i32,
                message.len() as i32,
            );
        }
    }

    pub(crate) fn now_ms() -> u32 {
        unsafe { ffi::now_ms() as u32 }
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod imp {
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicU32, Ordering};

    const GUEST_MEMORY_SIZE: usize = 1 << 20;

    thread_local! {
        static GUEST_MEMORY: RefCell<Vec<u8>> = RefCell::new(vec![0; GUEST_MEMORY_SIZE]);
    }

    static CLOCK_MS: AtomicU32 = AtomicU32::new(0);

    pub(crate) fn copy_in(src: u32, dst: *mut u8, len: usize) {
        GUEST_MEMORY.with(|memory| {
            let memory = memory.borrow();
            let src = src as usize;
            let source = &memory[src..src + len];
            unsafe { std::ptr::copy_nonoverlapping(source.as_ptr(), dst, len) };
        });
    }

    pub(crate) fn copy_out(src: *const u8, dst: u32, len: usize) {
        GUEST_MEMORY.with(|memory| {
            let mut memory = memory.borrow_mut();
            let dst = dst as usize;
            let target = &mut memory[dst..dst + len];
            unsafe { std::ptr::copy_nonoverlapping(src, target.as_mut_ptr(), len) };
        });
    }

    pub(crate) fn trace(is_error: bool, message: &str) {
        eprintln!("{}: {}", if is_error { "error" } else { "trace" }, message);
    }

    pub(crate) fn now_ms() -> u32 {
        CLOCK_MS.load(Ordering::Relaxed)
    }

    /// Wind the simulated clock; `now_ms` returns the last value set.
    pub fn set_now_ms(milliseconds: u32) {
        CLOCK_MS.store(milliseconds, Ordering::Relaxed);
    }

    /// Run `body` with direct access to the simulated guest memory image.
    pub fn guest_memory_with<R>(body: impl FnOnce(&mut [u8]) -> R) -> R {
        GUEST_MEMORY.with(|memory| body(&mut memory.borrow_mut()))
    }
}

pub(crate) use imp::{copy_in, copy_out, now_ms, trace};

#[cfg(not(target_arch = "wasm32"))]
pub use imp::{guest_memory_with, set_now_ms};
