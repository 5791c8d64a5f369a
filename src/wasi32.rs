//! wasm32-sized ABI types.
//!
//! The guest runs on a 32-bit target, so pointer-valued fields crossing the
//! boundary are 32 bits wide regardless of the host's word size. Anything
//! read out of guest memory that embeds a pointer uses these layouts.

pub type Uintptr = u32;
pub type Size = u32;

/// Scatter target for reads: a guest buffer address and its length.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Iovec {
    pub buf: Uintptr,
    pub buf_len: Size,
}

/// Gather source for writes.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Ciovec {
    pub buf: Uintptr,
    pub buf_len: Size,
}
