//! Marshalling between guest linear memory and host scratch space.
//!
//! The guest's memory is not directly addressable here; every pointer-valued
//! argument is shuttled through a call-scoped arena with the host's
//! `copy_in`/`copy_out` primitives. Allocations are bump-style, raw guest
//! bytes only ever land in plain-old-data spans, and nothing handed out by a
//! frame survives the call that allocated it.

use crate::error::{Errno, Result};
use crate::host;
use crate::wasi32;
use std::cell::{Cell, UnsafeCell};
use std::mem::{align_of, size_of};
use std::slice;
use std::str;

/// Fixed scratch arena size per call.
const FRAME_SIZE: usize = 4096 * 10;

/// One call's scratch arena. Dropped (and with it every span it handed out)
/// when the dispatcher entry returns.
pub(crate) struct CallFrame {
    buffer: UnsafeCell<Box<[u8]>>,
    offset: Cell<usize>,
}

impl CallFrame {
    pub(crate) fn new() -> Self {
        Self {
            buffer: UnsafeCell::new(vec![0; FRAME_SIZE].into_boxed_slice()),
            offset: Cell::new(0),
        }
    }

    fn alloc(&self, bytes: usize, align: usize) -> *mut u8 {
        let start = (self.offset.get() + align - 1) & !(align - 1);
        let end = start.checked_add(bytes).expect("scratch arena exhausted");
        assert!(end <= FRAME_SIZE, "scratch arena exhausted");
        self.offset.set(end);
        // Disjoint spans of an arena that lives as long as the borrow; the
        // buffer itself is zero-initialized.
        unsafe { (*self.buffer.get()).as_mut_ptr().add(start) }
    }

    fn alloc_slice<T: Copy>(&self, count: usize) -> &mut [T] {
        let bytes = size_of::<T>()
            .checked_mul(count)
            .expect("scratch arena exhausted");
        let data = self.alloc(bytes, align_of::<T>()).cast::<T>();
        unsafe { slice::from_raw_parts_mut(data, count) }
    }

    /// Copy `count` elements of `T` in from guest memory at `addr`.
    pub(crate) fn ref_array<T: Copy>(&self, addr: wasi32::Uintptr, count: usize) -> &mut [T] {
        let data = self.alloc_slice::<T>(count);
        host::copy_in(addr, data.as_mut_ptr().cast(), size_of::<T>() * count);
        data
    }

    /// Copy a guest path or name in. WASI requires UTF-8; anything else is
    /// Ilseq.
    pub(crate) fn ref_string(&self, addr: wasi32::Uintptr, len: usize) -> Result<&str> {
        let bytes = self.ref_array::<u8>(addr, len);
        str::from_utf8(bytes).map_err(|_| Errno::Ilseq)
    }
}

/// A guest buffer mirrored into the arena, flushed back on drop. Used for
/// every out-parameter, so a failed call writes back whatever the guest had
/// there before.
pub(crate) struct MutableView<'frame, T: Copy> {
    data: &'frame mut [T],
    addr: wasi32::Uintptr,
}

impl<'frame, T: Copy> MutableView<'frame, T> {
    pub(crate) fn new(frame: &'frame CallFrame, addr: wasi32::Uintptr, count: usize) -> Self {
        Self {
            data: frame.ref_array(addr, count),
            addr,
        }
    }

    pub(crate) fn get_mut(&mut self) -> &mut T {
        &mut self.data[0]
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [T] {
        &mut *self.data
    }
}

impl<T: Copy> Drop for MutableView<'_, T> {
    fn drop(&mut self) {
        host::copy_out(self.data.as_ptr().cast(), self.addr, size_of::<T>() * self.data.len());
    }
}

/// Mirror a guest iovec array and its target buffers into the arena. Reads
/// scatter into the mirrored buffers, which flush back to guest memory when
/// the views drop, so bytes past a short read keep their guest values.
pub(crate) fn with_iovs<R>(
    frame: &CallFrame,
    addr: wasi32::Uintptr,
    count: usize,
    body: impl FnOnce(&mut [&mut [u8]]) -> Result<R>,
) -> Result<R> {
    let iovs = frame.ref_array::<wasi32::Iovec>(addr, count);
    let mut views: Vec<MutableView<'_, u8>> = iovs
        .iter()
        .map(|iov| MutableView::new(frame, iov.buf, iov.buf_len as usize))
        .collect();
    let mut buffers: Vec<&mut [u8]> = views.iter_mut().map(|view| view.as_mut_slice()).collect();
    body(&mut buffers)
}

/// Mirror a guest ciovec array and its source buffers into the arena.
/// Writes gather from the copies; nothing flows back.
pub(crate) fn with_ciovs<R>(
    frame: &CallFrame,
    addr: wasi32::Uintptr,
    count: usize,
    body: impl FnOnce(&[&[u8]]) -> Result<R>,
) -> Result<R> {
    let iovs = frame.ref_array::<wasi32::Ciovec>(addr, count);
    let buffers: Vec<&[u8]> = iovs
        .iter()
        .map(|iov| &*frame.ref_array::<u8>(iov.buf, iov.buf_len as usize))
        .collect();
    body(&buffers)
}
