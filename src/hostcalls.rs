//! The exported WASI entry points.
//!
//! One extern function per hostcall, with the exact ABI name and signature.
//! Each entry opens a call frame, shuttles its arguments through the bridge,
//! invokes the façade on the thread-local context, and returns the errno.
//! No other logic lives here.

use crate::ctx::WasiCtx;
use crate::error::{Errno, Result};
use crate::memory::{self, CallFrame, MutableView};
use crate::wasi::{Fdflags, Fdstat, Filestat, Fstflags, Lookupflags, Oflags, Prestat, Rights, Whence};
use crate::wasi32;
use std::cell::RefCell;

thread_local! {
    static CTX: RefCell<Option<WasiCtx>> = RefCell::new(None);
}

fn with_ctx(body: impl FnOnce(&mut WasiCtx) -> Result<()>) -> i32 {
    CTX.with(|slot| {
        let mut slot = slot.borrow_mut();
        let Some(ctx) = slot.as_mut() else {
            log::error!("hostcall before initialize_internal");
            return Errno::Inval as i32;
        };
        match body(ctx) {
            Ok(()) => Errno::Success as i32,
            Err(errno) => errno as i32,
        }
    })
}

#[no_mangle]
pub extern "C" fn fd_advise(fd: i32, offset: i64, len: i64, advice: i32) -> i32 {
    with_ctx(|ctx| ctx.fd_advise(fd as u32, offset as u64, len as u64, advice as u8))
}

#[no_mangle]
pub extern "C" fn fd_allocate(fd: i32, offset: i64, len: i64) -> i32 {
    with_ctx(|ctx| ctx.fd_allocate(fd as u32, offset as u64, len as u64))
}

#[no_mangle]
pub extern "C" fn fd_close(fd: i32) -> i32 {
    with_ctx(|ctx| ctx.fd_close(fd as u32))
}

#[no_mangle]
pub extern "C" fn fd_datasync(fd: i32) -> i32 {
    with_ctx(|ctx| ctx.fd_datasync(fd as u32))
}

#[no_mangle]
pub extern "C" fn fd_fdstat_get(fd: i32, stat: i32) -> i32 {
    with_ctx(|ctx| {
        let frame = CallFrame::new();
        let mut out = MutableView::<Fdstat>::new(&frame, stat as u32, 1);
        *out.get_mut() = ctx.fd_fdstat_get(fd as u32)?;
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn fd_fdstat_set_flags(fd: i32, flags: i32) -> i32 {
    with_ctx(|ctx| ctx.fd_fdstat_set_flags(fd as u32, Fdflags::from_bits_retain(flags as u16)))
}

#[no_mangle]
pub extern "C" fn fd_fdstat_set_rights(fd: i32, rights_base: i64, rights_inheriting: i64) -> i32 {
    with_ctx(|ctx| {
        ctx.fd_fdstat_set_rights(
            fd as u32,
            Rights::from_bits_retain(rights_base as u64),
            Rights::from_bits_retain(rights_inheriting as u64),
        )
    })
}

#[no_mangle]
pub extern "C" fn fd_filestat_get(fd: i32, stat: i32) -> i32 {
    with_ctx(|ctx| {
        let frame = CallFrame::new();
        let mut out = MutableView::<Filestat>::new(&frame, stat as u32, 1);
        *out.get_mut() = ctx.fd_filestat_get(fd as u32)?;
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn fd_filestat_set_size(fd: i32, size: i64) -> i32 {
    with_ctx(|ctx| ctx.fd_filestat_set_size(fd as u32, size as u64))
}

#[no_mangle]
pub extern "C" fn fd_filestat_set_times(fd: i32, atim: i64, mtim: i64, fst_flags: i32) -> i32 {
    with_ctx(|ctx| {
        ctx.fd_filestat_set_times(
            fd as u32,
            atim as u64,
            mtim as u64,
            Fstflags::from_bits_retain(fst_flags as u16),
        )
    })
}

#[no_mangle]
pub extern "C" fn fd_pread(fd: i32, iovs: i32, iovs_len: i32, offset: i64, nread: i32) -> i32 {
    with_ctx(|ctx| {
        let frame = CallFrame::new();
        let mut out = MutableView::<wasi32::Size>::new(&frame, nread as u32, 1);
        memory::with_iovs(&frame, iovs as u32, iovs_len as usize, |buffers| {
            *out.get_mut() = ctx.fd_pread(fd as u32, buffers, offset as u64)? as wasi32::Size;
            Ok(())
        })
    })
}

#[no_mangle]
pub extern "C" fn fd_prestat_get(fd: i32, prestat: i32) -> i32 {
    with_ctx(|ctx| {
        let frame = CallFrame::new();
        let mut out = MutableView::<Prestat>::new(&frame, prestat as u32, 1);
        *out.get_mut() = ctx.fd_prestat_get(fd as u32)?;
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn fd_prestat_dir_name(fd: i32, name: i32, name_len: i32) -> i32 {
    with_ctx(|ctx| {
        let frame = CallFrame::new();
        let mut out = MutableView::<u8>::new(&frame, name as u32, name_len as usize);
        ctx.fd_prestat_dir_name(fd as u32, out.as_mut_slice())
    })
}

#[no_mangle]
pub extern "C" fn fd_pwrite(fd: i32, iovs: i32, iovs_len: i32, offset: i64, nwritten: i32) -> i32 {
    with_ctx(|ctx| {
        let frame = CallFrame::new();
        let mut out = MutableView::<wasi32::Size>::new(&frame, nwritten as u32, 1);
        memory::with_ciovs(&frame, iovs as u32, iovs_len as usize, |buffers| {
            *out.get_mut() = ctx.fd_pwrite(fd as u32, buffers, offset as u64)? as wasi32::Size;
            Ok(())
        })
    })
}

#[no_mangle]
pub extern "C" fn fd_read(fd: i32, iovs: i32, iovs_len: i32, nread: i32) -> i32 {
    with_ctx(|ctx| {
        let frame = CallFrame::new();
        let mut out = MutableView::<wasi32::Size>::new(&frame, nread as u32, 1);
        memory::with_iovs(&frame, iovs as u32, iovs_len as usize, |buffers| {
            *out.get_mut() = ctx.fd_read(fd as u32, buffers)? as wasi32::Size;
            Ok(())
        })
    })
}

#[no_mangle]
pub extern "C" fn fd_readdir(fd: i32, buf: i32, buf_len: i32, cookie: i64, bufused: i32) -> i32 {
    with_ctx(|ctx| {
        let frame = CallFrame::new();
        let mut buffer = MutableView::<u8>::new(&frame, buf as u32, buf_len as usize);
        let mut out = MutableView::<wasi32::Size>::new(&frame, bufused as u32, 1);
        *out.get_mut() =
            ctx.fd_readdir(fd as u32, buffer.as_mut_slice(), cookie as u64)? as wasi32::Size;
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn fd_renumber(fd: i32, to: i32) -> i32 {
    with_ctx(|ctx| ctx.fd_renumber(fd as u32, to as u32))
}

#[no_mangle]
pub extern "C" fn fd_seek(fd: i32, offset: i64, whence: i32, newoffset: i32) -> i32 {
    with_ctx(|ctx| {
        let frame = CallFrame::new();
        let mut out = MutableView::<u64>::new(&frame, newoffset as u32, 1);
        let whence = u8::try_from(whence)
            .map_err(|_| Errno::Inval)
            .and_then(Whence::try_from)?;
        *out.get_mut() = ctx.fd_seek(fd as u32, offset, whence)?;
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn fd_sync(fd: i32) -> i32 {
    with_ctx(|ctx| ctx.fd_sync(fd as u32))
}

#[no_mangle]
pub extern "C" fn fd_tell(fd: i32, offset: i32) -> i32 {
    with_ctx(|ctx| {
        let frame = CallFrame::new();
        let mut out = MutableView::<u64>::new(&frame, offset as u32, 1);
        *out.get_mut() = ctx.fd_tell(fd as u32)?;
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn fd_write(fd: i32, iovs: i32, iovs_len: i32, nwritten: i32) -> i32 {
    with_ctx(|ctx| {
        let frame = CallFrame::new();
        let mut out = MutableView::<wasi32::Size>::new(&frame, nwritten as u32, 1);
        memory::with_ciovs(&frame, iovs as u32, iovs_len as usize, |buffers| {
            *out.get_mut() = ctx.fd_write(fd as u32, buffers)? as wasi32::Size;
            Ok(())
        })
    })
}

#[no_mangle]
pub extern "C" fn path_create_directory(dirfd: i32, path: i32, path_len: i32) -> i32 {
    with_ctx(|ctx| {
        let frame = CallFrame::new();
        let path = frame.ref_string(path as u32, path_len as usize)?;
        ctx.path_create_directory(dirfd as u32, path)
    })
}

#[no_mangle]
pub extern "C" fn path_filestat_get(dirfd: i32, flags: i32, path: i32, path_len: i32, stat: i32) -> i32 {
    with_ctx(|ctx| {
        let frame = CallFrame::new();
        let mut out = MutableView::<Filestat>::new(&frame, stat as u32, 1);
        let path = frame.ref_string(path as u32, path_len as usize)?;
        *out.get_mut() = ctx.path_filestat_get(
            dirfd as u32,
            Lookupflags::from_bits_retain(flags as u32),
            path,
        )?;
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn path_filestat_set_times(
    dirfd: i32,
    flags: i32,
    path: i32,
    path_len: i32,
    atim: i64,
    mtim: i64,
    fst_flags: i32,
) -> i32 {
    with_ctx(|ctx| {
        let frame = CallFrame::new();
        let path = frame.ref_string(path as u32, path_len as usize)?;
        ctx.path_filestat_set_times(
            dirfd as u32,
            Lookupflags::from_bits_retain(flags as u32),
            path,
            atim as u64,
            mtim as u64,
            Fstflags::from_bits_retain(fst_flags as u16),
        )
    })
}

#[no_mangle]
pub extern "C" fn path_link(
    old_dirfd: i32,
    old_flags: i32,
    old_path: i32,
    old_path_len: i32,
    new_dirfd: i32,
    new_path: i32,
    new_path_len: i32,
) -> i32 {
    with_ctx(|ctx| {
        let frame = CallFrame::new();
        let old_path = frame.ref_string(old_path as u32, old_path_len as usize)?;
        let new_path = frame.ref_string(new_path as u32, new_path_len as usize)?;
        ctx.path_link(
            old_dirfd as u32,
            Lookupflags::from_bits_retain(old_flags as u32),
            old_path,
            new_dirfd as u32,
            new_path,
        )
    })
}

#[no_mangle]
pub extern "C" fn path_open(
    dirfd: i32,
    dirflags: i32,
    path: i32,
    path_len: i32,
    oflags: i32,
    rights_base: i64,
    rights_inheriting: i64,
    fdflags: i32,
    opened_fd: i32,
) -> i32 {
    with_ctx(|ctx| {
        let frame = CallFrame::new();
        let mut out = MutableView::<u32>::new(&frame, opened_fd as u32, 1);
        let path = frame.ref_string(path as u32, path_len as usize)?;
        *out.get_mut() = ctx.path_open(
            dirfd as u32,
            Lookupflags::from_bits_retain(dirflags as u32),
            path,
            Oflags::from_bits_retain(oflags as u16),
            Rights::from_bits_retain(rights_base as u64),
            Rights::from_bits_retain(rights_inheriting as u64),
            Fdflags::from_bits_retain(fdflags as u16),
        )?;
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn path_readlink(
    dirfd: i32,
    path: i32,
    path_len: i32,
    buf: i32,
    buf_len: i32,
    bufused: i32,
) -> i32 {
    with_ctx(|ctx| {
        let frame = CallFrame::new();
        let mut buffer = MutableView::<u8>::new(&frame, buf as u32, buf_len as usize);
        let mut out = MutableView::<wasi32::Size>::new(&frame, bufused as u32, 1);
        let path = frame.ref_string(path as u32, path_len as usize)?;
        *out.get_mut() =
            ctx.path_readlink(dirfd as u32, path, buffer.as_mut_slice())? as wasi32::Size;
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn path_remove_directory(dirfd: i32, path: i32, path_len: i32) -> i32 {
    with_ctx(|ctx| {
        let frame = CallFrame::new();
        let path = frame.ref_string(path as u32, path_len as usize)?;
        ctx.path_remove_directory(dirfd as u32, path)
    })
}

#[no_mangle]
pub extern "C" fn path_rename(
    old_dirfd: i32,
    old_path: i32,
    old_path_len: i32,
    new_dirfd: i32,
    new_path: i32,
    new_path_len: i32,
) -> i32 {
    with_ctx(|ctx| {
        let frame = CallFrame::new();
        let old_path = frame.ref_string(old_path as u32, old_path_len as usize)?;
        let new_path = frame.ref_string(new_path as u32, new_path_len as usize)?;
        ctx.path_rename(old_dirfd as u32, old_path, new_dirfd as u32, new_path)
    })
}

#[no_mangle]
pub extern "C" fn path_symlink(
    old_path: i32,
    old_path_len: i32,
    dirfd: i32,
    new_path: i32,
    new_path_len: i32,
) -> i32 {
    with_ctx(|ctx| {
        let frame = CallFrame::new();
        let old_path = frame.ref_string(old_path as u32, old_path_len as usize)?;
        let new_path = frame.ref_string(new_path as u32, new_path_len as usize)?;
        ctx.path_symlink(old_path, dirfd as u32, new_path)
    })
}

#[no_mangle]
pub extern "C" fn path_unlink_file(dirfd: i32, path: i32, path_len: i32) -> i32 {
    with_ctx(|ctx| {
        let frame = CallFrame::new();
        let path = frame.ref_string(path as u32, path_len as usize)?;
        ctx.path_unlink_file(dirfd as u32, path)
    })
}

/// One-time initialization. The host stages the JSON document in this
/// module's own linear memory (via `allocate`) before calling, so the
/// pointer is dereferenced directly rather than shuttled through the
/// bridge.
///
/// # Safety
///
/// `document` and `document_len` must describe a live allocation previously
/// returned by `allocate` and filled by the host.
#[no_mangle]
pub unsafe extern "C" fn initialize_internal(document: i32, document_len: i32) -> i32 {
    let bytes = std::slice::from_raw_parts(document as usize as *const u8, document_len as usize);
    let document = match std::str::from_utf8(bytes) {
        Ok(document) => document,
        Err(_) => return Errno::Ilseq as i32,
    };
    match WasiCtx::from_json(document) {
        Ok(ctx) => {
            CTX.with(|slot| *slot.borrow_mut() = Some(ctx));
            Errno::Success as i32
        }
        Err(errno) => errno as i32,
    }
}

/// Scratch allocation for the host to stage the init document in. Never
/// freed; initialization happens once.
#[no_mangle]
pub extern "C" fn allocate(size: i32) -> i32 {
    let size = (size as usize).max(1);
    let layout = std::alloc::Layout::from_size_align(size, 8).expect("allocation size overflow");
    unsafe { std::alloc::alloc(layout) as usize as i32 }
}
