//! Thin safe layer over the raw littlefs bindings, plus the translation
//! between littlefs codes and WASI codepoints.
//!
//! Everything below the façade talks to the backend through this module.
//! littlefs is built without malloc, so the mount configuration and every
//! open file carry their own cache buffers; the structs holding them are
//! boxed once and never move while the backend holds pointers into them.

mod rambd;

use crate::error::Errno;
use crate::wasi::{Filetype, Oflags, Rights};
use littlefs2_sys as ll;
use std::ffi::CString;
use std::mem;
use std::os::raw::c_int;
use thiserror::Error;

const READ_SIZE: u32 = 16;
const PROG_SIZE: u32 = 16;
const BLOCK_CYCLES: i32 = 500;
const CACHE_SIZE: u32 = 16;
const LOOKAHEAD_SIZE: u32 = 16;

const ERR_NOENT: c_int = ll::lfs_error_LFS_ERR_NOENT;
const ERR_EXIST: c_int = ll::lfs_error_LFS_ERR_EXIST;
const ERR_ISDIR: c_int = ll::lfs_error_LFS_ERR_ISDIR;
const ERR_NOTEMPTY: c_int = ll::lfs_error_LFS_ERR_NOTEMPTY;
const ERR_NOTDIR: c_int = ll::lfs_error_LFS_ERR_NOTDIR;
const ERR_INVAL: c_int = ll::lfs_error_LFS_ERR_INVAL;

const O_RDONLY: c_int = ll::lfs_open_flags_LFS_O_RDONLY as c_int;
const O_WRONLY: c_int = ll::lfs_open_flags_LFS_O_WRONLY as c_int;
const O_CREAT: c_int = ll::lfs_open_flags_LFS_O_CREAT as c_int;
const O_EXCL: c_int = ll::lfs_open_flags_LFS_O_EXCL as c_int;
const O_TRUNC: c_int = ll::lfs_open_flags_LFS_O_TRUNC as c_int;
const O_APPEND: c_int = ll::lfs_open_flags_LFS_O_APPEND as c_int;

const TYPE_DIR: u8 = ll::lfs_type_LFS_TYPE_DIR as u8;

pub(crate) const SEEK_SET: c_int = ll::lfs_whence_flags_LFS_SEEK_SET as c_int;
pub(crate) const SEEK_CUR: c_int = ll::lfs_whence_flags_LFS_SEEK_CUR as c_int;
pub(crate) const SEEK_END: c_int = ll::lfs_whence_flags_LFS_SEEK_END as c_int;

/// The littlefs error codes the façade can observe. Anything else escaping
/// the backend is a bug in this crate, not a guest-visible condition.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub(crate) enum Error {
    #[error("no such entry")]
    NoEntry,
    #[error("entry already exists")]
    Exists,
    #[error("entry is a directory")]
    IsDir,
    #[error("directory is not empty")]
    NotEmpty,
    #[error("entry is not a directory")]
    NotDir,
    #[error("invalid argument")]
    Invalid,
    #[error("littlefs error {0}")]
    Other(i32),
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

impl From<Error> for Errno {
    fn from(err: Error) -> Self {
        match err {
            Error::NoEntry => Errno::Noent,
            Error::Exists => Errno::Exist,
            Error::IsDir => Errno::Isdir,
            Error::NotEmpty => Errno::Notempty,
            Error::NotDir => Errno::Notdir,
            Error::Invalid => Errno::Inval,
            Error::Other(code) => panic!("unmapped littlefs error code {}", code),
        }
    }
}

fn check(code: c_int) -> Result<c_int> {
    if code >= 0 {
        return Ok(code);
    }
    Err(match code {
        ERR_NOENT => Error::NoEntry,
        ERR_EXIST => Error::Exists,
        ERR_ISDIR => Error::IsDir,
        ERR_NOTEMPTY => Error::NotEmpty,
        ERR_NOTDIR => Error::NotDir,
        ERR_INVAL => Error::Invalid,
        other => Error::Other(other),
    })
}

fn cpath(path: &str) -> Result<CString> {
    CString::new(path).map_err(|_| Error::Invalid)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NodeKind {
    File,
    Dir,
}

impl NodeKind {
    pub(crate) fn filetype(self) -> Filetype {
        match self {
            Self::Dir => Filetype::Directory,
            Self::File => Filetype::RegularFile,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Info {
    pub(crate) kind: NodeKind,
    pub(crate) size: u32,
}

/// Translate WASI open semantics into littlefs open flags: the access mode
/// comes from the descriptor's rights, creation disposition from oflags.
pub(crate) fn open_flags(oflags: Oflags, rights: Rights) -> c_int {
    let mut flags = 0;
    if rights.contains(Rights::FD_READ) {
        flags |= O_RDONLY;
    }
    if rights.contains(Rights::FD_WRITE) {
        flags |= O_WRONLY;
    }
    if oflags.contains(Oflags::CREAT) {
        flags |= O_CREAT;
    }
    if oflags.contains(Oflags::EXCL) {
        flags |= O_EXCL;
    }
    if oflags.contains(Oflags::TRUNC) {
        flags |= O_TRUNC;
    }
    flags
}

struct FileState {
    raw: ll::lfs_file_t,
    config: ll::lfs_file_config,
    cache: [u8; CACHE_SIZE as usize],
}

/// An open regular file. The inner state is boxed because littlefs links
/// open files into an intrusive list and keeps a pointer to the per-file
/// configuration; neither may move until the file is closed.
pub(crate) struct File {
    state: Box<FileState>,
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File").finish_non_exhaustive()
    }
}

impl File {
    /// Current logical position, as littlefs tracks it.
    pub(crate) fn pos(&self) -> u32 {
        self.state.raw.pos
    }

    /// Toggle the backend's append mode on the open handle.
    pub(crate) fn set_append(&mut self, enabled: bool) {
        if enabled {
            self.state.raw.flags |= O_APPEND as u32;
        } else {
            self.state.raw.flags &= !(O_APPEND as u32);
        }
    }
}

/// An open directory handle.
pub(crate) struct Dir {
    state: Box<ll::lfs_dir_t>,
}

impl std::fmt::Debug for Dir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dir").finish_non_exhaustive()
    }
}

struct State {
    lfs: ll::lfs_t,
    config: ll::lfs_config,
    device: rambd::RamBd,
    read_cache: [u8; CACHE_SIZE as usize],
    prog_cache: [u8; CACHE_SIZE as usize],
    lookahead: Lookahead,
}

#[repr(align(8))]
struct Lookahead([u8; LOOKAHEAD_SIZE as usize]);

/// The mounted littlefs instance over its RAM block device.
pub(crate) struct Filesystem {
    state: Box<State>,
}

impl Filesystem {
    /// Create the block device, format, and mount. Done once per instance.
    pub(crate) fn new() -> Result<Self> {
        let mut state = Box::new(State {
            lfs: unsafe { mem::zeroed() },
            config: unsafe { mem::zeroed() },
            device: rambd::RamBd::new(),
            read_cache: [0; CACHE_SIZE as usize],
            prog_cache: [0; CACHE_SIZE as usize],
            lookahead: Lookahead([0; LOOKAHEAD_SIZE as usize]),
        });

        state.config.context = (&mut state.device as *mut rambd::RamBd).cast();
        state.config.read = Some(rambd::read);
        state.config.prog = Some(rambd::prog);
        state.config.erase = Some(rambd::erase);
        state.config.sync = Some(rambd::sync);
        state.config.read_size = READ_SIZE;
        state.config.prog_size = PROG_SIZE;
        state.config.block_size = rambd::BLOCK_SIZE;
        state.config.block_count = rambd::BLOCK_COUNT;
        state.config.block_cycles = BLOCK_CYCLES;
        state.config.cache_size = CACHE_SIZE;
        state.config.lookahead_size = LOOKAHEAD_SIZE;
        state.config.read_buffer = state.read_cache.as_mut_ptr().cast();
        state.config.prog_buffer = state.prog_cache.as_mut_ptr().cast();
        state.config.lookahead_buffer = state.lookahead.0.as_mut_ptr().cast();

        unsafe {
            check(ll::lfs_format(&mut state.lfs, &state.config))?;
            check(ll::lfs_mount(&mut state.lfs, &state.config))?;
        }
        Ok(Self { state })
    }

    pub(crate) fn open_file(&mut self, path: &str, flags: c_int) -> Result<File> {
        let path = cpath(path)?;
        let mut file = Box::new(FileState {
            raw: unsafe { mem::zeroed() },
            config: unsafe { mem::zeroed() },
            cache: [0; CACHE_SIZE as usize],
        });
        file.config.buffer = file.cache.as_mut_ptr().cast();
        unsafe {
            check(ll::lfs_file_opencfg(
                &mut self.state.lfs,
                &mut file.raw,
                path.as_ptr(),
                flags,
                &file.config,
            ))?;
        }
        Ok(File { state: file })
    }

    pub(crate) fn close_file(&mut self, file: &mut File) -> Result<()> {
        unsafe {
            check(ll::lfs_file_close(&mut self.state.lfs, &mut file.state.raw))?;
        }
        Ok(())
    }

    pub(crate) fn read(&mut self, file: &mut File, buffer: &mut [u8]) -> Result<usize> {
        let count = unsafe {
            check(ll::lfs_file_read(
                &mut self.state.lfs,
                &mut file.state.raw,
                buffer.as_mut_ptr().cast(),
                buffer.len() as ll::lfs_size_t,
            ))?
        };
        Ok(count as usize)
    }

    pub(crate) fn write(&mut self, file: &mut File, buffer: &[u8]) -> Result<usize> {
        let count = unsafe {
            check(ll::lfs_file_write(
                &mut self.state.lfs,
                &mut file.state.raw,
                buffer.as_ptr().cast(),
                buffer.len() as ll::lfs_size_t,
            ))?
        };
        Ok(count as usize)
    }

    pub(crate) fn seek(&mut self, file: &mut File, offset: i32, whence: c_int) -> Result<u32> {
        let position = unsafe {
            check(ll::lfs_file_seek(
                &mut self.state.lfs,
                &mut file.state.raw,
                offset,
                whence,
            ))?
        };
        Ok(position as u32)
    }

    pub(crate) fn sync(&mut self, file: &mut File) -> Result<()> {
        unsafe {
            check(ll::lfs_file_sync(&mut self.state.lfs, &mut file.state.raw))?;
        }
        Ok(())
    }

    pub(crate) fn truncate(&mut self, file: &mut File, size: u64) -> Result<()> {
        unsafe {
            check(ll::lfs_file_truncate(
                &mut self.state.lfs,
                &mut file.state.raw,
                size as ll::lfs_off_t,
            ))?;
        }
        Ok(())
    }

    pub(crate) fn size(&mut self, file: &mut File) -> Result<u64> {
        let size = unsafe { check(ll::lfs_file_size(&mut self.state.lfs, &mut file.state.raw))? };
        Ok(size as u64)
    }

    pub(crate) fn open_dir(&mut self, path: &str) -> Result<Dir> {
        let path = cpath(path)?;
        let mut dir: Box<ll::lfs_dir_t> = Box::new(unsafe { mem::zeroed() });
        unsafe {
            check(ll::lfs_dir_open(&mut self.state.lfs, &mut *dir, path.as_ptr()))?;
        }
        Ok(Dir { state: dir })
    }

    pub(crate) fn close_dir(&mut self, dir: &mut Dir) -> Result<()> {
        unsafe {
            check(ll::lfs_dir_close(&mut self.state.lfs, &mut *dir.state))?;
        }
        Ok(())
    }

    pub(crate) fn mkdir(&mut self, path: &str) -> Result<()> {
        let path = cpath(path)?;
        unsafe {
            check(ll::lfs_mkdir(&mut self.state.lfs, path.as_ptr()))?;
        }
        Ok(())
    }

    /// Create every directory along `path`, ignoring the ones that exist.
    pub(crate) fn mkdir_all(&mut self, path: &str) -> Result<()> {
        let mut prefix = String::with_capacity(path.len());
        for component in path.split('/').filter(|component| !component.is_empty()) {
            prefix.push('/');
            prefix.push_str(component);
            match self.mkdir(&prefix) {
                Ok(()) | Err(Error::Exists) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    pub(crate) fn remove(&mut self, path: &str) -> Result<()> {
        let path = cpath(path)?;
        unsafe {
            check(ll::lfs_remove(&mut self.state.lfs, path.as_ptr()))?;
        }
        Ok(())
    }

    pub(crate) fn rename(&mut self, old_path: &str, new_path: &str) -> Result<()> {
        let old_path = cpath(old_path)?;
        let new_path = cpath(new_path)?;
        unsafe {
            check(ll::lfs_rename(
                &mut self.state.lfs,
                old_path.as_ptr(),
                new_path.as_ptr(),
            ))?;
        }
        Ok(())
    }

    pub(crate) fn stat(&mut self, path: &str) -> Result<Info> {
        let path = cpath(path)?;
        let mut info: ll::lfs_info = unsafe { mem::zeroed() };
        unsafe {
            check(ll::lfs_stat(&mut self.state.lfs, path.as_ptr(), &mut info))?;
        }
        let kind = if info.type_ == TYPE_DIR {
            NodeKind::Dir
        } else {
            NodeKind::File
        };
        Ok(Info {
            kind,
            size: info.size,
        })
    }

    /// Read extended attribute `id` into `buffer`, returning the stored size.
    pub(crate) fn get_attr(&mut self, path: &str, id: u8, buffer: &mut [u8]) -> Result<usize> {
        let path = cpath(path)?;
        let size = unsafe {
            check(ll::lfs_getattr(
                &mut self.state.lfs,
                path.as_ptr(),
                id,
                buffer.as_mut_ptr().cast(),
                buffer.len() as ll::lfs_size_t,
            ))?
        };
        Ok(size as usize)
    }

    pub(crate) fn set_attr(&mut self, path: &str, id: u8, buffer: &[u8]) -> Result<()> {
        let path = cpath(path)?;
        unsafe {
            check(ll::lfs_setattr(
                &mut self.state.lfs,
                path.as_ptr(),
                id,
                buffer.as_ptr().cast(),
                buffer.len() as ll::lfs_size_t,
            ))?;
        }
        Ok(())
    }
}
