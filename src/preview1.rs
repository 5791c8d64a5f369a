//! The WASI preview-1 file and directory surface.
//!
//! One method per hostcall. Capability checks go through the descriptor
//! table's lookup gate, paths resolve against the owning directory
//! descriptor, and every write path is flushed before returning so reads
//! observe prior writes in program order. Link and readdir calls are
//! unconditionally unsupported.

use crate::ctx::WasiCtx;
use crate::entry::{Backing, Entry, HandleRights};
use crate::error::{Errno, Result};
use crate::metadata;
use crate::path;
use crate::sys::{self, NodeKind};
use crate::table::PREOPEN_BASE;
use crate::wasi::{
    Fd, Fdflags, Fdstat, Filestat, Filetype, Fstflags, Lookupflags, Oflags, Prestat, PrestatDir,
    Rights, Whence, PREOPENTYPE_DIR,
};

impl WasiCtx {
    pub fn fd_advise(&mut self, fd: Fd, _offset: u64, _len: u64, _advice: u8) -> Result<()> {
        self.table.get(fd, None, Rights::FD_ADVISE, false)?;
        Ok(())
    }

    /// Grow the file to `offset + len` if it is smaller; never shrinks.
    pub fn fd_allocate(&mut self, fd: Fd, offset: u64, len: u64) -> Result<()> {
        let entry = self
            .table
            .get_mut(fd, Some(NodeKind::File), Rights::FD_ALLOCATE, false)?;
        let file = entry.file_mut();
        let required = offset.saturating_add(len);
        if self.fs.size(file)? < required {
            self.fs.truncate(file, required)?;
            self.fs.sync(file)?;
        }
        Ok(())
    }

    pub fn fd_close(&mut self, fd: Fd) -> Result<()> {
        self.table.require_not_preopen(fd)?;
        let entry = self.table.get_mut(fd, None, Rights::empty(), false)?;
        match &mut entry.backing {
            Backing::File(file) => self.fs.close_file(file)?,
            Backing::Dir(dir) => self.fs.close_dir(dir)?,
            Backing::Stream => unreachable!("streams are rejected by the lookup gate"),
        }
        self.table.remove(fd)?;
        Ok(())
    }

    /// Every write is flushed synchronously, so sync requests reduce to a
    /// rights check.
    pub fn fd_datasync(&mut self, fd: Fd) -> Result<()> {
        self.table.get(fd, None, Rights::FD_DATASYNC, false)?;
        Ok(())
    }

    pub fn fd_sync(&mut self, fd: Fd) -> Result<()> {
        self.table.get(fd, None, Rights::FD_SYNC, false)?;
        Ok(())
    }

    pub fn fd_fdstat_get(&mut self, fd: Fd) -> Result<Fdstat> {
        let entry = self.table.get(fd, None, Rights::empty(), true)?;
        Ok(Fdstat {
            fs_filetype: entry.filetype() as u8,
            fs_flags: entry.fdflags.bits(),
            fs_rights_base: entry.rights.base.bits(),
            fs_rights_inheriting: entry.rights.inheriting.bits(),
        })
    }

    pub fn fd_fdstat_set_flags(&mut self, fd: Fd, flags: Fdflags) -> Result<()> {
        let entry = self
            .table
            .get_mut(fd, None, Rights::FD_FDSTAT_SET_FLAGS, true)?;
        entry.fdflags = flags;
        Ok(())
    }

    /// Rights may only shrink: both new masks must be subsets of what the
    /// descriptor already holds.
    pub fn fd_fdstat_set_rights(&mut self, fd: Fd, base: Rights, inheriting: Rights) -> Result<()> {
        let entry = self.table.get_mut(fd, None, Rights::empty(), true)?;

        let new_base = entry.rights.base & base;
        if new_base != base {
            return Err(Errno::Notcapable);
        }
        let new_inheriting = entry.rights.inheriting & inheriting;
        if new_inheriting != inheriting {
            return Err(Errno::Notcapable);
        }

        entry.rights = HandleRights::new(new_base, new_inheriting);
        Ok(())
    }

    pub fn fd_filestat_get(&mut self, fd: Fd) -> Result<Filestat> {
        // Streams answer before the rights check; they hold no filestat
        // right but still report the socket fiction.
        let entry = self.table.get(fd, None, Rights::empty(), true)?;
        if entry.is_stream() {
            return Ok(Filestat {
                filetype: Filetype::SocketStream as u8,
                nlink: 1,
                ..Filestat::default()
            });
        }
        entry.validate_rights(&HandleRights::from_base(Rights::FD_FILESTAT_GET))?;
        let stat_path = entry.path.clone();
        self.filestat(&stat_path)
    }

    pub fn fd_filestat_set_size(&mut self, fd: Fd, size: u64) -> Result<()> {
        let entry =
            self.table
                .get_mut(fd, Some(NodeKind::File), Rights::FD_FILESTAT_SET_SIZE, false)?;
        let file = entry.file_mut();
        self.fs.truncate(file, size)?;
        self.fs.sync(file)?;
        Ok(())
    }

    pub fn fd_filestat_set_times(
        &mut self,
        fd: Fd,
        atim: u64,
        mtim: u64,
        fst_flags: Fstflags,
    ) -> Result<()> {
        let entry = self
            .table
            .get(fd, None, Rights::FD_FILESTAT_SET_TIMES, false)?;
        let times_path = entry.path.clone();
        self.set_times(&times_path, atim, mtim, fst_flags)
    }

    /// Read at `offset` without moving the descriptor's cursor.
    pub fn fd_pread(&mut self, fd: Fd, iovs: &mut [&mut [u8]], offset: u64) -> Result<usize> {
        let entry = self
            .table
            .get_mut(fd, Some(NodeKind::File), Rights::FD_READ, false)?;
        let file = entry.file_mut();

        let previous = file.pos();
        self.fs.seek(file, offset as i32, sys::SEEK_SET)?;
        self.fs.sync(file)?;

        let mut read = 0;
        for iov in iovs.iter_mut() {
            read += self.fs.read(file, iov)?;
        }

        self.fs.seek(file, previous as i32, sys::SEEK_SET)?;
        self.fs.sync(file)?;
        Ok(read)
    }

    pub fn fd_prestat_get(&mut self, fd: Fd) -> Result<Prestat> {
        if fd < PREOPEN_BASE {
            return Err(Errno::Notsup);
        }
        let index = (fd - PREOPEN_BASE) as usize;
        let preopen = self.table.preopens().get(index).ok_or(Errno::Badf)?;
        Ok(Prestat {
            tag: PREOPENTYPE_DIR,
            u: PrestatDir {
                pr_name_len: preopen.len() as u32,
            },
        })
    }

    /// The guest is expected to size the buffer from a prior prestat_get;
    /// anything else is a protocol violation.
    pub fn fd_prestat_dir_name(&mut self, fd: Fd, buffer: &mut [u8]) -> Result<()> {
        if fd < PREOPEN_BASE {
            return Err(Errno::Notsup);
        }
        let index = (fd - PREOPEN_BASE) as usize;
        let preopen = self.table.preopens().get(index).ok_or(Errno::Badf)?;
        assert_eq!(buffer.len(), preopen.len(), "prestat name buffer mismatch");
        buffer.copy_from_slice(preopen.as_bytes());
        Ok(())
    }

    /// Write at `offset` without moving the descriptor's cursor.
    pub fn fd_pwrite(&mut self, fd: Fd, iovs: &[&[u8]], offset: u64) -> Result<usize> {
        let entry = self
            .table
            .get_mut(fd, Some(NodeKind::File), Rights::FD_WRITE, false)?;
        let file = entry.file_mut();

        let previous = file.pos();
        self.fs.seek(file, offset as i32, sys::SEEK_SET)?;
        self.fs.sync(file)?;

        let mut written = 0;
        for iov in iovs {
            written += self.fs.write(file, iov)?;
        }

        self.fs.seek(file, previous as i32, sys::SEEK_SET)?;
        self.fs.sync(file)?;
        Ok(written)
    }

    pub fn fd_read(&mut self, fd: Fd, iovs: &mut [&mut [u8]]) -> Result<usize> {
        let entry = self
            .table
            .get_mut(fd, Some(NodeKind::File), Rights::FD_READ, false)?;
        let file = entry.file_mut();

        let mut read = 0;
        for iov in iovs.iter_mut() {
            read += self.fs.read(file, iov)?;
        }
        self.fs.sync(file)?;
        Ok(read)
    }

    pub fn fd_readdir(&mut self, _fd: Fd, _buffer: &mut [u8], _cookie: u64) -> Result<usize> {
        Err(Errno::Nosys)
    }

    /// Move the descriptor at `from` to `to`, closing whatever occupied
    /// `to`. Preopens can be neither source nor (via the close) target.
    pub fn fd_renumber(&mut self, from: Fd, to: Fd) -> Result<()> {
        self.table.require_not_preopen(from)?;
        if !self.table.contains(from) {
            return Err(Errno::Badf);
        }
        if self.table.contains(to) {
            self.fd_close(to)?;
        }
        let entry = self.table.remove(from)?;
        self.table.insert_at(to, entry);
        Ok(())
    }

    pub fn fd_seek(&mut self, fd: Fd, offset: i64, whence: Whence) -> Result<u64> {
        // A pure position query only needs the weaker tell capability.
        let read_only = whence == Whence::Cur && offset == 0;
        let required = if read_only {
            Rights::FD_SEEK | Rights::FD_TELL
        } else {
            Rights::FD_SEEK
        };
        // Streams are unseekable regardless of rights.
        let entry = self.table.get_mut(fd, Some(NodeKind::File), Rights::empty(), true)?;
        if entry.is_stream() {
            return Err(Errno::Spipe);
        }
        entry.validate_rights(&HandleRights::from_base(required))?;
        let file = entry.file_mut();

        let whence = match whence {
            Whence::Set => sys::SEEK_SET,
            Whence::Cur => sys::SEEK_CUR,
            Whence::End => sys::SEEK_END,
        };
        let position = self.fs.seek(file, offset as i32, whence)?;
        Ok(u64::from(position))
    }

    pub fn fd_tell(&mut self, fd: Fd) -> Result<u64> {
        self.fd_seek(fd, 0, Whence::Cur)
    }

    /// Append mode must not disturb the cursor the guest observes through
    /// fd_tell: the backend's append flag is set for the duration of the
    /// write and the previous position restored afterwards.
    pub fn fd_write(&mut self, fd: Fd, iovs: &[&[u8]]) -> Result<usize> {
        let entry = self
            .table
            .get_mut(fd, Some(NodeKind::File), Rights::FD_WRITE, false)?;
        let append = entry.fdflags.contains(Fdflags::APPEND);
        let file = entry.file_mut();

        self.fs.sync(file)?;
        let previous = file.pos();
        if append {
            file.set_append(true);
        }

        let mut written = 0;
        for iov in iovs {
            written += self.fs.write(file, iov)?;
        }

        if append {
            file.set_append(false);
            self.fs.seek(file, previous as i32, sys::SEEK_SET)?;
        }
        self.fs.sync(file)?;
        Ok(written)
    }

    pub fn path_create_directory(&mut self, dirfd: Fd, relative: &str) -> Result<()> {
        let resolved = self.resolve(dirfd, Rights::PATH_CREATE_DIRECTORY, relative)?;
        self.fs.mkdir(&resolved)?;
        Ok(())
    }

    pub fn path_filestat_get(
        &mut self,
        dirfd: Fd,
        _flags: Lookupflags,
        relative: &str,
    ) -> Result<Filestat> {
        let resolved = self.resolve(dirfd, Rights::PATH_FILESTAT_GET, relative)?;
        self.filestat(&resolved)
    }

    pub fn path_filestat_set_times(
        &mut self,
        dirfd: Fd,
        _flags: Lookupflags,
        relative: &str,
        atim: u64,
        mtim: u64,
        fst_flags: Fstflags,
    ) -> Result<()> {
        let resolved = self.resolve(dirfd, Rights::PATH_FILESTAT_SET_TIMES, relative)?;
        self.set_times(&resolved, atim, mtim, fst_flags)
    }

    pub fn path_link(
        &mut self,
        _old_dirfd: Fd,
        _old_flags: Lookupflags,
        _old_relative: &str,
        _new_dirfd: Fd,
        _new_relative: &str,
    ) -> Result<()> {
        Err(Errno::Nosys)
    }

    pub fn path_open(
        &mut self,
        dirfd: Fd,
        _dirflags: Lookupflags,
        relative: &str,
        oflags: Oflags,
        rights_base: Rights,
        rights_inheriting: Rights,
        fdflags: Fdflags,
    ) -> Result<Fd> {
        let mut required = Rights::PATH_OPEN;
        if oflags.contains(Oflags::CREAT) {
            required |= Rights::PATH_CREATE_FILE;
        }
        if oflags.contains(Oflags::TRUNC) {
            required |= Rights::PATH_FILESTAT_SET_SIZE;
        }

        let dir = self.table.get(dirfd, Some(NodeKind::Dir), required, false)?;
        let dir_inheriting = dir.rights.inheriting;
        let resolved = path::join(&dir.path, relative);

        // The new descriptor holds at most what the directory passes down,
        // and a descriptor kind only ever carries its own rights category.
        let mut base = rights_base & dir_inheriting;
        let entry = if oflags.contains(Oflags::DIRECTORY) {
            base &= !Rights::FD_RIGHTS;
            let handle = self.fs.open_dir(&resolved)?;
            let rights = HandleRights::new(base, rights_inheriting);
            Entry::directory(resolved.clone(), handle, rights, fdflags)
        } else {
            base &= !Rights::PATH_RIGHTS;
            let handle = self.fs.open_file(&resolved, sys::open_flags(oflags, base))?;
            let rights = HandleRights::new(base, rights_inheriting);
            Entry::file(resolved.clone(), handle, rights, fdflags)
        };
        let fd = self.table.insert(entry);

        // Touch the sidecar so the record exists from the first open.
        let times = metadata::get(&mut self.fs, &resolved);
        metadata::set(&mut self.fs, &resolved, times);

        Ok(fd)
    }

    pub fn path_readlink(
        &mut self,
        _dirfd: Fd,
        _relative: &str,
        _buffer: &mut [u8],
    ) -> Result<usize> {
        Err(Errno::Nosys)
    }

    pub fn path_remove_directory(&mut self, dirfd: Fd, relative: &str) -> Result<()> {
        let resolved = self.resolve(dirfd, Rights::PATH_REMOVE_DIRECTORY, relative)?;
        if let Ok(info) = self.fs.stat(&resolved) {
            if info.kind != NodeKind::Dir {
                return Err(Errno::Notdir);
            }
        }
        self.fs.remove(&resolved)?;
        Ok(())
    }

    pub fn path_rename(
        &mut self,
        old_dirfd: Fd,
        old_relative: &str,
        new_dirfd: Fd,
        new_relative: &str,
    ) -> Result<()> {
        let old_path = self.resolve(old_dirfd, Rights::PATH_RENAME_SOURCE, old_relative)?;
        let source_is_file = self.is_regular_file(&old_path);
        if source_is_file && old_path.ends_with('/') {
            return Err(Errno::Notdir);
        }

        let mut new_path = self.resolve(new_dirfd, Rights::PATH_RENAME_TARGET, new_relative)?;
        if source_is_file {
            if new_path.ends_with('/') {
                return Err(Errno::Notdir);
            }
        } else if new_path.ends_with('/') {
            // trailing '/' is valid for a directory but not for the backend's
            // destination path
            new_path.pop();
        }

        match self.fs.rename(&old_path, &new_path) {
            Err(sys::Error::IsDir) => {
                // For type mismatches, report based on the destination's type.
                if self.is_regular_file(&new_path) {
                    Err(Errno::Notdir)
                } else {
                    Err(Errno::Isdir)
                }
            }
            other => Ok(other?),
        }
    }

    pub fn path_symlink(&mut self, _old: &str, _dirfd: Fd, _new: &str) -> Result<()> {
        Err(Errno::Nosys)
    }

    pub fn path_unlink_file(&mut self, dirfd: Fd, relative: &str) -> Result<()> {
        let resolved = self.resolve(dirfd, Rights::PATH_UNLINK_FILE, relative)?;
        if let Ok(info) = self.fs.stat(&resolved) {
            if info.kind == NodeKind::Dir {
                return Err(Errno::Isdir);
            }
        }
        if resolved.ends_with('/') {
            return Err(Errno::Notdir);
        }
        self.fs.remove(&resolved)?;
        Ok(())
    }

    fn is_regular_file(&mut self, stat_path: &str) -> bool {
        matches!(
            self.fs.stat(stat_path),
            Ok(info) if info.kind == NodeKind::File
        )
    }
}
