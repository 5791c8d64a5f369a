use crate::entry::{Entry, HandleRights};
use crate::error::{Errno, Result};
use crate::logger;
use crate::metadata;
use crate::path;
use crate::sys::{self, NodeKind};
use crate::table::Table;
use crate::wasi::{Fd, Fdflags, Filestat, Fstflags, Oflags, Rights};
use serde::Deserialize;
use std::collections::BTreeMap;

/// The initialization document handed to `initialize_internal`:
/// preopen directory paths and a prepopulated file tree.
#[derive(Debug, Deserialize)]
struct InitDocument {
    preopens: Vec<String>,
    fs: BTreeMap<String, String>,
}

/// Everything one instance owns: the mounted backend and the descriptor
/// table (which carries the preopen list). Single-threaded by construction;
/// the dispatcher keeps the only value in a thread-local slot.
pub struct WasiCtx {
    pub(crate) fs: sys::Filesystem,
    pub(crate) table: Table,
}

impl std::fmt::Debug for WasiCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasiCtx").finish_non_exhaustive()
    }
}

impl WasiCtx {
    /// Format and mount a fresh image, then seed it from the JSON init
    /// document.
    pub fn from_json(document: &str) -> Result<Self> {
        install_diagnostics();
        let document: InitDocument = serde_json::from_str(document).map_err(|err| {
            log::error!("malformed init document: {}", err);
            Errno::Inval
        })?;
        let mut ctx = Self {
            fs: sys::Filesystem::new()?,
            table: Table::new(),
        };
        ctx.seed(&document)?;
        Ok(ctx)
    }

    fn seed(&mut self, document: &InitDocument) -> Result<()> {
        for preopen in &document.preopens {
            // Materialize the preopen root so files can be created directly
            // under it on an empty image.
            if let Err(err) = self.fs.mkdir_all(preopen) {
                log::debug!("preopen {} not materialized: {}", preopen, err);
            }
            let handle = self.fs.open_dir(preopen)?;
            let rights = HandleRights::new(Rights::PATH_RIGHTS, Rights::all());
            let entry = Entry::directory(preopen.clone(), handle, rights, Fdflags::empty());
            self.table.push_preopen(preopen.clone(), entry);
        }

        for (file_path, contents) in &document.fs {
            if let Some((parent, _)) = file_path.rsplit_once('/') {
                if !parent.is_empty() {
                    self.fs.mkdir_all(parent)?;
                }
            }
            let flags = sys::open_flags(Oflags::CREAT | Oflags::EXCL, Rights::FD_WRITE);
            let mut file = self.fs.open_file(file_path, flags)?;
            let written = self.fs.write(&mut file, contents.as_bytes())?;
            debug_assert_eq!(written, contents.len());
            self.fs.close_file(&mut file)?;
        }

        self.table.insert_at(0, Entry::stream(Rights::FD_READ));
        self.table.insert_at(1, Entry::stream(Rights::FD_WRITE));
        self.table.insert_at(2, Entry::stream(Rights::FD_WRITE));
        Ok(())
    }

    /// Resolve `relative` against the directory behind `dirfd`, checking
    /// `rights` on the way. The directory descriptor gate applies: a
    /// non-directory yields Notdir, missing rights Notcapable.
    pub(crate) fn resolve(&mut self, dirfd: Fd, rights: Rights, relative: &str) -> Result<String> {
        let dir = self.table.get(dirfd, Some(NodeKind::Dir), rights, false)?;
        let resolved = path::join(&dir.path, relative);
        log::trace!("resolved {:?} against fd={} to {:?}", relative, dirfd, resolved);
        Ok(resolved)
    }

    /// Stat `path` in the backend and merge in the timestamp sidecar.
    pub(crate) fn filestat(&mut self, stat_path: &str) -> Result<Filestat> {
        let info = self.fs.stat(stat_path)?;
        let times = metadata::get(&mut self.fs, stat_path);
        Ok(Filestat {
            dev: 0,
            ino: 0,
            filetype: info.kind.filetype() as u8,
            nlink: 1,
            size: u64::from(info.size),
            atim: times.atim,
            mtim: times.mtim,
            ctim: 0,
        })
    }

    /// Shared by the fd_ and path_ set_times variants. A timestamp may be
    /// set explicitly or to "now", never both.
    pub(crate) fn set_times(
        &mut self,
        times_path: &str,
        atim: u64,
        mtim: u64,
        fst_flags: Fstflags,
    ) -> Result<()> {
        if fst_flags.contains(Fstflags::ATIM) && fst_flags.contains(Fstflags::ATIM_NOW) {
            return Err(Errno::Inval);
        }
        if fst_flags.contains(Fstflags::MTIM) && fst_flags.contains(Fstflags::MTIM_NOW) {
            return Err(Errno::Inval);
        }

        let mut times = metadata::get(&mut self.fs, times_path);
        if fst_flags.contains(Fstflags::ATIM) {
            times.atim = atim;
        }
        if fst_flags.contains(Fstflags::MTIM) {
            times.mtim = mtim;
        }
        if fst_flags.contains(Fstflags::ATIM_NOW) {
            times.atim = metadata::now();
        }
        if fst_flags.contains(Fstflags::MTIM_NOW) {
            times.mtim = metadata::now();
        }
        metadata::set(&mut self.fs, times_path, times);
        Ok(())
    }
}

fn install_diagnostics() {
    logger::init();
    #[cfg(target_arch = "wasm32")]
    std::panic::set_hook(Box::new(|info| {
        crate::host::trace(true, &info.to_string());
    }));
}
