use crate::error::{Errno, Result};
use crate::sys;
use crate::wasi::{Fdflags, Filetype, Rights};
use std::fmt;

/// Rights of a descriptor, either already held or required.
#[derive(Debug, Copy, Clone)]
pub(crate) struct HandleRights {
    pub(crate) base: Rights,
    pub(crate) inheriting: Rights,
}

impl HandleRights {
    pub(crate) fn new(base: Rights, inheriting: Rights) -> Self {
        Self { base, inheriting }
    }

    /// Rights from `base` only, with `inheriting` set to none.
    pub(crate) fn from_base(base: Rights) -> Self {
        Self {
            base,
            inheriting: Rights::empty(),
        }
    }

    /// Check if `other` is a subset of these rights.
    pub(crate) fn contains(&self, other: &Self) -> bool {
        self.base.contains(other.base) && self.inheriting.contains(other.inheriting)
    }
}

impl fmt::Display for HandleRights {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "HandleRights {{ base: {:?}, inheriting: {:?} }}",
            self.base, self.inheriting
        )
    }
}

/// What a descriptor stands in front of: an open backend file, an open
/// backend directory, or the synthetic stdio stream fiction.
#[derive(Debug)]
pub(crate) enum Backing {
    File(sys::File),
    Dir(sys::Dir),
    Stream,
}

/// An owned descriptor record. Streams have an empty path; everything else
/// records the absolute path it was opened under (which goes stale if the
/// entry is renamed away underneath it, a preserved limitation).
#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) path: String,
    pub(crate) rights: HandleRights,
    pub(crate) fdflags: Fdflags,
    pub(crate) backing: Backing,
}

impl Entry {
    pub(crate) fn file(path: String, file: sys::File, rights: HandleRights, fdflags: Fdflags) -> Self {
        Self {
            path,
            rights,
            fdflags,
            backing: Backing::File(file),
        }
    }

    pub(crate) fn directory(
        path: String,
        dir: sys::Dir,
        rights: HandleRights,
        fdflags: Fdflags,
    ) -> Self {
        Self {
            path,
            rights,
            fdflags,
            backing: Backing::Dir(dir),
        }
    }

    /// A stdio stream descriptor: readable or writable per `rights`, never
    /// backed by the filesystem.
    pub(crate) fn stream(rights: Rights) -> Self {
        Self {
            path: String::new(),
            rights: HandleRights::new(Rights::POLL_FD_READWRITE | rights, Rights::all()),
            fdflags: Fdflags::empty(),
            backing: Backing::Stream,
        }
    }

    pub(crate) fn kind(&self) -> sys::NodeKind {
        match self.backing {
            Backing::Dir(_) => sys::NodeKind::Dir,
            Backing::File(_) | Backing::Stream => sys::NodeKind::File,
        }
    }

    pub(crate) fn is_stream(&self) -> bool {
        matches!(self.backing, Backing::Stream)
    }

    pub(crate) fn filetype(&self) -> Filetype {
        if self.is_stream() {
            Filetype::SocketStream
        } else {
            self.kind().filetype()
        }
    }

    pub(crate) fn file_mut(&mut self) -> &mut sys::File {
        match &mut self.backing {
            Backing::File(file) => file,
            _ => unreachable!("descriptor does not back a regular file"),
        }
    }

    /// Check this entry against `required`; `Notcapable` on failure.
    pub(crate) fn validate_rights(&self, required: &HandleRights) -> Result<()> {
        if self.rights.contains(required) {
            Ok(())
        } else {
            log::trace!(
                "validate_rights failed: required rights = {}; actual rights = {}",
                required,
                self.rights,
            );
            Err(Errno::Notcapable)
        }
    }
}
