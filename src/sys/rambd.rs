//! RAM block device backing the littlefs image.
//!
//! The geometry is fixed at 128 blocks of 4096 bytes. The callbacks below
//! are handed to littlefs through the mount configuration; `context` in the
//! configuration points back at the owning [`RamBd`].

use littlefs2_sys as ll;
use std::os::raw::{c_int, c_void};

pub(crate) const BLOCK_SIZE: u32 = 4096;
pub(crate) const BLOCK_COUNT: u32 = 128;

pub(crate) struct RamBd {
    blocks: Box<[u8]>,
}

impl RamBd {
    pub(crate) fn new() -> Self {
        Self {
            blocks: vec![0xff; (BLOCK_SIZE * BLOCK_COUNT) as usize].into_boxed_slice(),
        }
    }
}

unsafe fn device<'a>(config: *const ll::lfs_config) -> &'a mut RamBd {
    &mut *((*config).context as *mut RamBd)
}

pub(crate) unsafe extern "C" fn read(
    config: *const ll::lfs_config,
    block: ll::lfs_block_t,
    off: ll::lfs_off_t,
    buffer: *mut c_void,
    size: ll::lfs_size_t,
) -> c_int {
    let device = device(config);
    let start = (block * BLOCK_SIZE + off) as usize;
    let source = &device.blocks[start..start + size as usize];
    std::ptr::copy_nonoverlapping(source.as_ptr(), buffer as *mut u8, size as usize);
    0
}

pub(crate) unsafe extern "C" fn prog(
    config: *const ll::lfs_config,
    block: ll::lfs_block_t,
    off: ll::lfs_off_t,
    buffer: *const c_void,
    size: ll::lfs_size_t,
) -> c_int {
    let device = device(config);
    let start = (block * BLOCK_SIZE + off) as usize;
    let target = &mut device.blocks[start..start + size as usize];
    std::ptr::copy_nonoverlapping(buffer as *const u8, target.as_mut_ptr(), size as usize);
    0
}

pub(crate) unsafe extern "C" fn erase(config: *const ll::lfs_config, block: ll::lfs_block_t) -> c_int {
    let device = device(config);
    let start = (block * BLOCK_SIZE) as usize;
    device.blocks[start..start + BLOCK_SIZE as usize].fill(0xff);
    0
}

pub(crate) unsafe extern "C" fn sync(_config: *const ll::lfs_config) -> c_int {
    0
}
