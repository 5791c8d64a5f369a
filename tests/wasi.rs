//! End-to-end tests driving the façade the way a guest would: initialize
//! from a JSON document, then issue fs/path calls against the preopen.

use wasi_memfs::wasi::{Fd, Fdflags, Fstflags, Lookupflags, Oflags, Rights, Whence};
use wasi_memfs::{Errno, WasiCtx};

const ROOT: Fd = 3;

fn ctx() -> WasiCtx {
    WasiCtx::from_json(r#"{"preopens":["/root"],"fs":{}}"#).expect("initialize")
}

fn open(ctx: &mut WasiCtx, name: &str, oflags: Oflags, rights: Rights, fdflags: Fdflags) -> Fd {
    ctx.path_open(
        ROOT,
        Lookupflags::empty(),
        name,
        oflags,
        rights,
        Rights::all(),
        fdflags,
    )
    .expect("path_open")
}

fn create(ctx: &mut WasiCtx, name: &str, contents: &[u8]) {
    let fd = open(ctx, name, Oflags::CREAT, Rights::FD_WRITE, Fdflags::empty());
    assert_eq!(ctx.fd_write(fd, &[contents]).unwrap(), contents.len());
    ctx.fd_close(fd).unwrap();
}

fn read_file(ctx: &mut WasiCtx, name: &str) -> Vec<u8> {
    let fd = open(
        ctx,
        name,
        Oflags::empty(),
        Rights::FD_READ | Rights::FD_FILESTAT_GET,
        Fdflags::empty(),
    );
    let size = ctx.fd_filestat_get(fd).unwrap().size as usize;
    let mut buffer = vec![0u8; size];
    assert_eq!(ctx.fd_read(fd, &mut [buffer.as_mut_slice()]).unwrap(), size);
    ctx.fd_close(fd).unwrap();
    buffer
}

#[test]
fn initialize_and_list_preopen() {
    let mut ctx = ctx();
    let prestat = ctx.fd_prestat_get(ROOT).unwrap();
    assert_eq!(prestat.tag, 0);
    assert_eq!(prestat.u.pr_name_len, 5);

    let mut name = [0u8; 5];
    ctx.fd_prestat_dir_name(ROOT, &mut name).unwrap();
    assert_eq!(&name, b"/root");

    assert_eq!(ctx.fd_prestat_get(2).unwrap_err(), Errno::Notsup);
    assert_eq!(ctx.fd_prestat_get(4).unwrap_err(), Errno::Badf);
}

#[test]
fn initialize_seeds_the_file_tree() {
    let mut ctx =
        WasiCtx::from_json(r#"{"preopens":["/root"],"fs":{"/root/a/b/hello.txt":"hello"}}"#)
            .unwrap();
    assert_eq!(read_file(&mut ctx, "a/b/hello.txt"), b"hello");
}

#[test]
fn malformed_init_document_is_inval() {
    assert_eq!(WasiCtx::from_json("{").unwrap_err(), Errno::Inval);
    assert_eq!(
        WasiCtx::from_json(r#"{"preopens":[]}"#).unwrap_err(),
        Errno::Inval
    );
}

#[test]
fn create_write_read() {
    let mut ctx = ctx();
    let fd = open(
        &mut ctx,
        "f",
        Oflags::CREAT,
        Rights::FD_WRITE,
        Fdflags::empty(),
    );
    assert_eq!(ctx.fd_write(fd, &[b"hello".as_slice()]).unwrap(), 5);
    ctx.fd_close(fd).unwrap();

    let fd = open(
        &mut ctx,
        "f",
        Oflags::empty(),
        Rights::FD_READ,
        Fdflags::empty(),
    );
    let mut buffer = [0u8; 5];
    assert_eq!(ctx.fd_read(fd, &mut [&mut buffer[..]]).unwrap(), 5);
    assert_eq!(&buffer, b"hello");
    ctx.fd_close(fd).unwrap();
}

#[test]
fn scatter_gather_io() {
    let mut ctx = ctx();
    let fd = open(
        &mut ctx,
        "f",
        Oflags::CREAT,
        Rights::FD_READ | Rights::FD_WRITE,
        Fdflags::empty(),
    );
    let parts = [b"ab".as_slice(), b"cd".as_slice(), b"ef".as_slice()];
    assert_eq!(ctx.fd_write(fd, &parts).unwrap(), 6);

    let mut first = [0u8; 4];
    let mut second = [0u8; 2];
    assert_eq!(
        ctx.fd_pread(fd, &mut [&mut first[..], &mut second[..]], 0)
            .unwrap(),
        6
    );
    assert_eq!(&first, b"abcd");
    assert_eq!(&second, b"ef");
}

#[test]
fn unlink_refuses_directories() {
    let mut ctx = ctx();
    ctx.path_create_directory(ROOT, "d").unwrap();
    assert_eq!(ctx.path_unlink_file(ROOT, "d").unwrap_err(), Errno::Isdir);
    ctx.path_remove_directory(ROOT, "d").unwrap();
    assert_eq!(
        ctx.path_filestat_get(ROOT, Lookupflags::empty(), "d")
            .unwrap_err(),
        Errno::Noent
    );
}

#[test]
fn unlink_with_trailing_slash_is_notdir() {
    let mut ctx = ctx();
    create(&mut ctx, "f", b"x");
    assert_eq!(ctx.path_unlink_file(ROOT, "f/").unwrap_err(), Errno::Notdir);
    ctx.path_unlink_file(ROOT, "f").unwrap();
}

#[test]
fn remove_directory_on_file_is_notdir() {
    let mut ctx = ctx();
    create(&mut ctx, "f", b"x");
    assert_eq!(
        ctx.path_remove_directory(ROOT, "f").unwrap_err(),
        Errno::Notdir
    );
}

#[test]
fn remove_directory_requires_empty() {
    let mut ctx = ctx();
    ctx.path_create_directory(ROOT, "d").unwrap();
    create(&mut ctx, "d/f", b"x");
    assert_eq!(
        ctx.path_remove_directory(ROOT, "d").unwrap_err(),
        Errno::Notempty
    );
    ctx.path_unlink_file(ROOT, "d/f").unwrap();
    ctx.path_remove_directory(ROOT, "d").unwrap();
}

#[test]
fn seek_on_stream_is_spipe() {
    let mut ctx = ctx();
    for fd in 0..3 {
        assert_eq!(ctx.fd_seek(fd, 0, Whence::Set).unwrap_err(), Errno::Spipe);
        assert_eq!(ctx.fd_tell(fd).unwrap_err(), Errno::Spipe);
    }
}

#[test]
fn stream_filestat_reports_socket() {
    let mut ctx = ctx();
    let stat = ctx.fd_filestat_get(1).unwrap();
    assert_eq!(stat.filetype, 6); // socket_stream
    assert_eq!(stat.nlink, 1);
    assert_eq!(stat.size, 0);

    let fdstat = ctx.fd_fdstat_get(0).unwrap();
    assert_eq!(fdstat.fs_filetype, 6);
    assert!(Rights::from_bits_retain(fdstat.fs_rights_base).contains(Rights::FD_READ));
}

#[test]
fn streams_reject_filesystem_operations() {
    let mut ctx = ctx();
    let mut buffer = [0u8; 1];
    assert_eq!(
        ctx.fd_read(0, &mut [&mut buffer[..]]).unwrap_err(),
        Errno::Notsup
    );
    assert_eq!(ctx.fd_close(1).unwrap_err(), Errno::Notsup);
    assert_eq!(ctx.fd_datasync(2).unwrap_err(), Errno::Notsup);
}

#[test]
fn append_writes_leave_the_cursor_alone() {
    let mut ctx = ctx();
    let fd = open(
        &mut ctx,
        "a",
        Oflags::CREAT,
        Rights::FD_WRITE | Rights::FD_SEEK | Rights::FD_TELL,
        Fdflags::APPEND,
    );
    assert_eq!(ctx.fd_write(fd, &[b"AB".as_slice()]).unwrap(), 2);
    assert_eq!(ctx.fd_write(fd, &[b"CD".as_slice()]).unwrap(), 2);
    assert_eq!(ctx.fd_tell(fd).unwrap(), 0);
    ctx.fd_close(fd).unwrap();

    assert_eq!(read_file(&mut ctx, "a"), b"ABCD");
}

#[test]
fn append_lands_at_end_of_file_after_seek() {
    let mut ctx = ctx();
    let fd = open(
        &mut ctx,
        "a",
        Oflags::CREAT,
        Rights::FD_WRITE | Rights::FD_SEEK | Rights::FD_TELL,
        Fdflags::APPEND,
    );
    ctx.fd_write(fd, &[b"AB".as_slice()]).unwrap();
    ctx.fd_seek(fd, 1, Whence::Set).unwrap();
    ctx.fd_write(fd, &[b"ZZ".as_slice()]).unwrap();
    assert_eq!(ctx.fd_tell(fd).unwrap(), 1);
    ctx.fd_close(fd).unwrap();

    assert_eq!(read_file(&mut ctx, "a"), b"ABZZ");
}

#[test]
fn positional_io_does_not_move_the_cursor() {
    let mut ctx = ctx();
    let fd = open(
        &mut ctx,
        "f",
        Oflags::CREAT,
        Rights::FD_READ | Rights::FD_WRITE | Rights::FD_SEEK | Rights::FD_TELL,
        Fdflags::empty(),
    );
    ctx.fd_write(fd, &[b"abcdef".as_slice()]).unwrap();
    ctx.fd_seek(fd, 2, Whence::Set).unwrap();

    let mut buffer = [0u8; 2];
    assert_eq!(ctx.fd_pread(fd, &mut [&mut buffer[..]], 4).unwrap(), 2);
    assert_eq!(&buffer, b"ef");
    assert_eq!(ctx.fd_tell(fd).unwrap(), 2);

    assert_eq!(ctx.fd_pwrite(fd, &[b"XY".as_slice()], 0).unwrap(), 2);
    assert_eq!(ctx.fd_tell(fd).unwrap(), 2);
    ctx.fd_close(fd).unwrap();

    assert_eq!(read_file(&mut ctx, "f"), b"XYcdef");
}

#[test]
fn rights_shrink_only() {
    let mut ctx = ctx();
    let fd = open(
        &mut ctx,
        "f",
        Oflags::CREAT,
        Rights::FD_READ | Rights::FD_WRITE,
        Fdflags::empty(),
    );

    // growing the mask back is refused
    assert_eq!(
        ctx.fd_fdstat_set_rights(fd, Rights::FD_RIGHTS, Rights::all())
            .unwrap_err(),
        Errno::Notcapable
    );

    ctx.fd_fdstat_set_rights(fd, Rights::FD_READ, Rights::all())
        .unwrap();
    assert_eq!(
        ctx.fd_write(fd, &[b"x".as_slice()]).unwrap_err(),
        Errno::Notcapable
    );

    let mut buffer = [0u8; 1];
    ctx.fd_read(fd, &mut [&mut buffer[..]]).unwrap();
}

#[test]
fn missing_rights_are_notcapable_and_change_nothing() {
    let mut ctx = ctx();
    create(&mut ctx, "f", b"keep");

    let fd = open(
        &mut ctx,
        "f",
        Oflags::empty(),
        Rights::FD_READ,
        Fdflags::empty(),
    );
    assert_eq!(
        ctx.fd_write(fd, &[b"clobber".as_slice()]).unwrap_err(),
        Errno::Notcapable
    );
    assert_eq!(ctx.fd_datasync(fd).unwrap_err(), Errno::Notcapable);
    ctx.fd_close(fd).unwrap();

    assert_eq!(read_file(&mut ctx, "f"), b"keep");
}

#[test]
fn preopens_are_permanent() {
    let mut ctx = ctx();
    assert_eq!(ctx.fd_close(ROOT).unwrap_err(), Errno::Notsup);
    assert_eq!(ctx.fd_renumber(ROOT, 1000).unwrap_err(), Errno::Notsup);

    // renumbering onto a preopen would have to close it first
    let fd = open(
        &mut ctx,
        "f",
        Oflags::CREAT,
        Rights::FD_WRITE,
        Fdflags::empty(),
    );
    assert_eq!(ctx.fd_renumber(fd, ROOT).unwrap_err(), Errno::Notsup);

    // the preopen still answers
    ctx.fd_prestat_get(ROOT).unwrap();
}

#[test]
fn renumber_moves_the_descriptor() {
    let mut ctx = ctx();
    let fd = open(
        &mut ctx,
        "f",
        Oflags::CREAT,
        Rights::FD_WRITE | Rights::FD_SEEK | Rights::FD_TELL,
        Fdflags::empty(),
    );
    ctx.fd_renumber(fd, 1000).unwrap();
    assert_eq!(ctx.fd_tell(fd).unwrap_err(), Errno::Badf);
    assert_eq!(ctx.fd_tell(1000).unwrap(), 0);
    ctx.fd_close(1000).unwrap();
}

#[test]
fn renumber_closes_the_old_target() {
    let mut ctx = ctx();
    let first = open(
        &mut ctx,
        "f",
        Oflags::CREAT,
        Rights::FD_WRITE,
        Fdflags::empty(),
    );
    let second = open(
        &mut ctx,
        "g",
        Oflags::CREAT,
        Rights::FD_WRITE | Rights::FD_SEEK | Rights::FD_TELL,
        Fdflags::empty(),
    );
    ctx.fd_renumber(second, first).unwrap();
    assert_eq!(ctx.fd_tell(second).unwrap_err(), Errno::Badf);
    assert_eq!(ctx.fd_tell(first).unwrap(), 0);
}

#[test]
fn directory_descriptors_refuse_file_io() {
    let mut ctx = ctx();
    ctx.path_create_directory(ROOT, "d").unwrap();
    let fd = open(
        &mut ctx,
        "d",
        Oflags::DIRECTORY,
        Rights::all(),
        Fdflags::empty(),
    );
    assert_eq!(ctx.fd_fdstat_get(fd).unwrap().fs_filetype, 3); // directory

    let mut buffer = [0u8; 1];
    assert_eq!(
        ctx.fd_read(fd, &mut [&mut buffer[..]]).unwrap_err(),
        Errno::Badf
    );
    assert_eq!(
        ctx.fd_write(fd, &[b"x".as_slice()]).unwrap_err(),
        Errno::Badf
    );
    ctx.fd_close(fd).unwrap();
}

#[test]
fn regular_descriptors_refuse_path_calls() {
    let mut ctx = ctx();
    let fd = open(
        &mut ctx,
        "f",
        Oflags::CREAT,
        Rights::FD_WRITE,
        Fdflags::empty(),
    );
    assert_eq!(
        ctx.path_create_directory(fd, "sub").unwrap_err(),
        Errno::Notdir
    );
}

#[test]
fn open_masks_rights_through_the_directory() {
    let mut ctx = ctx();
    // the preopen inherits everything, so the file keeps the fd category
    let fd = open(&mut ctx, "f", Oflags::CREAT, Rights::all(), Fdflags::empty());
    let stat = ctx.fd_fdstat_get(fd).unwrap();
    let base = Rights::from_bits_retain(stat.fs_rights_base);
    assert!(base.contains(Rights::FD_READ | Rights::FD_WRITE));
    // path-category rights never survive onto a regular file
    assert!(!base.intersects(Rights::PATH_RIGHTS));
}

#[test]
fn fdstat_set_flags_updates_the_flags() {
    let mut ctx = ctx();
    let fd = open(&mut ctx, "f", Oflags::CREAT, Rights::all(), Fdflags::empty());
    ctx.fd_fdstat_set_flags(fd, Fdflags::APPEND).unwrap();
    let stat = ctx.fd_fdstat_get(fd).unwrap();
    assert_eq!(stat.fs_flags, Fdflags::APPEND.bits());
}

#[test]
fn allocate_only_grows() {
    let mut ctx = ctx();
    let fd = open(
        &mut ctx,
        "f",
        Oflags::CREAT,
        Rights::FD_WRITE | Rights::FD_ALLOCATE | Rights::FD_FILESTAT_GET,
        Fdflags::empty(),
    );
    ctx.fd_write(fd, &[b"abc".as_slice()]).unwrap();
    ctx.fd_allocate(fd, 0, 2).unwrap();
    assert_eq!(ctx.fd_filestat_get(fd).unwrap().size, 3);
    ctx.fd_allocate(fd, 4, 4).unwrap();
    assert_eq!(ctx.fd_filestat_get(fd).unwrap().size, 8);
}

#[test]
fn filestat_set_size_truncates() {
    let mut ctx = ctx();
    let fd = open(
        &mut ctx,
        "f",
        Oflags::CREAT,
        Rights::FD_WRITE | Rights::FD_FILESTAT_SET_SIZE | Rights::FD_FILESTAT_GET,
        Fdflags::empty(),
    );
    ctx.fd_write(fd, &[b"abcdef".as_slice()]).unwrap();
    ctx.fd_filestat_set_size(fd, 2).unwrap();
    assert_eq!(ctx.fd_filestat_get(fd).unwrap().size, 2);
    ctx.fd_close(fd).unwrap();
    assert_eq!(read_file(&mut ctx, "f"), b"ab");
}

#[test]
fn fresh_files_report_default_timestamps() {
    let mut ctx = ctx();
    create(&mut ctx, "f", b"x");
    let stat = ctx
        .path_filestat_get(ROOT, Lookupflags::empty(), "f")
        .unwrap();
    assert_eq!(stat.filetype, 4); // regular_file
    assert_eq!(stat.size, 1);
    assert_eq!(stat.atim, 100);
    assert_eq!(stat.mtim, 100);
}

#[test]
fn set_times_explicit_values() {
    let mut ctx = ctx();
    create(&mut ctx, "f", b"x");
    ctx.path_filestat_set_times(
        ROOT,
        Lookupflags::empty(),
        "f",
        7,
        9,
        Fstflags::ATIM | Fstflags::MTIM,
    )
    .unwrap();
    let stat = ctx
        .path_filestat_get(ROOT, Lookupflags::empty(), "f")
        .unwrap();
    assert_eq!(stat.atim, 7);
    assert_eq!(stat.mtim, 9);
}

#[test]
fn set_times_now_scales_the_host_clock() {
    let mut ctx = ctx();
    create(&mut ctx, "f", b"x");
    wasi_memfs::sim::set_now_ms(5);
    ctx.path_filestat_set_times(
        ROOT,
        Lookupflags::empty(),
        "f",
        0,
        0,
        Fstflags::ATIM_NOW | Fstflags::MTIM_NOW,
    )
    .unwrap();
    let stat = ctx
        .path_filestat_get(ROOT, Lookupflags::empty(), "f")
        .unwrap();
    assert_eq!(stat.atim, 50_000_000);
    assert_eq!(stat.mtim, 50_000_000);
}

#[test]
fn contradictory_time_flags_are_inval_and_change_nothing() {
    let mut ctx = ctx();
    create(&mut ctx, "f", b"x");
    for flags in [
        Fstflags::ATIM | Fstflags::ATIM_NOW,
        Fstflags::MTIM | Fstflags::MTIM_NOW,
    ] {
        assert_eq!(
            ctx.path_filestat_set_times(ROOT, Lookupflags::empty(), "f", 1, 1, flags)
                .unwrap_err(),
            Errno::Inval
        );
    }
    let stat = ctx
        .path_filestat_get(ROOT, Lookupflags::empty(), "f")
        .unwrap();
    assert_eq!(stat.atim, 100);
    assert_eq!(stat.mtim, 100);
}

#[test]
fn fd_filestat_set_times_goes_through_the_descriptor() {
    let mut ctx = ctx();
    let fd = open(
        &mut ctx,
        "f",
        Oflags::CREAT,
        Rights::FD_FILESTAT_SET_TIMES | Rights::FD_FILESTAT_GET | Rights::FD_WRITE,
        Fdflags::empty(),
    );
    ctx.fd_filestat_set_times(fd, 11, 13, Fstflags::ATIM | Fstflags::MTIM)
        .unwrap();
    let stat = ctx.fd_filestat_get(fd).unwrap();
    assert_eq!(stat.atim, 11);
    assert_eq!(stat.mtim, 13);
}

#[test]
fn rename_moves_files() {
    let mut ctx = ctx();
    create(&mut ctx, "a", b"payload");
    ctx.path_rename(ROOT, "a", ROOT, "b").unwrap();
    assert_eq!(read_file(&mut ctx, "b"), b"payload");
    assert_eq!(
        ctx.path_filestat_get(ROOT, Lookupflags::empty(), "a")
            .unwrap_err(),
        Errno::Noent
    );
}

#[test]
fn rename_file_onto_directory_is_isdir() {
    let mut ctx = ctx();
    create(&mut ctx, "f", b"x");
    ctx.path_create_directory(ROOT, "d").unwrap();
    assert_eq!(
        ctx.path_rename(ROOT, "f", ROOT, "d").unwrap_err(),
        Errno::Isdir
    );
}

#[test]
fn rename_directory_onto_file_is_notdir() {
    let mut ctx = ctx();
    ctx.path_create_directory(ROOT, "d").unwrap();
    create(&mut ctx, "f", b"x");
    assert_eq!(
        ctx.path_rename(ROOT, "d", ROOT, "f").unwrap_err(),
        Errno::Notdir
    );
}

#[test]
fn rename_file_with_trailing_slash_is_notdir() {
    let mut ctx = ctx();
    create(&mut ctx, "f", b"x");
    assert_eq!(
        ctx.path_rename(ROOT, "f", ROOT, "g/").unwrap_err(),
        Errno::Notdir
    );
}

#[test]
fn rename_directory_strips_trailing_slash() {
    let mut ctx = ctx();
    ctx.path_create_directory(ROOT, "d").unwrap();
    ctx.path_rename(ROOT, "d", ROOT, "e/").unwrap();
    let stat = ctx
        .path_filestat_get(ROOT, Lookupflags::empty(), "e")
        .unwrap();
    assert_eq!(stat.filetype, 3); // directory
}

#[test]
fn readdir_and_links_are_nosys() {
    let mut ctx = ctx();
    let mut buffer = [0u8; 8];
    assert_eq!(
        ctx.fd_readdir(ROOT, &mut buffer, 0).unwrap_err(),
        Errno::Nosys
    );
    assert_eq!(
        ctx.path_link(ROOT, Lookupflags::empty(), "a", ROOT, "b")
            .unwrap_err(),
        Errno::Nosys
    );
    assert_eq!(
        ctx.path_readlink(ROOT, "a", &mut buffer).unwrap_err(),
        Errno::Nosys
    );
    assert_eq!(ctx.path_symlink("a", ROOT, "b").unwrap_err(), Errno::Nosys);
}

#[test]
fn unknown_descriptors_are_badf() {
    let mut ctx = ctx();
    assert_eq!(ctx.fd_fdstat_get(99).unwrap_err(), Errno::Badf);
    assert_eq!(ctx.fd_close(99).unwrap_err(), Errno::Badf);
    assert_eq!(ctx.fd_renumber(99, 100).unwrap_err(), Errno::Badf);
}

#[test]
fn exclusive_create_of_existing_file_is_exist() {
    let mut ctx = ctx();
    create(&mut ctx, "f", b"x");
    assert_eq!(
        ctx.path_open(
            ROOT,
            Lookupflags::empty(),
            "f",
            Oflags::CREAT | Oflags::EXCL,
            Rights::FD_WRITE,
            Rights::all(),
            Fdflags::empty(),
        )
        .unwrap_err(),
        Errno::Exist
    );
}

#[test]
fn open_missing_file_is_noent() {
    let mut ctx = ctx();
    assert_eq!(
        ctx.path_open(
            ROOT,
            Lookupflags::empty(),
            "missing",
            Oflags::empty(),
            Rights::FD_READ,
            Rights::all(),
            Fdflags::empty(),
        )
        .unwrap_err(),
        Errno::Noent
    );
}

#[test]
fn truncating_open_clears_the_contents() {
    let mut ctx = ctx();
    create(&mut ctx, "f", b"payload");
    let fd = open(
        &mut ctx,
        "f",
        Oflags::TRUNC,
        Rights::FD_WRITE,
        Fdflags::empty(),
    );
    ctx.fd_close(fd).unwrap();
    let stat = ctx
        .path_filestat_get(ROOT, Lookupflags::empty(), "f")
        .unwrap();
    assert_eq!(stat.size, 0);
}

#[test]
fn dot_resolves_to_the_directory_itself() {
    let mut ctx = ctx();
    let stat = ctx
        .path_filestat_get(ROOT, Lookupflags::empty(), ".")
        .unwrap();
    assert_eq!(stat.filetype, 3); // directory
}
