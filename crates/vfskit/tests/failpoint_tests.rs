//! Fault injection through fail points (run with `--features failpoints`).

#![cfg(feature = "failpoints")]

use fail::FailScenario;
use vfskit::{Error, OpenFlags, Vfs, CURRENT_DIRECTORY};

#[test]
fn injected_io_failures_surface_as_errors() {
    let scenario = FailScenario::setup();
    let vfs = Vfs::new();
    let fd = vfs
        .open_file_at(
            CURRENT_DIRECTORY,
            "f",
            OpenFlags::CREATE | OpenFlags::READ | OpenFlags::WRITE,
            0o644,
        )
        .unwrap();

    fail::cfg("fd::write", "return(busy)").unwrap();
    assert_eq!(vfs.write(fd, b"x"), Err(Error::Busy));
    fail::cfg("fd::write", "off").unwrap();
    assert_eq!(vfs.write(fd, b"x").unwrap(), 1);

    fail::cfg("fd::read", "return(denied)").unwrap();
    let mut buf = [0u8; 1];
    assert_eq!(vfs.read(fd, &mut buf), Err(Error::AccessDenied));
    fail::cfg("fd::read", "off").unwrap();

    scenario.teardown();
}
