//! End-to-end scenarios exercised through the public surface.

use vfskit::{
    Error, MapFlags, MsgFlags, OpenFlags, Seek, SocketAddress, SocketKind, Vfs, CURRENT_DIRECTORY,
};

/// Create, write, read back.
#[test]
fn create_write_read() {
    let vfs = Vfs::new();
    let fd = vfs
        .open_file_at(
            CURRENT_DIRECTORY,
            "a",
            OpenFlags::CREATE | OpenFlags::READ | OpenFlags::WRITE,
            0o644,
        )
        .unwrap();
    assert_eq!(fd, 3);
    assert_eq!(vfs.write(fd, b"hello").unwrap(), 5);
    assert_eq!(vfs.seek(fd, 0, Seek::Set).unwrap(), 0);
    let mut buf = [0u8; 16];
    assert_eq!(vfs.read(fd, &mut buf).unwrap(), 5);
    assert_eq!(&buf[..5], b"hello");
}

/// A two-link symlink cycle fails with ELOOP.
#[test]
fn symlink_loop() {
    let vfs = Vfs::new();
    vfs.create_symlink_at(CURRENT_DIRECTORY, "y", "x").unwrap();
    vfs.create_symlink_at(CURRENT_DIRECTORY, "x", "y").unwrap();
    assert_eq!(
        vfs.open_file_at(CURRENT_DIRECTORY, "x", OpenFlags::READ, 0),
        Err(Error::LinkLoop)
    );
}

/// Pipe bytes arrive in FIFO order; a drained pipe reports would-block.
#[test]
fn pipe_fifo_order() {
    let vfs = Vfs::new();
    let (r, w) = vfs.pipe().unwrap();
    assert_eq!(vfs.write(w, b"ABCDE").unwrap(), 5);

    let mut buf = [0u8; 3];
    assert_eq!(vfs.read(r, &mut buf).unwrap(), 3);
    assert_eq!(&buf, b"ABC");
    assert_eq!(vfs.read(r, &mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"DE");

    // A further read would suspend; check through the non-blocking gate.
    vfs.set_descriptor_flags(r, OpenFlags::NONBLOCK).unwrap();
    assert_eq!(vfs.read(r, &mut buf), Err(Error::WouldBlock));
}

/// UNIX stream socket round trip: bind, listen, connect, accept, ping.
#[test]
fn unix_stream_send_recv() {
    let vfs = Vfs::new();
    let server = vfs.socket(SocketKind::Stream, OpenFlags::empty()).unwrap();
    vfs.bind(server, SocketAddress::path("/s")).unwrap();
    vfs.listen(server, 1).unwrap();

    let client = vfs.socket(SocketKind::Stream, OpenFlags::empty()).unwrap();
    vfs.connect(client, &SocketAddress::path("/s")).unwrap();

    let (conn, peer) = vfs.accept(server).unwrap();
    assert!(!peer.is_valid()); // the client never bound a name

    assert_eq!(vfs.send(client, b"ping", MsgFlags::empty()).unwrap(), 4);
    let mut buf = [0u8; 4];
    let (n, _) = vfs.receive(conn, &mut buf, MsgFlags::empty()).unwrap();
    assert_eq!(n, 4);
    assert_eq!(&buf, b"ping");

    // And the other direction.
    assert_eq!(vfs.send(conn, b"pong", MsgFlags::empty()).unwrap(), 4);
    let (n, addr) = vfs.receive(client, &mut buf, MsgFlags::empty()).unwrap();
    assert_eq!(n, 4);
    assert_eq!(&buf, b"pong");
    assert_eq!(addr, SocketAddress::unnamed());
}

/// Renaming a directory into its own subtree is rejected.
#[test]
fn rename_into_self_forbidden() {
    let vfs = Vfs::new();
    vfs.create_node_at(CURRENT_DIRECTORY, "d", 0o040755).unwrap();
    vfs.create_node_at(CURRENT_DIRECTORY, "d/e", 0o040755)
        .unwrap();
    assert_eq!(
        vfs.rename_at(CURRENT_DIRECTORY, "d/e/d", CURRENT_DIRECTORY, "d"),
        Err(Error::InvalidArgument)
    );
}

/// A shared mapping blocks plain writes with EBUSY until released.
#[test]
fn mmap_write_interlock() {
    let vfs = Vfs::new();
    let fd = vfs
        .open_file_at(
            CURRENT_DIRECTORY,
            "f",
            OpenFlags::CREATE | OpenFlags::READ | OpenFlags::WRITE,
            0o644,
        )
        .unwrap();
    vfs.ftruncate(fd, 16).unwrap();

    let addr = vfs.mmap(fd, 16, 0, MapFlags::SHARED).unwrap();
    assert_eq!(vfs.write(fd, b"x"), Err(Error::Busy));

    vfs.munmap(addr).unwrap();
    assert_eq!(vfs.write(fd, b"x").unwrap(), 1);
}

/// Unlinked files stay readable through descriptors opened earlier.
#[test]
fn unlink_keeps_open_descriptors_alive() {
    let vfs = Vfs::new();
    let fd = vfs
        .open_file_at(
            CURRENT_DIRECTORY,
            "doomed",
            OpenFlags::CREATE | OpenFlags::READ | OpenFlags::WRITE,
            0o644,
        )
        .unwrap();
    vfs.write(fd, b"contents").unwrap();
    vfs.remove_file("doomed").unwrap();

    assert_eq!(vfs.stat("doomed"), Err(Error::NotFound));
    let mut buf = [0u8; 8];
    assert_eq!(vfs.read_at(fd, 0, &mut buf).unwrap(), 8);
    assert_eq!(&buf, b"contents");
    assert_eq!(vfs.write(fd, b"!").unwrap(), 1);
}

/// Rename moves the entry and preserves the inode.
#[test]
fn rename_preserves_inode() {
    let vfs = Vfs::new();
    vfs.create_node_at(CURRENT_DIRECTORY, "src", 0o100644)
        .unwrap();
    let before = vfs.stat("src").unwrap().ino;
    vfs.rename_at(CURRENT_DIRECTORY, "dst", CURRENT_DIRECTORY, "src")
        .unwrap();
    assert_eq!(vfs.stat("src"), Err(Error::NotFound));
    assert_eq!(vfs.stat("dst").unwrap().ino, before);
}

/// Renaming a directory over a non-empty directory is refused.
#[test]
fn rename_over_populated_directory() {
    let vfs = Vfs::new();
    vfs.create_node_at(CURRENT_DIRECTORY, "a", 0o040755).unwrap();
    vfs.create_node_at(CURRENT_DIRECTORY, "b", 0o040755).unwrap();
    vfs.create_node_at(CURRENT_DIRECTORY, "b/keep", 0o100644)
        .unwrap();
    assert_eq!(
        vfs.rename_at(CURRENT_DIRECTORY, "b", CURRENT_DIRECTORY, "a"),
        Err(Error::NotEmpty)
    );
    // Over an empty directory it succeeds.
    vfs.remove_file("b/keep").unwrap();
    vfs.rename_at(CURRENT_DIRECTORY, "b", CURRENT_DIRECTORY, "a")
        .unwrap();
    assert_eq!(vfs.stat("a"), Err(Error::NotFound));
    assert!(vfs.stat("b").unwrap().mode.is_directory());
}

/// Symlink chains resolve; lstat sees the link, stat the target.
#[test]
fn symlink_chain_and_lstat() {
    let vfs = Vfs::new();
    vfs.create_node_at(CURRENT_DIRECTORY, "target", 0o100644)
        .unwrap();
    vfs.create_symlink_at(CURRENT_DIRECTORY, "l1", "target")
        .unwrap();
    vfs.create_symlink_at(CURRENT_DIRECTORY, "l2", "l1").unwrap();
    vfs.create_symlink_at(CURRENT_DIRECTORY, "l3", "l2").unwrap();

    assert_eq!(
        vfs.stat("l3").unwrap().ino,
        vfs.stat("target").unwrap().ino
    );
    assert!(vfs.lstat("l3").unwrap().mode.is_link());
    assert_eq!(vfs.read_link_at(CURRENT_DIRECTORY, "l3").unwrap(), "l2");
    assert_eq!(
        vfs.read_link_at(CURRENT_DIRECTORY, "target"),
        Err(Error::InvalidArgument)
    );
}

/// Directories in the middle of a path follow symlinks even without the
/// follow flag; only the final component is left unresolved.
#[test]
fn intermediate_symlinks_always_followed() {
    let vfs = Vfs::new();
    vfs.create_node_at(CURRENT_DIRECTORY, "real", 0o040755)
        .unwrap();
    vfs.create_node_at(CURRENT_DIRECTORY, "real/f", 0o100644)
        .unwrap();
    vfs.create_symlink_at(CURRENT_DIRECTORY, "alias", "real")
        .unwrap();
    assert_eq!(
        vfs.lstat("alias/f").unwrap().ino,
        vfs.stat("real/f").unwrap().ino
    );
}

/// Removing directories: only empty ones, and never via unlink.
#[test]
fn remove_directory_semantics() {
    let vfs = Vfs::new();
    vfs.create_node_at(CURRENT_DIRECTORY, "d", 0o040755).unwrap();
    vfs.create_node_at(CURRENT_DIRECTORY, "d/f", 0o100644)
        .unwrap();
    assert_eq!(vfs.remove_file("d"), Err(Error::IsADirectory));
    assert_eq!(vfs.remove_directory("d"), Err(Error::NotEmpty));
    vfs.remove_file("d/f").unwrap();
    vfs.remove_directory("d").unwrap();
    assert_eq!(vfs.stat("d"), Err(Error::NotFound));
}
