//! The bit-packed mode word: file type nibble plus permission triplets.

use bitflags::bitflags;

bitflags! {
    /// File type and permission bits, laid out like `st_mode`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Mode: u32 {
        const SOCKET = 0o140000;
        const LINK = 0o120000;
        const FILE = 0o100000;
        const BLOCK_DEVICE = 0o060000;
        const DIRECTORY = 0o040000;
        const CHAR_DEVICE = 0o020000;
        const FIFO = 0o010000;

        const SET_UID = 0o4000;
        const SET_GID = 0o2000;
        const STICKY = 0o1000;

        const RUSER = 0o400;
        const WUSER = 0o200;
        const XUSER = 0o100;
        const RGROUP = 0o040;
        const WGROUP = 0o020;
        const XGROUP = 0o010;
        const ROTHER = 0o004;
        const WOTHER = 0o002;
        const XOTHER = 0o001;

        const RWXUSER = 0o700;
        const RWXGROUP = 0o070;
        const RWXOTHER = 0o007;

        /// All nine permission bits.
        const GRANTS = 0o777;
    }
}

impl Mode {
    /// Mask selecting the file type nibble.
    pub const TYPE_MASK: u32 = 0o170000;

    /// Bits `chmod` may change: permissions plus setuid/setgid/sticky.
    pub const CHMOD_MASK: u32 = 0o7777;

    /// Reinterpret a raw mode word, keeping unknown bits.
    pub fn from_raw(bits: u32) -> Self {
        Mode::from_bits_retain(bits)
    }

    fn file_type(self) -> u32 {
        self.bits() & Self::TYPE_MASK
    }

    pub fn is_file(self) -> bool {
        self.file_type() == Mode::FILE.bits()
    }

    pub fn is_directory(self) -> bool {
        self.file_type() == Mode::DIRECTORY.bits()
    }

    pub fn is_link(self) -> bool {
        self.file_type() == Mode::LINK.bits()
    }

    pub fn is_fifo(self) -> bool {
        self.file_type() == Mode::FIFO.bits()
    }

    pub fn is_socket(self) -> bool {
        self.file_type() == Mode::SOCKET.bits()
    }

    pub fn is_char_device(self) -> bool {
        self.file_type() == Mode::CHAR_DEVICE.bits()
    }

    pub fn is_block_device(self) -> bool {
        self.file_type() == Mode::BLOCK_DEVICE.bits()
    }

    pub fn user_read(self) -> bool {
        self.contains(Mode::RUSER)
    }

    pub fn user_write(self) -> bool {
        self.contains(Mode::WUSER)
    }

    pub fn user_execute(self) -> bool {
        self.contains(Mode::XUSER)
    }

    /// `true` when every bit of `grant` is present.
    pub fn grants(self, grant: Mode) -> bool {
        self.contains(grant)
    }
}
